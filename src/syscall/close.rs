//! `close` (spec.md §4.4, §6, syscall 6).

use crate::{fs, process, util::EResult};
use macros::syscall;

#[syscall]
pub fn close(fd: i32) -> EResult<usize> {
	let handle = process::with_current(|t| t.fds.take(fd as usize))?;
	let mut guard = fs::volume()?;
	let volume = guard.as_mut().expect("checked Some by fs::volume");
	fs::handle::close(volume, handle)?;
	Ok(0)
}
