//! `write` (spec.md §4.4, §6, syscall 4): fd 1/2 go to the console, everything else to the
//! filesystem.

use crate::{
	fs, process,
	util::{errno, EResult},
};
use macros::syscall;

#[syscall]
pub fn write(fd: i32, buf_ptr: usize, count: usize) -> EResult<usize> {
	let buf = super::user_slice(buf_ptr, count)?;
	match fd {
		0 => Err(errno!(EBADF)),
		1 | 2 => {
			crate::print::write_bytes(buf);
			Ok(buf.len())
		}
		_ => {
			let mut guard = fs::volume()?;
			let volume = guard.as_mut().expect("checked Some by fs::volume");
			process::with_current(|t| {
				let handle = t.fds.get_mut(fd as usize)?;
				fs::handle::write(volume, handle, buf)
			})
		}
	}
}
