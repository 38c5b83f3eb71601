//! `read` (spec.md §4.4, §6, syscall 3): delegates to the filesystem except fd 0, which is the
//! console. The console has no input backend (spec.md §1 scopes it out as an external
//! collaborator; see DESIGN.md) — fd 0 therefore always reads as empty, as though already at
//! end-of-file, rather than blocking on input that can never arrive.

use crate::{
	fs, process,
	util::{errno, EResult},
};
use macros::syscall;

#[syscall]
pub fn read(fd: i32, buf_ptr: usize, count: usize) -> EResult<usize> {
	let buf = super::user_slice_mut(buf_ptr, count)?;
	match fd {
		0 => Ok(0),
		1 | 2 => Err(errno!(EBADF)),
		_ => {
			let guard = fs::volume()?;
			let volume = guard.as_ref().expect("checked Some by fs::volume");
			process::with_current(|t| {
				let handle = t.fds.get_mut(fd as usize)?;
				fs::handle::read(volume, handle, buf)
			})
		}
	}
}
