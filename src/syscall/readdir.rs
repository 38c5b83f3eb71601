//! `readdir` (spec.md §4.4 "Directory enumeration", syscall 18): yields one entry name per call
//! from a directory opened via `open`.

use crate::{
	fs, process,
	util::{errno, EResult},
};
use macros::syscall;

#[syscall]
pub fn readdir(fd: i32, buf_ptr: usize, buf_len: usize) -> EResult<usize> {
	let guard = fs::volume()?;
	let volume = guard.as_ref().expect("checked Some by fs::volume");
	let name = process::with_current(|t| {
		let handle = t.fds.get_mut(fd as usize)?;
		fs::handle::readdir(volume, handle)
	})?;
	drop(guard);

	match name {
		None => Ok(0),
		Some(name) => {
			if name.len() > buf_len {
				return Err(errno!(ENAMETOOLONG));
			}
			let buf = super::user_slice_mut(buf_ptr, name.len())?;
			buf.copy_from_slice(&name);
			Ok(name.len())
		}
	}
}
