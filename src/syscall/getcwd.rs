//! `getcwd` (spec.md §4.4, syscall 79).

use crate::{
	process,
	util::{errno, EResult},
};
use macros::syscall;

#[syscall]
pub fn getcwd(buf_ptr: usize, size: usize) -> EResult<usize> {
	let cwd = process::with_current(|t| t.cwd_path.clone());
	let needed = cwd.len() + 1;
	if needed > size {
		return Err(errno!(ERANGE));
	}
	let buf = super::user_slice_mut(buf_ptr, needed)?;
	buf[..cwd.len()].copy_from_slice(&cwd);
	buf[cwd.len()] = 0;
	Ok(needed)
}
