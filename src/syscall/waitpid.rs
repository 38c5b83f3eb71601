//! `waitpid` (spec.md §4.5, syscall 7).

use crate::{process, util::EResult};
use macros::syscall;

#[syscall]
pub fn waitpid(pid: i32, status_ptr: usize, _opts: i32) -> EResult<usize> {
	let (reaped_pid, code) = process::waitpid(pid as u32)?;
	if status_ptr != 0 {
		let buf = super::user_slice_mut(status_ptr, core::mem::size_of::<i32>())?;
		buf.copy_from_slice(&code.to_ne_bytes());
	}
	Ok(reaped_pid as usize)
}
