//! `getpid` (spec.md §4.5, syscall 20).

use crate::{process, util::EResult};
use macros::syscall;

#[syscall]
pub fn getpid() -> EResult<usize> {
	Ok(process::current_pid() as usize)
}
