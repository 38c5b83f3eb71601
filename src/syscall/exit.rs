//! `exit` (spec.md §4.5, syscall 1): never returns.

use crate::process;
use macros::syscall;

#[syscall]
pub fn exit(code: i32) -> ! {
	process::exit(code)
}
