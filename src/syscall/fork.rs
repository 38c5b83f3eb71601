//! `fork` (spec.md §4.5, syscall 2).
//!
//! Written by hand rather than through `#[syscall]`: the handler needs the raw interrupt frame
//! itself (to build the child's resume state), which no `FromSyscallArg` conversion produces.

use crate::{idt::IntFrame, process, util::EResult};

pub fn fork_raw(frame: &IntFrame) -> EResult<usize> {
	process::fork(frame).map(|pid| pid as usize)
}
