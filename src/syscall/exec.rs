//! `exec` (spec.md §4.5, syscall 11): replaces the current task's image in place.
//!
//! Written by hand rather than through `#[syscall]`: on success the handler must rewrite the
//! interrupt frame's `rip`/`rsp`/`cs`/`rflags` itself, which no ordinary return value can express.

use crate::{idt::IntFrame, process, util::EResult};

pub fn exec_raw(frame: &mut IntFrame, args: &[usize; 6]) -> EResult<usize> {
	let path = super::read_path(args[0])?;
	process::exec(frame, &path)?;
	// The frame now resumes at the new image's entry point; `int 0x80`'s caller-visible return
	// value is moot since that caller no longer exists, but `dispatch` still needs something to
	// write into `rax` before `iretq` — harmless, since `rax` is immediately overwritten by the
	// loaded program's own startup code.
	Ok(0)
}
