//! Rust-side wrapper around the assembly context switch.

use super::regs::Context;

extern "C" {
	/// Saves callee-saved registers into `*prev`, restores them from `*next`, and returns into
	/// whatever call site last suspended `next` (its own earlier call to this same function).
	fn context_switch(prev: *mut Context, next: *const Context);
}

/// Switches execution from `prev` to `next`. Returns once some future call switches back into
/// `prev`.
pub fn switch(prev: &mut Context, next: &Context) {
	unsafe {
		context_switch(prev as *mut Context, next as *const Context);
	}
}
