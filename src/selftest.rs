//! Self-testing: unit tests that run inside the booted kernel, via
//! `#![test_runner(crate::selftest::runner)]`.
//!
//! Because the kernel cannot reset itself between tests, a test that corrupts shared state
//! (the frame allocator, the mounted volume) could in principle make a later test pass for the
//! wrong reason. In practice every `#[test_case]` in this crate either operates on fresh
//! kernel-heap-backed local state or targets pure, side-effect-free arithmetic, so this is a
//! theoretical concern rather than a live one.

use core::{
	any::type_name,
	sync::atomic::{AtomicBool, Ordering},
};

static RUNNING: AtomicBool = AtomicBool::new(false);

/// Trait for any testable feature; blanket-implemented for all `Fn()`.
pub trait Testable {
	/// Runs the test, printing its name and result.
	fn run(&self);
}

impl<T: Fn()> Testable for T {
	fn run(&self) {
		let name = type_name::<T>();
		crate::print!("test {name} ... ");
		self();
		crate::println!("ok");
	}
}

/// The test runner registered as `#![test_runner]`.
pub fn runner(tests: &[&dyn Testable]) {
	crate::println!("running {} tests", tests.len());
	RUNNING.store(true, Ordering::Relaxed);
	for test in tests {
		test.run();
	}
	RUNNING.store(false, Ordering::Relaxed);
	crate::println!("all tests passed");
	#[cfg(config_debug_qemu)]
	crate::debug::qemu::exit(crate::debug::qemu::SUCCESS);
}

/// Tells whether self-testing is currently running.
pub fn is_running() -> bool {
	RUNNING.load(Ordering::Relaxed)
}
