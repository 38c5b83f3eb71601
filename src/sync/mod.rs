//! Concurrency primitives.
//!
//! spec.md §5 is explicit: the only source of concurrent execution on this kernel is the timer
//! interrupt preempting whatever was running on the single CPU. There is therefore no true
//! contention to resolve — only re-entrancy from an interrupt handler landing inside a critical
//! section the interrupted code was in the middle of. [`IntMutex`] is the kernel's answer: a
//! spinlock (from the `spin` crate) that also masks interrupts for the duration of the guard, so
//! an IRQ can never observe the lock half-held by the code it preempted.

use core::{
	arch::asm,
	ops::{Deref, DerefMut},
};
use spin::{Mutex as SpinMutex, MutexGuard as SpinGuard};

/// Reads and clears the interrupt flag, returning whether interrupts were enabled beforehand.
#[inline]
fn cli_save() -> bool {
	let flags: u64;
	unsafe {
		asm!("pushfq; pop {}", out(reg) flags, options(nomem, preserves_flags));
		asm!("cli", options(nomem, nostack));
	}
	flags & 0x200 != 0
}

/// Restores the interrupt flag to `enabled`.
#[inline]
fn restore(enabled: bool) {
	unsafe {
		if enabled {
			asm!("sti", options(nomem, nostack));
		}
	}
}

/// A mutex that disables interrupts for the lifetime of the guard.
///
/// This is the kernel's only lock: with a single CPU and interrupts as the sole preemption
/// source, masking interrupts around the critical section is both necessary and sufficient.
pub struct IntMutex<T> {
	inner: SpinMutex<T>,
}

impl<T> IntMutex<T> {
	/// Creates a new lock wrapping `value`.
	pub const fn new(value: T) -> Self {
		Self {
			inner: SpinMutex::new(value),
		}
	}

	/// Locks the mutex, disabling interrupts until the guard is dropped.
	pub fn lock(&self) -> IntMutexGuard<'_, T> {
		let was_enabled = cli_save();
		let guard = self.inner.lock();
		IntMutexGuard {
			guard,
			was_enabled,
		}
	}
}

/// RAII guard for [`IntMutex`]. Restores the interrupt flag on drop.
pub struct IntMutexGuard<'m, T> {
	guard: SpinGuard<'m, T>,
	was_enabled: bool,
}

impl<T> Deref for IntMutexGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &T {
		&self.guard
	}
}

impl<T> DerefMut for IntMutexGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut T {
		&mut self.guard
	}
}

impl<T> Drop for IntMutexGuard<'_, T> {
	fn drop(&mut self) {
		restore(self.was_enabled);
	}
}

/// Runs `f` with interrupts disabled, restoring the previous flag state afterwards.
///
/// Used around FAT/bitmap sector writes and other multi-step metadata updates that must not be
/// observed half-done by a timer tick (spec.md §5, §9 "interrupt-free critical section").
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
	let was_enabled = cli_save();
	let r = f();
	restore(was_enabled);
	r
}
