//! Priority scheduler (spec.md §4.6): a fixed-quantum preemptive scheduler that always runs the
//! Ready task with the lowest priority value. The idle task's priority is pinned to `u8::MAX`
//! (see [`super::init`]), so it naturally loses to anything else Ready without needing a special
//! case in the scan.

use super::{pid, regs::Context, switch, State, CURRENT, TASKS};
use crate::{
	config::SCHED_QUANTUM_TICKS,
	gdt,
	memory::vmem::{self, Root},
};
use core::sync::atomic::{AtomicUsize, Ordering};

/// Ticks remaining in the current task's quantum.
static REMAINING: AtomicUsize = AtomicUsize::new(SCHED_QUANTUM_TICKS);

/// Called from the timer interrupt handler on every tick. Counts the tick against whichever task
/// is currently Running (spec.md §3, "accumulated tick count"), then reschedules once the quantum
/// runs out.
pub fn tick() {
	let current = CURRENT.load(Ordering::Relaxed);
	if let Some(task) = TASKS.lock()[current].as_mut() {
		task.ticks += 1;
	}
	if REMAINING.fetch_sub(1, Ordering::Relaxed) <= 1 {
		schedule();
	}
}

/// Gives up the rest of the current quantum and reschedules. Used by blocking waits (e.g.
/// `waitpid`) that have nothing better to do until some other task makes progress.
pub fn yield_now() {
	schedule();
}

/// Picks the next task to run and switches into it. Returns once this task is chosen to run
/// again.
///
/// Must not hold [`TASKS`] across the actual context switch: the task switched into may itself
/// need the lock (directly, or transitively via an interrupt) before ever switching back, which
/// would deadlock a single CPU against itself. The lock is taken only to choose the next task and
/// is dropped before `switch::switch` is called.
pub fn schedule() {
	let (prev_ctx, next_ctx, next_root, next_stack_top): (*mut Context, *const Context, Root, u64) = {
		let mut tasks = TASKS.lock();
		let current = CURRENT.load(Ordering::Relaxed);
		if let Some(task) = tasks[current].as_mut() {
			if task.state == State::Running {
				task.state = State::Ready;
			}
		}

		let mut best: Option<usize> = None;
		for (pid, slot) in tasks.iter().enumerate() {
			let Some(task) = slot else { continue };
			if task.state != State::Ready {
				continue;
			}
			let better = match best {
				None => true,
				Some(b) => task.priority < tasks[b].as_ref().unwrap().priority,
			};
			if better {
				best = Some(pid);
			}
		}
		// The idle task is always Ready, so `best` can only be `None` before the idle task has
		// been created during boot.
		let next = best.unwrap_or(pid::IDLE_PID as usize);

		let prev_ctx = {
			let task = tasks[current].as_mut().expect("current task missing from table");
			&mut task.context as *mut Context
		};
		let next_task = tasks[next].as_mut().expect("chosen task missing from table");
		next_task.state = State::Running;
		let next_ctx = &next_task.context as *const Context;
		let next_root = next_task.address_space;
		let next_stack_top =
			next_task.kernel_stack.as_ref().map(|s| s.top.0 as u64).unwrap_or(0);

		CURRENT.store(next, Ordering::Relaxed);
		REMAINING.store(SCHED_QUANTUM_TICKS, Ordering::Relaxed);
		(prev_ctx, next_ctx, next_root, next_stack_top)
	};

	vmem::switch_address_space(next_root);
	gdt::set_kernel_stack(next_stack_top);
	// Safety: both pointers were read from live `TASKS` slots above and remain valid — a task's
	// `Context`/`kernel_stack` are never moved or freed while it is Ready or Running.
	unsafe {
		switch::switch(&mut *prev_ctx, &*next_ctx);
	}
}
