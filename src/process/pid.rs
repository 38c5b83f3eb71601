//! PID allocation: a simple bitmap over `[0, MAX_PROCESSES)`, pid 0 reserved for the idle task.

use crate::{
	config::MAX_PROCESSES,
	sync::IntMutex,
	util::{errno, EResult},
};

pub type Pid = u32;

/// The idle task's fixed pid.
pub const IDLE_PID: Pid = 0;

static USED: IntMutex<[bool; MAX_PROCESSES]> = IntMutex::new([false; MAX_PROCESSES]);

/// Reserves and returns the lowest unused pid greater than [`IDLE_PID`].
pub fn alloc() -> EResult<Pid> {
	let mut used = USED.lock();
	for (pid, slot) in used.iter_mut().enumerate().skip(1) {
		if !*slot {
			*slot = true;
			return Ok(pid as Pid);
		}
	}
	Err(errno!(EAGAIN))
}

/// Returns `pid` to the pool.
pub fn free(pid: Pid) {
	if (pid as usize) < MAX_PROCESSES {
		USED.lock()[pid as usize] = false;
	}
}
