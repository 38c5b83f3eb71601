//! Signal delivery: a fixed-size pending queue per task (spec.md §4.5 "deliver SIGCHLD (signal
//! 17) to the parent by appending to the parent's pending queue").

use crate::config::MAX_PENDING_SIGNALS;

/// Number of installed-handler slots a PCB carries (spec.md §3, "32 installed handler slots").
pub const MAX_SIGNAL: u8 = 32;

/// Signal numbers the kernel knows about; values match Linux's numbering since that is the
/// contract userspace programs are compiled against.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
	Hup = 1,
	Int = 2,
	Quit = 3,
	Ill = 4,
	Trap = 5,
	Abrt = 6,
	Bus = 7,
	Fpe = 8,
	Kill = 9,
	Usr1 = 10,
	Segv = 11,
	Usr2 = 12,
	Pipe = 13,
	Alrm = 14,
	Term = 15,
	Chld = 17,
	Cont = 18,
	Stop = 19,
}

impl Signal {
	/// Index into a PCB's `signal_handlers` array for this signal (spec.md §6, "integers 1–31").
	pub fn slot(self) -> usize {
		(self as u8 - 1) as usize
	}

	/// Whether this signal terminates its target immediately rather than queuing (spec.md §5
	/// "Cancellation", §6 "SIGKILL/SIGTERM terminate immediately").
	pub fn is_fatal(self) -> bool {
		matches!(self, Signal::Kill | Signal::Term)
	}
}

/// A bounded FIFO of pending signal numbers. Once full, further deliveries are dropped: the
/// kernel does not implement real-time queuing.
#[derive(Default)]
pub struct PendingQueue {
	slots: [u8; MAX_PENDING_SIGNALS],
	len: usize,
}

impl PendingQueue {
	/// Appends `signal` to the queue if there is room.
	pub fn push(&mut self, signal: Signal) {
		if self.len < self.slots.len() {
			self.slots[self.len] = signal as u8;
			self.len += 1;
		}
	}

	/// Removes and returns the oldest pending signal, if any.
	pub fn pop(&mut self) -> Option<Signal> {
		if self.len == 0 {
			return None;
		}
		let value = self.slots[0];
		self.slots.copy_within(1..self.len, 0);
		self.len -= 1;
		// Every value ever pushed came from `Signal as u8`, so this always round-trips.
		Some(match value {
			1 => Signal::Hup,
			2 => Signal::Int,
			3 => Signal::Quit,
			4 => Signal::Ill,
			5 => Signal::Trap,
			6 => Signal::Abrt,
			7 => Signal::Bus,
			8 => Signal::Fpe,
			9 => Signal::Kill,
			10 => Signal::Usr1,
			11 => Signal::Segv,
			12 => Signal::Usr2,
			13 => Signal::Pipe,
			14 => Signal::Alrm,
			15 => Signal::Term,
			17 => Signal::Chld,
			18 => Signal::Cont,
			_ => Signal::Stop,
		})
	}

	/// Tells whether any signal is pending.
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}
}

/// Pops and delivers at most one pending signal for the current task at a syscall-return
/// boundary (spec.md §6, "others are queued and delivered at a syscall-return boundary"; spec.md
/// §1's Non-goals explicitly rule out delivery at arbitrary instruction points, only here).
///
/// A signal with an installed handler redirects `frame` to it: the interrupted `rip` is pushed
/// onto the user stack (the same slot `fork` reads/writes to reach the pushed `rsp`/`ss`, since
/// `IntFrame` itself ends at `rflags`) so the handler's own `ret` resumes the interrupted code,
/// and the signal number is passed in `rdi` per the SysV calling convention. A signal with no
/// handler installed is dropped: this kernel defines no default disposition beyond SIGKILL/SIGTERM,
/// which `signal_send` handles directly and never queues.
pub fn deliver_pending(frame: &mut crate::idt::IntFrame) {
	if !frame.from_userspace() {
		return;
	}
	let Some((sig, handler)) = super::with_current(|t| {
		let sig = t.pending_signals.pop()?;
		Some((sig, t.signal_handlers[sig.slot()]))
	}) else {
		return;
	};
	let Some(handler) = handler else {
		return;
	};
	// Safety: `frame` is the live interrupt frame for a ring-3 entry; the two `u64`s immediately
	// past it on this kernel stack are the `rsp`/`ss` the CPU pushed on privilege-level change.
	unsafe {
		let user_rsp_ptr = (frame as *mut crate::idt::IntFrame as *mut u64).add(core::mem::size_of::<crate::idt::IntFrame>() / 8);
		let mut user_rsp = *user_rsp_ptr;
		user_rsp -= 8;
		(user_rsp as *mut u64).write(frame.rip);
		*user_rsp_ptr = user_rsp;
	}
	frame.rdi = sig as u64;
	frame.rip = handler as u64;
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn fifo_order() {
		let mut q = PendingQueue::default();
		q.push(Signal::Chld);
		q.push(Signal::Term);
		assert_eq!(q.pop(), Some(Signal::Chld));
		assert_eq!(q.pop(), Some(Signal::Term));
		assert_eq!(q.pop(), None);
	}

	#[test_case]
	fn drops_past_capacity() {
		let mut q = PendingQueue::default();
		for _ in 0..MAX_PENDING_SIGNALS + 4 {
			q.push(Signal::Chld);
		}
		let mut count = 0;
		while q.pop().is_some() {
			count += 1;
		}
		assert_eq!(count, MAX_PENDING_SIGNALS);
	}
}
