//! Task control blocks and their lifecycle (spec.md §4.5).
//!
//! The source this was distilled from threads tasks through a linked list of raw pointers
//! (spec.md §9, "Task list as a linked list of raw pointers"). This reimplementation instead
//! uses a single fixed-size table indexed by pid — the "owning table" redesign spec.md §9
//! recommends — so the scheduler and `waitpid` never chase a pointer that might have been
//! freed out from under them.

pub mod pid;
pub mod regs;
pub mod scheduler;
pub mod signal;
pub mod switch;

use crate::{
	config::{KERNEL_STACK_PAGES, MAX_PROCESSES},
	fs,
	file::fd::FdTable,
	gdt,
	idt::IntFrame,
	memory::{
		frame,
		stack::{self, KernelStack},
		vmem::{self, Flags, Root},
		VirtAddr, PAGE_SIZE,
	},
	sync::IntMutex,
	util::{errno, EResult},
};
use core::sync::atomic::{AtomicUsize, Ordering};
use pid::Pid;
use regs::Context;
use signal::PendingQueue;

extern "C" {
	/// The label in `interrupt.S` right after `isr_common`'s call into Rust — a newly created
	/// task's stack is built to look exactly like one that is about to run this epilogue.
	fn isr_epilogue();
}

/// Top of the per-task user stack (spec.md §4.5): just below the canonical-address boundary.
const USER_STACK_TOP: VirtAddr = VirtAddr(0x0000_7FFF_FFFF_E000);
/// Size of a new task's user stack. Not fixed by spec.md; chosen to match the kernel stack size.
const USER_STACK_PAGES: usize = KERNEL_STACK_PAGES;
/// Base of the `brk` heap window (spec.md §4.7).
pub const USER_BRK_BASE: VirtAddr = VirtAddr(0x1000_0000);
/// Base of the anonymous `mmap` bump region (spec.md §4.7).
pub const USER_MMAP_BASE: VirtAddr = VirtAddr(0x4000_0000);

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
	Ready,
	Running,
	Blocked,
	Zombie,
}

/// A task control block.
pub struct Task {
	pub pid: Pid,
	pub ppid: Pid,
	pub priority: u8,
	pub state: State,
	pub context: Context,
	pub address_space: Root,
	pub kernel_stack: Option<KernelStack>,
	pub is_user: bool,
	pub exit_code: i32,
	pub fds: FdTable,
	pub pending_signals: PendingQueue,
	/// Installed handler slots, one per signal number 1..=32 (spec.md §3). `None` means the
	/// default disposition (terminate, for every signal this kernel delivers).
	pub signal_handlers: [Option<usize>; signal::MAX_SIGNAL as usize],
	pub cwd_cluster: u32,
	pub cwd_path: alloc::vec::Vec<u8>,
	pub brk: VirtAddr,
	pub mmap_bump: VirtAddr,
	/// Number of timer ticks this task has been the one Running (spec.md §3, "accumulated tick
	/// count"), incremented by [`scheduler::tick`].
	pub ticks: u64,
}

/// The task table: a fixed-size array indexed by pid, `None` for unused slots.
static TASKS: IntMutex<[Option<Task>; MAX_PROCESSES]> = IntMutex::new([const { None }; MAX_PROCESSES]);
/// Index (pid) of the task currently running. Reads/writes only happen with interrupts
/// disabled (inside [`TASKS`]'s critical sections or the scheduler), so `Relaxed` suffices.
static CURRENT: AtomicUsize = AtomicUsize::new(pid::IDLE_PID as usize);

/// Runs `f` with the task table locked and the current task borrowed mutably.
pub fn with_current<R>(f: impl FnOnce(&mut Task) -> R) -> R {
	let mut tasks = TASKS.lock();
	let current = CURRENT.load(Ordering::Relaxed);
	f(tasks[current].as_mut().expect("current task missing from table"))
}

/// Runs `f` with the task table locked and the task at `pid` borrowed mutably, if present.
pub fn with_task<R>(pid: Pid, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
	let mut tasks = TASKS.lock();
	tasks.get_mut(pid as usize)?.as_mut().map(f)
}

/// The pid of the task currently running.
pub fn current_pid() -> Pid {
	CURRENT.load(Ordering::Relaxed) as Pid
}

/// Writes the register frame a brand-new task's kernel stack must hold so that
/// `context_switch`'s trailing `ret` lands on `isr_epilogue`'s first `pop`, which then
/// `iretq`s straight into `entry` (spec.md §4.5's initial register frame, built via the same
/// mechanism a real interrupt return uses).
fn build_initial_context(stack_top: VirtAddr, entry: usize, is_user: bool, user_rsp: VirtAddr) -> Context {
	let mut sp = stack_top.0;
	if is_user {
		sp -= 8;
		unsafe { (sp as *mut u64).write(gdt::USER_DS as u64) };
		sp -= 8;
		unsafe { (sp as *mut u64).write(user_rsp.0 as u64) };
	}
	sp -= core::mem::size_of::<IntFrame>();
	let frame = IntFrame {
		r15: 0,
		r14: 0,
		r13: 0,
		r12: 0,
		r11: 0,
		r10: 0,
		r9: 0,
		r8: 0,
		rbp: 0,
		rdi: 0,
		rsi: 0,
		rdx: 0,
		rcx: 0,
		rbx: 0,
		rax: 0,
		vector: 0,
		error_code: 0,
		rip: entry as u64,
		cs: if is_user { gdt::USER_CS as u64 } else { gdt::KERNEL_CS as u64 },
		rflags: 0x202,
	};
	unsafe { (sp as *mut IntFrame).write(frame) };
	sp -= 8;
	unsafe { (sp as *mut u64).write(isr_epilogue as usize as u64) };
	Context { rbx: 0, rbp: 0, r12: 0, r13: 0, r14: 0, r15: 0, rsp: sp as u64 }
}

fn root_cluster() -> u32 {
	fs::volume().ok().and_then(|guard| guard.as_ref().map(|v| v.root_cluster())).unwrap_or(0)
}

/// Creates a new task running `entry` (a kernel function pointer if `!is_user`, else a user
/// virtual address), appends it to the task table, and returns its pid.
pub fn create(entry: usize, is_user: bool, priority: u8, ppid: Pid) -> EResult<Pid> {
	let pid = pid::alloc()?;
	let kernel_stack = match stack::alloc() {
		Some(s) => s,
		None => {
			pid::free(pid);
			return Err(errno!(ENOMEM));
		}
	};

	let address_space = if is_user {
		match vmem::create_address_space() {
			Some(root) => root,
			None => {
				stack::free(kernel_stack);
				pid::free(pid);
				return Err(errno!(ENOMEM));
			}
		}
	} else {
		vmem::kernel_root()
	};

	let mut user_rsp = VirtAddr(0);
	if is_user {
		let base = USER_STACK_TOP - USER_STACK_PAGES * PAGE_SIZE;
		for i in 0..USER_STACK_PAGES {
			let Some(phys) = frame::alloc_page() else {
				vmem::destroy_address_space(address_space);
				stack::free(kernel_stack);
				pid::free(pid);
				return Err(errno!(ENOMEM));
			};
			let virt = VirtAddr(base.0 + i * PAGE_SIZE);
			if vmem::map_page(address_space, virt, phys, Flags::PRESENT | Flags::WRITABLE | Flags::USER).is_none() {
				frame::free_page(phys);
				vmem::destroy_address_space(address_space);
				stack::free(kernel_stack);
				pid::free(pid);
				return Err(errno!(ENOMEM));
			}
		}
		user_rsp = USER_STACK_TOP;
	}

	let context = build_initial_context(kernel_stack.top, entry, is_user, user_rsp);
	let task = Task {
		pid,
		ppid,
		priority,
		state: State::Ready,
		context,
		address_space,
		kernel_stack: Some(kernel_stack),
		is_user,
		exit_code: 0,
		fds: FdTable::new(),
		pending_signals: PendingQueue::default(),
		signal_handlers: [None; signal::MAX_SIGNAL as usize],
		cwd_cluster: root_cluster(),
		cwd_path: alloc::vec![b'/'],
		brk: USER_BRK_BASE,
		mmap_bump: USER_MMAP_BASE,
		ticks: 0,
	};
	TASKS.lock()[pid as usize] = Some(task);
	Ok(pid)
}

/// The idle task's entry point: an interrupt-enabled halt loop, the scheduler's fallback when
/// no other task is Ready (spec.md §4.6).
extern "C" fn idle_entry() -> ! {
	loop {
		crate::power::halt();
	}
}

/// Boots the process subsystem: creates the idle task at pid 0.
pub fn init() {
	let kernel_stack = stack::alloc().expect("out of memory creating the idle task");
	let context = build_initial_context(kernel_stack.top, idle_entry as usize, false, VirtAddr(0));
	let idle = Task {
		pid: pid::IDLE_PID,
		ppid: pid::IDLE_PID,
		priority: u8::MAX,
		state: State::Ready,
		context,
		address_space: vmem::kernel_root(),
		kernel_stack: Some(kernel_stack),
		is_user: false,
		exit_code: 0,
		fds: FdTable::new(),
		pending_signals: PendingQueue::default(),
		signal_handlers: [None; signal::MAX_SIGNAL as usize],
		cwd_cluster: root_cluster(),
		cwd_path: alloc::vec![b'/'],
		brk: USER_BRK_BASE,
		mmap_bump: USER_MMAP_BASE,
		ticks: 0,
	};
	TASKS.lock()[pid::IDLE_PID as usize] = Some(idle);
}

/// Spawns the first user process by loading `path` (resolved from the filesystem root) into a
/// fresh address space. Unlike [`create`], which hands a task a kernel function pointer to run,
/// this loads a real ELF image, since there is no parent task yet to `exec` from. The new task
/// is its own parent: pid 1 has no ancestor to reparent onto.
pub fn spawn_init(path: &[u8]) -> EResult<Pid> {
	let pid = pid::alloc()?;
	let kernel_stack = match stack::alloc() {
		Some(s) => s,
		None => {
			pid::free(pid);
			return Err(errno!(ENOMEM));
		}
	};
	let address_space = match vmem::create_address_space() {
		Some(root) => root,
		None => {
			stack::free(kernel_stack);
			pid::free(pid);
			return Err(errno!(ENOMEM));
		}
	};
	let image = match crate::elf::load(address_space, root_cluster(), path) {
		Ok(image) => image,
		Err(e) => {
			vmem::destroy_address_space(address_space);
			stack::free(kernel_stack);
			pid::free(pid);
			return Err(e);
		}
	};

	let base = USER_STACK_TOP - USER_STACK_PAGES * PAGE_SIZE;
	for i in 0..USER_STACK_PAGES {
		let Some(phys) = frame::alloc_page() else {
			vmem::destroy_address_space(address_space);
			stack::free(kernel_stack);
			pid::free(pid);
			return Err(errno!(ENOMEM));
		};
		let virt = VirtAddr(base.0 + i * PAGE_SIZE);
		if vmem::map_page(address_space, virt, phys, Flags::PRESENT | Flags::WRITABLE | Flags::USER).is_none() {
			frame::free_page(phys);
			vmem::destroy_address_space(address_space);
			stack::free(kernel_stack);
			pid::free(pid);
			return Err(errno!(ENOMEM));
		}
	}

	let context = build_initial_context(kernel_stack.top, image.entry as usize, true, USER_STACK_TOP);
	let task = Task {
		pid,
		ppid: pid,
		priority: 10,
		state: State::Ready,
		context,
		address_space,
		kernel_stack: Some(kernel_stack),
		is_user: true,
		exit_code: 0,
		fds: FdTable::new(),
		pending_signals: PendingQueue::default(),
		signal_handlers: [None; signal::MAX_SIGNAL as usize],
		cwd_cluster: root_cluster(),
		cwd_path: alloc::vec![b'/'],
		brk: USER_BRK_BASE,
		mmap_bump: USER_MMAP_BASE,
		ticks: 0,
	};
	TASKS.lock()[pid as usize] = Some(task);
	Ok(pid)
}

/// Closes every open file descriptor in `task`'s table, flushing dirty handles' stream-entry
/// fields back to disk (the same path `syscall::close` uses), rather than dropping them silently
/// (spec.md §4.4 "close of a dirty handle flushes...", §4.5 "exit... close[s] all open file
/// descriptors").
fn close_all_fds(task: &mut Task) {
	let handles = task.fds.take_all();
	if handles.is_empty() {
		return;
	}
	if let Ok(mut guard) = fs::volume() {
		if let Some(volume) = guard.as_mut() {
			for handle in handles {
				let _ = fs::handle::close(volume, handle);
			}
		}
	}
}

/// Frees every present user-half leaf frame of `task`'s address space, leaving the page tables
/// themselves (and the root) intact: a zombie's memory is reclaimed immediately, but the space
/// isn't torn down until the parent reaps it in `waitpid`, since the scheduler still holds its
/// `Root` until then.
fn free_user_frames(task: &Task) {
	if !task.is_user {
		return;
	}
	let mut leaves = alloc::vec::Vec::new();
	vmem::for_each_user_page(task.address_space, |virt, phys| leaves.push((virt, phys)));
	for (virt, phys) in leaves {
		vmem::unmap_page(task.address_space, virt);
		frame::free_page(phys);
	}
}

/// Terminates the current task: marks it Zombie, records `code`, signals the parent, releases
/// its file descriptors, and reschedules. Never returns.
pub fn exit(code: i32) -> ! {
	let ppid;
	{
		let mut tasks = TASKS.lock();
		let current = CURRENT.load(Ordering::Relaxed);
		let task = tasks[current].as_mut().expect("current task missing from table");
		task.state = State::Zombie;
		task.exit_code = code;
		close_all_fds(task);
		ppid = task.ppid;
		free_user_frames(task);
		if let Some(parent) = tasks.get_mut(ppid as usize).and_then(|p| p.as_mut()) {
			parent.pending_signals.push(signal::Signal::Chld);
		}
	}
	scheduler::schedule();
	unreachable!("a Zombie task must never be scheduled back in");
}

/// Sends `sig` to `target` (spec.md §5 "Cancellation"). `SIGKILL`/`SIGTERM` transition the target
/// directly to Zombie — closing its file descriptors, freeing its user frames and notifying its
/// parent exactly as `exit` does — bypassing any installed handler and the pending queue
/// entirely. Every other signal is appended to the target's pending queue for delivery at its
/// next syscall-return boundary ([`signal::deliver_pending`]).
pub fn signal_send(target: Pid, sig: signal::Signal) -> EResult<()> {
	if !sig.is_fatal() {
		return with_task(target, |t| t.pending_signals.push(sig)).ok_or(errno!(ESRCH));
	}

	let is_current = target == current_pid();
	{
		let mut tasks = TASKS.lock();
		let task = tasks.get_mut(target as usize).and_then(|t| t.as_mut()).ok_or(errno!(ESRCH))?;
		task.state = State::Zombie;
		task.exit_code = 128 + sig as i32;
		close_all_fds(task);
		let ppid = task.ppid;
		free_user_frames(task);
		if let Some(parent) = tasks.get_mut(ppid as usize).and_then(|p| p.as_mut()) {
			parent.pending_signals.push(signal::Signal::Chld);
		}
	}
	if is_current {
		scheduler::schedule();
		unreachable!("a Zombie task must never be scheduled back in");
	}
	Ok(())
}

/// Deep-copies the current task into a new one sharing no physical frames with it (each present
/// user page is copied, not shared). `parent_frame` is the interrupt frame the `fork` syscall
/// was entered through; the child's stack is built to resume from an identical copy of it (with
/// `rax` zeroed), so it returns from the same `int 0x80` the parent did, at the same `rip`.
pub fn fork(parent_frame: &IntFrame) -> EResult<Pid> {
	let child_pid = pid::alloc()?;
	let kernel_stack = match stack::alloc() {
		Some(s) => s,
		None => {
			pid::free(child_pid);
			return Err(errno!(ENOMEM));
		}
	};
	let child_space = match vmem::create_address_space() {
		Some(s) => s,
		None => {
			stack::free(kernel_stack);
			pid::free(child_pid);
			return Err(errno!(ENOMEM));
		}
	};

	debug_assert!(parent_frame.from_userspace(), "fork is only reachable from a ring-3 syscall");

	let (parent_pid, parent_space, parent_priority) =
		with_current(|t| (t.pid, t.address_space, t.priority));

	// Copy every present user page byte-for-byte into a freshly allocated frame. Collected into
	// a buffer first since `for_each_user_page` borrows the parent's tables for its duration and
	// `frame::alloc_page`/`map_page` must not reenter that walk.
	let mut mappings = alloc::vec::Vec::new();
	vmem::for_each_user_page(parent_space, |virt, phys| mappings.push((virt, phys)));
	for (virt, phys) in mappings {
		let Some(new_frame) = frame::alloc_page() else {
			vmem::destroy_address_space(child_space);
			stack::free(kernel_stack);
			pid::free(child_pid);
			return Err(errno!(ENOMEM));
		};
		unsafe {
			core::ptr::copy_nonoverlapping(
				phys.to_virt().as_ptr::<u8>(),
				new_frame.to_virt().as_ptr::<u8>(),
				PAGE_SIZE,
			);
		}
		vmem::map_page(child_space, virt, new_frame, Flags::PRESENT | Flags::WRITABLE | Flags::USER);
	}

	// Build the child's initial register state by copying the parent's own interrupt frame
	// onto its stack, with `rax` forced to zero so the child's `int 0x80` return sees 0. The
	// user `rsp`/`ss` the CPU pushed on privilege-level change sit directly after the frame on
	// the parent's own kernel stack; copy them across rather than re-deriving them.
	let child_frame = IntFrame { rax: 0, ..*parent_frame };
	let mut sp = kernel_stack.top.0;
	unsafe {
		let parent_tail = (parent_frame as *const IntFrame as *const u64)
			.add(core::mem::size_of::<IntFrame>() / 8);
		let user_rsp = *parent_tail;
		let user_ss = *parent_tail.add(1);
		sp -= 8;
		(sp as *mut u64).write(user_ss);
		sp -= 8;
		(sp as *mut u64).write(user_rsp);
		sp -= core::mem::size_of::<IntFrame>();
		(sp as *mut IntFrame).write(child_frame);
		sp -= 8;
		(sp as *mut u64).write(isr_epilogue as usize as u64);
	}

	let fds = with_current(|t| t.fds.fork_clone());
	let (cwd_cluster, cwd_path, brk, mmap_bump) =
		with_current(|t| (t.cwd_cluster, t.cwd_path.clone(), t.brk, t.mmap_bump));
	let child = Task {
		pid: child_pid,
		ppid: parent_pid,
		priority: parent_priority,
		state: State::Ready,
		context: Context { rbx: 0, rbp: 0, r12: 0, r13: 0, r14: 0, r15: 0, rsp: sp as u64 },
		address_space: child_space,
		kernel_stack: Some(kernel_stack),
		is_user: true,
		exit_code: 0,
		fds,
		pending_signals: PendingQueue::default(),
		signal_handlers: [None; signal::MAX_SIGNAL as usize],
		cwd_cluster,
		cwd_path,
		brk,
		mmap_bump,
		ticks: 0,
	};
	TASKS.lock()[child_pid as usize] = Some(child);
	Ok(child_pid)
}

/// Loads an ELF image over the current task's address space and redirects execution to its
/// entry point (spec.md §4.5: the existing address space is reused, not replaced).
pub fn exec(frame: &mut IntFrame, path: &[u8]) -> EResult<()> {
	let (cwd_cluster, address_space) = with_current(|t| (t.cwd_cluster, t.address_space));
	let root = root_cluster();
	let dir_cluster = if path.first() == Some(&b'/') { root } else { cwd_cluster };
	let image = crate::elf::load(address_space, dir_cluster, path)?;

	frame.rip = image.entry as u64;
	frame.rsp = USER_STACK_TOP.0 as u64;
	frame.cs = gdt::USER_CS as u64;
	frame.rflags = 0x202;
	Ok(())
}

/// Blocks (by yielding) until `pid` — which must be a direct child of the current task —
/// becomes Zombie, then reaps it and returns its exit code.
pub fn waitpid(pid: Pid) -> EResult<(Pid, i32)> {
	let caller = current_pid();
	loop {
		{
			let mut tasks = TASKS.lock();
			let Some(Some(child)) = tasks.get(pid as usize) else {
				return Err(errno!(ECHILD));
			};
			if child.ppid != caller {
				return Err(errno!(ECHILD));
			}
			if child.state == State::Zombie {
				let child = tasks[pid as usize].take().unwrap();
				let code = child.exit_code;
				if let Some(stack) = child.kernel_stack {
					stack::free(stack);
				}
				if child.is_user {
					vmem::destroy_address_space(child.address_space);
				}
				pid::free(pid);
				return Ok((pid, code));
			}
		}
		scheduler::yield_now();
	}
}
