//! Build-time kernel configuration.
//!
//! Values come from `kernel.toml` at the workspace root, threaded through by `build.rs` as
//! `rustc-env` variables. Parsing them here (instead of hard-coding) keeps a single source of
//! truth the way the teacher's `config` module does for its JSON build config.

macro_rules! env_usize {
	($name:expr) => {{
		match konst_parse(env!($name).as_bytes()) {
			Some(v) => v,
			None => panic!(concat!("invalid ", $name)),
		}
	}};
}

/// Minimal const-fn decimal parser, since `str::parse` is not `const`.
const fn konst_parse(mut bytes: &[u8]) -> Option<usize> {
	let mut value: usize = 0;
	if bytes.is_empty() {
		return None;
	}
	while let [b, rest @ ..] = bytes {
		if !b.is_ascii_digit() {
			return None;
		}
		value = value * 10 + (*b - b'0') as usize;
		bytes = rest;
	}
	Some(value)
}

/// Page size in bytes, fixed by the architecture.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of live tasks (PCBs).
pub const MAX_PROCESSES: usize = env_usize!("NUCLEUS_MAX_PROCESSES");
/// Per-task file descriptor table size.
pub const MAX_FDS: usize = env_usize!("NUCLEUS_MAX_FDS");
/// Per-task pending-signal queue and handler table size.
pub const MAX_PENDING_SIGNALS: usize = env_usize!("NUCLEUS_MAX_PENDING_SIGNALS");
/// Kernel stack size for each task, in pages.
pub const KERNEL_STACK_PAGES: usize = env_usize!("NUCLEUS_KERNEL_STACK_PAGES");
/// Timer interrupt frequency, in Hz.
pub const TIMER_FREQUENCY_HZ: usize = env_usize!("NUCLEUS_TIMER_FREQUENCY_HZ");
/// Scheduler quantum, in ticks.
pub const SCHED_QUANTUM_TICKS: usize = env_usize!("NUCLEUS_SCHED_QUANTUM_TICKS");
/// ATA PIO primary channel I/O port base.
pub const ATA_IO_BASE: u16 = env_usize!("NUCLEUS_ATA_IO_BASE") as u16;
/// LBA of the first sector of the ExFAT partition.
pub const ATA_PARTITION_LBA: u64 = env_usize!("NUCLEUS_ATA_PARTITION_LBA") as u64;
