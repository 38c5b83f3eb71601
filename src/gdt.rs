//! Global Descriptor Table: flat kernel/user code and data segments, plus a Task State Segment
//! used only to hold the ring-0 stack pointer interrupts land on when they come from userspace
//! (long mode does not use the TSS for anything else).

use core::{arch::asm, mem::size_of};

/// Selector of the kernel code segment.
pub const KERNEL_CS: u16 = 1 << 3;
/// Selector of the kernel data segment.
pub const KERNEL_DS: u16 = 2 << 3;
/// Selector of the user code segment (RPL 3 folded in by callers).
pub const USER_CS: u16 = (3 << 3) | 3;
/// Selector of the user data segment (RPL 3 folded in by callers).
pub const USER_DS: u16 = (4 << 3) | 3;
/// Selector of the TSS descriptor.
const TSS_SEL: u16 = 5 << 3;

#[repr(C, packed)]
struct Tss {
	_reserved0: u32,
	rsp0: u64,
	rsp1: u64,
	rsp2: u64,
	_reserved1: u64,
	ist: [u64; 7],
	_reserved2: u64,
	_reserved3: u16,
	iomap_base: u16,
}

impl Tss {
	const fn new() -> Self {
		Self {
			_reserved0: 0,
			rsp0: 0,
			rsp1: 0,
			rsp2: 0,
			_reserved1: 0,
			ist: [0; 7],
			_reserved2: 0,
			_reserved3: 0,
			iomap_base: size_of::<Tss>() as u16,
		}
	}
}

static mut TSS: Tss = Tss::new();

/// A flat (base 0, limit max) 64-bit code or data segment descriptor.
const fn flat_descriptor(executable: bool, dpl: u8) -> u64 {
	let access: u64 = 0x90 | ((dpl as u64) << 5) | if executable { 0x0a } else { 0x02 };
	let flags: u64 = if executable { 0x2 } else { 0 };
	(access << 40) | (flags << 52) | 0x0000_FFFF | (0xF << 48)
}

#[repr(C, align(8))]
struct Gdt {
	entries: [u64; 5],
	tss_low: u64,
	tss_high: u64,
}

static mut GDT: Gdt = Gdt {
	entries: [
		0,
		flat_descriptor(true, 0),
		flat_descriptor(false, 0),
		flat_descriptor(true, 3),
		flat_descriptor(false, 3),
	],
	tss_low: 0,
	tss_high: 0,
};

#[repr(C, packed)]
struct Descriptor {
	limit: u16,
	base: u64,
}

/// Sets up the GDT and TSS and loads them.
pub fn init() {
	unsafe {
		let tss_addr = &raw const TSS as u64;
		let limit = (size_of::<Tss>() - 1) as u64;
		let access: u64 = 0x89; // present, type=0x9 (64-bit TSS available)
		GDT.tss_low = (limit & 0xFFFF)
			| ((tss_addr & 0xFFFFFF) << 16)
			| (access << 40)
			| (((limit >> 16) & 0xF) << 48)
			| (((tss_addr >> 24) & 0xFF) << 56);
		GDT.tss_high = tss_addr >> 32;

		let descriptor = Descriptor {
			limit: (size_of::<Gdt>() - 1) as u16,
			base: &raw const GDT as u64,
		};
		asm!("lgdt [{}]", in(reg) &descriptor, options(readonly, nostack, preserves_flags));
		reload_segments();
		asm!("ltr {0:x}", in(reg) TSS_SEL, options(nostack, preserves_flags));
	}
}

/// Sets the ring-0 stack pointer the CPU switches to on a privilege-level change (i.e. the
/// current task's kernel stack top). Called by the scheduler on every context switch.
pub fn set_kernel_stack(top: u64) {
	unsafe {
		TSS.rsp0 = top;
	}
}

unsafe fn reload_segments() {
	asm!(
		"push {sel}",
		"lea {tmp}, [2f + rip]",
		"push {tmp}",
		"retfq",
		"2:",
		"mov ds, {ds:x}",
		"mov es, {ds:x}",
		"mov fs, {ds:x}",
		"mov gs, {ds:x}",
		"mov ss, {ds:x}",
		sel = in(reg) KERNEL_CS as u64,
		tmp = lateout(reg) _,
		ds = in(reg) KERNEL_DS,
	);
}
