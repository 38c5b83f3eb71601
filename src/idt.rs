//! Interrupt Descriptor Table: installs the 256 gates spec.md §4.8 requires (vectors 0–19 for
//! exceptions, 0x20/0x21 for the remapped timer/keyboard IRQs, 0x80 for the syscall gate), and
//! the common Rust-side dispatcher the assembly trampoline (`interrupt.S`) calls into.

use crate::{gdt, pic, pit, sync::without_interrupts};
use core::{arch::asm, mem::size_of};

const ENTRIES: usize = 256;
const GATE_INTERRUPT: u8 = 0x8E; // present, DPL 0, 64-bit interrupt gate
const GATE_SYSCALL: u8 = 0xEE; // present, DPL 3, 64-bit interrupt gate

#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
struct Entry {
	offset_low: u16,
	selector: u16,
	ist: u8,
	type_attr: u8,
	offset_mid: u16,
	offset_high: u32,
	_reserved: u32,
}

impl Entry {
	fn new(handler: u64, type_attr: u8) -> Self {
		Self {
			offset_low: handler as u16,
			selector: gdt::KERNEL_CS,
			ist: 0,
			type_attr,
			offset_mid: (handler >> 16) as u16,
			offset_high: (handler >> 32) as u32,
			_reserved: 0,
		}
	}
}

#[repr(C, align(16))]
struct Table([Entry; ENTRIES]);

static mut IDT: Table = Table([Entry {
	offset_low: 0,
	selector: 0,
	ist: 0,
	type_attr: 0,
	offset_mid: 0,
	offset_high: 0,
	_reserved: 0,
}; ENTRIES]);

#[repr(C, packed)]
struct Descriptor {
	limit: u16,
	base: u64,
}

macro_rules! isr_decl {
	($($name:ident),* $(,)?) => {
		extern "C" {
			$(fn $name();)*
		}
	};
}

isr_decl!(
	isr_0, isr_1, isr_2, isr_3, isr_4, isr_5, isr_6, isr_7, isr_8, isr_9, isr_10, isr_11, isr_12,
	isr_13, isr_14, isr_15, isr_16, isr_17, isr_18, isr_19, isr_20, isr_21, isr_22, isr_23, isr_24,
	isr_25, isr_26, isr_27, isr_28, isr_29, isr_30, isr_31,
);
extern "C" {
	fn isr_0x20();
	fn isr_0x21();
	fn isr_0x80();
}

/// Names used in the exception dump (spec.md §4.8).
const EXCEPTION_NAMES: [&str; 32] = [
	"divide error",
	"debug",
	"non-maskable interrupt",
	"breakpoint",
	"overflow",
	"bound range exceeded",
	"invalid opcode",
	"device not available",
	"double fault",
	"coprocessor segment overrun",
	"invalid TSS",
	"segment not present",
	"stack-segment fault",
	"general protection fault",
	"page fault",
	"reserved",
	"x87 floating-point exception",
	"alignment check",
	"machine check",
	"SIMD floating-point exception",
	"virtualization exception",
	"control protection exception",
	"reserved",
	"reserved",
	"reserved",
	"reserved",
	"reserved",
	"reserved",
	"hypervisor injection exception",
	"VMM communication exception",
	"security exception",
	"reserved",
];

/// Installs every gate and loads the table. Must run after [`gdt::init`].
pub fn init() {
	// Safety: single-threaded, runs once during boot before interrupts are enabled.
	let idt = unsafe { &mut *&raw mut IDT };
	macro_rules! set {
		($vec:expr, $handler:expr, $attr:expr) => {
			idt.0[$vec] = Entry::new($handler as u64, $attr);
		};
	}
	set!(0, isr_0, GATE_INTERRUPT);
	set!(1, isr_1, GATE_INTERRUPT);
	set!(2, isr_2, GATE_INTERRUPT);
	set!(3, isr_3, GATE_INTERRUPT);
	set!(4, isr_4, GATE_INTERRUPT);
	set!(5, isr_5, GATE_INTERRUPT);
	set!(6, isr_6, GATE_INTERRUPT);
	set!(7, isr_7, GATE_INTERRUPT);
	set!(8, isr_8, GATE_INTERRUPT);
	set!(9, isr_9, GATE_INTERRUPT);
	set!(10, isr_10, GATE_INTERRUPT);
	set!(11, isr_11, GATE_INTERRUPT);
	set!(12, isr_12, GATE_INTERRUPT);
	set!(13, isr_13, GATE_INTERRUPT);
	set!(14, isr_14, GATE_INTERRUPT);
	set!(15, isr_15, GATE_INTERRUPT);
	set!(16, isr_16, GATE_INTERRUPT);
	set!(17, isr_17, GATE_INTERRUPT);
	set!(18, isr_18, GATE_INTERRUPT);
	set!(19, isr_19, GATE_INTERRUPT);
	set!(20, isr_20, GATE_INTERRUPT);
	set!(21, isr_21, GATE_INTERRUPT);
	set!(22, isr_22, GATE_INTERRUPT);
	set!(23, isr_23, GATE_INTERRUPT);
	set!(24, isr_24, GATE_INTERRUPT);
	set!(25, isr_25, GATE_INTERRUPT);
	set!(26, isr_26, GATE_INTERRUPT);
	set!(27, isr_27, GATE_INTERRUPT);
	set!(28, isr_28, GATE_INTERRUPT);
	set!(29, isr_29, GATE_INTERRUPT);
	set!(30, isr_30, GATE_INTERRUPT);
	set!(31, isr_31, GATE_INTERRUPT);
	set!(0x20, isr_0x20, GATE_INTERRUPT);
	set!(0x21, isr_0x21, GATE_INTERRUPT);
	set!(0x80, isr_0x80, GATE_SYSCALL);

	let descriptor = Descriptor {
		limit: (size_of::<Table>() - 1) as u16,
		base: &raw const IDT as u64,
	};
	unsafe {
		asm!("lidt [{}]", in(reg) &descriptor, options(readonly, nostack, preserves_flags));
	}
	pic::init(0x20, 0x28);
	pit::init();
}

/// The register frame pushed by `isr_common`, in the exact order `interrupt.S` pushes it:
/// lowest address first (most recently pushed).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IntFrame {
	pub r15: u64,
	pub r14: u64,
	pub r13: u64,
	pub r12: u64,
	pub r11: u64,
	pub r10: u64,
	pub r9: u64,
	pub r8: u64,
	pub rbp: u64,
	pub rdi: u64,
	pub rsi: u64,
	pub rdx: u64,
	pub rcx: u64,
	pub rbx: u64,
	pub rax: u64,
	pub vector: u64,
	pub error_code: u64,
	pub rip: u64,
	pub cs: u64,
	pub rflags: u64,
}

impl IntFrame {
	/// Tells whether the interrupted context was executing in ring 3.
	pub fn from_userspace(&self) -> bool {
		self.cs & 3 == 3
	}

	/// Reads the six syscall argument slots per the SysV convention spec.md §4.7 specifies.
	pub fn syscall_args(&self) -> [usize; 6] {
		[
			self.rdi as usize,
			self.rsi as usize,
			self.rdx as usize,
			self.r10 as usize,
			self.r8 as usize,
			self.r9 as usize,
		]
	}
}

fn current_cr2() -> u64 {
	let cr2: u64;
	unsafe {
		asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack));
	}
	cr2
}

/// Dumps the frame and halts. Used for every exception except a handled page fault recovery
/// path (there is none here: spec.md §4.8 treats every exception as fatal).
fn fatal(frame: &IntFrame) -> ! {
	let name = EXCEPTION_NAMES
		.get(frame.vector as usize)
		.copied()
		.unwrap_or("unknown exception");
	log::error!("{name} (vector {}, error code {:#x})", frame.vector, frame.error_code);
	if frame.vector == 14 {
		log::error!("faulting address: {:#018x}", current_cr2());
	}
	log::error!("{frame:#x?}");
	crate::debug::print_backtrace(frame.rbp as usize, 16);
	crate::power::halt();
}

/// Entry point called by `isr_common` for every vector.
#[unsafe(no_mangle)]
extern "C" fn interrupt_dispatch(frame: &mut IntFrame) {
	match frame.vector {
		8 => {
			log::error!("double fault");
			crate::power::halt();
		}
		0..=19 => fatal(frame),
		0x20 => {
			pit::tick();
			pic::end_of_interrupt(0);
			without_interrupts(|| crate::process::scheduler::tick());
		}
		0x21 => {
			let _scancode = crate::io::inb(0x60);
			pic::end_of_interrupt(1);
		}
		0x80 => {
			let args = frame.syscall_args();
			let result = crate::syscall::dispatch(frame, frame.rax as usize, &args);
			frame.rax = result as u64;
		}
		_ => {
			log::warn!("unhandled interrupt vector {}", frame.vector);
		}
	}
}
