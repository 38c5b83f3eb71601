//! Nucleus is a small x86-64 kernel written in Rust. This crate implements its core: physical
//! and virtual memory management, preemptive multitasking, a syscall interface, and an
//! ExFAT-compatible filesystem over an ATA PIO disk.
//!
//! # Features
//!
//! - `strace`: if enabled, the kernel traces system call entry. This is a debug feature.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(crate::selftest::runner)]
#![reexport_test_harness_main = "kernel_selftest"]
#![allow(dead_code)]

extern crate alloc;

pub mod print;
pub mod config;
pub mod debug;
pub mod device;
pub mod elf;
pub mod file;
pub mod fs;
pub mod gdt;
pub mod idt;
pub mod io;
pub mod logger;
pub mod memory;
pub mod multiboot;
pub mod panic;
pub mod pic;
pub mod pit;
pub mod power;
pub mod process;
pub mod selftest;
pub mod sync;
pub mod syscall;
pub mod util;

use core::ffi::c_void;

/// The kernel's name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Current kernel version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path to the init process binary, loaded from the mounted volume once the filesystem and
/// process subsystems are both up.
const INIT_PATH: &[u8] = b"/sbin/init";

/// An inner function, so that every local (the boot-info parse, the volume mount guard) is
/// dropped before the kernel falls into the idle loop.
fn kernel_main_inner(magic: u32, multiboot_ptr: *const c_void) {
	gdt::init();
	idt::init();

	logger::init();
	crate::println!("boot {NAME} version {VERSION}");

	// Safety: `magic`/`multiboot_ptr` come straight from the bootloader per the Multiboot2
	// kernel entry contract; this is the first use of either.
	let boot_info = unsafe { multiboot::read(magic, multiboot_ptr) };
	if let Some(cmdline) = boot_info.cmdline {
		log::info!("command line: {cmdline}");
	}

	crate::println!("setup memory management");
	memory::frame::init(boot_info.mem_size);
	for region in boot_info.available_regions() {
		memory::frame::free_region(region.base, region.length);
	}
	memory::vmem::init();
	let heap_seed = memory::frame::alloc_page().expect("out of memory initializing the kernel heap");
	memory::heap::init(heap_seed.to_virt().0, memory::PAGE_SIZE);

	#[cfg(test)]
	kernel_selftest();

	pic::init(0x20, 0x28);
	pit::init();

	crate::println!("mount filesystem");
	match fs::init() {
		Ok(()) => {}
		Err(e) => log::error!("filesystem mount failed: {e:?}"),
	}

	crate::println!("setup processes");
	process::init();

	if fs::is_mounted() {
		crate::println!("execute init process ({})", core::str::from_utf8(INIT_PATH).unwrap_or("?"));
		match process::spawn_init(INIT_PATH) {
			Ok(pid) => log::info!("init process running as pid {pid}"),
			Err(e) => log::error!("init process execution failed: {e:?}"),
		}
	}

	// Enabling interrupts here, rather than earlier, keeps the boot sequence above free of
	// preemption: the timer's first tick is the point at which the scheduler may run anything
	// other than this thread of execution.
	unsafe {
		core::arch::asm!("sti", options(nomem, nostack));
	}
}

/// This is the main function of the Rust source code, responsible for the initialization of the
/// kernel.
///
/// When calling this function, the CPU must already be in long mode with a flat GDT loaded; the
/// real-mode-to-long-mode transition and the Multiboot2 header are out-of-scope boot glue
/// supplied by the bootloader shim ahead of this entry point.
///
/// Arguments:
/// - `magic` is the magic number passed by Multiboot.
/// - `multiboot_ptr` is the pointer to the Multiboot boot information structure.
#[unsafe(no_mangle)]
pub extern "C" fn kernel_main(magic: u32, multiboot_ptr: *const c_void) -> ! {
	kernel_main_inner(magic, multiboot_ptr);
	power::halt();
}
