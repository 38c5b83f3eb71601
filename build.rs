//! Build script: compiles the architecture assembly stubs (boot trampoline, context switch,
//! interrupt entry points) and reads `kernel.toml` into `rustc-env` variables consumed by
//! `src/config.rs`.

use serde::Deserialize;
use std::{env, fs, path::PathBuf};

#[derive(Deserialize)]
struct Config {
	max_processes: usize,
	max_fds: usize,
	max_pending_signals: usize,
	kernel_stack_pages: usize,
	timer_frequency_hz: u32,
	sched_quantum_ticks: u32,
	ata_io_base: u16,
	ata_partition_lba: u64,
}

fn main() {
	let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());

	let config_path = manifest_dir.join("kernel.toml");
	println!("cargo:rerun-if-changed={}", config_path.display());
	let raw = fs::read_to_string(&config_path).expect("failed to read kernel.toml");
	let cfg: Config = toml::from_str(&raw).expect("failed to parse kernel.toml");

	println!("cargo:rustc-env=NUCLEUS_MAX_PROCESSES={}", cfg.max_processes);
	println!("cargo:rustc-env=NUCLEUS_MAX_FDS={}", cfg.max_fds);
	println!(
		"cargo:rustc-env=NUCLEUS_MAX_PENDING_SIGNALS={}",
		cfg.max_pending_signals
	);
	println!(
		"cargo:rustc-env=NUCLEUS_KERNEL_STACK_PAGES={}",
		cfg.kernel_stack_pages
	);
	println!(
		"cargo:rustc-env=NUCLEUS_TIMER_FREQUENCY_HZ={}",
		cfg.timer_frequency_hz
	);
	println!(
		"cargo:rustc-env=NUCLEUS_SCHED_QUANTUM_TICKS={}",
		cfg.sched_quantum_ticks
	);
	println!("cargo:rustc-env=NUCLEUS_ATA_IO_BASE={}", cfg.ata_io_base);
	println!(
		"cargo:rustc-env=NUCLEUS_ATA_PARTITION_LBA={}",
		cfg.ata_partition_lba
	);

	// Assemble the low-level stubs that cannot be expressed in `asm!` blocks alone (the context
	// switch trampoline and the raw interrupt entry points, which must not let the compiler
	// choose a prologue). Out-of-scope boot glue (real mode -> long mode, multiboot header) is
	// assumed to be supplied by the bootloader shim; only the in-scope stubs are built here.
	let asm_dir = manifest_dir.join("src/arch/x86_64");
	println!("cargo:rerun-if-changed={}", asm_dir.display());
	cc::Build::new()
		.file(asm_dir.join("switch.S"))
		.file(asm_dir.join("interrupt.S"))
		.flag("-nostdlib")
		.compile("arch_asm");
}
