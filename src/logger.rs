//! Glue between the `log` crate facade and the kernel console.
//!
//! Mirrors the teacher's `logger.rs`: a single global [`log::Log`] implementation installed at
//! boot, writing through [`crate::println`]. `error!`/`warn!` are used for the resource
//! exhaustion and filesystem integrity conditions in spec.md §7; `info!` traces the boot
//! sequence; `debug!`/`trace!` are reserved for the `strace` feature.

use log::{Level, LevelFilter, Log, Metadata, Record};

struct KernelLogger;

impl Log for KernelLogger {
	fn enabled(&self, metadata: &Metadata) -> bool {
		if cfg!(feature = "strace") {
			metadata.level() <= Level::Trace
		} else {
			metadata.level() <= Level::Info
		}
	}

	fn log(&self, record: &Record) {
		if !self.enabled(record.metadata()) {
			return;
		}
		crate::println!("[{:>5}] {}", record.level(), record.args());
	}

	fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Installs the global logger. Must run once, early in boot, after the console is up.
pub fn init() {
	log::set_logger(&LOGGER)
		.map(|()| log::set_max_level(LevelFilter::Trace))
		.expect("logger already initialized");
}
