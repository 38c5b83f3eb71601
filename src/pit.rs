//! Programmable Interval Timer: programmed to fire IRQ0 at [`config::TIMER_FREQUENCY_HZ`]
//! (~1 kHz, spec.md §4.8), driving the scheduler's quantum.

use crate::{config::TIMER_FREQUENCY_HZ, io::outb};
use core::sync::atomic::{AtomicU64, Ordering};

const CHANNEL_0: u16 = 0x40;
const COMMAND: u16 = 0x43;
const SELECT_CHANNEL_0: u8 = 0b00 << 6;
const ACCESS_LOBYTE_HIBYTE: u8 = 0b11 << 4;
const MODE_3_SQUARE_WAVE: u8 = 0b011 << 1;
const BASE_FREQUENCY: u32 = 1_193_182;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Programs channel 0 for [`TIMER_FREQUENCY_HZ`].
pub fn init() {
	let divisor = (BASE_FREQUENCY / TIMER_FREQUENCY_HZ as u32) as u16;
	unsafe {
		outb(COMMAND, SELECT_CHANNEL_0 | ACCESS_LOBYTE_HIBYTE | MODE_3_SQUARE_WAVE);
		outb(CHANNEL_0, (divisor & 0xFF) as u8);
		outb(CHANNEL_0, (divisor >> 8) as u8);
	}
}

/// Called from the IRQ0 handler on every tick.
pub fn tick() {
	TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Number of ticks since boot.
pub fn ticks() -> u64 {
	TICKS.load(Ordering::Relaxed)
}
