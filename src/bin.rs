//! The binary entry point.
//!
//! Everything the kernel does lives in the `kernel` library crate (`src/kernel.rs`); this
//! binary exists only so Cargo produces a linkable image that exports `kernel_main`, the symbol
//! the out-of-scope bootloader shim jumps to once the machine is in long mode.

#![no_std]
#![no_main]

use kernel as _;
