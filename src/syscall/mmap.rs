//! `mmap` (spec.md §4.7, syscall 19): anonymous-only, bump-allocated from
//! `process::USER_MMAP_BASE`. `addr`, `fd`, and `off` are accepted (so callers that always pass
//! six arguments don't fail decoding) but ignored: there is no fixed-address or file-backed
//! mapping here.

use crate::{
	memory::{
		frame,
		vmem::{self, Flags},
		VirtAddr, PAGE_SIZE,
	},
	process,
	util::{errno, EResult},
};
use macros::syscall;

/// `PROT_WRITE` (the only `prot` bit this mapper consults besides exec).
const PROT_WRITE: i32 = 0x2;
/// `PROT_EXEC`.
const PROT_EXEC: i32 = 0x4;

#[syscall]
pub fn mmap(_addr: usize, len: usize, prot: i32, _flags: i32, _fd: i32, _off: usize) -> EResult<usize> {
	if len == 0 {
		return Err(errno!(EINVAL));
	}
	let pages = len.div_ceil(PAGE_SIZE);
	let mut flags = Flags::PRESENT | Flags::USER;
	if prot & PROT_WRITE != 0 {
		flags |= Flags::WRITABLE;
	}
	if prot & PROT_EXEC == 0 {
		flags |= Flags::NO_EXECUTE;
	}

	let (address_space, base) = process::with_current(|t| (t.address_space, t.mmap_bump));
	for i in 0..pages {
		let Some(phys) = frame::alloc_page() else {
			return Err(errno!(ENOMEM));
		};
		let virt = VirtAddr(base.0 + i * PAGE_SIZE);
		if vmem::map_page(address_space, virt, phys, flags).is_none() {
			frame::free_page(phys);
			return Err(errno!(ENOMEM));
		}
	}
	process::with_current(|t| t.mmap_bump = VirtAddr(base.0 + pages * PAGE_SIZE));
	Ok(base.0)
}
