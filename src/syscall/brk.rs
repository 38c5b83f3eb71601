//! `brk` (spec.md §4.7, syscall 45): grows or shrinks the heap window above
//! `process::USER_BRK_BASE` by mapping or unmapping whole 4 KiB pages.

use crate::{
	memory::{
		frame,
		vmem::{self, Flags},
		VirtAddr, PAGE_SIZE,
	},
	process,
	util::EResult,
};
use macros::syscall;

fn page_align_up(addr: usize) -> usize {
	(addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

#[syscall]
pub fn brk(addr: usize) -> EResult<usize> {
	let (address_space, old_brk) = process::with_current(|t| (t.address_space, t.brk));
	if addr == 0 {
		return Ok(old_brk.0);
	}

	let old_top = page_align_up(old_brk.0);
	let new_top = page_align_up(addr);
	let new_brk = if new_top > old_top {
		let mut mapped = old_top;
		while mapped < new_top {
			let Some(phys) = frame::alloc_page() else { break };
			let flags = Flags::PRESENT | Flags::WRITABLE | Flags::USER;
			if vmem::map_page(address_space, VirtAddr(mapped), phys, flags).is_none() {
				frame::free_page(phys);
				break;
			}
			mapped += PAGE_SIZE;
		}
		// Report the request only if every page it needed was actually mapped; otherwise the
		// break stops wherever memory ran out, same as the real `brk(2)` contract.
		if mapped == new_top { addr } else { mapped }
	} else if new_top < old_top {
		let mut cursor = new_top;
		while cursor < old_top {
			let virt = VirtAddr(cursor);
			let phys = vmem::translate(address_space, virt);
			if phys.0 != 0 {
				vmem::unmap_page(address_space, virt);
				frame::free_page(phys);
			}
			cursor += PAGE_SIZE;
		}
		addr
	} else {
		addr
	};

	process::with_current(|t| t.brk = VirtAddr(new_brk));
	Ok(new_brk)
}
