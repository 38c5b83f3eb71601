//! `munmap` (spec.md §4.7, syscall 17): unmaps and frees the frames backing `[addr, addr+len)`.

use crate::{
	memory::{frame, vmem, VirtAddr, PAGE_SIZE},
	process,
	util::{errno, EResult},
};
use macros::syscall;

#[syscall]
pub fn munmap(addr: usize, len: usize) -> EResult<usize> {
	if len == 0 || addr % PAGE_SIZE != 0 {
		return Err(errno!(EINVAL));
	}
	let pages = len.div_ceil(PAGE_SIZE);
	let address_space = process::with_current(|t| t.address_space);
	for i in 0..pages {
		let virt = VirtAddr(addr + i * PAGE_SIZE);
		let phys = vmem::translate(address_space, virt);
		if phys.0 != 0 {
			vmem::unmap_page(address_space, virt);
			frame::free_page(phys);
		}
	}
	Ok(0)
}
