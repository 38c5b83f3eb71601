//! Kernel stack allocation for new tasks (spec.md §4.5: 16 KiB, i.e. [`config::KERNEL_STACK_PAGES`]
//! 4 KiB pages).

use super::{frame, vmem, vmem::Flags, PhysAddr, VirtAddr, PAGE_SIZE};
use crate::config::KERNEL_STACK_PAGES;

/// A task's kernel stack: the frames backing it and its top-of-stack virtual address.
pub struct KernelStack {
	frames: [PhysAddr; KERNEL_STACK_PAGES],
	/// Virtual address one byte past the end of the stack (the initial `rsp`).
	pub top: VirtAddr,
}

/// Allocates `KERNEL_STACK_PAGES` frames and maps them contiguously through the higher-half
/// alias, returning the stack with `top` set to its highest address.
pub fn alloc() -> Option<KernelStack> {
	let mut frames = [PhysAddr(0); KERNEL_STACK_PAGES];
	for slot in frames.iter_mut() {
		*slot = frame::alloc_page()?;
	}
	let base = frames[0].to_virt();
	for (i, f) in frames.iter().enumerate() {
		let virt = VirtAddr(base.0 + i * PAGE_SIZE);
		vmem::map_page(
			vmem::kernel_root(),
			virt,
			*f,
			Flags::PRESENT | Flags::WRITABLE | Flags::GLOBAL,
		)?;
	}
	Some(KernelStack {
		frames,
		top: VirtAddr(base.0 + KERNEL_STACK_PAGES * PAGE_SIZE),
	})
}

/// Releases the frames backing a kernel stack. Does not unmap them: the higher-half alias is
/// shared kernel state and unmapping it would require tracking per-task mappings for no benefit,
/// since the alias for a freed frame is simply never dereferenced again.
pub fn free(stack: KernelStack) {
	for f in stack.frames {
		frame::free_page(f);
	}
}
