//! Four-level paging (PML4 → PDPT → PD → PT), 512 entries per table, 4 KiB leaves with optional
//! 2 MiB leaves at the PD level for the kernel identity map.

use super::{frame, PhysAddr, VirtAddr, KERNEL_BASE, PAGE_SIZE};
use core::arch::asm;

bitflags::bitflags! {
	/// Page table entry flags, matching the hardware bit positions.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct Flags: u64 {
		const PRESENT    = 1 << 0;
		const WRITABLE   = 1 << 1;
		const USER       = 1 << 2;
		const PAGE_SIZE  = 1 << 7;
		const GLOBAL     = 1 << 8;
		const NO_EXECUTE = 1 << 63;
	}
}

const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;
const ENTRIES: usize = 512;

#[repr(C, align(4096))]
struct Table([u64; ENTRIES]);

impl Table {
	fn entry_phys(entry: u64) -> PhysAddr {
		PhysAddr((entry & ADDR_MASK) as usize)
	}

	fn present(entry: u64) -> bool {
		entry & Flags::PRESENT.bits() != 0
	}
}

/// Root of an address space: the physical address of its PML4 table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Root(pub PhysAddr);

fn table_at(phys: PhysAddr) -> &'static mut Table {
	// Safety: page tables are always reached through the higher-half identity alias, which
	// `init` guarantees is mapped before any table is walked.
	unsafe { &mut *phys.to_virt().as_ptr::<Table>() }
}

fn alloc_table() -> Option<PhysAddr> {
	let frame = frame::alloc_page()?;
	table_at(frame).0.fill(0);
	Some(frame)
}

static mut KERNEL_ROOT: PhysAddr = PhysAddr(0);

/// Returns the kernel's root table, present in every address space.
pub fn kernel_root() -> Root {
	// Safety: set once by `init` before any address space is created.
	Root(unsafe { KERNEL_ROOT })
}

/// Maps `[0, 4 GiB)` with 2 MiB pages and creates the higher-half alias, then loads the root and
/// turns on global pages.
pub fn init() {
	let root = alloc_table().expect("out of memory during early paging setup");
	// Safety: nothing else touches `KERNEL_ROOT` before this point.
	unsafe {
		KERNEL_ROOT = root;
	}
	let pml4 = table_at(root);
	let flags = Flags::PRESENT | Flags::WRITABLE | Flags::GLOBAL | Flags::PAGE_SIZE;

	// Identity map the first 4 GiB using 2 MiB leaves.
	for gib in 0..4usize {
		let pdpt = alloc_table().expect("out of memory during early paging setup");
		pml4.0[gib] = pdpt.0 as u64 | (Flags::PRESENT | Flags::WRITABLE).bits();
		let pdpt_table = table_at(pdpt);
		for pd_idx in 0..ENTRIES {
			let pd = alloc_table().expect("out of memory during early paging setup");
			pdpt_table.0[pd_idx] = pd.0 as u64 | (Flags::PRESENT | Flags::WRITABLE).bits();
			let pd_table = table_at(pd);
			for leaf in 0..ENTRIES {
				let phys = (gib * 512 + pd_idx) * ENTRIES * PAGE_SIZE + leaf * 2 * 1024 * 1024;
				pd_table.0[leaf] = phys as u64 | flags.bits();
			}
		}
	}

	// Higher-half alias: reuse the same PDPT/PD subtree for at least the first 256 MiB by
	// pointing the high PML4 slots at the same low PDPTs.
	let high_base = KERNEL_BASE.table_index(3);
	for gib in 0..4usize {
		pml4.0[high_base + gib] = pml4.0[gib];
	}

	unsafe {
		let mut cr4: u64;
		asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack));
		cr4 |= 1 << 7; // PGE
		asm!("mov cr4, {}", in(reg) cr4, options(nomem, nostack));
		asm!("mov cr3, {}", in(reg) root.0 as u64, options(nostack));
	}
}

/// Allocates a fresh zeroed root and copies the kernel's upper-half PML4 slots into it.
pub fn create_address_space() -> Option<Root> {
	let root = alloc_table()?;
	let table = table_at(root);
	// Safety: `init` ran before any address space is created.
	let kernel = table_at(unsafe { KERNEL_ROOT });
	table.0[256..].copy_from_slice(&kernel.0[256..]);
	Some(Root(root))
}

/// Frees every present frame reachable below PML4 index 256 (the user half), then the root
/// itself. The kernel root is never passed here.
pub fn destroy_address_space(root: Root) {
	let pml4 = table_at(root.0);
	for pml4_idx in 0..256 {
		let pdpte = pml4.0[pml4_idx];
		if !Table::present(pdpte) {
			continue;
		}
		let pdpt = table_at(Table::entry_phys(pdpte));
		for pdpt_idx in 0..ENTRIES {
			let pde = pdpt.0[pdpt_idx];
			if !Table::present(pde) {
				continue;
			}
			let pd = table_at(Table::entry_phys(pde));
			for pd_idx in 0..ENTRIES {
				let pte_entry = pd.0[pd_idx];
				if !Table::present(pte_entry) {
					continue;
				}
				let pt = table_at(Table::entry_phys(pte_entry));
				for leaf in pt.0.iter() {
					if Table::present(*leaf) {
						frame::free_page(Table::entry_phys(*leaf));
					}
				}
				frame::free_page(Table::entry_phys(pte_entry));
			}
			frame::free_page(Table::entry_phys(pde));
		}
		frame::free_page(Table::entry_phys(pdpte));
	}
	frame::free_page(root.0);
}

/// Loads `root` into the page-table base register. A null root switches back to the kernel
/// root.
pub fn switch_address_space(root: Root) {
	let phys = if root.0.is_null() {
		// Safety: `init` always runs first.
		unsafe { KERNEL_ROOT }
	} else {
		root.0
	};
	unsafe {
		asm!("mov cr3, {}", in(reg) phys.0 as u64, options(nostack));
	}
}

fn walk_create(root: Root, virt: VirtAddr) -> Option<&'static mut u64> {
	let mut table = table_at(root.0);
	for level in (1..=3).rev() {
		let idx = virt.table_index(level);
		let entry = table.0[idx];
		let next = if Table::present(entry) {
			Table::entry_phys(entry)
		} else {
			let new_table = alloc_table()?;
			table.0[idx] = new_table.0 as u64 | (Flags::PRESENT | Flags::WRITABLE | Flags::USER).bits();
			new_table
		};
		table = table_at(next);
	}
	Some(&mut table.0[virt.table_index(0)])
}

/// Maps `virt` to `phys` with `flags`, allocating any missing intermediate tables. Returns
/// `None` if an intermediate allocation fails.
pub fn map_page(root: Root, virt: VirtAddr, phys: PhysAddr, flags: Flags) -> Option<()> {
	let leaf = walk_create(root, virt)?;
	*leaf = phys.0 as u64 | (flags | Flags::PRESENT).bits();
	invalidate_page(virt);
	Some(())
}

fn walk(root: Root, virt: VirtAddr) -> Option<&'static mut u64> {
	let mut table = table_at(root.0);
	for level in (1..=3).rev() {
		let idx = virt.table_index(level);
		let entry = table.0[idx];
		if !Table::present(entry) {
			return None;
		}
		if level == 2 && entry & Flags::PAGE_SIZE.bits() != 0 {
			return Some(&mut table.0[idx]);
		}
		table = table_at(Table::entry_phys(entry));
	}
	Some(&mut table.0[virt.table_index(0)])
}

/// Clears the leaf mapping `virt`. Returns `None` if an intermediate table is absent. Does not
/// free intermediate tables.
pub fn unmap_page(root: Root, virt: VirtAddr) -> Option<()> {
	let leaf = walk(root, virt)?;
	*leaf = 0;
	invalidate_page(virt);
	Some(())
}

/// Translates `virt` through `root`, honoring 2 MiB leaves. Returns a null address for any
/// missing level.
pub fn translate(root: Root, virt: VirtAddr) -> PhysAddr {
	let Some(leaf) = walk(root, virt) else {
		return PhysAddr(0);
	};
	let entry = *leaf;
	if !Table::present(entry) {
		return PhysAddr(0);
	}
	let base = Table::entry_phys(entry).0;
	if entry & Flags::PAGE_SIZE.bits() != 0 {
		PhysAddr(base | (virt.0 & 0x1F_FFFF))
	} else {
		PhysAddr(base | (virt.0 & (PAGE_SIZE - 1)))
	}
}

/// Calls `f(virt, phys)` for every present 4 KiB leaf mapping in the user half (PML4 indices
/// 0..256) of `root`. Used by `fork` to copy a task's address space without walking every
/// virtual address that could possibly exist.
pub fn for_each_user_page(root: Root, mut f: impl FnMut(VirtAddr, PhysAddr)) {
	let pml4 = table_at(root.0);
	for pml4_idx in 0..256 {
		let pdpte = pml4.0[pml4_idx];
		if !Table::present(pdpte) {
			continue;
		}
		let pdpt = table_at(Table::entry_phys(pdpte));
		for pdpt_idx in 0..ENTRIES {
			let pde = pdpt.0[pdpt_idx];
			if !Table::present(pde) {
				continue;
			}
			let pd = table_at(Table::entry_phys(pde));
			for pd_idx in 0..ENTRIES {
				let pte_entry = pd.0[pd_idx];
				if !Table::present(pte_entry) {
					continue;
				}
				let pt = table_at(Table::entry_phys(pte_entry));
				for (pt_idx, leaf) in pt.0.iter().enumerate() {
					if !Table::present(*leaf) {
						continue;
					}
					let virt = VirtAddr(
						(pml4_idx << 39) | (pdpt_idx << 30) | (pd_idx << 21) | (pt_idx << 12),
					);
					f(virt, Table::entry_phys(*leaf));
				}
			}
		}
	}
}

/// Flushes a single TLB entry.
pub fn invalidate_page(virt: VirtAddr) {
	unsafe {
		asm!("invlpg [{}]", in(reg) virt.0, options(nostack));
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn flags_roundtrip() {
		let f = Flags::PRESENT | Flags::WRITABLE | Flags::USER;
		assert!(f.contains(Flags::PRESENT));
		assert!(!f.contains(Flags::NO_EXECUTE));
	}
}
