//! ELF64 loading for `exec` (spec.md §4.5).
//!
//! Only what a static, non-relocatable executable needs: the file header, the program header
//! table, and `PT_LOAD` segment mapping. No dynamic linking, no relocations: userspace programs
//! on this kernel are statically linked.

use crate::{
	fs::{self, handle},
	memory::{
		frame,
		vmem::{self, Flags, Root},
		VirtAddr, PAGE_SIZE,
	},
	util::{errno, AnyRepr, EResult},
};
use alloc::vec;
use macros::AnyRepr;

const EI_NIDENT: usize = 16;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
/// Required architecture: AMD x86-64.
const EM_X86_64: u16 = 62;
const PT_LOAD: u32 = 1;
const PF_X: u32 = 0x1;
const PF_W: u32 = 0x2;

#[derive(AnyRepr, Clone, Copy)]
#[repr(C)]
struct Elf64Header {
	e_ident: [u8; EI_NIDENT],
	e_type: u16,
	e_machine: u16,
	e_version: u32,
	e_entry: u64,
	e_phoff: u64,
	e_shoff: u64,
	e_flags: u32,
	e_ehsize: u16,
	e_phentsize: u16,
	e_phnum: u16,
	e_shentsize: u16,
	e_shnum: u16,
	e_shstrndx: u16,
}

#[derive(AnyRepr, Clone, Copy)]
#[repr(C)]
struct Elf64ProgramHeader {
	p_type: u32,
	p_flags: u32,
	p_offset: u64,
	p_vaddr: u64,
	p_paddr: u64,
	p_filesz: u64,
	p_memsz: u64,
	p_align: u64,
}

/// What `exec` needs to redirect execution into a freshly loaded image.
pub struct LoadedImage {
	pub entry: u64,
}

fn read_at(volume: &mut fs::Volume, handle: &mut handle::Handle, offset: u64, buf: &mut [u8]) -> EResult<()> {
	handle::seek(volume, handle, offset as i64, handle::Whence::Set)?;
	let mut done = 0;
	while done < buf.len() {
		let n = handle::read(volume, handle, &mut buf[done..])?;
		if n == 0 {
			return Err(errno!(EIO));
		}
		done += n;
	}
	Ok(())
}

/// Loads the executable at `path` (resolved under `dir_cluster`) into `root`, mapping every
/// `PT_LOAD` segment. `root` is expected to already carry the kernel's upper half and nothing
/// else: the caller is responsible for having unmapped any previous image first (spec.md §9,
/// "`exec` should unmap the old image before loading the new one").
pub fn load(root: Root, dir_cluster: u32, path: &[u8]) -> EResult<LoadedImage> {
	let mut guard = fs::volume()?;
	let volume = guard.as_mut().ok_or(errno!(ENODEV))?;
	let mut handle = handle::open(volume, dir_cluster, path, handle::O_RDONLY)?;

	let mut header_buf = [0u8; core::mem::size_of::<Elf64Header>()];
	read_at(volume, &mut handle, 0, &mut header_buf)?;
	let header = *Elf64Header::from_bytes(&header_buf).ok_or(errno!(ENOEXEC))?;

	if &header.e_ident[0..4] != b"\x7fELF"
		|| header.e_ident[4] != ELFCLASS64
		|| header.e_ident[5] != ELFDATA2LSB
		|| header.e_machine != EM_X86_64
		|| (header.e_type != ET_EXEC && header.e_type != ET_DYN)
	{
		return Err(errno!(ENOEXEC));
	}

	for i in 0..header.e_phnum as u64 {
		let mut phdr_buf = [0u8; core::mem::size_of::<Elf64ProgramHeader>()];
		read_at(volume, &mut handle, header.e_phoff + i * header.e_phentsize as u64, &mut phdr_buf)?;
		let phdr = *Elf64ProgramHeader::from_bytes(&phdr_buf).ok_or(errno!(ENOEXEC))?;
		if phdr.p_type != PT_LOAD || phdr.p_memsz == 0 {
			continue;
		}

		let mut segment = vec![0u8; phdr.p_memsz as usize];
		if phdr.p_filesz > 0 {
			read_at(volume, &mut handle, phdr.p_offset, &mut segment[..phdr.p_filesz as usize])?;
		}

		let seg_start = phdr.p_vaddr as usize;
		let seg_end = seg_start + phdr.p_memsz as usize;
		let page_start = VirtAddr(seg_start).align_down(PAGE_SIZE);
		let page_end = VirtAddr(seg_end).align_up(PAGE_SIZE);

		let mut flags = Flags::PRESENT | Flags::USER;
		if phdr.p_flags & PF_W != 0 {
			flags |= Flags::WRITABLE;
		}
		if phdr.p_flags & PF_X == 0 {
			flags |= Flags::NO_EXECUTE;
		}

		let mut page = page_start;
		while page.0 < page_end.0 {
			let phys = frame::alloc_page().ok_or(errno!(ENOMEM))?;
			let dst = phys.to_virt().as_ptr::<u8>();
			unsafe { core::ptr::write_bytes(dst, 0, PAGE_SIZE) };

			let copy_start = page.0.max(seg_start);
			let copy_end = (page.0 + PAGE_SIZE).min(seg_end);
			if copy_end > copy_start {
				let dst_off = copy_start - page.0;
				let src_off = copy_start - seg_start;
				let len = copy_end - copy_start;
				unsafe {
					core::ptr::copy_nonoverlapping(
						segment[src_off..src_off + len].as_ptr(),
						dst.add(dst_off),
						len,
					);
				}
			}

			vmem::map_page(root, page, phys, flags).ok_or(errno!(ENOMEM))?;
			page = page + PAGE_SIZE;
		}
	}

	handle::close(volume, handle)?;
	Ok(LoadedImage { entry: header.e_entry })
}
