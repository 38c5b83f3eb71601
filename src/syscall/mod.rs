//! System call dispatch (spec.md §4.7, §6): a 256-entry table reached through the `int 0x80`
//! gate. Unknown numbers return `-1` (`ENOSYS`), per spec.md §6.

mod brk;
mod chdir;
mod close;
mod exec;
mod exit;
mod fork;
mod getcwd;
mod getpid;
mod mkdir;
mod mmap;
mod munmap;
mod open;
mod read;
mod readdir;
mod rename;
mod rmdir;
mod stat;
mod waitpid;
mod write;

use crate::{
	idt::IntFrame,
	memory::{VirtAddr, KERNEL_BASE},
	util::{errno, EResult},
};
use alloc::vec::Vec;

/// Converts a raw syscall argument register into a typed handler parameter.
///
/// The `#[syscall]` macro always passes `false` for the second parameter; it is reserved for a
/// future distinction between read-only and read-write user pointers, which no handler here
/// needs yet.
pub trait FromSyscallArg: Sized {
	fn from_syscall_arg(raw: usize, write: bool) -> Self;
}

macro_rules! impl_from_syscall_arg_int {
	($($t:ty),* $(,)?) => {
		$(
			impl FromSyscallArg for $t {
				fn from_syscall_arg(raw: usize, _write: bool) -> Self {
					raw as $t
				}
			}
		)*
	};
}
impl_from_syscall_arg_int!(usize, isize, u8, u32, i32, u64, i64);

/// Longest path this kernel will read out of userspace in one syscall argument.
const MAX_PATH: usize = 256;

/// Tells whether `addr` (and, for multi-byte reads, `addr + len`) falls within the user half of
/// the address space. The kernel does not switch `cr3` on syscall entry, so a validated user
/// pointer can simply be dereferenced directly; this is the only check standing between a
/// careless syscall handler and a kernel-mode page fault.
fn validate_range(addr: usize, len: usize) -> EResult<()> {
	if addr == 0 {
		return Err(errno!(EFAULT));
	}
	let end = addr.checked_add(len).ok_or(errno!(EFAULT))?;
	if end > KERNEL_BASE.0 {
		return Err(errno!(EFAULT));
	}
	Ok(())
}

/// Copies a NUL-terminated path out of userspace.
fn read_path(ptr: usize) -> EResult<Vec<u8>> {
	validate_range(ptr, MAX_PATH)?;
	let slice = unsafe { core::slice::from_raw_parts(VirtAddr(ptr).as_ptr::<u8>(), MAX_PATH) };
	let len = slice.iter().position(|&b| b == 0).ok_or(errno!(ENAMETOOLONG))?;
	Ok(slice[..len].to_vec())
}

/// Borrows a validated, possibly-empty user buffer for reading or writing.
fn user_slice_mut(ptr: usize, len: usize) -> EResult<&'static mut [u8]> {
	if len == 0 {
		return Ok(&mut []);
	}
	validate_range(ptr, len)?;
	Ok(unsafe { core::slice::from_raw_parts_mut(VirtAddr(ptr).as_ptr::<u8>(), len) })
}

fn user_slice(ptr: usize, len: usize) -> EResult<&'static [u8]> {
	if len == 0 {
		return Ok(&[]);
	}
	validate_range(ptr, len)?;
	Ok(unsafe { core::slice::from_raw_parts(VirtAddr(ptr).as_ptr::<u8>(), len) })
}

fn to_raw_result(result: EResult<usize>) -> isize {
	match result {
		Ok(v) => v as isize,
		Err(e) => -(e.get() as isize),
	}
}

/// Looks up and runs the handler for syscall `num`, returning the value to write back into the
/// accumulator register.
pub fn dispatch(frame: &mut IntFrame, num: usize, args: &[usize; 6]) -> isize {
	let result: EResult<usize> = match num {
		1 => exit::exit_raw(args),
		2 => fork::fork_raw(frame),
		3 => read::read_raw(args),
		4 => write::write_raw(args),
		5 => open::open_raw(args),
		6 => close::close_raw(args),
		7 => waitpid::waitpid_raw(args),
		11 => exec::exec_raw(frame, args),
		16 => rename::rename_raw(args),
		17 => munmap::munmap_raw(args),
		18 => readdir::readdir_raw(args),
		19 => mmap::mmap_raw(args),
		20 => getpid::getpid_raw(args),
		30 => stat::stat_raw(args),
		45 => brk::brk_raw(args),
		79 => getcwd::getcwd_raw(args),
		80 => chdir::chdir_raw(args),
		83 => mkdir::mkdir_raw(args),
		84 => rmdir::rmdir_raw(args),
		_ => Err(errno!(ENOSYS)),
	};
	let raw = to_raw_result(result);
	crate::process::signal::deliver_pending(frame);
	raw
}
