//! `stat` (spec.md §4.4, §9, syscall 30 — an Open Question this reimplementation resolves; see
//! DESIGN.md).

use crate::{
	file::path,
	fs::{self, dir},
	process,
	util::{errno, AnyRepr, EResult},
};
use macros::syscall;

/// The fixed-size structure `stat` writes into the caller's buffer. Only `size` and `is_dir` are
/// required by spec.md's testable properties; both are populated straight from the Stream and
/// File entries.
#[derive(AnyRepr, Clone, Copy)]
#[repr(C)]
pub struct Stat {
	pub size: u64,
	pub is_dir: u8,
	reserved: [u8; 7],
}

#[syscall]
pub fn stat(path_ptr: usize, stat_ptr: usize) -> EResult<usize> {
	let raw_path = super::read_path(path_ptr)?;
	let cwd = process::with_current(|t| t.cwd_path.clone());
	let resolved = path::resolve(&cwd, &raw_path);

	let guard = fs::volume()?;
	let volume = guard.as_ref().expect("checked Some by fs::volume");
	let root = volume.root_cluster();
	let (file, stream, _) = dir::lookup(volume, root, &resolved)?.ok_or(errno!(ENOENT))?;
	drop(guard);

	let out = Stat {
		size: stream.data_length,
		is_dir: file.is_directory() as u8,
		reserved: [0; 7],
	};
	let buf = super::user_slice_mut(stat_ptr, core::mem::size_of::<Stat>())?;
	buf.copy_from_slice(out.as_bytes());
	Ok(0)
}
