//! `rmdir` (spec.md §4.4, §9, syscall 84): unlike the source this was distilled from, refuses to
//! remove a non-empty directory (the resolved Open Question — see DESIGN.md).

use crate::{
	file::path,
	fs::{self, dir, fat},
	process,
	util::{errno, EResult},
};
use macros::syscall;

#[syscall]
pub fn rmdir(path_ptr: usize) -> EResult<usize> {
	let raw_path = super::read_path(path_ptr)?;
	let cwd = process::with_current(|t| t.cwd_path.clone());
	let resolved = path::resolve(&cwd, &raw_path);

	let mut guard = fs::volume()?;
	let volume = guard.as_mut().expect("checked Some by fs::volume");
	let root = volume.root_cluster();
	let (file, stream, loc) = dir::lookup(volume, root, &resolved)?.ok_or(errno!(ENOENT))?;
	if !file.is_directory() {
		return Err(errno!(ENOTDIR));
	}
	if !dir::is_empty(volume, stream.first_cluster)? {
		return Err(errno!(ENOTEMPTY));
	}
	if stream.first_cluster != 0 {
		fat::free_chain(volume, stream.first_cluster)?;
	}
	dir::tombstone(volume, loc)?;
	Ok(0)
}
