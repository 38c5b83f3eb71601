//! `rename` (spec.md §4.4 "Rename / move", syscall 16).

use crate::{
	file::path,
	fs::{self, dir},
	process,
	util::{errno, EResult},
};
use macros::syscall;

#[syscall]
pub fn rename(old_ptr: usize, new_ptr: usize) -> EResult<usize> {
	let old_raw = super::read_path(old_ptr)?;
	let new_raw = super::read_path(new_ptr)?;
	let cwd = process::with_current(|t| t.cwd_path.clone());
	let old_resolved = path::resolve(&cwd, &old_raw);
	let new_resolved = path::resolve(&cwd, &new_raw);

	let mut guard = fs::volume()?;
	let volume = guard.as_mut().expect("checked Some by fs::volume");
	let root = volume.root_cluster();

	let (_, _, old_loc) = dir::lookup(volume, root, &old_resolved)?.ok_or(errno!(ENOENT))?;
	let (old_parent_path, _) = dir::split_parent(&old_resolved);
	let old_parent = dir::walk_dirs(volume, root, old_parent_path)?;

	let (new_parent_path, new_name) = dir::split_parent(&new_resolved);
	let new_parent = dir::walk_dirs(volume, root, new_parent_path)?;
	if new_parent == 0 {
		return Err(errno!(ENOENT));
	}

	dir::rename(volume, old_parent, old_loc, new_parent, new_name)?;
	Ok(0)
}
