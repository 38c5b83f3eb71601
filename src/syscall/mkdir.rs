//! `mkdir` (spec.md §4.4, syscall 83).

use crate::{
	file::path,
	fs::{self, dir},
	process,
	util::{errno, EResult},
};
use macros::syscall;

#[syscall]
pub fn mkdir(path_ptr: usize) -> EResult<usize> {
	let raw_path = super::read_path(path_ptr)?;
	let cwd = process::with_current(|t| t.cwd_path.clone());
	let resolved = path::resolve(&cwd, &raw_path);
	let (parent_path, name) = dir::split_parent(&resolved);

	let mut guard = fs::volume()?;
	let volume = guard.as_mut().expect("checked Some by fs::volume");
	let root = volume.root_cluster();
	let parent_cluster = dir::walk_dirs(volume, root, parent_path)?;
	if parent_cluster == 0 {
		return Err(errno!(ENOENT));
	}
	dir::mkdir(volume, parent_cluster, name)?;
	Ok(0)
}
