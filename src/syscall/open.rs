//! `open` (spec.md §4.4 "File I/O", §6, syscall 5).

use crate::{
	file::path,
	fs::{self, handle},
	process,
	util::EResult,
};
use macros::syscall;

#[syscall]
pub fn open(path_ptr: usize, flags: u32) -> EResult<usize> {
	let raw_path = super::read_path(path_ptr)?;
	let cwd = process::with_current(|t| t.cwd_path.clone());
	let resolved = path::resolve(&cwd, &raw_path);

	let mut guard = fs::volume()?;
	let volume = guard.as_mut().expect("checked Some by fs::volume");
	let root = volume.root_cluster();
	let opened = handle::open(volume, root, &resolved, flags)?;
	drop(guard);

	process::with_current(|t| t.fds.alloc(opened))
}
