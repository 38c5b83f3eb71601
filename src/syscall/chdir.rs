//! `chdir` (spec.md §4.4, syscall 80).

use crate::{
	file::path,
	fs::{self, dir},
	process,
	util::{errno, EResult},
};
use macros::syscall;

#[syscall]
pub fn chdir(path_ptr: usize) -> EResult<usize> {
	let raw_path = super::read_path(path_ptr)?;
	let cwd = process::with_current(|t| t.cwd_path.clone());
	let resolved = path::resolve(&cwd, &raw_path);

	let guard = fs::volume()?;
	let volume = guard.as_ref().expect("checked Some by fs::volume");
	let root = volume.root_cluster();
	let cluster = if resolved.is_empty() || resolved == b"/" {
		root
	} else {
		let (file, stream, _) = dir::lookup(volume, root, &resolved)?.ok_or(errno!(ENOENT))?;
		if !file.is_directory() {
			return Err(errno!(ENOTDIR));
		}
		stream.first_cluster
	};
	drop(guard);

	process::with_current(|t| {
		t.cwd_cluster = cluster;
		t.cwd_path = resolved;
	});
	Ok(0)
}
