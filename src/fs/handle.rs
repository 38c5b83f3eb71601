//! Open file and directory handles (spec.md §4.4 "File I/O" / "Directory enumeration").
//!
//! A handle keeps an in-memory mirror of its Stream entry's mutable fields (`first_cluster`,
//! `data_length`, `valid_data_length`) plus the `(cluster, index)` of its backing entry set, so
//! `flush` can write the three fields back without re-resolving the path (spec.md §9, "File
//! handle and directory entry coupling").

use super::dir::{self, EntryLoc};
use super::{fat, Volume, CLUSTER_EOC};
use crate::util::{errno, EResult};
use alloc::vec;

/// `open` flags (spec.md §6).
pub const O_RDONLY: u32 = 0;
pub const O_WRONLY: u32 = 1;
pub const O_RDWR: u32 = 2;
pub const O_CREAT: u32 = 4;
pub const O_TRUNC: u32 = 8;
pub const O_APPEND: u32 = 16;
pub const O_EXCL: u32 = 32;
/// Supplemented from `original_source`: accepted but not required by `open`, used internally
/// by `opendir`.
pub const O_DIRECTORY: u32 = 0x1_0000;

/// `seek` origins.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Whence {
	Set,
	Cur,
	End,
}

/// An open regular file. Deep-copied byte-for-byte by `fork` (spec.md §4.5).
#[derive(Clone, Copy)]
pub struct Handle {
	loc: EntryLoc,
	first_cluster: u32,
	size: u64,
	offset: u64,
	current_cluster: u32,
	is_directory: bool,
	append: bool,
	dirty: bool,
	/// Whether the cluster chain is a single contiguous run (exFAT's "no FAT chain" variant,
	/// spec.md §3) rather than FAT-linked. Read from the Stream entry at `open`; read/write
	/// advance the current cluster by direct increment instead of `fat::next_cluster` while set.
	is_contiguous: bool,
}

impl Handle {
	/// A handle with no backing entry set, for unit tests that exercise the fd table only.
	#[cfg(test)]
	pub(crate) fn test_stub() -> Self {
		Self {
			loc: EntryLoc { cluster: 0, index: 0 },
			first_cluster: 0,
			size: 0,
			offset: 0,
			current_cluster: 0,
			is_directory: false,
			append: false,
			dirty: false,
			is_contiguous: false,
		}
	}

	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn is_directory(&self) -> bool {
		self.is_directory
	}

	pub fn offset(&self) -> u64 {
		self.offset
	}
}

/// Resolves `path` under `root`, applying `flags`, and returns an open handle.
pub fn open(volume: &mut Volume, root: u32, path: &[u8], flags: u32) -> EResult<Handle> {
	let (parent_path, name) = dir::split_parent(path);
	let dir_cluster = dir::walk_dirs(volume, root, parent_path)?;
	if dir_cluster == 0 {
		return Err(errno!(ENOENT));
	}

	let found = dir::find_entry(volume, dir_cluster, name)?;
	let (loc, file, mut stream) = match found {
		Some((file, stream, loc)) => {
			if flags & O_CREAT != 0 && flags & O_EXCL != 0 {
				return Err(errno!(EEXIST));
			}
			(loc, file, stream)
		}
		None => {
			if flags & O_CREAT == 0 {
				return Err(errno!(ENOENT));
			}
			let loc = dir::create(volume, dir_cluster, name)?;
			let (file, stream) = dir::read_entry_set(volume, loc)?;
			(loc, file, stream)
		}
	};

	if file.is_directory() && (flags & (O_WRONLY | O_RDWR) != 0 || flags & O_TRUNC != 0) {
		return Err(errno!(EISDIR));
	}

	if flags & O_TRUNC != 0 && !file.is_directory() && stream.first_cluster != 0 {
		fat::free_chain(volume, stream.first_cluster)?;
		stream.first_cluster = 0;
		stream.data_length = 0;
		stream.valid_data_length = 0;
		dir::write_stream_entry(volume, loc, &stream)?;
	}

	let offset = if flags & O_APPEND != 0 { stream.data_length } else { 0 };
	Ok(Handle {
		loc,
		first_cluster: stream.first_cluster,
		size: stream.data_length,
		offset,
		current_cluster: stream.first_cluster,
		is_directory: file.is_directory(),
		append: flags & O_APPEND != 0,
		dirty: false,
		is_contiguous: stream.is_contiguous(),
	})
}

/// Walks from `first_cluster` to the cluster containing byte offset `offset`. A contiguous chain
/// (exFAT's "no FAT chain" variant) is addressed by direct arithmetic; a FAT-linked chain is
/// walked one link at a time.
fn cluster_for_offset(volume: &Volume, first_cluster: u32, offset: u64, is_contiguous: bool) -> u32 {
	if first_cluster == 0 {
		return 0;
	}
	let skip = offset / volume.bytes_per_cluster() as u64;
	if is_contiguous {
		return first_cluster + skip as u32;
	}
	let mut cluster = first_cluster;
	let mut remaining = skip;
	while remaining > 0 {
		cluster = fat::next_cluster(volume, cluster);
		if cluster == 0 || cluster >= CLUSTER_EOC {
			return 0;
		}
		remaining -= 1;
	}
	cluster
}

/// Copies up to `buf.len()` bytes starting at the handle's current offset, advancing it.
pub fn read(volume: &Volume, handle: &mut Handle, buf: &mut [u8]) -> EResult<usize> {
	if handle.is_directory {
		return Err(errno!(EISDIR));
	}
	let remaining_in_file = handle.size.saturating_sub(handle.offset);
	let to_read = (buf.len() as u64).min(remaining_in_file) as usize;
	if to_read == 0 || handle.current_cluster == 0 {
		return Ok(0);
	}

	let cluster_size = volume.bytes_per_cluster();
	let mut done = 0;
	let mut cluster = handle.current_cluster;
	let mut intra_offset = (handle.offset % cluster_size as u64) as usize;
	let mut cluster_buf = vec![0u8; cluster_size];
	while done < to_read {
		volume.read_cluster(cluster, &mut cluster_buf)?;
		let chunk = (cluster_size - intra_offset).min(to_read - done);
		buf[done..done + chunk].copy_from_slice(&cluster_buf[intra_offset..intra_offset + chunk]);
		done += chunk;
		handle.offset += chunk as u64;
		intra_offset += chunk;
		if intra_offset == cluster_size && done < to_read {
			let next = if handle.is_contiguous {
				cluster + 1
			} else {
				let n = fat::next_cluster(volume, cluster);
				if n == 0 || n >= CLUSTER_EOC {
					break;
				}
				n
			};
			cluster = next;
			intra_offset = 0;
		}
	}
	handle.current_cluster = cluster;
	Ok(done)
}

/// Writes `buf` starting at the handle's current offset (or end-of-file if opened `O_APPEND`),
/// allocating clusters lazily as the chain is extended.
pub fn write(volume: &mut Volume, handle: &mut Handle, buf: &[u8]) -> EResult<usize> {
	if handle.is_directory {
		return Err(errno!(EISDIR));
	}
	if handle.append {
		handle.offset = handle.size;
	}
	if handle.first_cluster == 0 {
		let cluster_size = volume.bytes_per_cluster();
		let wanted = (buf.len() as u64).div_ceil(cluster_size as u64).max(1) as u32;
		let new_cluster = fat::alloc_cluster(volume, wanted, true)?;
		if new_cluster != 0 {
			handle.is_contiguous = true;
		} else {
			let new_cluster = fat::alloc_cluster(volume, 1, false)?;
			if new_cluster == 0 {
				return Err(errno!(ENOSPC));
			}
			handle.first_cluster = new_cluster;
			handle.current_cluster = new_cluster;
		}
		if handle.is_contiguous {
			handle.first_cluster = new_cluster;
			handle.current_cluster = new_cluster;
		}
	}

	let cluster_size = volume.bytes_per_cluster();
	let mut cluster = cluster_for_offset(volume, handle.first_cluster, handle.offset, handle.is_contiguous);
	if cluster == 0 {
		cluster = handle.current_cluster;
	}
	let mut intra_offset = (handle.offset % cluster_size as u64) as usize;
	let mut cluster_buf = vec![0u8; cluster_size];
	let mut done = 0;
	while done < buf.len() {
		volume.read_cluster(cluster, &mut cluster_buf)?;
		let chunk = (cluster_size - intra_offset).min(buf.len() - done);
		cluster_buf[intra_offset..intra_offset + chunk].copy_from_slice(&buf[done..done + chunk]);
		volume.write_cluster(cluster, &cluster_buf)?;
		done += chunk;
		handle.offset += chunk as u64;
		intra_offset += chunk;
		if intra_offset == cluster_size && done < buf.len() {
			let next = if handle.is_contiguous {
				cluster + 1
			} else {
				let mut n = fat::next_cluster(volume, cluster);
				if n == 0 || n >= CLUSTER_EOC {
					n = fat::alloc_cluster(volume, 1, false)?;
					if n == 0 {
						break;
					}
					fat::set_next(volume, cluster, n)?;
				}
				n
			};
			cluster = next;
			intra_offset = 0;
		}
	}
	handle.current_cluster = cluster;
	handle.size = handle.size.max(handle.offset);
	handle.dirty = true;
	Ok(done)
}

/// Recomputes the handle's offset (and current cluster) per `whence`.
pub fn seek(volume: &Volume, handle: &mut Handle, offset: i64, whence: Whence) -> EResult<u64> {
	let base = match whence {
		Whence::Set => 0i64,
		Whence::Cur => handle.offset as i64,
		Whence::End => handle.size as i64,
	};
	let new_offset = base.checked_add(offset).ok_or(errno!(EOVERFLOW))?;
	if new_offset < 0 {
		return Err(errno!(EINVAL));
	}
	handle.offset = new_offset as u64;
	handle.current_cluster = cluster_for_offset(volume, handle.first_cluster, handle.offset, handle.is_contiguous);
	Ok(handle.offset)
}

/// Publishes `first_cluster`/`data_length`/`valid_data_length` back to the Stream entry.
pub fn flush(volume: &mut Volume, handle: &mut Handle) -> EResult<()> {
	if !handle.dirty {
		return Ok(());
	}
	let (_, mut stream) = dir::read_entry_set(volume, handle.loc)?;
	stream.first_cluster = handle.first_cluster;
	stream.data_length = handle.size;
	stream.valid_data_length = handle.size;
	stream.set_contiguous(handle.is_contiguous);
	dir::write_stream_entry(volume, handle.loc, &stream)?;
	handle.dirty = false;
	Ok(())
}

/// Flushes and drops the handle.
pub fn close(volume: &mut Volume, mut handle: Handle) -> EResult<()> {
	flush(volume, &mut handle)
}

/// Yields the next logical directory entry's name from a handle opened on a directory (spec.md
/// §4.4 "Directory enumeration"), or `None` at end-of-chain. A directory handle has no
/// meaningful byte offset, so `offset`/`current_cluster` double as the scan cursor instead —
/// the same fields `seek` and `read` use for regular files.
pub fn readdir(volume: &Volume, handle: &mut Handle) -> EResult<Option<alloc::vec::Vec<u8>>> {
	use super::direntry::{ENTRY_TYPE_END, ENTRY_TYPE_FILE, ENTRY_TYPE_NAME};

	if !handle.is_directory {
		return Err(errno!(ENOTDIR));
	}
	let records_per_cluster = volume.bytes_per_cluster() / 32;
	let mut index = handle.offset as usize;
	loop {
		if handle.current_cluster == 0 || handle.current_cluster >= CLUSTER_EOC {
			return Ok(None);
		}
		let mut buf = vec![0u8; volume.bytes_per_cluster()];
		volume.read_cluster(handle.current_cluster, &mut buf)?;
		if index + 2 >= records_per_cluster {
			handle.current_cluster = fat::next_cluster(volume, handle.current_cluster);
			index = 0;
			continue;
		}
		let record = &buf[index * 32..(index + 1) * 32];
		if record[0] == ENTRY_TYPE_END {
			handle.offset = index as u64;
			return Ok(None);
		}
		if record[0] == ENTRY_TYPE_FILE {
			let name_rec = &buf[(index + 2) * 32..(index + 3) * 32];
			if name_rec[0] & !super::direntry::ENTRY_TYPE_IN_USE == ENTRY_TYPE_NAME {
				let name_entry = super::direntry::NameEntry::from_bytes(name_rec).ok_or(errno!(EUCLEAN))?;
				let name = name_entry.name_str().to_vec();
				index += 3;
				handle.offset = index as u64;
				return Ok(Some(name));
			}
		}
		index += 1;
	}
}

/// Convenience wrapper (supplemented from `original_source`'s `fs_exists`): whether `path`
/// resolves to any entry.
pub fn exists(volume: &Volume, root: u32, path: &[u8]) -> EResult<bool> {
	Ok(dir::lookup(volume, root, path)?.is_some())
}
