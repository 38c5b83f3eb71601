//! An exFAT-compatible filesystem over a single ATA PIO volume (spec.md §4.4). One volume is
//! mounted at a time; there is no mount-point tree.

pub mod dir;
pub mod direntry;
pub mod fat;
pub mod handle;

use crate::{
	config::ATA_PARTITION_LBA,
	device::ata,
	sync::{IntMutex, IntMutexGuard},
	util::{errno, AnyRepr, EResult},
};
use alloc::vec;
use alloc::vec::Vec;
use direntry::{BootSector, ENTRY_TYPE_BITMAP};

/// Free cluster / directory entry marker.
pub const CLUSTER_FREE: u32 = 0;
/// End-of-chain marker.
pub const CLUSTER_EOC: u32 = 0xFFFF_FFFF;
/// Bad-cluster marker.
pub const CLUSTER_BAD: u32 = 0xFFFF_FFF7;
/// First cluster number actually usable for data; clusters 0 and 1 are reserved FAT entries.
pub const FIRST_DATA_CLUSTER: u32 = 2;
/// Cluster reserved for the root directory by [`format`].
const ROOT_CLUSTER: u32 = 2;
/// Cluster reserved for the allocation bitmap by [`format`].
const BITMAP_RESERVED_CLUSTER: u32 = 3;
/// Cluster reserved for the up-case table by [`format`].
const UPCASE_RESERVED_CLUSTER: u32 = 4;

/// Mounted volume state: boot sector geometry plus the cached FAT and allocation bitmap.
pub struct Volume {
	pub boot: BootSector,
	pub partition_lba: u64,
	/// First cluster of the allocation bitmap, discovered at mount time.
	pub bitmap_cluster: u32,
	/// Cached FAT, one `u32` entry per cluster.
	pub fat: Vec<u32>,
	/// Cached allocation bitmap, one bit per cluster starting at [`FIRST_DATA_CLUSTER`].
	pub bitmap: Vec<u8>,
}

impl Volume {
	pub fn bytes_per_sector(&self) -> usize {
		self.boot.bytes_per_sector()
	}

	pub fn sectors_per_cluster(&self) -> usize {
		self.boot.sectors_per_cluster()
	}

	pub fn bytes_per_cluster(&self) -> usize {
		self.boot.bytes_per_cluster()
	}

	pub fn root_cluster(&self) -> u32 {
		self.boot.first_cluster_of_root_directory
	}

	/// Absolute LBA of the first sector of a cluster's data.
	pub fn cluster_lba(&self, cluster: u32) -> u64 {
		self.partition_lba
			+ self.boot.cluster_heap_offset as u64
			+ (cluster - FIRST_DATA_CLUSTER) as u64 * self.sectors_per_cluster() as u64
	}

	fn fat_entry_location(&self, cluster: u32) -> (u64, usize) {
		let byte_offset = cluster as usize * 4;
		let sector_index = byte_offset / self.bytes_per_sector();
		let offset_in_sector = byte_offset % self.bytes_per_sector();
		(self.partition_lba + self.boot.fat_offset as u64 + sector_index as u64, offset_in_sector)
	}

	/// Reads an entire cluster into `buf`, which must be exactly one cluster long.
	pub fn read_cluster(&self, cluster: u32, buf: &mut [u8]) -> EResult<()> {
		debug_assert_eq!(buf.len(), self.bytes_per_cluster());
		let lba = self.cluster_lba(cluster);
		for (i, chunk) in buf.chunks_mut(self.bytes_per_sector()).enumerate() {
			let mut sector_buf = [0u8; ata::SECTOR_SIZE];
			ata::read_sector((lba + i as u64) as u32, &mut sector_buf)?;
			chunk.copy_from_slice(&sector_buf[..chunk.len()]);
		}
		Ok(())
	}

	/// Writes an entire cluster from `buf`, which must be exactly one cluster long.
	pub fn write_cluster(&self, cluster: u32, buf: &[u8]) -> EResult<()> {
		debug_assert_eq!(buf.len(), self.bytes_per_cluster());
		let lba = self.cluster_lba(cluster);
		for (i, chunk) in buf.chunks(self.bytes_per_sector()).enumerate() {
			let mut sector_buf = [0u8; ata::SECTOR_SIZE];
			sector_buf[..chunk.len()].copy_from_slice(chunk);
			ata::write_sector((lba + i as u64) as u32, &sector_buf)?;
		}
		Ok(())
	}

	/// Writes the single sector of the cached FAT covering `cluster`'s entry back to disk
	/// (spec.md §4.4 "write-through").
	pub(super) fn flush_fat_sector(&self, cluster: u32) -> EResult<()> {
		let (lba, offset_in_sector) = self.fat_entry_location(cluster);
		let sector_base_entry = cluster as usize - (offset_in_sector / 4);
		let entries_per_sector = self.bytes_per_sector() / 4;
		let mut sector_buf = [0u8; ata::SECTOR_SIZE];
		let end = (sector_base_entry + entries_per_sector).min(self.fat.len());
		for (i, entry) in self.fat[sector_base_entry..end].iter().enumerate() {
			sector_buf[i * 4..i * 4 + 4].copy_from_slice(&entry.to_le_bytes());
		}
		ata::write_sector(lba as u32, &sector_buf)
	}

	/// Writes the single sector of the cached bitmap covering `cluster`'s bit back to disk.
	pub(super) fn flush_bitmap_sector(&self, cluster: u32) -> EResult<()> {
		let bit_index = (cluster - FIRST_DATA_CLUSTER) as usize;
		let byte_index = bit_index / 8;
		let bytes_per_sector = self.bytes_per_sector();
		let sector_index = byte_index / bytes_per_sector;
		let base = sector_index * bytes_per_sector;
		let end = (base + bytes_per_sector).min(self.bitmap.len());
		let mut sector_buf = [0u8; ata::SECTOR_SIZE];
		sector_buf[..end - base].copy_from_slice(&self.bitmap[base..end]);
		// The bitmap's cluster chain is contiguous by construction (format lays it out as a
		// single cluster); locate the absolute sector directly from its first cluster.
		let lba = self.cluster_lba(self.bitmap_cluster) + sector_index as u64;
		ata::write_sector(lba as u32, &sector_buf)
	}
}

static VOLUME: IntMutex<Option<Volume>> = IntMutex::new(None);

/// Locks and returns the mounted volume, or `ENODEV` if none is mounted.
pub fn volume() -> EResult<IntMutexGuard<'static, Option<Volume>>> {
	let guard = VOLUME.lock();
	if guard.is_none() {
		return Err(errno!(ENODEV));
	}
	Ok(guard)
}

/// Tells whether a volume is currently mounted.
pub fn is_mounted() -> bool {
	VOLUME.lock().is_some()
}

/// Mounts the volume at [`config::ATA_PARTITION_LBA`]: reads the boot sector, verifies its
/// signature and tag, loads the FAT, locates and loads the allocation bitmap.
///
/// Leaves no volume mounted on any verification failure.
pub fn init() -> EResult<()> {
	let mut sector = [0u8; ata::SECTOR_SIZE];
	ata::read_sector(ATA_PARTITION_LBA as u32, &mut sector)?;
	let boot = *BootSector::from_bytes(&sector).ok_or(errno!(EIO))?;
	if !boot.is_valid() {
		return Err(errno!(EUCLEAN));
	}

	let fat_sectors = boot.fat_length as usize;
	let bytes_per_sector = boot.bytes_per_sector();
	let mut fat = Vec::with_capacity(fat_sectors * bytes_per_sector / 4);
	let mut sector_buf = [0u8; ata::SECTOR_SIZE];
	for i in 0..fat_sectors {
		ata::read_sector((ATA_PARTITION_LBA + boot.fat_offset as u64 + i as u64) as u32, &mut sector_buf)?;
		for chunk in sector_buf.chunks_exact(4) {
			fat.push(u32::from_le_bytes(chunk.try_into().unwrap()));
		}
	}

	let root_cluster = boot.first_cluster_of_root_directory;
	let mut volume = Volume {
		boot,
		partition_lba: ATA_PARTITION_LBA,
		bitmap_cluster: 0,
		fat,
		bitmap: Vec::new(),
	};

	let mut root_buf = vec![0u8; volume.bytes_per_cluster()];
	volume.read_cluster(root_cluster, &mut root_buf)?;
	let bitmap_cluster = root_buf
		.chunks_exact(32)
		.find(|entry| entry[0] == ENTRY_TYPE_BITMAP)
		.map(|entry| u32::from_le_bytes(entry[20..24].try_into().unwrap()))
		.ok_or(errno!(EUCLEAN))?;
	volume.bitmap_cluster = bitmap_cluster;

	let bitmap_bytes = (volume.boot.cluster_count as usize).div_ceil(8);
	let mut bitmap = Vec::with_capacity(bitmap_bytes.div_ceil(volume.bytes_per_cluster()) * volume.bytes_per_cluster());
	let mut cluster_buf = vec![0u8; volume.bytes_per_cluster()];
	let mut remaining = bitmap_bytes;
	let mut cluster = bitmap_cluster;
	while remaining > 0 {
		volume.read_cluster(cluster, &mut cluster_buf)?;
		bitmap.extend_from_slice(&cluster_buf);
		remaining = remaining.saturating_sub(volume.bytes_per_cluster());
		cluster += 1;
	}
	bitmap.truncate(bitmap_bytes);
	volume.bitmap = bitmap;

	*VOLUME.lock() = Some(volume);
	Ok(())
}

/// Formats `total_sectors` worth of storage (partition-relative) as a fresh exFAT-compatible
/// volume: fixed 512-byte sectors, 4 KiB clusters, a single FAT, reserving clusters 2 (root), 3
/// (bitmap), 4 (up-case), then re-mounts via [`init`].
pub fn format(total_sectors: u64) -> EResult<()> {
	let sector_size = ata::SECTOR_SIZE as u64;
	let zero = [0u8; ata::SECTOR_SIZE];
	for i in 0..32.min(total_sectors) {
		ata::write_sector((ATA_PARTITION_LBA + i) as u32, &zero)?;
	}

	let sectors_per_cluster = 8u64; // 4 KiB clusters with 512-byte sectors
	let fat_offset = 24u64;
	let cluster_count = ((total_sectors - fat_offset) / sectors_per_cluster).saturating_sub(1) as u32;
	let fat_length_sectors = ((cluster_count as u64 + 2) * 4).div_ceil(sector_size) as u32;
	let cluster_heap_offset = (fat_offset + fat_length_sectors as u64) as u32;

	let boot = BootSector::new_for_format(
		total_sectors * sector_size,
		fat_length_sectors,
		cluster_heap_offset,
		cluster_count,
	);
	let mut sector = [0u8; ata::SECTOR_SIZE];
	sector[..core::mem::size_of::<BootSector>()].copy_from_slice(boot.as_bytes());
	ata::write_sector(ATA_PARTITION_LBA as u32, &sector)?;

	// FAT: entries 0 and 1, plus the three reserved clusters, are end-of-chain.
	let mut fat = vec![CLUSTER_FREE; (fat_length_sectors as usize * ata::SECTOR_SIZE) / 4];
	fat[0] = CLUSTER_EOC;
	fat[1] = CLUSTER_EOC;
	fat[ROOT_CLUSTER as usize] = CLUSTER_EOC;
	fat[BITMAP_RESERVED_CLUSTER as usize] = CLUSTER_EOC;
	fat[UPCASE_RESERVED_CLUSTER as usize] = CLUSTER_EOC;
	for (i, chunk) in fat.chunks(ata::SECTOR_SIZE / 4).enumerate() {
		let mut buf = [0u8; ata::SECTOR_SIZE];
		for (j, entry) in chunk.iter().enumerate() {
			buf[j * 4..j * 4 + 4].copy_from_slice(&entry.to_le_bytes());
		}
		ata::write_sector((ATA_PARTITION_LBA + fat_offset + i as u64) as u32, &buf)?;
	}

	// Allocation bitmap: low three bits set (clusters 2, 3, 4 in use).
	let bitmap_bytes = (cluster_count as usize).div_ceil(8);
	let mut bitmap = vec![0u8; bitmap_bytes.max(1)];
	bitmap[0] = 0b0000_0111;
	let bytes_per_cluster = 4096usize;
	let bitmap_cluster_lba =
		ATA_PARTITION_LBA + cluster_heap_offset as u64 + (BITMAP_RESERVED_CLUSTER - FIRST_DATA_CLUSTER) as u64 * sectors_per_cluster;
	let mut padded = vec![0u8; bytes_per_cluster];
	padded[..bitmap.len().min(bytes_per_cluster)].copy_from_slice(&bitmap[..bitmap.len().min(bytes_per_cluster)]);
	for (i, chunk) in padded.chunks(ata::SECTOR_SIZE).enumerate() {
		let mut buf = [0u8; ata::SECTOR_SIZE];
		buf.copy_from_slice(chunk);
		ata::write_sector((bitmap_cluster_lba + i as u64) as u32, &buf)?;
	}

	// Root cluster: a Bitmap entry and an Up-case entry (stubbed, but present and reserved).
	let mut root = vec![0u8; bytes_per_cluster];
	root[0] = ENTRY_TYPE_BITMAP;
	root[20..24].copy_from_slice(&BITMAP_RESERVED_CLUSTER.to_le_bytes());
	root[24..32].copy_from_slice(&(bitmap.len() as u64).to_le_bytes());
	root[32] = direntry::ENTRY_TYPE_UPCASE;
	root[52..56].copy_from_slice(&UPCASE_RESERVED_CLUSTER.to_le_bytes());
	let root_cluster_lba =
		ATA_PARTITION_LBA + cluster_heap_offset as u64 + (ROOT_CLUSTER - FIRST_DATA_CLUSTER) as u64 * sectors_per_cluster;
	for (i, chunk) in root.chunks(ata::SECTOR_SIZE).enumerate() {
		let mut buf = [0u8; ata::SECTOR_SIZE];
		buf.copy_from_slice(chunk);
		ata::write_sector((root_cluster_lba + i as u64) as u32, &buf)?;
	}

	init()
}
