//! On-disk structures: the boot sector and the three-record directory entry sets (File, Stream
//! extension, File name) spec.md §4.4 describes.

use macros::AnyRepr;

/// Type byte of a File directory entry.
pub const ENTRY_TYPE_FILE: u8 = 0x85;
/// Type byte of a Stream extension entry.
pub const ENTRY_TYPE_STREAM: u8 = 0xC0;
/// Type byte of a File name entry.
pub const ENTRY_TYPE_NAME: u8 = 0xC1;
/// Type byte of the volume allocation Bitmap entry.
pub const ENTRY_TYPE_BITMAP: u8 = 0x81;
/// Type byte of the Up-case table entry.
pub const ENTRY_TYPE_UPCASE: u8 = 0x82;
/// Marks the end of a directory's entry stream.
pub const ENTRY_TYPE_END: u8 = 0x00;
/// High bit that, when cleared, marks a record as deleted/unused while preserving its type.
pub const ENTRY_TYPE_IN_USE: u8 = 0x80;

/// The `FileAttributes.Directory` bit.
pub const ATTR_DIRECTORY: u16 = 1 << 4;
/// The `FileAttributes.Archive` bit, set on every newly created file.
pub const ATTR_ARCHIVE: u16 = 1 << 5;

const BOOT_SIGNATURE: u16 = 0xAA55;
const FS_NAME: &[u8; 8] = b"EXFAT   ";

/// The exFAT main boot sector (LBA 0 of the volume, or of the partition if one is configured).
#[derive(AnyRepr, Clone, Copy)]
#[repr(C, packed)]
pub struct BootSector {
	pub jump_boot: [u8; 3],
	pub fs_name: [u8; 8],
	pub must_be_zero: [u8; 53],
	pub partition_offset: u64,
	pub volume_length: u64,
	pub fat_offset: u32,
	pub fat_length: u32,
	pub cluster_heap_offset: u32,
	pub cluster_count: u32,
	pub first_cluster_of_root_directory: u32,
	pub volume_serial_number: u32,
	pub fs_revision: u16,
	pub volume_flags: u16,
	pub bytes_per_sector_shift: u8,
	pub sectors_per_cluster_shift: u8,
	pub number_of_fats: u8,
	pub drive_select: u8,
	pub percent_in_use: u8,
	pub reserved: [u8; 7],
	pub boot_code: [u8; 390],
	pub boot_signature: u16,
}

impl BootSector {
	/// Tells whether this sector carries a valid exFAT signature and tag.
	pub fn is_valid(&self) -> bool {
		self.boot_signature == BOOT_SIGNATURE && &self.fs_name == FS_NAME
	}

	pub fn bytes_per_sector(&self) -> usize {
		1 << self.bytes_per_sector_shift
	}

	pub fn bytes_per_cluster(&self) -> usize {
		1 << (self.bytes_per_sector_shift + self.sectors_per_cluster_shift)
	}

	pub fn sectors_per_cluster(&self) -> usize {
		1 << self.sectors_per_cluster_shift
	}

	/// Builds a boot sector for [`super::format`]: fixed 512-byte sectors, 4 KiB clusters.
	pub fn new_for_format(volume_length: u64, fat_length: u32, cluster_heap_offset: u32, cluster_count: u32) -> Self {
		Self {
			jump_boot: [0xEB, 0x76, 0x90],
			fs_name: *FS_NAME,
			must_be_zero: [0; 53],
			partition_offset: 0,
			volume_length,
			fat_offset: 24,
			fat_length,
			cluster_heap_offset,
			cluster_count,
			first_cluster_of_root_directory: 2,
			volume_serial_number: 0xDEAD_BEEF,
			fs_revision: 0x0100,
			volume_flags: 0,
			bytes_per_sector_shift: 9,
			sectors_per_cluster_shift: 3,
			number_of_fats: 1,
			drive_select: 0x80,
			percent_in_use: 0xFF,
			reserved: [0; 7],
			boot_code: [0; 390],
			boot_signature: BOOT_SIGNATURE,
		}
	}
}

/// A File directory entry (type `0x85`): the head of a three-record entry set.
#[derive(AnyRepr, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct FileEntry {
	pub entry_type: u8,
	pub secondary_count: u8,
	pub set_checksum: u16,
	pub file_attributes: u16,
	pub reserved1: u16,
	pub create_timestamp: u32,
	pub last_modified_timestamp: u32,
	pub last_accessed_timestamp: u32,
	pub create_10ms_increment: u8,
	pub last_modified_10ms_increment: u8,
	pub create_utc_offset: u8,
	pub last_modified_utc_offset: u8,
	pub last_accessed_utc_offset: u8,
	pub reserved2: [u8; 7],
}

impl FileEntry {
	pub fn is_in_use(&self) -> bool {
		self.entry_type & ENTRY_TYPE_IN_USE != 0
	}

	pub fn is_directory(&self) -> bool {
		self.file_attributes & ATTR_DIRECTORY != 0
	}

	/// Clears the in-use bit, tombstoning the record without erasing its contents.
	pub fn tombstone(&mut self) {
		self.entry_type &= !ENTRY_TYPE_IN_USE;
	}
}

/// A Stream extension entry (type `0xC0`): the second record of a three-record entry set.
#[derive(AnyRepr, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct StreamEntry {
	pub entry_type: u8,
	pub general_secondary_flags: u8,
	pub reserved1: u8,
	pub name_length: u8,
	pub name_hash: u16,
	pub reserved2: u16,
	pub valid_data_length: u64,
	pub reserved3: u32,
	pub first_cluster: u32,
	pub data_length: u64,
}

/// `general_secondary_flags` bit 1: the cluster chain is one contiguous run rather than
/// FAT-linked (exFAT's "NoFatChain" bit; `original_source`'s `fs_file_t.is_contiguous`).
pub const STREAM_FLAG_NO_FAT_CHAIN: u8 = 0x02;

impl StreamEntry {
	pub fn tombstone(&mut self) {
		self.entry_type &= !ENTRY_TYPE_IN_USE;
	}

	pub fn is_contiguous(&self) -> bool {
		self.general_secondary_flags & STREAM_FLAG_NO_FAT_CHAIN != 0
	}

	pub fn set_contiguous(&mut self, contiguous: bool) {
		if contiguous {
			self.general_secondary_flags |= STREAM_FLAG_NO_FAT_CHAIN;
		} else {
			self.general_secondary_flags &= !STREAM_FLAG_NO_FAT_CHAIN;
		}
	}
}

/// A File name entry (type `0xC1`): the third record of a three-record entry set. Names in this
/// implementation are plain ASCII, one byte per slot, rather than exFAT's native UTF-16 — the
/// volume format is exFAT-compatible but not a byte-for-byte exFAT implementation. The `name`
/// array keeps exFAT's 30-byte record field, but only the first 15 bytes are ever used: the
/// matching code-unit cap (`fs::dir::MAX_NAME_LEN`) stays 15, not 30, to match `original_source`'s
/// `name[15]`.
#[derive(AnyRepr, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct NameEntry {
	pub entry_type: u8,
	pub general_secondary_flags: u8,
	pub name: [u8; 30],
}

impl NameEntry {
	pub fn tombstone(&mut self) {
		self.entry_type &= !ENTRY_TYPE_IN_USE;
	}

	/// Returns the name bytes up to the first NUL.
	pub fn name_str(&self) -> &[u8] {
		let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
		&self.name[..len]
	}
}

const _: () = assert!(core::mem::size_of::<FileEntry>() == 32);
const _: () = assert!(core::mem::size_of::<StreamEntry>() == 32);
const _: () = assert!(core::mem::size_of::<NameEntry>() == 32);
const _: () = assert!(core::mem::size_of::<BootSector>() == 512);
