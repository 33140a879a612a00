/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! The ext2 superblock: the top-level metadata record at byte offset 1024.

use crate::device::ImageDevice;
use crate::error::Error;
use crate::error::Result;
use std::mem::size_of;
use std::mem::zeroed;
use std::slice;

/// Byte offset of the superblock from the start of the image.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// The ext2 signature, as stored in `s_magic`.
pub const EXT2_MAGIC: u16 = 0xef53;
/// Filesystem state: clean unmount.
pub const FS_STATE_CLEAN: u16 = 1;

/// The ext2 superblock, laid out exactly as it appears on disk.
#[repr(C, packed)]
#[derive(Clone)]
pub struct Superblock {
	pub s_inodes_count: u32,
	pub s_blocks_count: u32,
	pub s_r_blocks_count: u32,
	pub s_free_blocks_count: u32,
	pub s_free_inodes_count: u32,
	pub s_first_data_block: u32,
	pub s_log_block_size: u32,
	pub s_log_frag_size: u32,
	pub s_blocks_per_group: u32,
	pub s_frags_per_group: u32,
	pub s_inodes_per_group: u32,
	pub s_mtime: u32,
	pub s_wtime: u32,
	pub s_mnt_count: u16,
	pub s_max_mnt_count: u16,
	pub s_magic: u16,
	pub s_state: u16,
	pub s_errors: u16,
	pub s_minor_rev_level: u16,
	pub s_lastcheck: u32,
	pub s_checkinterval: u32,
	pub s_creator_os: u32,
	pub s_rev_level: u32,
	pub s_def_resuid: u16,
	pub s_def_resgid: u16,

	// Extended fields (revision 1).
	pub s_first_ino: u32,
	pub s_inode_size: u16,
	pub s_block_group_nr: u16,
	pub s_feature_compat: u32,
	pub s_feature_incompat: u32,
	pub s_feature_ro_compat: u32,
	pub s_uuid: [u8; 16],
	pub s_volume_name: [u8; 16],
	pub s_last_mounted: [u8; 64],
	pub s_algo_bitmap: u32,
	pub s_prealloc_blocks: u8,
	pub s_prealloc_dir_blocks: u8,
	pub s_padding1: u16,
	pub s_journal_uuid: [u8; 16],
	pub s_journal_inum: u32,
	pub s_journal_dev: u32,
	pub s_last_orphan: u32,

	/// Padding out to the full 1024-byte on-disk record; unused by this implementation.
	pub s_reserved: [u8; 788],
}

const _: () = assert!(size_of::<Superblock>() == 1024);

impl Superblock {
	/// Reads the superblock from the image and validates its magic number.
	pub fn read(dev: &mut ImageDevice) -> Result<Self> {
		let mut sb: Superblock = unsafe { zeroed() };
		let slice =
			unsafe { slice::from_raw_parts_mut(&mut sb as *mut _ as *mut u8, size_of::<Self>()) };
		dev.read_at(SUPERBLOCK_OFFSET, slice)?;
		let magic = sb.s_magic;
		if magic != EXT2_MAGIC {
			return Err(Error::InvalidImage(format!(
				"bad magic number {magic:#06x}, expected {EXT2_MAGIC:#06x}"
			)));
		}
		Ok(sb)
	}

	/// Flushes the whole superblock back to disk. No partial flushes are performed.
	pub fn flush(&self, dev: &mut ImageDevice) -> Result<()> {
		let slice =
			unsafe { slice::from_raw_parts(self as *const _ as *const u8, size_of::<Self>()) };
		dev.write_at(SUPERBLOCK_OFFSET, slice)
	}

	/// Returns the block size in bytes, computed from `s_log_block_size`.
	pub fn block_size(&self) -> u32 {
		let log = self.s_log_block_size;
		1024 << log
	}

	/// Returns the size in bytes of one on-disk inode record.
	pub fn inode_size(&self) -> u32 {
		let rev = self.s_rev_level;
		let size = self.s_inode_size;
		if rev >= 1 {
			size as u32
		} else {
			128
		}
	}

	/// Returns the number of block groups in the filesystem.
	pub fn groups_count(&self) -> u32 {
		let blocks = self.s_blocks_count;
		let per_group = self.s_blocks_per_group;
		blocks.div_ceil(per_group)
	}

	/// Returns the volume name, trimmed of trailing NUL bytes.
	pub fn volume_name(&self) -> String {
		let end = self
			.s_volume_name
			.iter()
			.position(|&b| b == 0)
			.unwrap_or(self.s_volume_name.len());
		String::from_utf8_lossy(&self.s_volume_name[..end]).into_owned()
	}
}
