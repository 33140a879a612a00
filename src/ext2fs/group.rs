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

//! The block group descriptor table, stored immediately after the superblock.

use crate::device::ImageDevice;
use crate::error::Result;
use crate::superblock::Superblock;
use std::mem::size_of;
use std::mem::zeroed;
use std::slice;

/// Byte offset of the group descriptor table: right after the superblock's 1024-byte block.
pub const GDT_OFFSET: u64 = 2048;

/// One 32-byte group descriptor.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct GroupDescriptor {
	pub bg_block_bitmap: u32,
	pub bg_inode_bitmap: u32,
	pub bg_inode_table: u32,
	pub bg_free_blocks_count: u16,
	pub bg_free_inodes_count: u16,
	pub bg_used_dirs_count: u16,
	pub bg_pad: u16,
	pub bg_reserved: [u8; 12],
}

const _: () = assert!(size_of::<GroupDescriptor>() == 32);

impl GroupDescriptor {
	/// Returns the byte offset of the `i`th group descriptor.
	pub fn disk_offset(i: u32) -> u64 {
		GDT_OFFSET + i as u64 * size_of::<Self>() as u64
	}

	/// Reads the `i`th group descriptor.
	pub fn read(dev: &mut ImageDevice, i: u32) -> Result<Self> {
		let mut gd: GroupDescriptor = unsafe { zeroed() };
		let slice =
			unsafe { slice::from_raw_parts_mut(&mut gd as *mut _ as *mut u8, size_of::<Self>()) };
		dev.read_at(Self::disk_offset(i), slice)?;
		Ok(gd)
	}

	/// Writes the `i`th group descriptor back to disk.
	pub fn write(&self, dev: &mut ImageDevice, i: u32) -> Result<()> {
		let slice =
			unsafe { slice::from_raw_parts(self as *const _ as *const u8, size_of::<Self>()) };
		dev.write_at(Self::disk_offset(i), slice)
	}
}

/// Reads every group descriptor named by the superblock's group count.
pub fn read_all(dev: &mut ImageDevice, sb: &Superblock) -> Result<Vec<GroupDescriptor>> {
	(0..sb.groups_count())
		.map(|i| GroupDescriptor::read(dev, i))
		.collect()
}
