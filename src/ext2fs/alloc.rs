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

//! The block and inode bitmap allocator.
//!
//! Both allocators use the same tie-break: first-fit across groups in ascending group
//! order, then ascending bit index within the group's bitmap. There is no locality-aware
//! placement.

use crate::device::ImageDevice;
use crate::device::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::group::GroupDescriptor;
use crate::inode::S_IFDIR;
use crate::inode::S_IFMT;
use crate::superblock::Superblock;

/// Returns the index of the first clear bit in `buf[0..len_bits)`, if any.
fn first_clear_bit(buf: &[u8; BLOCK_SIZE], len_bits: u32) -> Option<u32> {
	(0..len_bits).find(|&b| buf[(b >> 3) as usize] & (1 << (b & 7)) == 0)
}

fn set_bit(buf: &mut [u8; BLOCK_SIZE], b: u32) {
	buf[(b >> 3) as usize] |= 1 << (b & 7);
}

fn clear_bit(buf: &mut [u8; BLOCK_SIZE], b: u32) {
	buf[(b >> 3) as usize] &= !(1 << (b & 7));
}

fn bit_is_set(buf: &[u8; BLOCK_SIZE], b: u32) -> bool {
	buf[(b >> 3) as usize] & (1 << (b & 7)) != 0
}

/// Allocates a free inode, returning its 1-based inode number.
///
/// `mode` is recorded so that a directory inode bumps the owning group's `bg_used_dirs_count`.
pub fn alloc_inode(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
	mode: u16,
) -> Result<u32> {
	let inodes_per_group = sb.s_inodes_per_group;
	for (g, gd) in gds.iter_mut().enumerate() {
		let free_inodes = gd.bg_free_inodes_count;
		if free_inodes == 0 {
			continue;
		}
		let inode_bitmap = gd.bg_inode_bitmap;
		let mut buf = [0u8; BLOCK_SIZE];
		dev.read_block(inode_bitmap, &mut buf)?;
		let Some(bit) = first_clear_bit(&buf, inodes_per_group) else {
			continue;
		};
		set_bit(&mut buf, bit);
		dev.write_block(inode_bitmap, &buf)?;

		gd.bg_free_inodes_count = free_inodes - 1;
		if mode & S_IFMT == S_IFDIR {
			let used_dirs = gd.bg_used_dirs_count;
			gd.bg_used_dirs_count = used_dirs + 1;
		}
		gd.write(dev, g as u32)?;

		let sb_free_inodes = sb.s_free_inodes_count;
		sb.s_free_inodes_count = sb_free_inodes - 1;
		sb.flush(dev)?;

		return Ok(g as u32 * inodes_per_group + bit + 1);
	}
	Err(Error::NoSpace("no free inodes".into()))
}

/// Allocates a free data block, returning its absolute block number.
pub fn alloc_block(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
) -> Result<u32> {
	let blocks_per_group = sb.s_blocks_per_group;
	let first_data_block = sb.s_first_data_block;
	for (g, gd) in gds.iter_mut().enumerate() {
		let free_blocks = gd.bg_free_blocks_count;
		if free_blocks == 0 {
			continue;
		}
		let block_bitmap = gd.bg_block_bitmap;
		let mut buf = [0u8; BLOCK_SIZE];
		dev.read_block(block_bitmap, &mut buf)?;
		let Some(bit) = first_clear_bit(&buf, blocks_per_group) else {
			continue;
		};
		set_bit(&mut buf, bit);
		dev.write_block(block_bitmap, &buf)?;

		gd.bg_free_blocks_count = free_blocks - 1;
		gd.write(dev, g as u32)?;

		let sb_free_blocks = sb.s_free_blocks_count;
		sb.s_free_blocks_count = sb_free_blocks - 1;
		sb.flush(dev)?;

		return Ok(first_data_block + g as u32 * blocks_per_group + bit);
	}
	Err(Error::NoSpace("no free blocks".into()))
}

/// Frees inode number `ino`, clearing its bitmap bit and bumping free counters.
pub fn free_inode(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
	ino: u32,
) -> Result<()> {
	let idx = ino - 1;
	let group = idx / sb.s_inodes_per_group;
	let local = idx % sb.s_inodes_per_group;
	let gd = gds
		.get_mut(group as usize)
		.ok_or_else(|| Error::Corruption(format!("inode {ino} maps to unknown group {group}")))?;

	let inode_bitmap = gd.bg_inode_bitmap;
	let mut buf = [0u8; BLOCK_SIZE];
	dev.read_block(inode_bitmap, &mut buf)?;
	if !bit_is_set(&buf, local) {
		return Err(Error::Corruption(format!("inode {ino} is already free")));
	}
	clear_bit(&mut buf, local);
	dev.write_block(inode_bitmap, &buf)?;

	let free_inodes = gd.bg_free_inodes_count;
	gd.bg_free_inodes_count = free_inodes + 1;
	gd.write(dev, group)?;

	let sb_free_inodes = sb.s_free_inodes_count;
	sb.s_free_inodes_count = sb_free_inodes + 1;
	sb.flush(dev)
}

/// Frees block number `blk`, clearing its bitmap bit and bumping free counters.
pub fn free_block(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
	blk: u32,
) -> Result<()> {
	let first_data_block = sb.s_first_data_block;
	if blk < first_data_block {
		return Err(Error::Corruption(format!(
			"refusing to free metadata block {blk}"
		)));
	}
	let rel = blk - first_data_block;
	let group = rel / sb.s_blocks_per_group;
	let local = rel % sb.s_blocks_per_group;
	let gd = gds
		.get_mut(group as usize)
		.ok_or_else(|| Error::Corruption(format!("block {blk} maps to unknown group {group}")))?;

	let block_bitmap = gd.bg_block_bitmap;
	let mut buf = [0u8; BLOCK_SIZE];
	dev.read_block(block_bitmap, &mut buf)?;
	if !bit_is_set(&buf, local) {
		return Err(Error::Corruption(format!("block {blk} is already free")));
	}
	clear_bit(&mut buf, local);
	dev.write_block(block_bitmap, &buf)?;

	let free_blocks = gd.bg_free_blocks_count;
	gd.bg_free_blocks_count = free_blocks + 1;
	gd.write(dev, group)?;

	let sb_free_blocks = sb.s_free_blocks_count;
	sb.s_free_blocks_count = sb_free_blocks + 1;
	sb.flush(dev)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_clear_bit_finds_lowest() {
		let mut buf = [0xffu8; BLOCK_SIZE];
		buf[0] = 0b1111_1101; // bit 1 clear
		assert_eq!(first_clear_bit(&buf, 16), Some(1));
	}

	#[test]
	fn first_clear_bit_respects_len() {
		let buf = [0x00u8; BLOCK_SIZE];
		assert_eq!(first_clear_bit(&buf, 3), Some(0));
		let mut full = [0xffu8; BLOCK_SIZE];
		full[0] = 0b0000_0111;
		assert_eq!(first_clear_bit(&full, 3), None);
	}

	#[test]
	fn set_then_clear_round_trips() {
		let mut buf = [0u8; BLOCK_SIZE];
		set_bit(&mut buf, 13);
		assert!(bit_is_set(&buf, 13));
		clear_bit(&mut buf, 13);
		assert!(!bit_is_set(&buf, 13));
	}
}
