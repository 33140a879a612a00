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

//! Traversal of an inode's 12 direct + single/double/triple indirect block pointers.
//!
//! The pointer space is flattened as 12 direct pointers, then up to 256 pointers reached
//! through the single indirect block, then up to 256*256 through the double, then up to
//! 256*256*256 through the triple. A pointer value of `0` at any level denotes a hole.

use crate::alloc;
use crate::device::ImageDevice;
use crate::device::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::group::GroupDescriptor;
use crate::inode::now_epoch;
use crate::inode::Inode;
use crate::superblock::Superblock;

/// Number of block pointers packed into one indirect block (1024 / 4).
const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// Reads an indirect block's 256 pointers. A block number of `0` (hole) yields all zeros
/// without touching the device.
fn read_ptr_block(dev: &mut ImageDevice, blk: u32) -> Result<[u32; PTRS_PER_BLOCK]> {
	if blk == 0 {
		return Ok([0; PTRS_PER_BLOCK]);
	}
	let mut buf = [0u8; BLOCK_SIZE];
	dev.read_block(blk, &mut buf)?;
	let mut ptrs = [0u32; PTRS_PER_BLOCK];
	for (i, p) in ptrs.iter_mut().enumerate() {
		*p = u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
	}
	Ok(ptrs)
}

fn append_single(dev: &mut ImageDevice, blk: u32, count: usize, out: &mut Vec<u32>) -> Result<()> {
	if out.len() >= count {
		return Ok(());
	}
	let ptrs = read_ptr_block(dev, blk)?;
	let take = (count - out.len()).min(PTRS_PER_BLOCK);
	out.extend_from_slice(&ptrs[..take]);
	Ok(())
}

fn append_double(dev: &mut ImageDevice, blk: u32, count: usize, out: &mut Vec<u32>) -> Result<()> {
	if out.len() >= count {
		return Ok(());
	}
	let l1 = read_ptr_block(dev, blk)?;
	for &single_blk in l1.iter() {
		if out.len() >= count {
			break;
		}
		append_single(dev, single_blk, count, out)?;
	}
	Ok(())
}

fn append_triple(dev: &mut ImageDevice, blk: u32, count: usize, out: &mut Vec<u32>) -> Result<()> {
	if out.len() >= count {
		return Ok(());
	}
	let l1 = read_ptr_block(dev, blk)?;
	for &double_blk in l1.iter() {
		if out.len() >= count {
			break;
		}
		append_double(dev, double_blk, count, out)?;
	}
	Ok(())
}

/// Returns the first `count` data block numbers reachable from `inode`, flattening the
/// direct/indirect/double-indirect/triple-indirect chain in order. A `0` entry is a hole.
pub fn data_block_numbers(dev: &mut ImageDevice, inode: &Inode, count: usize) -> Result<Vec<u32>> {
	let direct = inode.i_block;
	let mut out = Vec::with_capacity(count);
	for &d in direct[0..12].iter() {
		if out.len() >= count {
			return Ok(out);
		}
		out.push(d);
	}
	append_single(dev, direct[12], count, &mut out)?;
	append_double(dev, direct[13], count, &mut out)?;
	append_triple(dev, direct[14], count, &mut out)?;
	if out.len() < count {
		return Err(Error::Corruption(
			"indirect pointer chain is too short for the inode's claimed size".into(),
		));
	}
	Ok(out)
}

/// Reads the full byte contents of a regular file's inode. Holes read back as zero bytes.
pub fn read_inode_data(dev: &mut ImageDevice, inode: &Inode) -> Result<Vec<u8>> {
	let size = inode.i_size as usize;
	let count = size.div_ceil(BLOCK_SIZE);
	let blocks = data_block_numbers(dev, inode, count)?;
	let mut out = Vec::with_capacity(size);
	for &blk in &blocks {
		let mut buf = [0u8; BLOCK_SIZE];
		if blk != 0 {
			dev.read_block(blk, &mut buf)?;
		}
		let take = (size - out.len()).min(BLOCK_SIZE);
		out.extend_from_slice(&buf[..take]);
	}
	Ok(out)
}

fn free_single(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
	blk: u32,
) -> Result<()> {
	if blk == 0 {
		return Ok(());
	}
	let ptrs = read_ptr_block(dev, blk)?;
	for &p in ptrs.iter() {
		if p != 0 {
			alloc::free_block(dev, sb, gds, p)?;
		}
	}
	alloc::free_block(dev, sb, gds, blk)
}

fn free_double(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
	blk: u32,
) -> Result<()> {
	if blk == 0 {
		return Ok(());
	}
	let ptrs = read_ptr_block(dev, blk)?;
	for &p in ptrs.iter() {
		if p != 0 {
			free_single(dev, sb, gds, p)?;
		}
	}
	alloc::free_block(dev, sb, gds, blk)
}

fn free_triple(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
	blk: u32,
) -> Result<()> {
	if blk == 0 {
		return Ok(());
	}
	let ptrs = read_ptr_block(dev, blk)?;
	for &p in ptrs.iter() {
		if p != 0 {
			free_double(dev, sb, gds, p)?;
		}
	}
	alloc::free_block(dev, sb, gds, blk)
}

/// Frees every block (direct, then single/double/triple indirect, children strictly before
/// their parent indirect block) reachable from `inode`, then clears its pointers and size.
pub fn free_inode_blocks(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
	inode: &mut Inode,
) -> Result<()> {
	let direct = inode.i_block;
	for &d in direct[0..12].iter() {
		if d != 0 {
			alloc::free_block(dev, sb, gds, d)?;
		}
	}
	free_single(dev, sb, gds, direct[12])?;
	free_double(dev, sb, gds, direct[13])?;
	free_triple(dev, sb, gds, direct[14])?;

	inode.i_block = [0u32; 15];
	inode.i_blocks = 0;
	inode.i_size = 0;
	inode.i_dtime = now_epoch();
	Ok(())
}

/// Appends a new, empty data block to a directory inode, using the next free direct slot.
///
/// Directories are deliberately never grown past their 12 direct pointers.
pub fn append_directory_block(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
	dir_inode: &mut Inode,
) -> Result<u32> {
	let mut direct = dir_inode.i_block;
	let slot = direct[0..12]
		.iter()
		.position(|&b| b == 0)
		.ok_or_else(|| Error::NoSpace("directory has no free direct block slot".into()))?;

	let blk = alloc::alloc_block(dev, sb, gds)?;
	direct[slot] = blk;
	dir_inode.i_block = direct;

	let size = dir_inode.i_size;
	dir_inode.i_size = size + BLOCK_SIZE as u32;
	let sectors = dir_inode.i_blocks;
	dir_inode.i_blocks = sectors + (BLOCK_SIZE / 512) as u32;

	Ok(blk)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::OpenOptions;
	use tempfile::NamedTempFile;

	fn open_device(blocks: u32) -> (NamedTempFile, ImageDevice) {
		let file = NamedTempFile::new().expect("create temp file");
		file.as_file()
			.set_len(blocks as u64 * BLOCK_SIZE as u64)
			.expect("size temp file");
		let handle = OpenOptions::new()
			.read(true)
			.write(true)
			.open(file.path())
			.expect("reopen temp file");
		(file, ImageDevice::new(handle))
	}

	#[test]
	fn ptr_block_round_trips() {
		let (_file, mut dev) = open_device(2);
		let mut buf = [0u8; BLOCK_SIZE];
		buf[0..4].copy_from_slice(&7u32.to_le_bytes());
		buf[255 * 4..255 * 4 + 4].copy_from_slice(&99u32.to_le_bytes());
		dev.write_block(1, &buf).unwrap();

		let decoded = read_ptr_block(&mut dev, 1).unwrap();
		assert_eq!(decoded[0], 7);
		assert_eq!(decoded[255], 99);
		assert_eq!(decoded[1], 0);
	}

	#[test]
	fn ptr_block_hole_reads_as_zero_without_touching_device() {
		let (_file, mut dev) = open_device(2);
		let decoded = read_ptr_block(&mut dev, 0).unwrap();
		assert_eq!(decoded, [0u32; PTRS_PER_BLOCK]);
	}
}
