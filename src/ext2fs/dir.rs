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

//! Directory blocks: length-prefixed record streams of `(inode, rec_len, name_len, file_type,
//! name)`, one data block at a time.

use crate::blocks;
use crate::device::ImageDevice;
use crate::device::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::group::GroupDescriptor;
use crate::inode::Inode;
use crate::superblock::Superblock;

/// `file_type` byte stored in a directory record for an unknown type.
pub const FT_UNKNOWN: u8 = 0;
/// `file_type` byte for a regular file.
pub const FT_REG: u8 = 1;
/// `file_type` byte for a directory.
pub const FT_DIR: u8 = 2;

/// One decoded directory entry: a read-only view into a block buffer.
#[derive(Debug, Clone)]
pub struct Entry {
	pub inode: u32,
	pub file_type: u8,
	pub name: String,
	/// Byte offset of this record within its block, for callers that need to rewrite it.
	offset: usize,
	rec_len: u16,
}

fn round_up4(n: usize) -> usize {
	(n + 3) & !3
}

/// Minimal on-disk length for a record with the given name length.
fn ideal_len(name_len: usize) -> usize {
	round_up4(8 + name_len)
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
	u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn write_u32(buf: &mut [u8], off: usize, v: u32) {
	buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
	u16::from_le_bytes(buf[off..off + 2].try_into().unwrap())
}

fn write_u16(buf: &mut [u8], off: usize, v: u16) {
	buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

/// Decodes every record in a single directory block buffer, including tombstones.
fn parse_block(buf: &[u8; BLOCK_SIZE]) -> Result<Vec<Entry>> {
	let mut entries = Vec::new();
	let mut off = 0usize;
	while off < BLOCK_SIZE {
		let rec_len = read_u16(buf, off + 4);
		if rec_len < 8 {
			return Err(Error::Corruption(format!(
				"directory record at offset {off} has rec_len {rec_len} < 8"
			)));
		}
		let inode = read_u32(buf, off);
		let name_len = buf[off + 6] as usize;
		let file_type = buf[off + 7];
		let name = if inode != 0 {
			String::from_utf8_lossy(&buf[off + 8..off + 8 + name_len]).into_owned()
		} else {
			String::new()
		};
		entries.push(Entry {
			inode,
			file_type,
			name,
			offset: off,
			rec_len,
		});
		off += rec_len as usize;
	}
	Ok(entries)
}

fn collect_dir_blocks(dev: &mut ImageDevice, inode: &Inode) -> Result<Vec<u32>> {
	let count = (inode.i_size as usize).div_ceil(BLOCK_SIZE);
	blocks::data_block_numbers(dev, inode, count)
}

/// Iterates every live entry (`inode != 0`) of a directory, across all of its data blocks.
pub fn iter(dev: &mut ImageDevice, inode: &Inode) -> Result<Vec<Entry>> {
	let mut out = Vec::new();
	for blk in collect_dir_blocks(dev, inode)? {
		let mut buf = [0u8; BLOCK_SIZE];
		dev.read_block(blk, &mut buf)?;
		for e in parse_block(&buf)? {
			if e.inode != 0 {
				out.push(e);
			}
		}
	}
	Ok(out)
}

/// Looks up `name` in a directory, returning the matching entry if any.
pub fn lookup(dev: &mut ImageDevice, inode: &Inode, name: &str) -> Result<Option<Entry>> {
	Ok(iter(dev, inode)?.into_iter().find(|e| e.name == name))
}

/// Inserts `(child_ino, file_type, name)` into `dir_inode`, splitting a predecessor's slack
/// or appending a new data block as a last resort.
pub fn insert(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
	dir_inode: &mut Inode,
	child_ino: u32,
	file_type: u8,
	name: &str,
) -> Result<()> {
	let need = ideal_len(name.len());
	let dir_blocks = collect_dir_blocks(dev, dir_inode)?;
	for blk in dir_blocks {
		let mut buf = [0u8; BLOCK_SIZE];
		dev.read_block(blk, &mut buf)?;
		for e in parse_block(&buf)? {
			let used = if e.inode != 0 {
				ideal_len(e.name.len())
			} else {
				0
			};
			let slack = e.rec_len as usize - used;
			if slack < need {
				continue;
			}
			let new_off = e.offset + used;
			if e.inode != 0 {
				write_u16(&mut buf, e.offset + 4, used as u16);
			}
			write_u32(&mut buf, new_off, child_ino);
			write_u16(&mut buf, new_off + 4, slack as u16);
			buf[new_off + 6] = name.len() as u8;
			buf[new_off + 7] = file_type;
			buf[new_off + 8..new_off + 8 + name.len()].copy_from_slice(name.as_bytes());
			dev.write_block(blk, &buf)?;
			return Ok(());
		}
	}

	let blk = blocks::append_directory_block(dev, sb, gds, dir_inode)?;
	let mut buf = [0u8; BLOCK_SIZE];
	write_u32(&mut buf, 0, child_ino);
	write_u16(&mut buf, 4, BLOCK_SIZE as u16);
	buf[6] = name.len() as u8;
	buf[7] = file_type;
	buf[8..8 + name.len()].copy_from_slice(name.as_bytes());
	dev.write_block(blk, &buf)
}

/// Removes the entry for `child_ino` from `dir_inode`. Does not free the child's inode or
/// data blocks; the caller is responsible for that.
pub fn remove(dev: &mut ImageDevice, dir_inode: &Inode, child_ino: u32) -> Result<()> {
	for blk in collect_dir_blocks(dev, dir_inode)? {
		let mut buf = [0u8; BLOCK_SIZE];
		dev.read_block(blk, &mut buf)?;
		let entries = parse_block(&buf)?;
		let Some(pos) = entries.iter().position(|e| e.inode == child_ino) else {
			continue;
		};
		let curr = &entries[pos];
		if pos > 0 {
			let prev = &entries[pos - 1];
			let combined = prev.rec_len + curr.rec_len;
			write_u16(&mut buf, prev.offset + 4, combined);
		} else {
			write_u32(&mut buf, curr.offset, 0);
			write_u16(&mut buf, curr.offset + 4, BLOCK_SIZE as u16);
		}
		dev.write_block(blk, &buf)?;
		return Ok(());
	}
	Err(Error::not_found(child_ino.to_string()))
}

/// Renames the entry for `child_ino` in place. Fails if the new name does not fit the
/// existing record's length; the core never relocates an entry to make room.
pub fn rename(
	dev: &mut ImageDevice,
	dir_inode: &Inode,
	child_ino: u32,
	new_name: &str,
) -> Result<()> {
	for blk in collect_dir_blocks(dev, dir_inode)? {
		let mut buf = [0u8; BLOCK_SIZE];
		dev.read_block(blk, &mut buf)?;
		let entries = parse_block(&buf)?;
		let Some(curr) = entries.iter().find(|e| e.inode == child_ino) else {
			continue;
		};
		let need = ideal_len(new_name.len());
		if need > curr.rec_len as usize {
			return Err(Error::NoSpace(format!(
				"record for inode {child_ino} has no room for the longer name {new_name:?}"
			)));
		}
		let old_name_len = buf[curr.offset + 6] as usize;
		buf[curr.offset + 6] = new_name.len() as u8;
		buf[curr.offset + 8..curr.offset + 8 + new_name.len()].copy_from_slice(new_name.as_bytes());
		if new_name.len() < old_name_len {
			buf[curr.offset + 8 + new_name.len()..curr.offset + 8 + old_name_len].fill(0);
		}
		dev.write_block(blk, &buf)?;
		return Ok(());
	}
	Err(Error::not_found(child_ino.to_string()))
}

/// Writes the `.`/`..` bootstrap block for a freshly allocated directory inode.
pub fn bootstrap(
	dev: &mut ImageDevice,
	sb: &mut Superblock,
	gds: &mut [GroupDescriptor],
	dir_inode: &mut Inode,
	self_ino: u32,
	parent_ino: u32,
) -> Result<()> {
	let blk = blocks::append_directory_block(dev, sb, gds, dir_inode)?;
	let mut buf = [0u8; BLOCK_SIZE];
	write_u32(&mut buf, 0, self_ino);
	write_u16(&mut buf, 4, 12);
	buf[6] = 1;
	buf[7] = FT_DIR;
	buf[8] = b'.';

	write_u32(&mut buf, 12, parent_ino);
	write_u16(&mut buf, 16, (BLOCK_SIZE - 12) as u16);
	buf[18] = 2;
	buf[19] = FT_DIR;
	buf[20] = b'.';
	buf[21] = b'.';

	dev.write_block(blk, &buf)
}

/// Whether a directory has no entries besides `.` and `..`.
pub fn is_empty(dev: &mut ImageDevice, inode: &Inode) -> Result<bool> {
	Ok(iter(dev, inode)?
		.iter()
		.all(|e| e.name == "." || e.name == ".."))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ideal_len_rounds_up_to_four() {
		assert_eq!(ideal_len(1), 12);
		assert_eq!(ideal_len(4), 12);
		assert_eq!(ideal_len(5), 16);
	}

	#[test]
	fn parse_block_reads_bootstrap_records() {
		let mut buf = [0u8; BLOCK_SIZE];
		write_u32(&mut buf, 0, 5);
		write_u16(&mut buf, 4, 12);
		buf[6] = 1;
		buf[7] = FT_DIR;
		buf[8] = b'.';
		write_u32(&mut buf, 12, 2);
		write_u16(&mut buf, 16, (BLOCK_SIZE - 12) as u16);
		buf[18] = 2;
		buf[19] = FT_DIR;
		buf[20] = b'.';
		buf[21] = b'.';

		let entries = parse_block(&buf).unwrap();
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].inode, 5);
		assert_eq!(entries[0].name, ".");
		assert_eq!(entries[1].inode, 2);
		assert_eq!(entries[1].name, "..");
	}

	#[test]
	fn rejects_short_rec_len() {
		let mut buf = [0u8; BLOCK_SIZE];
		write_u16(&mut buf, 4, 4);
		assert!(matches!(parse_block(&buf), Err(Error::Corruption(_))));
	}
}
