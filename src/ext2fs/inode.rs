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

//! Locating, reading and writing fixed-size inode records.

use crate::device::ImageDevice;
use crate::device::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::group::GroupDescriptor;
use crate::superblock::Superblock;
use std::mem::size_of;
use std::mem::zeroed;
use std::slice;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Inode type bits within `i_mode`.
pub const S_IFMT: u16 = 0xf000;
/// Regular file type bit.
pub const S_IFREG: u16 = 0x8000;
/// Directory type bit.
pub const S_IFDIR: u16 = 0x4000;

/// The root directory's inode number.
pub const ROOT_INODE: u32 = 2;

/// An ext2 inode, laid out exactly as it appears on disk (128 bytes).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Inode {
	pub i_mode: u16,
	pub i_uid: u16,
	pub i_size: u32,
	pub i_atime: u32,
	pub i_ctime: u32,
	pub i_mtime: u32,
	pub i_dtime: u32,
	pub i_gid: u16,
	pub i_links_count: u16,
	pub i_blocks: u32,
	pub i_flags: u32,
	pub i_osd1: u32,
	pub i_block: [u32; 15],
	pub i_generation: u32,
	pub i_file_acl: u32,
	pub i_size_high: u32,
	pub i_faddr: u32,
	pub i_osd2: [u8; 12],
}

const _: () = assert!(size_of::<Inode>() == 128);

impl Inode {
	/// Builds a fresh, zeroed inode of the given type with standard Unix permission bits.
	pub fn new(mode: u16, perm: u16, links_count: u16) -> Self {
		let mut ino: Inode = unsafe { zeroed() };
		ino.i_mode = mode | (perm & 0x0fff);
		ino.i_links_count = links_count;
		let now = now_epoch();
		ino.i_atime = now;
		ino.i_ctime = now;
		ino.i_mtime = now;
		ino
	}

	/// Returns the type bits of `i_mode` (e.g. [`S_IFDIR`] or [`S_IFREG`]).
	pub fn file_type(&self) -> u16 {
		self.i_mode & S_IFMT
	}

	/// Whether this inode describes a directory.
	pub fn is_dir(&self) -> bool {
		self.file_type() == S_IFDIR
	}

	/// Whether this inode describes a regular file.
	pub fn is_regular(&self) -> bool {
		self.file_type() == S_IFREG
	}

	/// Computes `(block, byte_offset_in_block)` for inode number `ino` (1-based).
	fn locate(ino: u32, sb: &Superblock, gds: &[GroupDescriptor]) -> Result<(u32, u64)> {
		if ino == 0 {
			return Err(Error::InvalidImage("inode 0 requested".into()));
		}
		let idx = ino - 1;
		let group = idx / sb.s_inodes_per_group;
		let local = idx % sb.s_inodes_per_group;
		let gd = gds
			.get(group as usize)
			.ok_or_else(|| Error::Corruption(format!("inode {ino} maps to unknown group {group}")))?;
		let inode_size = sb.inode_size() as u64;
		let block = gd.bg_inode_table as u64 + (local as u64 * inode_size) / BLOCK_SIZE as u64;
		let byte_off = (local as u64 * inode_size) % BLOCK_SIZE as u64;
		Ok((block as u32, byte_off))
	}

	/// Reads inode `ino` from the image.
	pub fn read(
		dev: &mut ImageDevice,
		sb: &Superblock,
		gds: &[GroupDescriptor],
		ino: u32,
	) -> Result<Self> {
		let (block, byte_off) = Self::locate(ino, sb, gds)?;
		let off = block as u64 * BLOCK_SIZE as u64 + byte_off;
		let mut inode: Inode = unsafe { zeroed() };
		let slice = unsafe {
			slice::from_raw_parts_mut(&mut inode as *mut _ as *mut u8, size_of::<Self>())
		};
		dev.read_at(off, slice)?;
		Ok(inode)
	}

	/// Writes inode `ino` back to the image.
	pub fn write(
		&self,
		dev: &mut ImageDevice,
		sb: &Superblock,
		gds: &[GroupDescriptor],
		ino: u32,
	) -> Result<()> {
		let (block, byte_off) = Self::locate(ino, sb, gds)?;
		let off = block as u64 * BLOCK_SIZE as u64 + byte_off;
		let slice =
			unsafe { slice::from_raw_parts(self as *const _ as *const u8, size_of::<Self>()) };
		dev.write_at(off, slice)
	}

	/// Returns the permission string used by `attr`, e.g. `-rwxr-xr-x` or `drwxr-xr-x`.
	pub fn permission_string(&self) -> String {
		let type_ch = if self.is_dir() {
			'd'
		} else if self.is_regular() {
			'-'
		} else {
			'?'
		};
		let perm = self.i_mode & 0o777;
		let bits = [
			(0o400, 'r'),
			(0o200, 'w'),
			(0o100, 'x'),
			(0o040, 'r'),
			(0o020, 'w'),
			(0o010, 'x'),
			(0o004, 'r'),
			(0o002, 'w'),
			(0o001, 'x'),
		];
		let mut s = String::with_capacity(10);
		s.push(type_ch);
		for (mask, ch) in bits {
			s.push(if perm & mask != 0 { ch } else { '-' });
		}
		s
	}
}

/// Returns the current time as a Unix epoch timestamp, as stored in `i_atime`/`i_ctime`/`i_mtime`.
pub fn now_epoch() -> u32 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock is before the Unix epoch")
		.as_secs() as u32
}
