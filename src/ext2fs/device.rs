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

//! Block-addressable access to the image file backing the filesystem.

use crate::error::Result;
use std::fs::File;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

/// The fixed block size used throughout this implementation.
pub const BLOCK_SIZE: usize = 1024;

/// A byte-addressable random-access backing store for an image file.
///
/// A block number of `0` is never read or written as data: it denotes a hole, and callers
/// substitute a zero-filled buffer instead of calling [`ImageDevice::read_block`].
pub struct ImageDevice {
	file: File,
}

impl ImageDevice {
	/// Wraps an already-open image file.
	pub fn new(file: File) -> Self {
		Self { file }
	}

	/// Reads block `b` into `buf`, which must be exactly [`BLOCK_SIZE`] bytes.
	pub fn read_block(&mut self, b: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
		debug_assert!(b != 0, "block 0 is never read as data");
		self.file.seek(SeekFrom::Start(b as u64 * BLOCK_SIZE as u64))?;
		self.file.read_exact(buf)?;
		Ok(())
	}

	/// Writes `buf` (exactly [`BLOCK_SIZE`] bytes) to block `b`.
	pub fn write_block(&mut self, b: u32, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
		debug_assert!(b != 0, "block 0 is never written as data");
		self.file.seek(SeekFrom::Start(b as u64 * BLOCK_SIZE as u64))?;
		self.file.write_all(buf)?;
		Ok(())
	}

	/// Reads `len` bytes at byte offset `off`, regardless of block boundaries.
	///
	/// Used for the superblock and group descriptor table, which are addressed by byte
	/// offset rather than by block number.
	pub fn read_at(&mut self, off: u64, buf: &mut [u8]) -> Result<()> {
		self.file.seek(SeekFrom::Start(off))?;
		self.file.read_exact(buf)?;
		Ok(())
	}

	/// Writes `buf` at byte offset `off`, regardless of block boundaries.
	pub fn write_at(&mut self, off: u64, buf: &[u8]) -> Result<()> {
		self.file.seek(SeekFrom::Start(off))?;
		self.file.write_all(buf)?;
		Ok(())
	}

	/// Returns the size of the backing image file in bytes.
	pub fn len(&self) -> Result<u64> {
		Ok(self.file.metadata()?.len())
	}
}
