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

//! The open filesystem handle: device, cached superblock, group descriptors and cwd, all in
//! one place.

use crate::device::ImageDevice;
use crate::error::Result;
use crate::group::GroupDescriptor;
use crate::group;
use crate::inode::ROOT_INODE;
use crate::superblock::Superblock;
use std::fs::OpenOptions;
use std::path::Path;

/// One open ext2 image, owning the file handle and the cached metadata needed by every
/// command. Not `Clone`: only the command currently executing may mutate it.
pub struct Ext2Fs {
	dev: ImageDevice,
	sb: Superblock,
	gds: Vec<GroupDescriptor>,
	cwd: u32,
	closed: bool,
}

impl Ext2Fs {
	/// Opens `path`, reads and validates the superblock, and loads every group descriptor.
	pub fn open(path: &Path) -> Result<Self> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		let mut dev = ImageDevice::new(file);
		let sb = Superblock::read(&mut dev)?;
		let gds = group::read_all(&mut dev, &sb)?;
		Ok(Self {
			dev,
			sb,
			gds,
			cwd: ROOT_INODE,
			closed: false,
		})
	}

	/// Explicit, preferred close: flushes the superblock and surfaces any I/O error.
	pub fn close(mut self) -> Result<()> {
		self.sb.flush(&mut self.dev)?;
		self.closed = true;
		Ok(())
	}

	pub fn device(&mut self) -> &mut ImageDevice {
		&mut self.dev
	}

	pub fn superblock(&self) -> &Superblock {
		&self.sb
	}

	pub fn superblock_mut(&mut self) -> &mut Superblock {
		&mut self.sb
	}

	pub fn group_descriptors(&self) -> &[GroupDescriptor] {
		&self.gds
	}

	pub fn group_descriptors_mut(&mut self) -> &mut [GroupDescriptor] {
		&mut self.gds
	}

	pub fn cwd(&self) -> u32 {
		self.cwd
	}

	pub fn set_cwd(&mut self, ino: u32) {
		self.cwd = ino;
	}

	/// Splits the handle into its parts for operations that need simultaneous `&mut` access
	/// to the device, superblock and descriptor table (disjoint borrows).
	pub fn parts_mut(&mut self) -> (&mut ImageDevice, &mut Superblock, &mut [GroupDescriptor]) {
		(&mut self.dev, &mut self.sb, &mut self.gds)
	}

	/// Splits the handle for read operations that need the device mutably (for I/O) and the
	/// descriptor table immutably at the same time, such as path resolution and inode reads.
	pub fn device_and_descriptors(&mut self) -> (&mut ImageDevice, &[GroupDescriptor]) {
		(&mut self.dev, &self.gds)
	}

	/// Flushes the superblock. Every mutating command calls this before returning success.
	pub fn flush(&mut self) -> Result<()> {
		self.sb.flush(&mut self.dev)
	}
}

impl Drop for Ext2Fs {
	fn drop(&mut self) {
		if !self.closed {
			let _ = self.sb.flush(&mut self.dev);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::commands;
	use crate::device::BLOCK_SIZE;
	use crate::dir;
	use crate::error::Error;
	use crate::inode::Inode;
	use crate::inode::S_IFDIR;
	use crate::superblock::EXT2_MAGIC;
	use std::fs::OpenOptions;
	use std::mem::zeroed;
	use tempfile::NamedTempFile;

	const TOTAL_BLOCKS: u32 = 40;
	const INODES_PER_GROUP: u32 = 16;

	/// Writes a minimal valid image (one group, bootstrapped root directory) to a fresh temp
	/// file and hands back the path, ready for [`Ext2Fs::open`].
	fn build_image() -> NamedTempFile {
		let file = NamedTempFile::new().expect("create temp file");
		file.as_file()
			.set_len(TOTAL_BLOCKS as u64 * BLOCK_SIZE as u64)
			.expect("size temp file");
		let handle = OpenOptions::new()
			.read(true)
			.write(true)
			.open(file.path())
			.expect("reopen temp file");
		let mut dev = ImageDevice::new(handle);

		let mut sb: Superblock = unsafe { zeroed() };
		sb.s_magic = EXT2_MAGIC;
		sb.s_rev_level = 1;
		sb.s_inode_size = 128;
		sb.s_first_data_block = 1;
		sb.s_blocks_per_group = TOTAL_BLOCKS - 1;
		sb.s_inodes_per_group = INODES_PER_GROUP;
		sb.s_inodes_count = INODES_PER_GROUP;
		sb.s_blocks_count = TOTAL_BLOCKS - 1;
		sb.s_free_blocks_count = TOTAL_BLOCKS - 1 - 4;
		sb.s_free_inodes_count = INODES_PER_GROUP - 2;

		let gd = GroupDescriptor {
			bg_block_bitmap: 1,
			bg_inode_bitmap: 2,
			bg_inode_table: 3,
			bg_free_blocks_count: (TOTAL_BLOCKS - 1 - 4) as u16,
			bg_free_inodes_count: (INODES_PER_GROUP - 2) as u16,
			bg_used_dirs_count: 1,
			bg_pad: 0,
			bg_reserved: [0; 12],
		};

		let mut block_bitmap = [0u8; BLOCK_SIZE];
		block_bitmap[0] = 0b0000_1111;
		dev.write_block(gd.bg_block_bitmap, &block_bitmap).unwrap();

		let mut inode_bitmap = [0u8; BLOCK_SIZE];
		inode_bitmap[0] = 0b0000_0011;
		dev.write_block(gd.bg_inode_bitmap, &inode_bitmap).unwrap();

		let mut gds = vec![gd];
		let mut root = Inode::new(S_IFDIR, 0o755, 2);
		dir::bootstrap(&mut dev, &mut sb, &mut gds, &mut root, ROOT_INODE, ROOT_INODE).unwrap();
		root.write(&mut dev, &sb, &gds, ROOT_INODE).unwrap();

		gd.write(&mut dev, 0).unwrap();
		sb.flush(&mut dev).unwrap();

		file
	}

	/// Reads the root directory's first (and only, in these fixtures) data block.
	fn read_root_block(fs: &mut Ext2Fs) -> [u8; BLOCK_SIZE] {
		let sb = fs.superblock().clone();
		let (dev, gds) = fs.device_and_descriptors();
		let root = Inode::read(dev, &sb, gds, ROOT_INODE).unwrap();
		let mut buf = [0u8; BLOCK_SIZE];
		dev.read_block(root.i_block[0], &mut buf).unwrap();
		buf
	}

	#[test]
	fn touch_then_rm_restores_counters_and_bytes() {
		let image = build_image();
		let mut fs = Ext2Fs::open(image.path()).unwrap();

		let before_bytes = read_root_block(&mut fs);
		let free_inodes_before = fs.superblock().s_free_inodes_count;
		let free_blocks_before = fs.superblock().s_free_blocks_count;

		commands::touch(&mut fs, "/x").unwrap();
		commands::rm(&mut fs, "/x").unwrap();

		let free_inodes_after = fs.superblock().s_free_inodes_count;
		let free_blocks_after = fs.superblock().s_free_blocks_count;
		assert_eq!(free_inodes_after, free_inodes_before);
		assert_eq!(free_blocks_after, free_blocks_before);
		assert_eq!(read_root_block(&mut fs), before_bytes);
	}

	#[test]
	fn mkdir_then_rmdir_restores_counters() {
		let image = build_image();
		let mut fs = Ext2Fs::open(image.path()).unwrap();
		let free_inodes_before = fs.superblock().s_free_inodes_count;
		let free_blocks_before = fs.superblock().s_free_blocks_count;
		let links_before = {
			let sb = fs.superblock().clone();
			let (dev, gds) = fs.device_and_descriptors();
			Inode::read(dev, &sb, gds, ROOT_INODE).unwrap().i_links_count
		};

		commands::mkdir(&mut fs, "/a").unwrap();
		commands::rmdir(&mut fs, "/a").unwrap();

		let free_inodes_after = fs.superblock().s_free_inodes_count;
		let free_blocks_after = fs.superblock().s_free_blocks_count;
		assert_eq!(free_inodes_after, free_inodes_before);
		assert_eq!(free_blocks_after, free_blocks_before);
		let links_after = {
			let sb = fs.superblock().clone();
			let (dev, gds) = fs.device_and_descriptors();
			Inode::read(dev, &sb, gds, ROOT_INODE).unwrap().i_links_count
		};
		assert_eq!(links_after, links_before);
		assert!(matches!(
			commands::rmdir(&mut fs, "/a"),
			Err(Error::NotFound(_))
		));
	}

	#[test]
	fn rename_round_trip_restores_directory_bytes() {
		let image = build_image();
		let mut fs = Ext2Fs::open(image.path()).unwrap();
		commands::touch(&mut fs, "/p").unwrap();

		let block_before = read_root_block(&mut fs);

		commands::rename(&mut fs, "/p", "q").unwrap();
		commands::rename(&mut fs, "/q", "p").unwrap();

		assert_eq!(read_root_block(&mut fs), block_before);
	}

	#[test]
	fn ls_is_idempotent() {
		let image = build_image();
		let mut fs = Ext2Fs::open(image.path()).unwrap();
		commands::touch(&mut fs, "/x").unwrap();

		let block_before = read_root_block(&mut fs);

		commands::ls(&mut fs, None).unwrap();
		commands::ls(&mut fs, Some("/")).unwrap();

		assert_eq!(read_root_block(&mut fs), block_before);
	}
}
