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

//! Splitting and resolving `/`-separated paths against the directory tree.

use crate::device::ImageDevice;
use crate::dir;
use crate::error::Error;
use crate::error::Result;
use crate::group::GroupDescriptor;
use crate::inode::Inode;
use crate::inode::ROOT_INODE;
use crate::superblock::Superblock;

/// Resolves `path` to an inode number, starting at `cwd` for relative paths and at the root
/// for absolute ones.
pub fn resolve(
	dev: &mut ImageDevice,
	sb: &Superblock,
	gds: &[GroupDescriptor],
	cwd: u32,
	path: &str,
) -> Result<u32> {
	if path.is_empty() {
		return Err(Error::InvalidSyntax("empty path".into()));
	}
	let (mut current, rest) = if let Some(rest) = path.strip_prefix('/') {
		(ROOT_INODE, rest)
	} else {
		(cwd, path)
	};

	for component in rest.split('/').filter(|c| !c.is_empty()) {
		if component == "." {
			continue;
		}
		let inode = Inode::read(dev, sb, gds, current)?;
		if !inode.is_dir() {
			return Err(Error::NotADirectory(component.to_string()));
		}
		let entry = dir::lookup(dev, &inode, component)?
			.ok_or_else(|| Error::not_found(component))?;
		current = entry.inode;
	}
	Ok(current)
}

/// Resolves `path` to (parent inode number, final component name). Fails if the path has no
/// final component (root itself).
pub fn resolve_parent<'a>(
	dev: &mut ImageDevice,
	sb: &Superblock,
	gds: &[GroupDescriptor],
	cwd: u32,
	path: &'a str,
) -> Result<(u32, &'a str)> {
	let trimmed = path.trim_end_matches('/');
	if trimmed.is_empty() {
		return Err(Error::InvalidSyntax(
			"path has no final component".into(),
		));
	}
	let (dir_part, name) = match trimmed.rsplit_once('/') {
		Some((dir_part, name)) => (dir_part, name),
		None => ("", trimmed),
	};
	let parent = if dir_part.is_empty() {
		if trimmed.starts_with('/') {
			ROOT_INODE
		} else {
			cwd
		}
	} else {
		resolve(dev, sb, gds, cwd, dir_part)?
	};
	Ok((parent, name))
}

/// Reconstructs the absolute path of `ino` by walking `..` upward to the root, scanning each
/// parent for the record whose inode equals the child's.
pub fn reconstruct(
	dev: &mut ImageDevice,
	sb: &Superblock,
	gds: &[GroupDescriptor],
	ino: u32,
) -> Result<String> {
	let mut components = Vec::new();
	let mut current = ino;
	while current != ROOT_INODE {
		let inode = Inode::read(dev, sb, gds, current)?;
		let parent_entry = dir::lookup(dev, &inode, "..")?
			.ok_or_else(|| Error::Corruption(format!("inode {current} has no .. entry")))?;
		let parent_ino = parent_entry.inode;
		let parent_inode = Inode::read(dev, sb, gds, parent_ino)?;
		let name = dir::iter(dev, &parent_inode)?
			.into_iter()
			.find(|e| e.inode == current && e.name != "." && e.name != "..")
			.map(|e| e.name)
			.ok_or_else(|| {
				Error::Corruption(format!("parent of inode {current} has no matching entry"))
			})?;
		components.push(name);
		current = parent_ino;
	}
	if components.is_empty() {
		return Ok("/".to_string());
	}
	components.reverse();
	Ok(format!("/{}", components.join("/")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::alloc;
	use crate::device::BLOCK_SIZE;
	use crate::group::GroupDescriptor;
	use crate::inode::S_IFDIR;
	use crate::inode::S_IFREG;
	use crate::superblock::Superblock;
	use std::fs::OpenOptions;
	use std::mem::zeroed;
	use tempfile::NamedTempFile;

	const TOTAL_BLOCKS: u32 = 30;
	const INODES_PER_GROUP: u32 = 16;

	/// Builds a tiny image with `/sub/` holding one file `f`, using the real allocator and
	/// directory code so the fixture exercises the same paths as the rest of the suite.
	fn build_fixture() -> (NamedTempFile, ImageDevice, Superblock, Vec<GroupDescriptor>) {
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
		sb.s_magic = crate::superblock::EXT2_MAGIC;
		sb.s_rev_level = 1;
		sb.s_inode_size = 128;
		sb.s_first_data_block = 1;
		sb.s_blocks_per_group = TOTAL_BLOCKS - 1;
		sb.s_inodes_per_group = INODES_PER_GROUP;
		sb.s_inodes_count = INODES_PER_GROUP;
		sb.s_blocks_count = TOTAL_BLOCKS - 1;
		// Metadata occupies relative blocks 0..3: block bitmap, inode bitmap, two inode
		// table blocks (16 inodes * 128 bytes == 2 blocks).
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
		block_bitmap[0] = 0b0000_1111; // relative blocks 0..3 in use
		dev.write_block(gd.bg_block_bitmap, &block_bitmap).unwrap();

		let mut inode_bitmap = [0u8; BLOCK_SIZE];
		inode_bitmap[0] = 0b0000_0011; // inode 1 (reserved) and inode 2 (root) in use
		dev.write_block(gd.bg_inode_bitmap, &inode_bitmap).unwrap();

		let mut gds = vec![gd];
		let mut root = Inode::new(S_IFDIR, 0o755, 2);
		dir::bootstrap(&mut dev, &mut sb, &mut gds, &mut root, ROOT_INODE, ROOT_INODE).unwrap();
		root.write(&mut dev, &sb, &gds, ROOT_INODE).unwrap();

		let sub_ino = alloc::alloc_inode(&mut dev, &mut sb, &mut gds, S_IFDIR).unwrap();
		let mut sub = Inode::new(S_IFDIR, 0o755, 2);
		dir::bootstrap(&mut dev, &mut sb, &mut gds, &mut sub, sub_ino, ROOT_INODE).unwrap();
		sub.write(&mut dev, &sb, &gds, sub_ino).unwrap();
		dir::insert(&mut dev, &mut sb, &mut gds, &mut root, sub_ino, dir::FT_DIR, "sub").unwrap();
		let links = root.i_links_count;
		root.i_links_count = links + 1;
		root.write(&mut dev, &sb, &gds, ROOT_INODE).unwrap();

		let file_ino = alloc::alloc_inode(&mut dev, &mut sb, &mut gds, S_IFREG).unwrap();
		let f = Inode::new(S_IFREG, 0o644, 1);
		f.write(&mut dev, &sb, &gds, file_ino).unwrap();
		dir::insert(&mut dev, &mut sb, &mut gds, &mut sub, file_ino, dir::FT_REG, "f").unwrap();
		sub.write(&mut dev, &sb, &gds, sub_ino).unwrap();

		(file, dev, sb, gds)
	}

	#[test]
	fn resolve_walks_absolute_path_components() {
		let (_file, mut dev, sb, gds) = build_fixture();
		let sub_ino = resolve(&mut dev, &sb, &gds, ROOT_INODE, "/sub").unwrap();
		let file_ino = resolve(&mut dev, &sb, &gds, ROOT_INODE, "/sub/f").unwrap();
		assert_ne!(sub_ino, ROOT_INODE);
		assert_ne!(file_ino, sub_ino);
		// Relative resolution from within `sub` reaches the same file.
		assert_eq!(
			resolve(&mut dev, &sb, &gds, sub_ino, "f").unwrap(),
			file_ino
		);
		assert_eq!(
			resolve(&mut dev, &sb, &gds, sub_ino, "../sub/f").unwrap(),
			file_ino
		);
	}

	#[test]
	fn resolve_missing_component_is_not_found() {
		let (_file, mut dev, sb, gds) = build_fixture();
		let err = resolve(&mut dev, &sb, &gds, ROOT_INODE, "/sub/nope").unwrap_err();
		assert!(matches!(err, Error::NotFound(_)));
	}

	#[test]
	fn resolve_empty_path_is_invalid_syntax() {
		let (_file, mut dev, sb, gds) = build_fixture();
		let err = resolve(&mut dev, &sb, &gds, ROOT_INODE, "").unwrap_err();
		assert!(matches!(err, Error::InvalidSyntax(_)));
	}

	#[test]
	fn resolve_parent_splits_final_component() {
		let (_file, mut dev, sb, gds) = build_fixture();
		let (parent, name) = resolve_parent(&mut dev, &sb, &gds, ROOT_INODE, "/sub/f").unwrap();
		let sub_ino = resolve(&mut dev, &sb, &gds, ROOT_INODE, "/sub").unwrap();
		assert_eq!(parent, sub_ino);
		assert_eq!(name, "f");
	}

	#[test]
	fn reconstruct_recovers_absolute_path_of_a_directory() {
		let (_file, mut dev, sb, gds) = build_fixture();
		let sub_ino = resolve(&mut dev, &sb, &gds, ROOT_INODE, "/sub").unwrap();
		assert_eq!(reconstruct(&mut dev, &sb, &gds, sub_ino).unwrap(), "/sub");
		assert_eq!(reconstruct(&mut dev, &sb, &gds, ROOT_INODE).unwrap(), "/");
	}
}
