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

//! One function per user-facing command, each composed from the lower layers. Returns
//! structured results; the REPL is the one that formats them for display.

use crate::alloc;
use crate::blocks;
use crate::device::BLOCK_SIZE;
use crate::dir;
use crate::dir::FT_DIR;
use crate::dir::FT_REG;
use crate::error::Error;
use crate::error::Result;
use crate::fs::Ext2Fs;
use crate::inode::Inode;
use crate::inode::ROOT_INODE;
use crate::inode::S_IFDIR;
use crate::inode::S_IFREG;
use crate::path;
use chrono::TimeZone;
use chrono::Utc;
use std::path::Path;
use std::path::PathBuf;

const MAX_NAME_LEN: usize = 255;

/// A byte count rendered the way `attr` and `info` present sizes to the user: whole bytes
/// below 1 KiB, one decimal place above it.
///
/// Mirrors the teacher's `utils::util::ByteSize` (a newtype with a `Display` impl) rather than
/// formatting inline, but uses the thresholds and precision of the original `attr` command
/// (`fmt_size`: `%u B` / `%.1f KiB` / `%.1f MiB`).
pub struct HumanSize(pub u64);

impl std::fmt::Display for HumanSize {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let bytes = self.0;
		if bytes < 1024 {
			write!(f, "{bytes} B")
		} else if bytes < 1024 * 1024 {
			write!(f, "{:.1} KiB", bytes as f64 / 1024.0)
		} else {
			write!(f, "{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
		}
	}
}

/// `info`: volume-level statistics. Read-only.
pub struct InfoOutput {
	pub volume_name: String,
	pub image_bytes: u64,
	pub block_size: u32,
	pub inode_size: u32,
	pub groups: u32,
	pub blocks_per_group: u32,
	pub inodes_per_group: u32,
	pub total_blocks: u32,
	pub free_blocks: u32,
	pub free_kib: u64,
	pub total_inodes: u32,
	pub free_inodes: u32,
	pub inode_table_blocks: u32,
}

pub fn info(fs: &mut Ext2Fs) -> Result<InfoOutput> {
	let sb = fs.superblock().clone();
	let image_bytes = fs.device().len()?;
	let inode_size = sb.inode_size();
	let inode_table_blocks =
		(sb.s_inodes_per_group as u64 * inode_size as u64).div_ceil(BLOCK_SIZE as u64) as u32;
	let free_kib = sb.s_free_blocks_count as u64 * sb.block_size() as u64 / 1024;
	Ok(InfoOutput {
		volume_name: sb.volume_name(),
		image_bytes,
		block_size: sb.block_size(),
		inode_size,
		groups: sb.groups_count(),
		blocks_per_group: sb.s_blocks_per_group,
		inodes_per_group: sb.s_inodes_per_group,
		total_blocks: sb.s_blocks_count,
		free_blocks: sb.s_free_blocks_count,
		free_kib,
		total_inodes: sb.s_inodes_count,
		free_inodes: sb.s_free_inodes_count,
		inode_table_blocks,
	})
}

pub struct LsEntry {
	pub inode: u32,
	pub file_type: u8,
	pub name: String,
}

/// `ls [path]`: lists entries of the resolved directory.
pub fn ls(fs: &mut Ext2Fs, path: Option<&str>) -> Result<Vec<LsEntry>> {
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let (dev, gds) = fs.device_and_descriptors();
	let ino = match path {
		Some(p) => path::resolve(dev, &sb, gds, cwd, p)?,
		None => cwd,
	};
	let inode = Inode::read(dev, &sb, gds, ino)?;
	if !inode.is_dir() {
		return Err(Error::NotADirectory(path.unwrap_or(".").to_string()));
	}
	let entries = dir::iter(dev, &inode)?;
	Ok(entries
		.into_iter()
		.map(|e| LsEntry {
			inode: e.inode,
			file_type: e.file_type,
			name: e.name,
		})
		.collect())
}

/// `pwd`: the reconstructed absolute path of the current directory.
pub fn pwd(fs: &mut Ext2Fs) -> Result<String> {
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let (dev, gds) = fs.device_and_descriptors();
	path::reconstruct(dev, &sb, gds, cwd)
}

/// `cd <path>`: moves cwd to the resolved directory.
pub fn cd(fs: &mut Ext2Fs, target: &str) -> Result<()> {
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let (dev, gds) = fs.device_and_descriptors();
	let ino = path::resolve(dev, &sb, gds, cwd, target)?;
	let inode = Inode::read(dev, &sb, gds, ino)?;
	if !inode.is_dir() {
		return Err(Error::NotADirectory(target.to_string()));
	}
	fs.set_cwd(ino);
	Ok(())
}

/// `cat <file>`: the full byte contents of a regular file.
pub fn cat(fs: &mut Ext2Fs, target: &str) -> Result<Vec<u8>> {
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let (dev, gds) = fs.device_and_descriptors();
	let ino = path::resolve(dev, &sb, gds, cwd, target)?;
	let inode = Inode::read(dev, &sb, gds, ino)?;
	if inode.is_dir() {
		return Err(Error::IsADirectory(target.to_string()));
	}
	blocks::read_inode_data(dev, &inode)
}

pub struct AttrOutput {
	pub permissions: String,
	pub uid: u16,
	pub gid: u16,
	pub size: String,
	pub mtime: String,
}

/// `attr <name>`: permission string, ownership, human-formatted size and formatted mtime.
pub fn attr(fs: &mut Ext2Fs, target: &str) -> Result<AttrOutput> {
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let (dev, gds) = fs.device_and_descriptors();
	let ino = path::resolve(dev, &sb, gds, cwd, target)?;
	let inode = Inode::read(dev, &sb, gds, ino)?;
	let mtime = inode.i_mtime;
	let size = inode.i_size;
	let dt = Utc
		.timestamp_opt(mtime as i64, 0)
		.single()
		.ok_or_else(|| Error::Corruption(format!("inode {ino} has an out-of-range mtime")))?;
	Ok(AttrOutput {
		permissions: inode.permission_string(),
		uid: inode.i_uid,
		gid: inode.i_gid,
		size: HumanSize(size as u64).to_string(),
		mtime: dt.format("%d/%m/%Y %H:%M").to_string(),
	})
}

/// `touch <path>`: creates an empty regular file. Fails if the name already exists.
pub fn touch(fs: &mut Ext2Fs, target: &str) -> Result<()> {
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let (parent_ino, name) = {
		let (dev, gds) = fs.device_and_descriptors();
		path::resolve_parent(dev, &sb, gds, cwd, target)?
	};
	if name.len() > MAX_NAME_LEN {
		return Err(Error::InvalidSyntax(format!("name {name:?} is too long")));
	}
	let mut parent = {
		let (dev, gds) = fs.device_and_descriptors();
		Inode::read(dev, &sb, gds, parent_ino)?
	};
	if !parent.is_dir() {
		return Err(Error::NotADirectory(target.to_string()));
	}
	if dir::lookup(fs.device(), &parent, name)?.is_some() {
		return Err(Error::AlreadyExists(target.to_string()));
	}

	let (dev, sb, gds) = fs.parts_mut();
	let ino = alloc::alloc_inode(dev, sb, gds, S_IFREG)?;
	let new_inode = Inode::new(S_IFREG, 0o644, 1);
	new_inode.write(dev, sb, gds, ino)?;
	dir::insert(dev, sb, gds, &mut parent, ino, FT_REG, name)?;
	parent.write(dev, sb, gds, parent_ino)?;
	fs.flush()
}

/// `mkdir <path>`: creates a directory with a bootstrapped `.`/`..` block.
pub fn mkdir(fs: &mut Ext2Fs, target: &str) -> Result<()> {
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let (parent_ino, name) = {
		let (dev, gds) = fs.device_and_descriptors();
		path::resolve_parent(dev, &sb, gds, cwd, target)?
	};
	if name.len() > MAX_NAME_LEN {
		return Err(Error::InvalidSyntax(format!("name {name:?} is too long")));
	}
	let mut parent = {
		let (dev, gds) = fs.device_and_descriptors();
		Inode::read(dev, &sb, gds, parent_ino)?
	};
	if !parent.is_dir() {
		return Err(Error::NotADirectory(target.to_string()));
	}
	if dir::lookup(fs.device(), &parent, name)?.is_some() {
		return Err(Error::AlreadyExists(target.to_string()));
	}

	let (dev, sb, gds) = fs.parts_mut();
	let ino = alloc::alloc_inode(dev, sb, gds, S_IFDIR)?;
	let mut new_inode = Inode::new(S_IFDIR, 0o755, 2);
	dir::bootstrap(dev, sb, gds, &mut new_inode, ino, parent_ino)?;
	new_inode.write(dev, sb, gds, ino)?;

	dir::insert(dev, sb, gds, &mut parent, ino, FT_DIR, name)?;
	let links = parent.i_links_count;
	parent.i_links_count = links + 1;
	parent.write(dev, sb, gds, parent_ino)?;
	fs.flush()
}

/// `rm <path>`: removes a regular file, freeing its blocks and inode.
pub fn rm(fs: &mut Ext2Fs, target: &str) -> Result<()> {
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let (ino, mut inode) = {
		let (dev, gds) = fs.device_and_descriptors();
		let ino = path::resolve(dev, &sb, gds, cwd, target)?;
		let inode = Inode::read(dev, &sb, gds, ino)?;
		(ino, inode)
	};
	if inode.is_dir() {
		return Err(Error::IsADirectory(target.to_string()));
	}
	let parent = {
		let (dev, gds) = fs.device_and_descriptors();
		let (parent_ino, _name) = path::resolve_parent(dev, &sb, gds, cwd, target)?;
		Inode::read(dev, &sb, gds, parent_ino)?
	};

	let (dev, sb, gds) = fs.parts_mut();
	dir::remove(dev, &parent, ino)?;
	blocks::free_inode_blocks(dev, sb, gds, &mut inode)?;
	alloc::free_inode(dev, sb, gds, ino)?;
	fs.flush()
}

/// `rmdir <path>`: removes a directory that has no entries besides `.` and `..`.
pub fn rmdir(fs: &mut Ext2Fs, target: &str) -> Result<()> {
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let ino = {
		let (dev, gds) = fs.device_and_descriptors();
		path::resolve(dev, &sb, gds, cwd, target)?
	};
	if ino == ROOT_INODE {
		return Err(Error::InvalidSyntax(
			"cannot remove the root directory".into(),
		));
	}
	let mut inode = {
		let (dev, gds) = fs.device_and_descriptors();
		Inode::read(dev, &sb, gds, ino)?
	};
	if !inode.is_dir() {
		return Err(Error::NotADirectory(target.to_string()));
	}
	if !dir::is_empty(fs.device(), &inode)? {
		return Err(Error::NotEmpty(target.to_string()));
	}
	let (parent_ino, mut parent) = {
		let (dev, gds) = fs.device_and_descriptors();
		let (parent_ino, _name) = path::resolve_parent(dev, &sb, gds, cwd, target)?;
		let parent = Inode::read(dev, &sb, gds, parent_ino)?;
		(parent_ino, parent)
	};

	let (dev, sb, gds) = fs.parts_mut();
	dir::remove(dev, &parent, ino)?;
	blocks::free_inode_blocks(dev, sb, gds, &mut inode)?;
	alloc::free_inode(dev, sb, gds, ino)?;
	let links = parent.i_links_count;
	parent.i_links_count = links - 1;
	parent.write(dev, sb, gds, parent_ino)?;
	fs.flush()
}

/// `rename <path> <newname>`: in-place rename within the same parent.
pub fn rename(fs: &mut Ext2Fs, target: &str, new_name: &str) -> Result<()> {
	if new_name.len() > MAX_NAME_LEN {
		return Err(Error::InvalidSyntax(format!(
			"name {new_name:?} is too long"
		)));
	}
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let (ino, parent) = {
		let (dev, gds) = fs.device_and_descriptors();
		let ino = path::resolve(dev, &sb, gds, cwd, target)?;
		let (parent_ino, _name) = path::resolve_parent(dev, &sb, gds, cwd, target)?;
		let parent = Inode::read(dev, &sb, gds, parent_ino)?;
		(ino, parent)
	};
	if dir::lookup(fs.device(), &parent, new_name)?.is_some() {
		return Err(Error::AlreadyExists(new_name.to_string()));
	}
	dir::rename(fs.device(), &parent, ino, new_name)?;
	fs.flush()
}

fn host_destination(dst: &str, src_basename: &str) -> Result<PathBuf> {
	if !dst.starts_with('/') {
		return Err(Error::InvalidSyntax(
			"destination path must be absolute".into(),
		));
	}
	if dst.ends_with('/') || Path::new(dst).is_dir() {
		Ok(Path::new(dst).join(src_basename))
	} else {
		Ok(PathBuf::from(dst))
	}
}

/// `cp <src> <dst>`: exports a file's bytes from the image to a host path.
pub fn cp(fs: &mut Ext2Fs, src: &str, dst: &str) -> Result<PathBuf> {
	let cwd = fs.cwd();
	let sb = fs.superblock().clone();
	let inode = {
		let (dev, gds) = fs.device_and_descriptors();
		let ino = path::resolve(dev, &sb, gds, cwd, src)?;
		Inode::read(dev, &sb, gds, ino)?
	};
	if !inode.is_regular() {
		return Err(Error::NotARegularFile(src.to_string()));
	}
	let basename = src.rsplit('/').next().unwrap_or(src);
	let dst_path = host_destination(dst, basename)?;
	let data = blocks::read_inode_data(fs.device(), &inode)?;
	std::fs::write(&dst_path, data)?;
	Ok(dst_path)
}

/// `mv <src> <dst>`: `cp` followed by `rm` of the source. A failed `rm` after a successful
/// `cp` is reported back as a non-fatal warning.
pub fn mv(fs: &mut Ext2Fs, src: &str, dst: &str) -> Result<(PathBuf, Option<Error>)> {
	let dst_path = cp(fs, src, dst)?;
	match rm(fs, src) {
		Ok(()) => Ok((dst_path, None)),
		Err(e) => Ok((dst_path, Some(e))),
	}
}

fn hex_dump(buf: &[u8]) -> String {
	let mut out = String::new();
	for (i, chunk) in buf.chunks(16).enumerate() {
		out.push_str(&format!("{:08x}: ", i * 16));
		for b in chunk {
			out.push_str(&format!("{b:02x} "));
		}
		out.push('\n');
	}
	out
}

/// `print <sub> [arg]`: raw diagnostic dumps of on-disk structures.
pub fn print(fs: &mut Ext2Fs, sub: &str, arg: Option<&str>) -> Result<String> {
	let sb = fs.superblock().clone();
	match sub {
		"superblock" => {
			let magic = sb.s_magic;
			let state = sb.s_state;
			let rev = sb.s_rev_level;
			let free_inodes = sb.s_free_inodes_count;
			let inodes = sb.s_inodes_count;
			let free_blocks = sb.s_free_blocks_count;
			let blocks = sb.s_blocks_count;
			Ok(format!(
				"magic={magic:#06x} state={state} rev={rev} inodes={free_inodes}/{inodes} blocks={free_blocks}/{blocks} block_size={} inode_size={} volume={:?}",
				sb.block_size(),
				sb.inode_size(),
				sb.volume_name(),
			))
		}
		"groups" => {
			let mut out = String::new();
			for (i, gd) in fs.group_descriptors().iter().enumerate() {
				let block_bitmap = gd.bg_block_bitmap;
				let inode_bitmap = gd.bg_inode_bitmap;
				let inode_table = gd.bg_inode_table;
				let free_blocks = gd.bg_free_blocks_count;
				let free_inodes = gd.bg_free_inodes_count;
				let used_dirs = gd.bg_used_dirs_count;
				out.push_str(&format!(
					"group {i}: block_bitmap={block_bitmap} inode_bitmap={inode_bitmap} inode_table={inode_table} free_blocks={free_blocks} free_inodes={free_inodes} used_dirs={used_dirs}\n",
				));
			}
			Ok(out)
		}
		"inode" => {
			let n: u32 = arg
				.ok_or_else(|| Error::InvalidSyntax("print inode requires an inode number".into()))?
				.parse()
				.map_err(|_| Error::InvalidSyntax("inode number must be an integer".into()))?;
			let (dev, gds) = fs.device_and_descriptors();
			let inode = Inode::read(dev, &sb, gds, n)?;
			let bytes = unsafe {
				std::slice::from_raw_parts(
					&inode as *const Inode as *const u8,
					std::mem::size_of::<Inode>(),
				)
			};
			Ok(hex_dump(bytes))
		}
		"block" => {
			let n: u32 = arg
				.ok_or_else(|| Error::InvalidSyntax("print block requires a block number".into()))?
				.parse()
				.map_err(|_| Error::InvalidSyntax("block number must be an integer".into()))?;
			let mut buf = [0u8; BLOCK_SIZE];
			fs.device().read_block(n, &mut buf)?;
			Ok(hex_dump(&buf))
		}
		"inodebitmap" | "blockbitmap" => {
			let g: usize = arg
				.map(str::parse)
				.transpose()
				.map_err(|_| Error::InvalidSyntax("group number must be an integer".into()))?
				.unwrap_or(0);
			let gd = fs
				.group_descriptors()
				.get(g)
				.copied()
				.ok_or_else(|| Error::InvalidSyntax(format!("no such group {g}")))?;
			let bitmap_block = if sub == "inodebitmap" {
				gd.bg_inode_bitmap
			} else {
				gd.bg_block_bitmap
			};
			let mut buf = [0u8; BLOCK_SIZE];
			fs.device().read_block(bitmap_block, &mut buf)?;
			Ok(hex_dump(&buf[..64]))
		}
		_ => Err(Error::InvalidSyntax(format!("unknown print target {sub:?}"))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn human_size_formats_by_threshold() {
		assert_eq!(format!("{}", HumanSize(0)).as_str(), "0 B");
		assert_eq!(format!("{}", HumanSize(1)).as_str(), "1 B");
		assert_eq!(format!("{}", HumanSize(1023)).as_str(), "1023 B");
		assert_eq!(format!("{}", HumanSize(1024)).as_str(), "1.0 KiB");
		assert_eq!(format!("{}", HumanSize(1536)).as_str(), "1.5 KiB");
		assert_eq!(format!("{}", HumanSize(1024 * 1024 - 1)).as_str(), "1024.0 KiB");
		assert_eq!(format!("{}", HumanSize(1024 * 1024)).as_str(), "1.0 MiB");
		assert_eq!(format!("{}", HumanSize(3 * 1024 * 1024)).as_str(), "3.0 MiB");
	}
}
