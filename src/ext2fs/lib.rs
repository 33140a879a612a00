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

//! `ext2fs`: a from-scratch, host-file-backed reader/writer for the ext2 on-disk format.
//!
//! The layers are leaves first: [`device`] is raw block I/O, [`superblock`] and [`group`]
//! are the metadata records, [`alloc`] is the bitmap allocator, [`inode`] locates inode
//! records, [`blocks`] walks an inode's direct/indirect pointer chain, [`dir`] reads and
//! mutates directory entries, [`path`] resolves `/`-separated paths, and [`fs`] ties all of
//! it together behind one handle. [`commands`] is the one-function-per-shell-command layer
//! that a REPL (or anything else) can drive.

pub mod alloc;
pub mod blocks;
pub mod commands;
pub mod device;
pub mod dir;
pub mod error;
pub mod fs;
pub mod group;
pub mod inode;
pub mod path;
pub mod superblock;

pub use error::Error;
pub use error::Result;
pub use fs::Ext2Fs;
