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

//! The error taxonomy shared by every fallible operation on an ext2 image.

use std::path::PathBuf;
use thiserror::Error;

/// An error produced while reading or mutating an ext2 image.
#[derive(Debug, Error)]
pub enum Error {
	/// The image is missing the ext2 magic, is truncated, or inode `0` was requested.
	#[error("invalid image: {0}")]
	InvalidImage(String),

	/// A path component or directory entry does not exist.
	#[error("not found: {0}")]
	NotFound(String),

	/// An operation expected a directory but found something else.
	#[error("not a directory: {0}")]
	NotADirectory(String),

	/// An operation expected a regular file but found something else.
	#[error("not a regular file: {0}")]
	NotARegularFile(String),

	/// An operation refuses to act on a directory.
	#[error("is a directory: {0}")]
	IsADirectory(String),

	/// `touch`/`mkdir`/`rename` collided with an existing entry.
	#[error("already exists: {0}")]
	AlreadyExists(String),

	/// `rmdir` target still holds entries besides `.` and `..`.
	#[error("directory not empty: {0}")]
	NotEmpty(String),

	/// The bitmap allocator or a directory block ran out of room.
	#[error("no space left: {0}")]
	NoSpace(String),

	/// Wrong arity or a malformed argument.
	#[error("invalid syntax: {0}")]
	InvalidSyntax(String),

	/// An on-disk structure violates an invariant the core relies on.
	#[error("corrupt filesystem: {0}")]
	Corruption(String),

	/// A short read/write against the image device or a host file.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Shorthand for [`Error::NotFound`] carrying the path that could not be resolved.
	pub fn not_found(path: impl Into<PathBuf>) -> Self {
		Self::NotFound(path.into().display().to_string())
	}
}

/// A convenience alias for results from the core.
pub type Result<T> = std::result::Result<T, Error>;
