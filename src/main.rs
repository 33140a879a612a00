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

//! `ext2sh`: an interactive shell over an ext2 image file.

use ext2fs::commands;
use ext2fs::dir::FT_DIR;
use ext2fs::Ext2Fs;
use std::env;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

const BIN: &str = "ext2sh";

/// Prints a message to stderr in the shape `{bin}: error: {msg}` and exits with status 1.
fn fatal<M: std::fmt::Display>(msg: M) -> ! {
	eprintln!("{BIN}: error: {msg}");
	exit(1);
}

/// Splits a command line into tokens, honoring `"`/`'` as simple, non-nesting quoting. No
/// escape sequences are interpreted inside or outside quotes.
fn tokenize(line: &str) -> Vec<String> {
	let mut tokens = Vec::new();
	let mut chars = line.chars().peekable();
	loop {
		while chars.peek().is_some_and(|c| c.is_whitespace()) {
			chars.next();
		}
		if chars.peek().is_none() {
			break;
		}
		let mut tok = String::new();
		if matches!(chars.peek(), Some('"') | Some('\'')) {
			let quote = chars.next().unwrap();
			for c in chars.by_ref() {
				if c == quote {
					break;
				}
				tok.push(c);
			}
		} else {
			while let Some(&c) = chars.peek() {
				if c.is_whitespace() {
					break;
				}
				tok.push(c);
				chars.next();
			}
		}
		tokens.push(tok);
	}
	tokens
}

const HELP: &str = "\
Commands:
  info                       volume statistics
  ls [path]                  list a directory
  pwd                        print the current directory
  cd <path>                  change the current directory
  cat <file>                 print a file's contents
  attr <path>                show permissions, ownership, size, mtime
  touch <path>               create an empty file
  mkdir <path>                create a directory
  rm <path>                  remove a file
  rmdir <path>               remove an empty directory
  rename <path> <newname>    rename an entry in place
  cp <src> <dst>             export a file to the host
  mv <src> <dst>             export a file to the host, then remove the source
  print <sub> [arg]          dump superblock, groups, inode, block or bitmap
  help                       show this text
  exit, quit                 leave the shell";

fn file_type_char(ft: u8) -> char {
	if ft == FT_DIR {
		'd'
	} else {
		'-'
	}
}

fn run_command(fs: &mut Ext2Fs, tokens: &[String]) -> Result<(), ext2fs::Error> {
	let args: Vec<&str> = tokens[1..].iter().map(String::as_str).collect();
	match tokens[0].as_str() {
		"info" => {
			let info = commands::info(fs)?;
			println!(
				"volume: {:?}\nimage size: {} bytes\nblock size: {}\ninode size: {}\ngroups: {}\nblocks/group: {}\ninodes/group: {}\nblocks: {}/{} free\nfree space: {} KiB\ninodes: {}/{} free\ninode table: {} blocks/group",
				info.volume_name,
				info.image_bytes,
				info.block_size,
				info.inode_size,
				info.groups,
				info.blocks_per_group,
				info.inodes_per_group,
				info.free_blocks,
				info.total_blocks,
				info.free_kib,
				info.free_inodes,
				info.total_inodes,
				info.inode_table_blocks,
			);
		}
		"ls" => {
			let entries = commands::ls(fs, args.first().copied())?;
			for e in entries {
				println!("{} {:>8} {}", file_type_char(e.file_type), e.inode, e.name);
			}
		}
		"pwd" => println!("{}", commands::pwd(fs)?),
		"cd" => {
			let target = args
				.first()
				.ok_or_else(|| ext2fs::Error::InvalidSyntax("cd requires a path".into()))?;
			commands::cd(fs, target)?;
		}
		"cat" => {
			let target = args
				.first()
				.ok_or_else(|| ext2fs::Error::InvalidSyntax("cat requires a path".into()))?;
			let data = commands::cat(fs, target)?;
			io::stdout().write_all(&data).ok();
		}
		"attr" => {
			let target = args
				.first()
				.ok_or_else(|| ext2fs::Error::InvalidSyntax("attr requires a path".into()))?;
			let a = commands::attr(fs, target)?;
			println!(
				"{} uid={} gid={} size={} mtime={}",
				a.permissions, a.uid, a.gid, a.size, a.mtime
			);
		}
		"touch" => {
			let target = args
				.first()
				.ok_or_else(|| ext2fs::Error::InvalidSyntax("touch requires a path".into()))?;
			commands::touch(fs, target)?;
		}
		"mkdir" => {
			let target = args
				.first()
				.ok_or_else(|| ext2fs::Error::InvalidSyntax("mkdir requires a path".into()))?;
			commands::mkdir(fs, target)?;
		}
		"rm" => {
			let target = args
				.first()
				.ok_or_else(|| ext2fs::Error::InvalidSyntax("rm requires a path".into()))?;
			commands::rm(fs, target)?;
		}
		"rmdir" => {
			let target = args
				.first()
				.ok_or_else(|| ext2fs::Error::InvalidSyntax("rmdir requires a path".into()))?;
			commands::rmdir(fs, target)?;
		}
		"rename" => {
			let (target, new_name) = match (args.first(), args.get(1)) {
				(Some(t), Some(n)) => (t, n),
				_ => {
					return Err(ext2fs::Error::InvalidSyntax(
						"rename requires a path and a new name".into(),
					))
				}
			};
			commands::rename(fs, target, new_name)?;
		}
		"cp" => {
			let (src, dst) = match (args.first(), args.get(1)) {
				(Some(s), Some(d)) => (s, d),
				_ => {
					return Err(ext2fs::Error::InvalidSyntax(
						"cp requires a source and a destination".into(),
					))
				}
			};
			let dst_path = commands::cp(fs, src, dst)?;
			println!("copied to {}", dst_path.display());
		}
		"mv" => {
			let (src, dst) = match (args.first(), args.get(1)) {
				(Some(s), Some(d)) => (s, d),
				_ => {
					return Err(ext2fs::Error::InvalidSyntax(
						"mv requires a source and a destination".into(),
					))
				}
			};
			let (dst_path, warning) = commands::mv(fs, src, dst)?;
			println!("moved to {}", dst_path.display());
			if let Some(e) = warning {
				eprintln!("{BIN}: warning: export succeeded but rm failed: {e}");
			}
		}
		"print" => {
			let sub = args
				.first()
				.ok_or_else(|| ext2fs::Error::InvalidSyntax("print requires a subcommand".into()))?;
			let out = commands::print(fs, sub, args.get(1).copied())?;
			print!("{out}");
		}
		"help" => println!("{HELP}"),
		other => {
			return Err(ext2fs::Error::InvalidSyntax(format!(
				"unknown command {other:?}, try `help`"
			)))
		}
	}
	Ok(())
}

fn main() {
	let mut args = env::args_os();
	args.next();
	let image_path: PathBuf = match args.next() {
		Some(p) => p.into(),
		None => fatal("usage: ext2sh <image>"),
	};

	let mut fs = Ext2Fs::open(&image_path).unwrap_or_else(|e| fatal(e));

	let stdin = io::stdin();
	loop {
		let cwd_path = commands::pwd(&mut fs).unwrap_or_else(|_| "?".to_string());
		print!("[{cwd_path}]$> ");
		io::stdout().flush().ok();

		let mut line = String::new();
		let n = stdin.lock().read_line(&mut line).unwrap_or(0);
		if n == 0 {
			println!();
			break;
		}
		let tokens = tokenize(&line);
		if tokens.is_empty() {
			continue;
		}
		if matches!(tokens[0].as_str(), "exit" | "quit") {
			break;
		}
		if let Err(e) = run_command(&mut fs, &tokens) {
			eprintln!("{BIN}: error: {e}");
		}
	}

	if let Err(e) = fs.close() {
		fatal(e);
	}
}
