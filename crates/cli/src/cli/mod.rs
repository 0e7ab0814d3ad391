//! CLI schema for the hexweave binary.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

#[cfg(test)]
mod tests;

#[derive(Parser, Debug)]
#[command(name = "hexweave")]
#[command(about = "Inspect and edit structured runs in ROM images")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// ROM image to open
	pub rom: PathBuf,

	/// Metadata file (defaults to the ROM path with a .toml extension, if present)
	#[arg(short, long, value_name = "PATH")]
	pub metadata: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	pub verbose: bool,

	/// Subcommand to execute.
	#[command(subcommand)]
	pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
	/// List every run with its address, length and format
	List,
	/// Print a named run as record text
	Show {
		/// Anchor name.
		name: String,
	},
	/// Validate every named table against the data
	Check,
	/// Append records to a named table and write the result
	Append {
		/// Anchor name.
		name: String,
		/// Number of records to add.
		count: usize,
		/// Where to write the edited ROM.
		#[arg(short, long, value_name = "PATH")]
		output: PathBuf,
	},
}

impl Cli {
	/// The metadata file to load, if any.
	pub fn metadata_path(&self) -> Option<PathBuf> {
		self.metadata.clone().or_else(|| sibling_metadata(&self.rom))
	}
}

fn sibling_metadata(rom: &Path) -> Option<PathBuf> {
	let path = rom.with_extension("toml");
	path.is_file().then_some(path)
}
