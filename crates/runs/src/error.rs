//! Error types for format parsing, validation and structural edits.

use hexweave_primitives::Address;
use thiserror::Error;

/// Errors raised while building, validating or editing runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
	/// The format string is malformed. Nothing was registered.
	#[error("invalid format token {token:?}: {message}")]
	Parse {
		/// The offending token.
		token: String,
		/// What was wrong with it.
		message: String,
	},

	/// The format is well formed but the bytes at the address do not match it.
	#[error("data at {address:06X} does not match format {format}")]
	Mismatch {
		/// The rejected format.
		format: String,
		/// Where it was applied.
		address: Address,
	},

	/// A refactor asked for an illegal layout change. No bytes were written.
	#[error("{0}")]
	Structural(String),

	/// No run strategy recognizes the format. This is a bug in the engine, not bad input.
	#[error("format not implemented: {0}")]
	Unimplemented(String),

	/// A named anchor could not be resolved.
	#[error("anchor not found: {0}")]
	AnchorNotFound(String),

	/// The address is not inside a table run.
	#[error("no table contains address {0:06X}")]
	NotATable(Address),

	/// Relocation could not find or create enough free space.
	#[error("no free space for {length} bytes")]
	OutOfSpace {
		/// Bytes requested.
		length: usize,
	},
}

impl FormatError {
	/// Builds a [`FormatError::Parse`].
	pub fn parse(token: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Parse {
			token: token.into(),
			message: message.into(),
		}
	}
}

/// Result type for run operations.
pub type Result<T> = std::result::Result<T, FormatError>;
