//! Choosing and driving a run strategy for a format string.
//!
//! Recognizers are tried in a fixed order and the first match wins:
//!
//! 1. exact keyword: `""` (terminated text)
//! 2. prefixed keywords: `` `asc``, `` `ucs``, `` `ucp``
//! 3. structural shape: `[` before `]` (table stream)
//!
//! A format no recognizer accepts is an engine fault, not user error.

use hexweave_primitives::{Address, ERASE_BYTE, SortedSpan};
use tracing::{debug, error, warn};

use crate::end::EndStrategy;
use crate::error::{FormatError, Result};
use crate::format::{TableFormat, looks_like_table};
use crate::model::{DataModel, Token};
use crate::run::{ASCII_PREFIX, AsciiRun, OpaqueKind, OpaqueRun, PALETTE_PREFIX, Run, SPRITE_PREFIX, TEXT_FORMAT, TextRun};
use crate::table::TableStreamRun;

/// A strategy bound to one format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStrategy {
	/// `""`
	Text,
	/// `` `asc`N ``
	Ascii { length: usize },
	/// `` `ucsBxWxH` `` and `` `ucpB` ``
	Opaque(OpaqueKind),
	/// `[…]end`
	Table { format: String },
}

impl RunStrategy {
	/// Picks the strategy for `format`.
	pub fn for_format(format: &str) -> Result<Self> {
		if format == TEXT_FORMAT {
			return Ok(Self::Text);
		}
		if let Some(length) = format.strip_prefix(ASCII_PREFIX) {
			return match length.parse::<usize>() {
				Ok(length) if length > 0 => Ok(Self::Ascii { length }),
				_ => Err(FormatError::parse(format, "ascii runs need a positive length")),
			};
		}
		if format.starts_with(SPRITE_PREFIX) || format.starts_with(PALETTE_PREFIX) {
			return OpaqueKind::parse(format)
				.map(Self::Opaque)
				.ok_or_else(|| FormatError::parse(format, "malformed sprite or palette geometry"));
		}
		if looks_like_table(format) {
			return Ok(Self::Table {
				format: format.to_string(),
			});
		}
		error!(format, "no run strategy recognizes format");
		Err(FormatError::Unimplemented(format.to_string()))
	}

	/// The format this strategy is bound to.
	pub fn format(&self) -> String {
		match self {
			Self::Text => TEXT_FORMAT.to_string(),
			Self::Ascii { length } => format!("{ASCII_PREFIX}{length}"),
			Self::Opaque(kind) => kind.format(),
			Self::Table { format } => format.clone(),
		}
	}

	/// Returns true if `run` already has this strategy's format.
	pub fn matches(&self, run: &Run) -> bool {
		match (self, run) {
			(Self::Text, Run::Text(_)) => true,
			(Self::Ascii { length }, Run::Ascii(run)) => run.length == *length,
			(Self::Opaque(kind), Run::Opaque(run)) => run.kind == *kind,
			(Self::Table { format }, Run::Table(run)) => run.format() == format,
			_ => false,
		}
	}

	/// Bytes a brand-new run needs at the destination of the pointer at `pointer_address`.
	pub fn length_for_new_run(&self, model: &dyn DataModel, pointer_address: Address) -> usize {
		match self {
			Self::Text => 1,
			Self::Ascii { length } => *length,
			Self::Opaque(kind) => kind.length(),
			Self::Table { format } => match TableFormat::parse(model, format) {
				Ok(parsed) => {
					let width = parsed.element_width();
					let count = match &parsed.end {
						EndStrategy::EndCode { .. } => 0,
						end => end.count(model, pointer_address, width, &SortedSpan::single(pointer_address)),
					};
					width * count + parsed.end.extra_length()
				}
				Err(err) => {
					warn!(format = %format, %err, "cannot size new run");
					0
				}
			},
		}
	}

	/// Parses this format at `address`, keeping the pointer sources already recorded there.
	pub fn try_parse_format(&self, model: &dyn DataModel, name: &str, address: Address) -> Result<Run> {
		let sources = model
			.run_at(address)
			.map(|run| run.pointer_sources().clone())
			.unwrap_or_default();
		self.parse_at(model, name, address, sources)
	}

	fn parse_at(&self, model: &dyn DataModel, name: &str, address: Address, sources: SortedSpan) -> Result<Run> {
		let mismatch = || FormatError::Mismatch {
			format: self.format(),
			address,
		};
		match self {
			Self::Text => TextRun::parse(model, address, sources).map(Run::Text).ok_or_else(mismatch),
			Self::Ascii { length } => {
				if address + length > model.len() {
					return Err(mismatch());
				}
				Ok(Run::Ascii(AsciiRun {
					start: address,
					length: *length,
					sources,
				}))
			}
			Self::Opaque(kind) => {
				if address + kind.length() > model.len() {
					return Err(mismatch());
				}
				Ok(Run::Opaque(OpaqueRun {
					start: address,
					sources,
					kind: *kind,
				}))
			}
			Self::Table { format } => TableStreamRun::try_parse(model, address, sources, name, format).map(Run::Table),
		}
	}

	/// Validates the bytes at `destination` and registers the run if they match.
	///
	/// Returns false, with nothing registered, when the data does not fit the format.
	pub fn try_add_format_at_destination(
		&self,
		model: &mut dyn DataModel,
		token: &mut Token,
		source: Address,
		destination: Address,
		name: &str,
	) -> bool {
		let sources = model
			.run_at(destination)
			.map(|run| run.pointer_sources().with(source))
			.unwrap_or_else(|| SortedSpan::single(source));
		match self.parse_at(model, name, destination, sources) {
			Ok(run) => {
				model.observe_run_written(token, run);
				true
			}
			Err(err) => {
				debug!(destination, %err, "format not added at pointer destination");
				false
			}
		}
	}

	/// Materializes a default run at an all-erased `destination` pointed to by `source`.
	pub fn write_new_run(
		&self,
		model: &mut dyn DataModel,
		token: &mut Token,
		source: Address,
		destination: Address,
		name: &str,
	) -> Result<Run> {
		self.write_default(model, token, SortedSpan::single(source), destination, name)
	}

	fn write_default(
		&self,
		model: &mut dyn DataModel,
		token: &mut Token,
		sources: SortedSpan,
		destination: Address,
		name: &str,
	) -> Result<Run> {
		let run = match self {
			Self::Text => {
				model.write_byte(token, destination, ERASE_BYTE);
				Run::Text(TextRun {
					start: destination,
					length: 1,
					sources,
				})
			}
			Self::Ascii { length } => {
				model.write_bytes(token, destination, &vec![b' '; *length]);
				Run::Ascii(AsciiRun {
					start: destination,
					length: *length,
					sources,
				})
			}
			Self::Opaque(kind) => {
				model.write_bytes(token, destination, &vec![0; kind.length()]);
				Run::Opaque(OpaqueRun {
					start: destination,
					sources,
					kind: *kind,
				})
			}
			Self::Table { format } => {
				let parsed = TableFormat::parse(model, format)?;
				let empty = TableStreamRun::new(model, destination, sources, format.as_str(), parsed.segments, parsed.end);
				let empty = empty.try_write_new_end_token(model, token).unwrap_or(empty);
				for element in 0..empty.element_count() {
					let mut address = empty.element_start(element);
					for segment in empty.segments().iter() {
						segment.write_empty(model, token, address);
						address += segment.width;
					}
				}
				Run::Table(empty.redescribe(model))
			}
		};
		if name.is_empty() {
			model.observe_run_written(token, run.clone());
		} else {
			model.observe_anchor_written(token, name, run.clone())?;
		}
		Ok(run)
	}

	/// Replaces `run` after the format of the pointer that targets it changed to this one.
	///
	/// Existing bytes are kept when they already fit; otherwise the run is
	/// rewritten with default content, moving it if it needs more room.
	pub fn update_new_run_from_pointer_format(
		&self,
		model: &mut dyn DataModel,
		token: &mut Token,
		name: &str,
		run: &Run,
	) -> Result<Run> {
		if self.matches(run) {
			return Ok(run.clone());
		}
		if let Ok(parsed) = self.parse_at(model, name, run.start(), run.pointer_sources().clone()) {
			model.observe_run_written(token, parsed.clone());
			return Ok(parsed);
		}

		let first_source = run.pointer_sources().first().unwrap_or(run.start());
		let length = self.length_for_new_run(model, first_source).max(1);
		let target = model.relocate_for_expansion(token, run, length)?;
		model.clear_format(token, target.start(), target.length().max(length));
		model.write_bytes(token, target.start(), &vec![ERASE_BYTE; length]);
		self.write_default(model, token, target.pointer_sources().clone(), target.start(), name)
	}
}

/// Applies `format` at `address`, naming the run `name` when it is not empty.
pub fn apply_format(model: &mut dyn DataModel, token: &mut Token, name: &str, address: Address, format: &str) -> Result<Run> {
	let strategy = RunStrategy::for_format(format)?;
	let run = strategy.try_parse_format(model, name, address)?;
	if name.is_empty() {
		model.observe_run_written(token, run.clone());
	} else {
		model.observe_anchor_written(token, name, run.clone())?;
	}
	Ok(model.run_at(address).cloned().unwrap_or(run))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn priority_order_picks_first_match() {
		assert_eq!(RunStrategy::for_format("\"\"").unwrap(), RunStrategy::Text);
		assert_eq!(RunStrategy::for_format("`asc`8").unwrap(), RunStrategy::Ascii { length: 8 });
		assert_eq!(
			RunStrategy::for_format("`ucp4`").unwrap(),
			RunStrategy::Opaque(OpaqueKind::Palette { bits: 4 })
		);
		assert!(matches!(RunStrategy::for_format("[a.]3").unwrap(), RunStrategy::Table { .. }));
	}

	#[test]
	fn unknown_formats_are_unimplemented() {
		assert_eq!(
			RunStrategy::for_format("lzsprite"),
			Err(FormatError::Unimplemented("lzsprite".into()))
		);
		assert_eq!(
			RunStrategy::for_format("]a.[3"),
			Err(FormatError::Unimplemented("]a.[3".into()))
		);
	}

	#[test]
	fn recognized_but_malformed_is_a_parse_error() {
		assert!(matches!(RunStrategy::for_format("`asc`0"), Err(FormatError::Parse { .. })));
		assert!(matches!(RunStrategy::for_format("`ucs4x`"), Err(FormatError::Parse { .. })));
	}

	#[test]
	fn format_is_preserved() {
		for format in ["\"\"", "`asc`12", "`ucs4x2x1`", "[a. b:]!FFFF"] {
			assert_eq!(RunStrategy::for_format(format).unwrap().format(), format);
		}
	}
}
