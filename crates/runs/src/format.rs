//! The table format language: `[segment segment …]end`.
//!
//! ```text
//! [name""12 hp. moves<[move:moveNames level.]!FFFF>]412
//! └────────────── segments ──────────────────────┘└end┘
//! ```
//!
//! The end token is a decimal element count, `!` and an even number of hex
//! digits naming a sentinel, or `parent/field` naming a count field in the
//! table that points at the stream.

use crate::end::EndStrategy;
use crate::error::{FormatError, Result};
use crate::model::DataModel;
use crate::segment::{Segment, parse_segments};

/// A parsed table format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFormat {
	/// Record layout, in byte order.
	pub segments: Vec<Segment>,
	/// How the element count is determined.
	pub end: EndStrategy,
}

impl TableFormat {
	/// Parses a table format string.
	pub fn parse(model: &dyn DataModel, format: &str) -> Result<Self> {
		let (body, end) = split_table_format(format)?;
		let segments = parse_segments(model, body)?;
		if segments.is_empty() {
			return Err(FormatError::parse(format, "table needs at least one segment"));
		}
		let end = EndStrategy::parse(end)?;
		Ok(Self { segments, end })
	}

	/// Spells the format canonically.
	pub fn serialize(&self) -> String {
		serialize_table_format(&self.segments, &self.end)
	}

	/// Sum of the segment widths.
	pub fn element_width(&self) -> usize {
		self.segments.iter().map(|segment| segment.width).sum()
	}
}

/// Spells a segment list and end strategy as a table format.
pub fn serialize_table_format(segments: &[Segment], end: &EndStrategy) -> String {
	let body: Vec<String> = segments.iter().map(Segment::serialize_format).collect();
	format!("[{}]{end}", body.join(" "))
}

/// Returns true if `format` has the `[…]` shape of a table format.
pub fn looks_like_table(format: &str) -> bool {
	matches!((format.find('['), format.find(']')), (Some(open), Some(close)) if open < close)
}

/// Splits a table format into its segment body and end token.
pub fn split_table_format(format: &str) -> Result<(&str, &str)> {
	let Some(rest) = format.strip_prefix('[') else {
		return Err(FormatError::parse(format, "table formats start with '['"));
	};
	let mut depth = 1usize;
	for (index, ch) in rest.char_indices() {
		match ch {
			'[' | '<' => depth += 1,
			']' | '>' => {
				depth = depth
					.checked_sub(1)
					.ok_or_else(|| FormatError::parse(format, format!("unbalanced '{ch}'")))?;
				if depth == 0 {
					if ch != ']' {
						return Err(FormatError::parse(format, "segment list closed by '>'"));
					}
					return Ok((&rest[..index], &rest[index + 1..]));
				}
			}
			_ => {}
		}
	}
	Err(FormatError::parse(format, "missing ']'"))
}
