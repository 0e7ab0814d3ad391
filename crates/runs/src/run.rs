//! The run variants held in the model's index.

use std::borrow::Cow;

use hexweave_primitives::{Address, POINTER_WIDTH, SortedSpan, text};

use crate::data_format::{DataFormat, FieldPosition};
use crate::model::DataModel;
use crate::table::TableStreamRun;

/// Format keyword of a terminated string run.
pub const TEXT_FORMAT: &str = "\"\"";
/// Format prefix of a fixed-length ASCII run.
pub const ASCII_PREFIX: &str = "`asc`";
/// Format prefix of an uncompressed sprite.
pub const SPRITE_PREFIX: &str = "`ucs";
/// Format prefix of an uncompressed palette.
pub const PALETTE_PREFIX: &str = "`ucp";

/// A typed region of the buffer.
#[derive(Debug, Clone)]
pub enum Run {
	/// A pointer destination with no known format.
	NoInfo(NoInfoRun),
	/// A pointer stored outside any table.
	Pointer(PointerRun),
	/// A terminated string.
	Text(TextRun),
	/// Raw ASCII of a fixed length.
	Ascii(AsciiRun),
	/// Graphics data whose codec lives elsewhere.
	Opaque(OpaqueRun),
	/// A table or stream.
	Table(TableStreamRun),
}

/// One byte marking a pointer destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoInfoRun {
	pub start: Address,
	pub sources: SortedSpan,
}

/// A standalone 4-byte pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerRun {
	pub start: Address,
	pub sources: SortedSpan,
}

/// A `0xFF`-terminated string; `length` includes the terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
	pub start: Address,
	pub length: usize,
	pub sources: SortedSpan,
}

/// `length` bytes shown as ASCII.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiRun {
	pub start: Address,
	pub length: usize,
	pub sources: SortedSpan,
}

/// Sprite or palette data, known only by its geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueRun {
	pub start: Address,
	pub sources: SortedSpan,
	pub kind: OpaqueKind,
}

/// Geometry of an [`OpaqueRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpaqueKind {
	/// `width` × `height` tiles of 8×8 pixels at `bits` per pixel.
	Sprite { bits: usize, width: usize, height: usize },
	/// 16 colors at 4 bits per pixel, 256 at 8.
	Palette { bits: usize },
}

impl OpaqueKind {
	/// Parses `` `ucsBxWxH` `` and `` `ucpB` ``.
	pub fn parse(format: &str) -> Option<Self> {
		if let Some(rest) = format.strip_prefix(SPRITE_PREFIX) {
			let mut parts = rest.strip_suffix('`')?.split('x').map(str::parse::<usize>);
			let (bits, width, height) = (parts.next()?.ok()?, parts.next()?.ok()?, parts.next()?.ok()?);
			if parts.next().is_some() || !matches!(bits, 1 | 2 | 4 | 8) || width == 0 || height == 0 {
				return None;
			}
			return Some(Self::Sprite { bits, width, height });
		}
		let bits = format.strip_prefix(PALETTE_PREFIX)?.strip_suffix('`')?.parse().ok()?;
		matches!(bits, 4 | 8).then_some(Self::Palette { bits })
	}

	/// Length in bytes.
	pub fn length(self) -> usize {
		match self {
			Self::Sprite { bits, width, height } => 8 * bits * width * height,
			Self::Palette { bits } => 2 << bits,
		}
	}

	/// Format string.
	pub fn format(self) -> String {
		match self {
			Self::Sprite { bits, width, height } => format!("{SPRITE_PREFIX}{bits}x{width}x{height}`"),
			Self::Palette { bits } => format!("{PALETTE_PREFIX}{bits}`"),
		}
	}
}

impl TextRun {
	/// Measures the string at `start`, or `None` if it is unterminated or holds invalid bytes.
	pub fn parse(model: &dyn DataModel, start: Address, sources: SortedSpan) -> Option<Self> {
		let bytes = model.bytes().get(start..)?;
		text::decode(bytes)?;
		let length = text::terminated_length(bytes)?;
		Some(Self { start, length, sources })
	}
}

impl Run {
	/// A no-format destination with one source.
	pub fn no_info(start: Address, source: Address) -> Self {
		Self::NoInfo(NoInfoRun {
			start,
			sources: SortedSpan::single(source),
		})
	}

	/// A standalone pointer.
	pub fn pointer(start: Address) -> Self {
		Self::Pointer(PointerRun {
			start,
			sources: SortedSpan::new(),
		})
	}

	pub fn start(&self) -> Address {
		match self {
			Self::NoInfo(run) => run.start,
			Self::Pointer(run) => run.start,
			Self::Text(run) => run.start,
			Self::Ascii(run) => run.start,
			Self::Opaque(run) => run.start,
			Self::Table(run) => run.start(),
		}
	}

	/// Length in bytes. Never zero for runs the model indexes, except empty fixed tables.
	pub fn length(&self) -> usize {
		match self {
			Self::NoInfo(_) => 1,
			Self::Pointer(_) => POINTER_WIDTH,
			Self::Text(run) => run.length,
			Self::Ascii(run) => run.length,
			Self::Opaque(run) => run.kind.length(),
			Self::Table(run) => run.length(),
		}
	}

	/// One past the last byte.
	pub fn end(&self) -> Address {
		self.start() + self.length()
	}

	/// Returns true if `address` lies inside the run.
	pub fn contains(&self, address: Address) -> bool {
		address >= self.start() && address < self.start() + self.length().max(1)
	}

	pub fn pointer_sources(&self) -> &SortedSpan {
		match self {
			Self::NoInfo(run) => &run.sources,
			Self::Pointer(run) => &run.sources,
			Self::Text(run) => &run.sources,
			Self::Ascii(run) => &run.sources,
			Self::Opaque(run) => &run.sources,
			Self::Table(run) => run.pointer_sources(),
		}
	}

	/// The format string; empty for runs without one.
	pub fn format(&self) -> Cow<'_, str> {
		match self {
			Self::NoInfo(_) | Self::Pointer(_) => Cow::Borrowed(""),
			Self::Text(_) => Cow::Borrowed(TEXT_FORMAT),
			Self::Ascii(run) => Cow::Owned(format!("{ASCII_PREFIX}{}", run.length)),
			Self::Opaque(run) => Cow::Owned(run.kind.format()),
			Self::Table(run) => Cow::Borrowed(run.format()),
		}
	}

	/// The same run with different pointer sources.
	pub fn with_sources(&self, sources: SortedSpan) -> Self {
		match self {
			Self::NoInfo(run) => Self::NoInfo(NoInfoRun { sources, ..run.clone() }),
			Self::Pointer(run) => Self::Pointer(PointerRun { sources, ..run.clone() }),
			Self::Text(run) => Self::Text(TextRun { sources, ..run.clone() }),
			Self::Ascii(run) => Self::Ascii(AsciiRun { sources, ..run.clone() }),
			Self::Opaque(run) => Self::Opaque(OpaqueRun { sources, ..run.clone() }),
			Self::Table(run) => Self::Table(run.with_sources(sources)),
		}
	}

	/// The same run after its bytes were copied to `start`.
	pub fn relocated(&self, start: Address) -> Self {
		match self {
			Self::NoInfo(run) => Self::NoInfo(NoInfoRun { start, ..run.clone() }),
			Self::Pointer(run) => Self::Pointer(PointerRun { start, ..run.clone() }),
			Self::Text(run) => Self::Text(TextRun { start, ..run.clone() }),
			Self::Ascii(run) => Self::Ascii(AsciiRun { start, ..run.clone() }),
			Self::Opaque(run) => Self::Opaque(OpaqueRun { start, ..run.clone() }),
			Self::Table(run) => Self::Table(run.relocated(start)),
		}
	}

	/// Addresses of the pointers held inside this run, with the format each expects at its destination.
	pub fn pointer_fields(&self) -> Vec<(Address, Option<String>)> {
		match self {
			Self::Pointer(run) => vec![(run.start, None)],
			Self::Table(run) => run
				.pointer_fields()
				.into_iter()
				.map(|(address, segment)| {
					let format = match &segment.kind {
						crate::segment::SegmentKind::Pointer { format } => format.clone(),
						_ => None,
					};
					(address, format)
				})
				.collect(),
			Self::NoInfo(_) | Self::Text(_) | Self::Ascii(_) | Self::Opaque(_) => Vec::new(),
		}
	}

	/// The table inside this run, if it is one.
	pub fn as_table(&self) -> Option<&TableStreamRun> {
		match self {
			Self::Table(run) => Some(run),
			_ => None,
		}
	}

	/// Presentation value of the byte at `index`.
	pub fn data_format(&self, model: &dyn DataModel, index: Address) -> DataFormat {
		if !self.contains(index) {
			return DataFormat::None;
		}
		let position = index - self.start();
		match self {
			Self::Table(run) => run.data_format(model, index),
			Self::Pointer(run) => DataFormat::Pointer {
				field: FieldPosition {
					element: 0,
					segment: 0,
					field_start: run.start,
					position,
					width: POINTER_WIDTH,
				},
				destination: model.read_pointer(run.start),
			},
			Self::Text(run) => {
				let end = (run.start + run.length).min(model.len());
				DataFormat::Text {
					field: FieldPosition {
						element: 0,
						segment: 0,
						field_start: run.start,
						position,
						width: run.length,
					},
					text: text::quote(&model.bytes()[run.start.min(end)..end]).into(),
				}
			}
			Self::NoInfo(_) => DataFormat::None,
			Self::Ascii(_) | Self::Opaque(_) => DataFormat::Raw {
				start: self.start(),
				position,
				value: model.bytes().get(index).copied().unwrap_or_default(),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sprite_and_palette_geometry() {
		assert_eq!(
			OpaqueKind::parse("`ucs4x2x2`"),
			Some(OpaqueKind::Sprite {
				bits: 4,
				width: 2,
				height: 2
			})
		);
		assert_eq!(OpaqueKind::parse("`ucs4x2x2`").map(OpaqueKind::length), Some(128));
		assert_eq!(OpaqueKind::parse("`ucp4`").map(OpaqueKind::length), Some(32));
		assert_eq!(OpaqueKind::parse("`ucp8`").map(OpaqueKind::length), Some(512));
	}

	#[test]
	fn malformed_geometry_is_rejected() {
		for format in ["`ucs4x2`", "`ucs3x1x1`", "`ucs4x0x1`", "`ucp2`", "`ucp4", "`ucsaxbxc`"] {
			assert_eq!(OpaqueKind::parse(format), None, "{format}");
		}
	}

	#[test]
	fn geometry_format_round_trips() {
		for format in ["`ucs8x1x4`", "`ucp8`"] {
			assert_eq!(OpaqueKind::parse(format).map(OpaqueKind::format).as_deref(), Some(format));
		}
	}
}
