//! Per-field codecs.
//!
//! A [`Segment`] is one field of a table's repeating record: a name, a byte
//! width and a [`SegmentKind`] that knows how to render the field as record
//! text, write it back from text, and check whether live bytes are plausible
//! for it.
//!
//! | kind       | spelling                  | width |
//! |------------|---------------------------|-------|
//! | Integer    | `hp.` `id:` `x:.` `y::`   | 1–4   |
//! | Enum       | `move:moveNames`          | 1–4   |
//! | Hex        | `flags:|h`                | 1–4   |
//! | Color      | `shade:|c`                | 2     |
//! | Tuple      | `pair:|t|level:::.|move::::.moveNames` | 1–4 |
//! | BitArray   | `tms|b[]tmNames`          | from source |
//! | Text       | `name""11`                | N     |
//! | Pointer    | `data<>` / `data<[a. b.]!FF>` | 4 |
//! | Unknown    | `pad^3`                   | N     |
//! | Calculated | `total|=stats/hp`         | 0     |

use std::collections::HashMap;

use hexweave_primitives::{Address, POINTER_WIDTH, text};
use tracing::debug;

use crate::model::{DataModel, Token};
use crate::run::Run;

mod parse;

pub use parse::{parse_segment, parse_segments, split_segment_specs};

/// One field of a table record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
	/// Field name; unique within a table by convention.
	pub name: String,
	/// Width in bytes.
	pub width: usize,
	/// How the bytes are interpreted.
	pub kind: SegmentKind,
}

/// The interpretation of a segment's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
	/// Raw bytes with no interpretation.
	Unknown,
	/// Fixed-width terminated text.
	Text,
	/// A 4-byte pointer, optionally with the format of its destination.
	Pointer {
		/// Format of the run the pointer targets.
		format: Option<String>,
	},
	/// A set of flags named by another table.
	BitArray {
		/// Anchor naming the flags.
		source: String,
	},
	/// An unsigned little-endian integer.
	Integer,
	/// An index into another table's labels.
	Enum {
		/// Anchor of the table providing labels.
		source: String,
	},
	/// Several bit fields packed into one integer.
	Tuple {
		/// Elements from the lowest bit upward.
		elements: Vec<TupleElement>,
	},
	/// An integer shown in hexadecimal.
	Hex,
	/// A 15-bit color.
	Color,
	/// A zero-width value read from the same-index element of another table.
	Calculated {
		/// Anchor of the other table.
		table: String,
		/// Field read from it.
		field: String,
	},
}

/// One bit field of a tuple segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleElement {
	/// Element name. Unnamed elements are padding and stay hidden in record text.
	pub name: String,
	/// Width in bits.
	pub bits: u32,
	/// Anchor providing labels for the element's values.
	pub source: Option<String>,
}

impl TupleElement {
	/// Returns true if the element appears in record text.
	pub fn is_visible(&self) -> bool {
		!self.name.is_empty()
	}

	fn mask(&self) -> u32 {
		if self.bits >= 32 { u32::MAX } else { (1u32 << self.bits) - 1 }
	}
}

/// Spelling of an integer width in the format language.
pub(crate) fn width_sigil(width: usize) -> &'static str {
	match width {
		1 => ".",
		2 => ":",
		3 => ":.",
		4 => "::",
		_ => "",
	}
}

impl Segment {
	/// Creates a segment.
	pub fn new(name: impl Into<String>, width: usize, kind: SegmentKind) -> Self {
		Self {
			name: name.into(),
			width,
			kind,
		}
	}

	/// Returns this segment spelled in the format language.
	pub fn serialize_format(&self) -> String {
		let name = &self.name;
		let sigil = width_sigil(self.width);
		match &self.kind {
			SegmentKind::Integer => format!("{name}{sigil}"),
			SegmentKind::Enum { source } => format!("{name}{sigil}{source}"),
			SegmentKind::Hex => format!("{name}{sigil}|h"),
			SegmentKind::Color => format!("{name}{sigil}|c"),
			SegmentKind::Tuple { elements } => {
				let mut out = format!("{name}{sigil}|t");
				for element in elements {
					out.push('|');
					out.push_str(&element.name);
					out.push_str(&":".repeat((element.bits / 2) as usize));
					if element.bits % 2 == 1 {
						out.push('.');
					}
					if let Some(source) = &element.source {
						out.push_str(source);
					}
				}
				out
			}
			SegmentKind::BitArray { source } => format!("{name}|b[]{source}"),
			SegmentKind::Text => format!("{name}\"\"{}", self.width),
			SegmentKind::Pointer { format } => format!("{name}<{}>", format.as_deref().unwrap_or("")),
			SegmentKind::Unknown => format!("{name}^{}", self.width),
			SegmentKind::Calculated { table, field } => format!("{name}|={table}/{field}"),
		}
	}

	/// Returns true if this segment takes its value domain from `anchor`.
	pub fn depends_on(&self, anchor: &str) -> bool {
		match &self.kind {
			SegmentKind::Enum { source } | SegmentKind::BitArray { source } => source == anchor,
			SegmentKind::Tuple { elements } => elements.iter().any(|e| e.source.as_deref() == Some(anchor)),
			SegmentKind::Calculated { table, .. } => table == anchor,
			SegmentKind::Unknown
			| SegmentKind::Text
			| SegmentKind::Pointer { .. }
			| SegmentKind::Integer
			| SegmentKind::Hex
			| SegmentKind::Color => false,
		}
	}

	/// Reads the field as an integer (at most 4 bytes).
	pub fn read_value(&self, model: &dyn DataModel, address: Address) -> u32 {
		model.read_value(address, self.width.min(4))
	}

	/// Checks whether the bytes at `address` are plausible for this field.
	pub fn matches(&self, model: &dyn DataModel, address: Address) -> bool {
		if address + self.width > model.len() {
			return false;
		}
		match &self.kind {
			SegmentKind::Text => text::decode(&model.bytes()[address..address + self.width]).is_some(),
			SegmentKind::Pointer { .. } => model.read_pointer(address).is_valid_within(model.len()),
			SegmentKind::Enum { source } => match enum_options(model, source) {
				Some(options) => (self.read_value(model, address) as usize) < options.len(),
				None => true,
			},
			SegmentKind::Tuple { elements } => {
				let raw = self.read_value(model, address);
				let mut shift = 0;
				elements.iter().all(|element| {
					let value = (raw >> shift) & element.mask();
					shift += element.bits;
					match element.source.as_deref().and_then(|s| enum_options(model, s)) {
						Some(options) => (value as usize) < options.len(),
						None => true,
					}
				})
			}
			SegmentKind::Unknown
			| SegmentKind::BitArray { .. }
			| SegmentKind::Integer
			| SegmentKind::Hex
			| SegmentKind::Color
			| SegmentKind::Calculated { .. } => true,
		}
	}

	/// Renders the field at `address` as record text.
	///
	/// `element_index` is only used by calculated fields.
	pub fn render(&self, model: &dyn DataModel, address: Address, element_index: usize) -> String {
		match &self.kind {
			SegmentKind::Integer => self.read_value(model, address).to_string(),
			SegmentKind::Hex => format!("0x{:0width$X}", self.read_value(model, address), width = self.width * 2),
			SegmentKind::Enum { source } => {
				let value = self.read_value(model, address);
				render_option(model, source, value)
			}
			SegmentKind::Color => {
				let (r, g, b) = split_color(self.read_value(model, address));
				format!("{r}:{g}:{b}")
			}
			SegmentKind::Tuple { elements } => {
				let raw = self.read_value(model, address);
				let mut shift = 0;
				let mut parts = Vec::new();
				for element in elements {
					let value = (raw >> shift) & element.mask();
					shift += element.bits;
					if !element.is_visible() {
						continue;
					}
					parts.push(match (&element.source, element.bits) {
						(Some(source), _) => render_option(model, source, value),
						(None, 1) => (value == 1).to_string(),
						(None, _) => value.to_string(),
					});
				}
				format!("({})", parts.join(" "))
			}
			SegmentKind::BitArray { .. } | SegmentKind::Unknown => hex_pairs(field_bytes(model, address, self.width)),
			SegmentKind::Text => text::quote(field_bytes(model, address, self.width)),
			SegmentKind::Pointer { .. } => model.read_pointer(address).to_string(),
			SegmentKind::Calculated { table, field } => {
				calculated_value(model, table, field, element_index).unwrap_or(0).to_string()
			}
		}
	}

	/// Writes the empty value of this field: zero, a null pointer or an empty string.
	pub fn write_empty(&self, model: &mut dyn DataModel, token: &mut Token, address: Address) -> bool {
		self.write(model, token, address, "")
	}

	/// Writes the field at `address` from record text.
	///
	/// Empty text writes the empty value (0, null, empty string). Text that
	/// cannot be interpreted leaves the field unchanged. Returns true if any
	/// byte changed.
	pub fn write(&self, model: &mut dyn DataModel, token: &mut Token, address: Address, value: &str) -> bool {
		let value = value.trim();
		match &self.kind {
			SegmentKind::Integer => match parse_integer(value) {
				Some(number) => write_int(model, token, address, self.width, number),
				None => rejected(self, value),
			},
			SegmentKind::Hex => match parse_hex(value) {
				Some(number) => write_int(model, token, address, self.width, number as i64),
				None => rejected(self, value),
			},
			SegmentKind::Enum { source } => match option_index(model, source, value) {
				Some(index) => write_int(model, token, address, self.width, index as i64),
				None => rejected(self, value),
			},
			SegmentKind::Color => match parse_color(value) {
				Some(color) => write_int(model, token, address, self.width, color as i64),
				None => rejected(self, value),
			},
			SegmentKind::Tuple { elements } => {
				let raw = self.read_value(model, address);
				match build_tuple(model, elements, raw, value) {
					Some(number) => write_int(model, token, address, self.width, number as i64),
					None => rejected(self, value),
				}
			}
			SegmentKind::BitArray { .. } | SegmentKind::Unknown => match parse_hex_pairs(value) {
				Some(mut bytes) => {
					bytes.resize(self.width, 0);
					write_bytes(model, token, address, &bytes)
				}
				None => rejected(self, value),
			},
			SegmentKind::Text => write_bytes(model, token, address, &text::encode_fixed(value, self.width)),
			SegmentKind::Pointer { .. } => write_pointer_text(model, token, address, value),
			SegmentKind::Calculated { .. } => false,
		}
	}
}

fn rejected(segment: &Segment, value: &str) -> bool {
	debug!(field = %segment.name, value, "field text not understood; left unchanged");
	false
}

fn field_bytes(model: &dyn DataModel, address: Address, width: usize) -> &[u8] {
	let bytes = model.bytes();
	let start = address.min(bytes.len());
	let end = (address + width).min(bytes.len());
	&bytes[start..end]
}

fn write_int(model: &mut dyn DataModel, token: &mut Token, address: Address, width: usize, value: i64) -> bool {
	let before = model.read_value(address, width);
	model.write_value(token, address, width, value as u32);
	before != model.read_value(address, width)
}

fn write_bytes(model: &mut dyn DataModel, token: &mut Token, address: Address, bytes: &[u8]) -> bool {
	let mut changed = false;
	for (offset, &byte) in bytes.iter().enumerate() {
		changed |= model.write_byte(token, address + offset, byte);
	}
	changed
}

fn write_pointer_text(model: &mut dyn DataModel, token: &mut Token, address: Address, value: &str) -> bool {
	let inner = value.trim_start_matches('<').trim_end_matches('>').trim();
	let destination = if inner.is_empty() || inner.eq_ignore_ascii_case("null") {
		None
	} else if let Some(anchor) = model.address_of_anchor(inner) {
		Some(anchor)
	} else if let Some(address) = hexweave_primitives::parse_address(inner) {
		Some(address)
	} else {
		debug!(anchor = inner, source = address, "pointer to unknown anchor recorded as unmapped");
		model.add_unmapped_source(inner, address);
		None
	};
	let before = model.read_value(address, POINTER_WIDTH);
	model.retarget_pointer(token, address, destination);
	before != model.read_value(address, POINTER_WIDTH)
}

/// Parses a decimal or `0x` hexadecimal integer. Empty text is zero.
pub fn parse_integer(text: &str) -> Option<i64> {
	let text = text.trim().trim_end_matches(',');
	if text.is_empty() {
		return Some(0);
	}
	if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
		return i64::from_str_radix(hex, 16).ok();
	}
	text.parse().ok()
}

fn parse_hex(text: &str) -> Option<u32> {
	let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
	if digits.is_empty() {
		return Some(0);
	}
	u32::from_str_radix(digits, 16).ok()
}

fn parse_hex_pairs(text: &str) -> Option<Vec<u8>> {
	let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
	if digits.len() % 2 != 0 {
		return None;
	}
	(0..digits.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
		.collect()
}

fn hex_pairs(bytes: &[u8]) -> String {
	bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Splits a 15-bit color into 5-bit components.
pub fn split_color(raw: u32) -> (u32, u32, u32) {
	(raw & 0x1F, (raw >> 5) & 0x1F, (raw >> 10) & 0x1F)
}

fn parse_color(text: &str) -> Option<u32> {
	let parts: Vec<&str> = text.split(':').collect();
	if parts.len() != 3 {
		return parse_integer(text).map(|value| value as u32);
	}
	let mut color = 0;
	for (i, part) in parts.iter().enumerate() {
		let channel: u32 = part.trim().parse().ok()?;
		if channel > 0x1F {
			return None;
		}
		color |= channel << (i * 5);
	}
	Some(color)
}

fn build_tuple(model: &dyn DataModel, elements: &[TupleElement], raw: u32, value: &str) -> Option<u32> {
	let inner = value.trim().trim_start_matches('(').trim_end_matches(')');
	if inner.trim().is_empty() {
		return Some(0);
	}
	let mut words = crate::tokenize::split_words(inner).into_iter();
	let mut result = raw;
	let mut shift = 0;
	for element in elements {
		let element_shift = shift;
		shift += element.bits;
		if !element.is_visible() {
			continue;
		}
		let word = words.next().unwrap_or_default();
		let number = match (&element.source, element.bits) {
			(Some(source), _) => option_index(model, source, &word)? as u32,
			(None, 1) if word.eq_ignore_ascii_case("true") => 1,
			(None, 1) if word.eq_ignore_ascii_case("false") => 0,
			(None, _) => parse_integer(&word)? as u32,
		};
		result &= !(element.mask() << element_shift);
		result |= (number & element.mask()) << element_shift;
	}
	Some(result)
}

/// Labels offered by the table anchored at `source`.
///
/// Each element contributes the text of its first text field. Repeated labels
/// get `~2`, `~3`, … suffixes so every label names exactly one value.
pub fn enum_options(model: &dyn DataModel, source: &str) -> Option<Vec<String>> {
	let address = model.address_of_anchor(source)?;
	let Some(Run::Table(table)) = model.run_at(address) else {
		return None;
	};
	let labels = table.read_labels(model)?;
	let mut seen: HashMap<String, usize> = HashMap::new();
	Some(
		labels
			.into_iter()
			.map(|label| {
				let count = seen.entry(label.clone()).or_insert(0);
				*count += 1;
				if *count == 1 { label } else { format!("{label}~{count}") }
			})
			.collect(),
	)
}

/// Quotes a label for record text if it contains spaces.
pub fn quote_option(label: &str) -> String {
	if label.contains(' ') { format!("\"{label}\"") } else { label.to_string() }
}

fn render_option(model: &dyn DataModel, source: &str, value: u32) -> String {
	enum_options(model, source)
		.and_then(|options| options.get(value as usize).map(|label| quote_option(label)))
		.unwrap_or_else(|| value.to_string())
}

fn option_index(model: &dyn DataModel, source: &str, text: &str) -> Option<usize> {
	let label = text.trim().trim_matches('"');
	if label.is_empty() {
		return Some(0);
	}
	if let Some(options) = enum_options(model, source) {
		if let Some(index) = options.iter().position(|option| option.eq_ignore_ascii_case(label)) {
			return Some(index);
		}
	}
	parse_integer(label).and_then(|number| usize::try_from(number).ok())
}

fn calculated_value(model: &dyn DataModel, table: &str, field: &str, element_index: usize) -> Option<u32> {
	let address = model.address_of_anchor(table)?;
	let Some(Run::Table(other)) = model.run_at(address) else {
		return None;
	};
	if element_index >= other.element_count() {
		return None;
	}
	let index = other.segment_index(field)?;
	let offset = other.segment_offset(index);
	let segment = &other.segments()[index];
	Some(segment.read_value(model, other.start() + element_index * other.element_width() + offset))
}
