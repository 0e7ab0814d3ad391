//! Parsing segment specs out of a table format body.

use hexweave_primitives::POINTER_WIDTH;

use super::{Segment, SegmentKind, TupleElement, enum_options};
use crate::error::{FormatError, Result};
use crate::factory::RunStrategy;
use crate::model::DataModel;

const NAME_STOPS: &[char] = &['.', ':', '<', '>', '[', ']', '|', '"', '^', '='];

/// Splits a format body into segment specs on whitespace outside `<…>` and `[…]`.
pub fn split_segment_specs(body: &str) -> Result<Vec<String>> {
	let mut specs = Vec::new();
	let mut current = String::new();
	let mut depth = 0i32;
	for ch in body.chars() {
		match ch {
			'<' | '[' => depth += 1,
			'>' | ']' => {
				depth -= 1;
				if depth < 0 {
					return Err(FormatError::parse(body, format!("unbalanced '{ch}'")));
				}
			}
			c if c.is_whitespace() && depth == 0 => {
				if !current.is_empty() {
					specs.push(std::mem::take(&mut current));
				}
				continue;
			}
			_ => {}
		}
		current.push(ch);
	}
	if depth != 0 {
		return Err(FormatError::parse(body, "unclosed nested format"));
	}
	if !current.is_empty() {
		specs.push(current);
	}
	Ok(specs)
}

/// Parses every segment spec in a format body.
pub fn parse_segments(model: &dyn DataModel, body: &str) -> Result<Vec<Segment>> {
	split_segment_specs(body)?
		.iter()
		.map(|spec| parse_segment(model, spec))
		.collect()
}

/// Parses one segment spec such as `hp.`, `name""11` or `moves<[move: level.]!FFFF>`.
///
/// Bit arrays take their width from the number of options their source
/// provides, so the source must already be registered in `model`.
pub fn parse_segment(model: &dyn DataModel, spec: &str) -> Result<Segment> {
	let name_end = spec.find(NAME_STOPS).unwrap_or(spec.len());
	let (name, rest) = spec.split_at(name_end);
	if name.is_empty() {
		return Err(FormatError::parse(spec, "segment needs a name"));
	}

	if let Some(inner) = rest.strip_prefix('<') {
		let inner = inner
			.strip_suffix('>')
			.ok_or_else(|| FormatError::parse(spec, "pointer format must end with '>'"))?;
		let format = if inner.is_empty() {
			None
		} else {
			RunStrategy::for_format(inner).map_err(|_| FormatError::parse(spec, format!("unknown destination format {inner:?}")))?;
			Some(inner.to_string())
		};
		return Ok(Segment::new(name, POINTER_WIDTH, SegmentKind::Pointer { format }));
	}

	if let Some(width) = rest.strip_prefix("\"\"") {
		let width = parse_width(spec, width)?;
		return Ok(Segment::new(name, width, SegmentKind::Text));
	}

	if let Some(width) = rest.strip_prefix('^') {
		let width = parse_width(spec, width)?;
		return Ok(Segment::new(name, width, SegmentKind::Unknown));
	}

	if let Some(target) = rest.strip_prefix("|=") {
		let (table, field) = target
			.split_once('/')
			.filter(|(table, field)| !table.is_empty() && !field.is_empty())
			.ok_or_else(|| FormatError::parse(spec, "calculated field needs table/field"))?;
		return Ok(Segment::new(
			name,
			0,
			SegmentKind::Calculated {
				table: table.to_string(),
				field: field.to_string(),
			},
		));
	}

	if let Some(source) = rest.strip_prefix("|b[]") {
		if source.is_empty() {
			return Err(FormatError::parse(spec, "bit array needs a source"));
		}
		let options = enum_options(model, source)
			.ok_or_else(|| FormatError::parse(spec, format!("bit array source {source:?} is not a table")))?;
		let width = options.len().div_ceil(8).max(1);
		return Ok(Segment::new(
			name,
			width,
			SegmentKind::BitArray {
				source: source.to_string(),
			},
		));
	}

	let sigil_end = rest.find(|c| c != '.' && c != ':').unwrap_or(rest.len());
	let (sigil, suffix) = rest.split_at(sigil_end);
	let width = match sigil {
		"." => 1,
		":" => 2,
		":." => 3,
		"::" => 4,
		"" => return Err(FormatError::parse(spec, "segment needs a width")),
		_ => return Err(FormatError::parse(spec, format!("unknown width {sigil:?}"))),
	};

	let kind = match suffix {
		"" => SegmentKind::Integer,
		"|h" => SegmentKind::Hex,
		"|c" if width == 2 => SegmentKind::Color,
		"|c" => return Err(FormatError::parse(spec, "colors are 2 bytes wide")),
		_ => {
			if let Some(elements) = suffix.strip_prefix("|t") {
				parse_tuple(spec, width, elements)?
			} else if suffix.starts_with('|') || suffix.contains(NAME_STOPS) {
				return Err(FormatError::parse(spec, format!("unknown modifier {suffix:?}")));
			} else {
				SegmentKind::Enum {
					source: suffix.to_string(),
				}
			}
		}
	};
	Ok(Segment::new(name, width, kind))
}

fn parse_width(spec: &str, text: &str) -> Result<usize> {
	match text.parse::<usize>() {
		Ok(width) if width > 0 => Ok(width),
		_ => Err(FormatError::parse(spec, format!("expected a positive width, found {text:?}"))),
	}
}

fn parse_tuple(spec: &str, width: usize, text: &str) -> Result<SegmentKind> {
	let text = text
		.strip_prefix('|')
		.ok_or_else(|| FormatError::parse(spec, "tuple needs at least one element"))?;
	let mut elements = Vec::new();
	for part in text.split('|') {
		let name_end = part.find(['.', ':']).unwrap_or(part.len());
		let (name, rest) = part.split_at(name_end);
		let bits_end = rest.find(|c| c != '.' && c != ':').unwrap_or(rest.len());
		let (bits, source) = rest.split_at(bits_end);
		let bits: u32 = bits.chars().map(|c| if c == ':' { 2 } else { 1 }).sum();
		if bits == 0 {
			return Err(FormatError::parse(spec, format!("tuple element {part:?} has no width")));
		}
		elements.push(TupleElement {
			name: name.to_string(),
			bits,
			source: (!source.is_empty()).then(|| source.to_string()),
		});
	}
	let total: u32 = elements.iter().map(|e| e.bits).sum();
	if total as usize > width * 8 {
		return Err(FormatError::parse(spec, format!("{total} bits do not fit in {width} bytes")));
	}
	Ok(SegmentKind::Tuple { elements })
}
