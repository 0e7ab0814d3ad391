//! How a stream decides where it ends, and how it grows.

use std::fmt;

use hexweave_primitives::{Address, ERASE_BYTE, SortedSpan};
use tracing::{debug, trace, warn};

use crate::error::{FormatError, Result};
use crate::model::{DataModel, Token};
use crate::run::Run;
use crate::table::TableStreamRun;

/// Termination rule of a table stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndStrategy {
	/// The element count is written into the format.
	Fixed {
		/// Number of elements.
		count: usize,
	},
	/// The stream ends at the first element-aligned occurrence of a byte sequence.
	EndCode {
		/// Sentinel bytes following the last element.
		code: Vec<u8>,
	},
	/// The element count is a field of the table that points at the stream.
	LengthFromParent(ParentLink),
}

/// Where a [`EndStrategy::LengthFromParent`] stream reads its count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
	/// Anchor of the parent table; empty to infer it from the pointer sources.
	pub parent: String,
	/// Name of the count field in the parent.
	pub field: String,
}

/// A parent table resolved for one stream.
struct ParentMatch {
	table: TableStreamRun,
	segment: usize,
	/// Element of the parent whose count field governs the stream.
	element: usize,
}

impl EndStrategy {
	/// Parses the text after a table format's closing `]`.
	pub fn parse(token: &str) -> Result<Self> {
		if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
			let count = token
				.parse()
				.map_err(|_| FormatError::parse(token, "count out of range"))?;
			return Ok(Self::Fixed { count });
		}
		if let Some(hex) = token.strip_prefix('!') {
			if hex.is_empty() || hex.len() % 2 != 0 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
				return Err(FormatError::parse(token, "end code needs an even number of hex digits"));
			}
			let code = (0..hex.len())
				.step_by(2)
				.map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
				.collect::<std::result::Result<Vec<_>, _>>()
				.map_err(|_| FormatError::parse(token, "invalid end code"))?;
			return Ok(Self::EndCode { code });
		}
		if let Some((parent, field)) = token.split_once('/') {
			if field.is_empty() || field.contains('/') {
				return Err(FormatError::parse(token, "expected parent/field"));
			}
			return Ok(Self::LengthFromParent(ParentLink {
				parent: parent.to_string(),
				field: field.to_string(),
			}));
		}
		Err(FormatError::parse(token, "expected a count, !ENDCODE or parent/field"))
	}

	/// Bytes after the last element that belong to the stream.
	pub fn extra_length(&self) -> usize {
		match self {
			Self::EndCode { code } => code.len(),
			Self::Fixed { .. } | Self::LengthFromParent(_) => 0,
		}
	}

	/// Returns false for fixed-length streams.
	pub fn can_append(&self) -> bool {
		!matches!(self, Self::Fixed { .. })
	}

	/// Returns true if a stream with no elements is still a stream.
	pub fn allows_zero_elements(&self) -> bool {
		matches!(self, Self::EndCode { .. })
	}

	/// Number of elements of a stream at `start` whose elements are `width` bytes.
	pub fn count(&self, model: &dyn DataModel, start: Address, width: usize, sources: &SortedSpan) -> usize {
		match self {
			Self::Fixed { count } => *count,
			Self::EndCode { code } => scan_for_end_code(model.bytes(), start, width, code),
			Self::LengthFromParent(link) => match link.resolve(model, sources) {
				Some(parent) => parent.read_count(model).max(1) as usize,
				None => 1,
			},
		}
	}

	/// Grows (or, with a negative `delta`, shrinks) a stream by `delta` elements.
	///
	/// The stream may move. The returned run is already registered with `model`.
	pub fn append(
		&self,
		run: &TableStreamRun,
		model: &mut dyn DataModel,
		token: &mut Token,
		delta: isize,
	) -> Result<TableStreamRun> {
		match self {
			Self::Fixed { .. } => Ok(run.clone()),
			Self::EndCode { code } => append_end_code(run, model, token, code, delta),
			Self::LengthFromParent(link) => {
				let Some(parent) = link.resolve(model, run.pointer_sources()) else {
					debug!(start = run.start(), "stream has no parent; append ignored");
					return Ok(run.clone());
				};
				let new_count = (run.element_count() as isize + delta).max(0) as usize;
				parent.write_counts(model, token, run.pointer_sources(), new_count);
				resize_records(run, model, token, delta)
			}
		}
	}

	/// Resynchronizes a stream after field `changed_segment` of its parent was written.
	pub fn update_from_parent(
		&self,
		run: &TableStreamRun,
		model: &mut dyn DataModel,
		token: &mut Token,
		changed_segment: usize,
	) -> Result<TableStreamRun> {
		let Self::LengthFromParent(link) = self else {
			return Ok(run.clone());
		};
		let Some(parent) = link.resolve(model, run.pointer_sources()) else {
			return Ok(run.clone());
		};
		if parent.segment != changed_segment {
			return Ok(run.clone());
		}

		let count = run.element_count();
		let target = parent.read_count(model).max(1) as usize;
		if target == count {
			return Ok(run.clone());
		}

		let updated = if target > count && can_redescribe(run, model, target) {
			trace!(start = run.start(), count, target, "stream redescribed in place");
			let updated = run.redescribe(model);
			model.observe_run_written(token, Run::Table(updated.clone()));
			updated
		} else {
			debug!(start = run.start(), count, target, "stream resized from parent");
			self.append(run, model, token, target as isize - count as isize)?
		};

		if let Some(parent) = link.resolve(model, updated.pointer_sources()) {
			parent.write_counts(model, token, updated.pointer_sources(), updated.element_count());
		}
		Ok(updated)
	}
}

impl fmt::Display for EndStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Fixed { count } => write!(f, "{count}"),
			Self::EndCode { code } => {
				f.write_str("!")?;
				code.iter().try_for_each(|b| write!(f, "{b:02X}"))
			}
			Self::LengthFromParent(link) => write!(f, "{}/{}", link.parent, link.field),
		}
	}
}

impl ParentLink {
	fn resolve(&self, model: &dyn DataModel, sources: &SortedSpan) -> Option<ParentMatch> {
		let (table, source) = if self.parent.is_empty() {
			sources.iter().find_map(|source| {
				let Some(Run::Table(table)) = model.next_run(source) else {
					return None;
				};
				(table.contains(source) && table.segment_index(&self.field).is_some()).then(|| (table.clone(), Some(source)))
			})?
		} else {
			let address = model.address_of_anchor(&self.parent)?;
			let Some(Run::Table(table)) = model.run_at(address) else {
				return None;
			};
			let source = sources.iter().find(|&source| table.contains(source));
			(table.clone(), source)
		};

		let segment = table.segment_index(&self.field)?;
		let element = source.map_or(0, |source| (source - table.start()) / table.element_width().max(1));
		Some(ParentMatch { table, segment, element })
	}
}

impl ParentMatch {
	fn count_address(&self, element: usize) -> Address {
		self.table.element_start(element) + self.table.segment_offset(self.segment)
	}

	fn width(&self) -> usize {
		self.table.segments()[self.segment].width
	}

	fn read_count(&self, model: &dyn DataModel) -> u32 {
		model.read_value(self.count_address(self.element), self.width())
	}

	/// Writes `count` into the count field of every parent element that points at the stream.
	fn write_counts(&self, model: &mut dyn DataModel, token: &mut Token, sources: &SortedSpan, count: usize) {
		for source in sources {
			if !self.table.contains(source) {
				continue;
			}
			let element = (source - self.table.start()) / self.table.element_width().max(1);
			if element >= self.table.element_count() {
				continue;
			}
			let address = self.count_address(element);
			if model.read_value(address, self.width()) != count as u32 {
				model.write_value(token, address, self.width(), count as u32);
			}
		}
	}
}

fn scan_for_end_code(bytes: &[u8], mut start: Address, width: usize, code: &[u8]) -> usize {
	if code.is_empty() {
		return 0;
	}
	let mut count = 0;
	loop {
		let Some(candidate) = bytes.get(start..start + code.len()) else {
			return 0;
		};
		if candidate == code {
			return count;
		}
		if width == 0 {
			return 0;
		}
		count += 1;
		start += width;
	}
}

/// True when the bytes after a stream already look like `target` elements and
/// nothing else claims them.
fn can_redescribe(run: &TableStreamRun, model: &dyn DataModel, target: usize) -> bool {
	let end = run.start() + run.element_width() * run.element_count();
	let implied_end = run.start() + run.element_width() * target;
	if implied_end > model.len() {
		return false;
	}
	if model.bytes()[end..implied_end].iter().all(|&b| b == ERASE_BYTE) {
		return false;
	}
	if let Some(next) = model.next_run(end) {
		if next.start() != run.start() && next.start() < implied_end {
			return false;
		}
	}
	run.data_matches(model, target)
}

fn append_end_code(
	run: &TableStreamRun,
	model: &mut dyn DataModel,
	token: &mut Token,
	code: &[u8],
	delta: isize,
) -> Result<TableStreamRun> {
	let width = run.element_width();
	let natural = width * run.element_count();
	let new_natural = (natural as isize + delta * width as isize).max(0) as usize;
	let moved = model.relocate_for_expansion(token, &Run::Table(run.clone()), new_natural + code.len())?;
	let start = moved.start();

	let added = run.element_count()..new_natural / width.max(1);
	if new_natural > natural {
		for element in added.clone() {
			write_empty_record(run, model, token, start + element * width);
		}
	} else {
		let erased = vec![ERASE_BYTE; natural + code.len() - new_natural];
		model.write_bytes(token, start + new_natural, &erased);
	}
	model.write_bytes(token, start + new_natural, code);

	// Records are checked once the sentinel is in place, since a short record
	// can read as the end code together with the bytes after it.
	if new_natural > natural {
		for element in added {
			let record = start + element * width;
			if !reads_as_end_code(model, record, code) {
				continue;
			}
			if element > 0 {
				warn!(record, "empty record reads as the end code; repeating the previous record");
				let previous = model.bytes()[record - width..record].to_vec();
				model.write_bytes(token, record, &previous);
			}
			if let (true, Some(&first)) = (reads_as_end_code(model, record, code), code.first()) {
				warn!(record, "empty record reads as the end code; changing its first byte");
				model.write_byte(token, record, !first);
			}
		}
	}

	let updated = TableStreamRun::from_parts(model, start, moved.pointer_sources().clone(), run);
	trace!(start, count = updated.element_count(), "end-code stream resized");
	model.observe_run_written(token, Run::Table(updated.clone()));
	Ok(updated)
}

fn resize_records(run: &TableStreamRun, model: &mut dyn DataModel, token: &mut Token, delta: isize) -> Result<TableStreamRun> {
	let width = run.element_width();
	let natural = run.length();
	let new_length = (natural as isize + delta * width as isize).max(0) as usize;
	let moved = model.relocate_for_expansion(token, &Run::Table(run.clone()), new_length)?;
	let start = moved.start();

	if new_length > natural {
		for element in run.element_count()..new_length / width.max(1) {
			write_empty_record(run, model, token, start + element * width);
		}
	} else {
		let erased = vec![ERASE_BYTE; natural - new_length];
		model.write_bytes(token, start + new_length, &erased);
	}

	let updated = TableStreamRun::from_parts(model, start, moved.pointer_sources().clone(), run);
	model.observe_run_written(token, Run::Table(updated.clone()));
	Ok(updated)
}

fn reads_as_end_code(model: &dyn DataModel, record: Address, code: &[u8]) -> bool {
	model.bytes().get(record..record + code.len()) == Some(code)
}

fn write_empty_record(run: &TableStreamRun, model: &mut dyn DataModel, token: &mut Token, record: Address) {
	let mut offset = 0;
	for segment in run.segments().iter() {
		segment.write_empty(model, token, record + offset);
		offset += segment.width;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_each_end_token() {
		assert_eq!(EndStrategy::parse("12").unwrap(), EndStrategy::Fixed { count: 12 });
		assert_eq!(
			EndStrategy::parse("!ff00").unwrap(),
			EndStrategy::EndCode { code: vec![0xFF, 0x00] }
		);
		assert_eq!(
			EndStrategy::parse("/count").unwrap(),
			EndStrategy::LengthFromParent(ParentLink {
				parent: String::new(),
				field: "count".into(),
			})
		);
	}

	#[test]
	fn rejects_malformed_end_tokens() {
		for token in ["", "!F", "!GG", "a/b/c", "abc", "x/"] {
			assert!(matches!(EndStrategy::parse(token), Err(FormatError::Parse { .. })), "{token}");
		}
	}

	#[test]
	fn end_code_is_serialized_uppercase() {
		assert_eq!(EndStrategy::parse("!ab01").unwrap().to_string(), "!AB01");
	}

	#[test]
	fn end_code_scan_stops_at_buffer_end() {
		let bytes = [1, 2, 3, 4, 0xFF, 0xFF];
		assert_eq!(scan_for_end_code(&bytes, 0, 2, &[0xFF, 0xFF]), 2);
		assert_eq!(scan_for_end_code(&bytes, 0, 4, &[0xFF, 0xFF]), 1);
		assert_eq!(scan_for_end_code(&bytes, 0, 3, &[0xFF, 0xFF]), 0);
		assert_eq!(scan_for_end_code(&bytes, 10, 2, &[0xFF, 0xFF]), 0);
		assert_eq!(scan_for_end_code(&bytes, 0, 0, &[0x02]), 0);
	}
}
