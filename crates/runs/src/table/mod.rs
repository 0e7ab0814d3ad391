//! Table streams: repeating records laid out by a [`TableFormat`](crate::format::TableFormat).

use std::cell::RefCell;
use std::sync::Arc;

use hexweave_primitives::{Address, SortedSpan, text};
use tracing::{debug, trace};

use crate::data_format::{DataFormat, FieldPosition};
use crate::end::EndStrategy;
use crate::error::{FormatError, Result};
use crate::format::{TableFormat, serialize_table_format};
use crate::model::{DataModel, Token};
use crate::segment::{Segment, SegmentKind};

mod autocomplete;
mod serialize;
#[cfg(test)]
mod tests;

pub use autocomplete::AutocompleteItem;

/// A table or stream of fixed-width records.
///
/// Geometry is fixed at construction: `length == element_width * element_count + end.extra_length()`.
/// Any change in geometry produces a new value.
#[derive(Debug, Clone)]
pub struct TableStreamRun {
	start: Address,
	sources: SortedSpan,
	format: Arc<str>,
	segments: Arc<[Segment]>,
	end: EndStrategy,
	element_width: usize,
	element_count: usize,
	length: usize,
	text_cache: RefCell<Option<TextCache>>,
}

#[derive(Debug, Clone)]
struct TextCache {
	field_start: Address,
	position: usize,
	text: Arc<str>,
}

/// Where an address falls inside a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLocation {
	/// Record index.
	pub element: usize,
	/// Segment index within the record.
	pub segment: usize,
	/// Address of the field's first byte.
	pub field_start: Address,
}

impl TableStreamRun {
	/// Builds a run, computing its element count from `end`.
	pub fn new(
		model: &dyn DataModel,
		start: Address,
		sources: SortedSpan,
		format: impl Into<Arc<str>>,
		segments: impl Into<Arc<[Segment]>>,
		end: EndStrategy,
	) -> Self {
		let segments = segments.into();
		let element_width = segments.iter().map(|segment| segment.width).sum();
		let element_count = end.count(model, start, element_width, &sources);
		let length = element_width * element_count + end.extra_length();
		Self {
			start,
			sources,
			format: format.into(),
			segments,
			end,
			element_width,
			element_count,
			length,
			text_cache: RefCell::new(None),
		}
	}

	/// Builds a run at `start` with the layout of `template`.
	pub fn from_parts(model: &dyn DataModel, start: Address, sources: SortedSpan, template: &Self) -> Self {
		Self::new(
			model,
			start,
			sources,
			template.format.clone(),
			template.segments.clone(),
			template.end.clone(),
		)
	}

	/// Parses `format` and checks it against the bytes at `start`.
	///
	/// When pointers are already waiting for an anchor called `name`, any
	/// non-empty stream is accepted. Otherwise the leading share of records
	/// given by the model's match tolerance must validate.
	pub fn try_parse(model: &dyn DataModel, start: Address, sources: SortedSpan, name: &str, format: &str) -> Result<Self> {
		let parsed = TableFormat::parse(model, format)?;
		let run = Self::new(model, start, sources, format, parsed.segments, parsed.end);

		if start >= model.len() {
			return Err(FormatError::Mismatch {
				format: format.to_string(),
				address: start,
			});
		}

		let accepted = if !name.is_empty() && !model.unmapped_sources_to_anchor(name).is_empty() {
			run.element_count > 0
		} else {
			let required = model.settings().required_matches(run.element_count);
			run.data_matches(model, required)
		};

		if accepted {
			trace!(start, format, count = run.element_count, "table format accepted");
			Ok(run)
		} else {
			debug!(start, format, "table format does not match data");
			Err(FormatError::Mismatch {
				format: format.to_string(),
				address: start,
			})
		}
	}

	/// Returns true if every field of the first `elements` records validates.
	pub fn data_matches(&self, model: &dyn DataModel, elements: usize) -> bool {
		(0..elements).all(|element| self.element_matches(model, element))
			&& (self.element_count > 0 || self.end.allows_zero_elements())
	}

	/// True when every field of one record holds a valid value.
	pub fn element_matches(&self, model: &dyn DataModel, element: usize) -> bool {
		let mut address = self.element_start(element);
		self.segments.iter().all(|segment| {
			let matches = segment.matches(model, address);
			address += segment.width;
			matches
		})
	}

	/// Recomputes the geometry at the same address, e.g. after the parent count changed.
	pub fn redescribe(&self, model: &dyn DataModel) -> Self {
		Self::from_parts(model, self.start, self.sources.clone(), self)
	}

	/// The same run with a different set of pointer sources.
	pub fn with_sources(&self, sources: SortedSpan) -> Self {
		Self {
			sources,
			text_cache: RefCell::new(None),
			..self.clone()
		}
	}

	/// The same run after its bytes were copied to `start`.
	pub fn relocated(&self, start: Address) -> Self {
		Self {
			start,
			text_cache: RefCell::new(None),
			..self.clone()
		}
	}

	/// First byte of the run.
	pub fn start(&self) -> Address {
		self.start
	}

	/// Length in bytes, including any end code.
	pub fn length(&self) -> usize {
		self.length
	}

	/// Addresses of the pointers that target this run.
	pub fn pointer_sources(&self) -> &SortedSpan {
		&self.sources
	}

	/// The format string the run was built from.
	pub fn format(&self) -> &str {
		&self.format
	}

	/// The record layout.
	pub fn segments(&self) -> &Arc<[Segment]> {
		&self.segments
	}

	/// The termination rule.
	pub fn end(&self) -> &EndStrategy {
		&self.end
	}

	pub fn element_width(&self) -> usize {
		self.element_width
	}

	pub fn element_count(&self) -> usize {
		self.element_count
	}

	/// Returns false for fixed-length tables.
	pub fn can_append(&self) -> bool {
		self.end.can_append()
	}

	/// Returns true if `address` lies inside the run.
	pub fn contains(&self, address: Address) -> bool {
		address >= self.start && address < self.start + self.length
	}

	/// Index of the segment called `name`.
	pub fn segment_index(&self, name: &str) -> Option<usize> {
		self.segments.iter().position(|segment| segment.name == name)
	}

	/// Byte offset of segment `index` within a record.
	pub fn segment_offset(&self, index: usize) -> usize {
		self.segments[..index.min(self.segments.len())]
			.iter()
			.map(|segment| segment.width)
			.sum()
	}

	/// Address of record `element`.
	pub fn element_start(&self, element: usize) -> Address {
		self.start + element * self.element_width
	}

	/// Finds the record and field holding `address`, if it is inside a record.
	pub fn locate(&self, address: Address) -> Option<FieldLocation> {
		if address < self.start || self.element_width == 0 {
			return None;
		}
		let element = (address - self.start) / self.element_width;
		if element >= self.element_count {
			return None;
		}
		let mut field_start = self.element_start(element);
		for (segment, field) in self.segments.iter().enumerate() {
			if address < field_start + field.width {
				return Some(FieldLocation {
					element,
					segment,
					field_start,
				});
			}
			field_start += field.width;
		}
		None
	}

	/// Addresses of every pointer field, with the segment each belongs to.
	pub fn pointer_fields(&self) -> Vec<(Address, &Segment)> {
		let mut fields = Vec::new();
		for element in 0..self.element_count {
			let mut address = self.element_start(element);
			for segment in self.segments.iter() {
				if matches!(segment.kind, SegmentKind::Pointer { .. }) {
					fields.push((address, segment));
				}
				address += segment.width;
			}
		}
		fields
	}

	/// The first text field of every record, used as enum labels by other tables.
	pub fn read_labels(&self, model: &dyn DataModel) -> Option<Vec<String>> {
		let index = self
			.segments
			.iter()
			.position(|segment| matches!(segment.kind, SegmentKind::Text))?;
		let offset = self.segment_offset(index);
		let width = self.segments[index].width;
		let bytes = model.bytes();
		let labels = (0..self.element_count)
			.map(|element| {
				let start = self.element_start(element) + offset;
				let field = bytes.get(start..start + width).unwrap_or_default();
				text::decode(field).unwrap_or_else(|| text::quote(field).trim_matches('"').to_string())
			})
			.collect();
		Some(labels)
	}

	/// Returns true if any segment takes its values from `anchor`.
	pub fn depends_on(&self, anchor: &str) -> bool {
		self.segments.iter().any(|segment| segment.depends_on(anchor))
	}

	/// Inclusive byte ranges of every enum field over `enum_name` that holds `value`.
	pub fn search(&self, model: &dyn DataModel, enum_name: &str, value: u32) -> Vec<(Address, Address)> {
		let mut results = Vec::new();
		for (index, segment) in self.segments.iter().enumerate() {
			if !matches!(&segment.kind, SegmentKind::Enum { source } if source == enum_name) {
				continue;
			}
			let offset = self.segment_offset(index);
			for element in 0..self.element_count {
				let field = self.element_start(element) + offset;
				if segment.read_value(model, field) == value {
					results.push((field, field + segment.width - 1));
				}
			}
		}
		results.sort_unstable();
		results
	}

	/// A run with the same end token but a new layout, at a new address.
	pub fn duplicate(
		&self,
		model: &dyn DataModel,
		start: Address,
		sources: SortedSpan,
		segments: impl Into<Arc<[Segment]>>,
	) -> Self {
		let segments = segments.into();
		let format = serialize_table_format(&segments, &self.end);
		Self::new(model, start, sources, format, segments, self.end.clone())
	}

	/// Bytes of an empty stream with this format.
	pub fn create_default(&self) -> Vec<u8> {
		match &self.end {
			EndStrategy::EndCode { code } => code.clone(),
			EndStrategy::Fixed { .. } | EndStrategy::LengthFromParent(_) => Vec::new(),
		}
	}

	/// Writes the end code at the start of the run, turning it into an empty stream.
	///
	/// Returns `None` for streams without an end code.
	pub fn try_write_new_end_token(&self, model: &mut dyn DataModel, token: &mut Token) -> Option<Self> {
		let EndStrategy::EndCode { code } = &self.end else {
			return None;
		};
		model.write_bytes(token, self.start, code);
		Some(self.redescribe(model))
	}

	/// Grows the stream by `count` records. Fixed tables are returned unchanged.
	pub fn append(&self, model: &mut dyn DataModel, token: &mut Token, count: usize) -> Result<Self> {
		self.end.append(self, model, token, count as isize)
	}

	/// Resynchronizes the stream after segment `changed_segment` of its parent was written.
	pub fn update_from_parent(&self, model: &mut dyn DataModel, token: &mut Token, changed_segment: usize) -> Result<Self> {
		self.end.update_from_parent(self, model, token, changed_segment)
	}

	/// Presentation value of the byte at `index`.
	pub fn data_format(&self, model: &dyn DataModel, index: Address) -> DataFormat {
		let natural_end = self.start + self.element_width * self.element_count;
		if index >= natural_end {
			return DataFormat::EndStream {
				stream_end: natural_end,
				position: index - natural_end,
				length: self.length - (natural_end - self.start),
			};
		}
		let Some(location) = self.locate(index) else {
			return DataFormat::None;
		};
		let segment = &self.segments[location.segment];
		let field = FieldPosition {
			element: location.element,
			segment: location.segment,
			field_start: location.field_start,
			position: index - location.field_start,
			width: segment.width,
		};
		match &segment.kind {
			SegmentKind::Text => DataFormat::Text {
				text: self.cached_text(model, location.field_start, field.position, segment.width),
				field,
			},
			SegmentKind::Pointer { .. } => DataFormat::Pointer {
				destination: model.read_pointer(location.field_start),
				field,
			},
			SegmentKind::Integer => DataFormat::Integer {
				value: segment.read_value(model, location.field_start),
				field,
			},
			SegmentKind::Unknown
			| SegmentKind::BitArray { .. }
			| SegmentKind::Enum { .. }
			| SegmentKind::Tuple { .. }
			| SegmentKind::Hex
			| SegmentKind::Color
			| SegmentKind::Calculated { .. } => DataFormat::Rendered {
				text: segment.render(model, location.field_start, location.element),
				field,
			},
		}
	}

	fn cached_text(&self, model: &dyn DataModel, field_start: Address, position: usize, width: usize) -> Arc<str> {
		let mut cache = self.text_cache.borrow_mut();
		if let Some(cached) = cache.as_ref() {
			if cached.field_start == field_start && cached.position <= position {
				return cached.text.clone();
			}
		}
		let bytes = model.bytes();
		let end = (field_start + width).min(bytes.len());
		let text: Arc<str> = text::quote(&bytes[field_start.min(end)..end]).into();
		*cache = Some(TextCache {
			field_start,
			position,
			text: text.clone(),
		});
		text
	}

	#[cfg(test)]
	fn text_cache_position(&self) -> Option<(Address, usize)> {
		self.text_cache
			.borrow()
			.as_ref()
			.map(|cache| (cache.field_start, cache.position))
	}
}
