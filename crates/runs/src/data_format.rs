//! Per-byte presentation values handed to a viewer.

use std::sync::Arc;

use hexweave_primitives::{Address, PointerTarget};

/// The field a byte belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPosition {
	/// Record index.
	pub element: usize,
	/// Segment index within the record.
	pub segment: usize,
	/// Address of the field's first byte.
	pub field_start: Address,
	/// Offset of the byte within the field.
	pub position: usize,
	/// Width of the field.
	pub width: usize,
}

/// What one byte of a run means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFormat {
	/// Unformatted byte.
	None,
	/// Part of an integer field.
	Integer { field: FieldPosition, value: u32 },
	/// Part of a text field; `text` is the whole quoted field.
	Text { field: FieldPosition, text: Arc<str> },
	/// Part of a pointer field or pointer run.
	Pointer { field: FieldPosition, destination: PointerTarget },
	/// Part of a field shown through its segment's text form.
	Rendered { field: FieldPosition, text: String },
	/// A byte of a raw run such as ASCII or sprite data.
	Raw { start: Address, position: usize, value: u8 },
	/// Past the last record: the end code of a stream.
	EndStream {
		/// First byte after the records.
		stream_end: Address,
		/// Offset of the byte from `stream_end`.
		position: usize,
		/// Length of the end code.
		length: usize,
	},
}
