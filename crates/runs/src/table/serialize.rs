//! Record text: one line per record, or one labelled line per field for
//! single-record tables.

use hexweave_primitives::Address;
use tracing::trace;

use super::TableStreamRun;
use crate::end::EndStrategy;
use crate::error::Result;
use crate::model::{DataModel, Token};
use crate::tokenize::{strip_label, tokenize_line};

impl TableStreamRun {
	/// Returns true for `[…]1` tables, which serialize one field per line.
	pub fn is_single_element(&self) -> bool {
		matches!(self.end, EndStrategy::Fixed { count: 1 })
	}

	/// Renders every record as text.
	pub fn serialize(&self, model: &dyn DataModel) -> String {
		if self.is_single_element() {
			return self.serialize_single_element(model);
		}
		(0..self.element_count)
			.map(|element| self.serialize_element(model, element))
			.collect::<Vec<_>>()
			.join("\n")
	}

	/// Renders one record as a line of comma-separated fields.
	pub fn serialize_element(&self, model: &dyn DataModel, element: usize) -> String {
		let mut address = self.element_start(element);
		let mut fields = Vec::with_capacity(self.segments.len());
		for segment in self.segments.iter() {
			fields.push(segment.render(model, address, element));
			address += segment.width;
		}
		fields.join(", ")
	}

	fn serialize_single_element(&self, model: &dyn DataModel) -> String {
		let longest = self.segments.iter().map(|segment| segment.name.len()).max().unwrap_or(0);
		let mut address = self.start;
		let mut lines = Vec::with_capacity(self.segments.len());
		for segment in self.segments.iter() {
			let padding = " ".repeat(longest - segment.name.len());
			lines.push(format!("  {}:{padding} {}", segment.name, segment.render(model, address, 0)));
			address += segment.width;
		}
		lines.join("\n")
	}

	/// Writes records from text and returns the resulting run.
	///
	/// More lines than records grows the stream first; fewer lines leave the
	/// stream's length alone and write empty values into the remaining records.
	pub fn deserialize(&self, model: &mut dyn DataModel, token: &mut Token, content: &str) -> Result<Self> {
		if self.is_single_element() {
			self.deserialize_single_element(model, token, content);
			return Ok(self.clone());
		}

		let lines: Vec<&str> = content.lines().filter(|line| !line.trim().is_empty()).collect();
		let run = if lines.len() > self.element_count && self.can_append() {
			self.append(model, token, lines.len() - self.element_count)?
		} else {
			self.clone()
		};
		trace!(start = run.start, lines = lines.len(), count = run.element_count, "deserializing stream");

		for element in 0..run.element_count {
			let tokens = lines.get(element).map(|line| tokenize_line(line)).unwrap_or_default();
			let mut address = run.element_start(element);
			for (index, segment) in run.segments.iter().enumerate() {
				let value = tokens.get(index).map(|field| strip_label(field)).unwrap_or("");
				segment.write(model, token, address, value);
				address += segment.width;
			}
		}
		Ok(run)
	}

	fn deserialize_single_element(&self, model: &mut dyn DataModel, token: &mut Token, content: &str) {
		let lines: Vec<&str> = content.lines().collect();
		let mut address: Address = self.start;
		for (index, segment) in self.segments.iter().enumerate() {
			let value = lines
				.get(index)
				.map(|line| line.split_once(':').map_or(*line, |(_, value)| value))
				.unwrap_or("");
			segment.write(model, token, address, value);
			address += segment.width;
		}
	}
}
