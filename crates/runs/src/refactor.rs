//! Layout refactors of named tables.
//!
//! Every check runs before the first byte is written, so a rejected refactor
//! leaves the token empty.

use tracing::debug;

use crate::end::EndStrategy;
use crate::error::{FormatError, Result};
use crate::format::serialize_table_format;
use crate::model::{DataModel, Token};
use crate::run::Run;
use crate::segment::{Segment, SegmentKind};
use crate::table::TableStreamRun;

/// Swaps the 1-byte field `field` with the 1-byte field at `new_offset`, in the format and in every record.
pub fn move_byte_field(
	model: &mut dyn DataModel,
	token: &mut Token,
	table_name: &str,
	field: &str,
	new_offset: usize,
) -> Result<TableStreamRun> {
	let table = named_table(model, table_name)?;
	let index = byte_field(&table, table_name, field)?;
	if new_offset >= table.element_width() {
		return Err(structural(format!(
			"cannot move {field} to offset {new_offset}: {table_name} records are {} bytes wide",
			table.element_width()
		)));
	}
	let Some(other) = (0..table.segments().len()).find(|&i| table.segment_offset(i) == new_offset && table.segments()[i].width > 0) else {
		return Err(structural(format!("offset {new_offset} is inside a wider field")));
	};
	if table.segments()[other].width != 1 {
		return Err(structural(format!(
			"{} must be a 1-byte field to be replaced",
			table.segments()[other].name
		)));
	}
	if other == index {
		return Ok(table);
	}

	let old_offset = table.segment_offset(index);
	check_end_code_after_swap(model, &table, old_offset, new_offset)?;

	let mut segments: Vec<Segment> = table.segments().to_vec();
	segments.swap(index, other);
	for element in 0..table.element_count() {
		let record = table.element_start(element);
		let a = model.byte(record + old_offset).unwrap_or_default();
		let b = model.byte(record + new_offset).unwrap_or_default();
		model.write_byte(token, record + old_offset, b);
		model.write_byte(token, record + new_offset, a);
	}
	debug!(table = table_name, field, old_offset, new_offset, "byte field moved");
	Ok(rewrite(model, token, &table, segments))
}

/// Turns the 1-byte field `field` into a 2-byte field by absorbing the 1-byte field after it.
///
/// Existing values are kept and the absorbed byte is cleared.
pub fn widen_byte_field(model: &mut dyn DataModel, token: &mut Token, table_name: &str, field: &str) -> Result<TableStreamRun> {
	let table = named_table(model, table_name)?;
	let index = byte_field(&table, table_name, field)?;
	let Some(absorbed) = table.segments().get(index + 1) else {
		return Err(structural(format!("{field} is the last field in {table_name}")));
	};
	if absorbed.width != 1 {
		return Err(structural(format!("{} must be a 1-byte field to be replaced", absorbed.name)));
	}
	let offset = table.segment_offset(index);
	if offset % 2 != 0 {
		return Err(structural(format!("{field} must be at an even offset to widen, found {offset}")));
	}
	let widened = &table.segments()[index];
	if matches!(widened.kind, SegmentKind::BitArray { .. }) {
		return Err(structural(format!("{field} takes its width from its source")));
	}

	let mut segments: Vec<Segment> = table.segments().to_vec();
	segments[index] = Segment::new(widened.name.clone(), 2, widened.kind.clone());
	segments.remove(index + 1);
	for element in 0..table.element_count() {
		model.write_byte(token, table.element_start(element) + offset + 1, 0);
	}
	debug!(table = table_name, field, offset, "byte field widened");
	Ok(rewrite(model, token, &table, segments))
}

fn structural(message: String) -> FormatError {
	FormatError::Structural(message)
}

fn named_table(model: &dyn DataModel, name: &str) -> Result<TableStreamRun> {
	let address = model
		.address_of_anchor(name)
		.ok_or_else(|| structural(format!("couldn't find table {name}")))?;
	match model.run_at(address) {
		Some(Run::Table(table)) => Ok(table.clone()),
		_ => Err(structural(format!("{name} is not a table"))),
	}
}

fn byte_field(table: &TableStreamRun, table_name: &str, field: &str) -> Result<usize> {
	let index = table
		.segment_index(field)
		.ok_or_else(|| structural(format!("couldn't find field {field} in {table_name}")))?;
	if table.segments()[index].width != 1 {
		return Err(structural(format!("{field} must be a 1-byte field to refactor")));
	}
	Ok(index)
}

/// Rejects a swap that would make a record start with the stream's end code.
fn check_end_code_after_swap(model: &dyn DataModel, table: &TableStreamRun, a: usize, b: usize) -> Result<()> {
	let EndStrategy::EndCode { code } = table.end() else {
		return Ok(());
	};
	let start = table.start();
	let mut bytes = model.bytes().get(start..start + table.length()).map(<[u8]>::to_vec).unwrap_or_default();
	for element in 0..table.element_count() {
		let record = element * table.element_width();
		if record + a.max(b) < bytes.len() {
			bytes.swap(record + a, record + b);
		}
	}
	for element in 0..table.element_count() {
		let record = element * table.element_width();
		if bytes.get(record..record + code.len()) == Some(&code[..]) {
			return Err(structural(format!(
				"moving the field would end the stream early at element {element}"
			)));
		}
	}
	Ok(())
}

fn rewrite(model: &mut dyn DataModel, token: &mut Token, table: &TableStreamRun, segments: Vec<Segment>) -> TableStreamRun {
	let format = serialize_table_format(&segments, table.end());
	let updated = TableStreamRun::new(model, table.start(), table.pointer_sources().clone(), format, segments, table.end().clone());
	model.observe_run_written(token, Run::Table(updated.clone()));
	updated
}
