//! Edits that go through a table's record layout.
//!
//! Writing a field is more than a byte write: pointer fields move sources
//! between runs and may materialize the destination's format, and count fields
//! drive the length of `parent/field` streams.

use std::collections::BTreeSet;

use hexweave_primitives::{Address, ERASE_BYTE, Notification};
use tracing::{debug, trace};

use crate::end::EndStrategy;
use crate::error::{FormatError, Result};
use crate::factory::RunStrategy;
use crate::model::{DataModel, Token};
use crate::run::Run;
use crate::segment::SegmentKind;
use crate::table::TableStreamRun;

/// Writes one field of the table holding `address` from record text.
///
/// Returns the notifications recorded on `token` during the call.
pub fn write_field(model: &mut dyn DataModel, token: &mut Token, address: Address, text: &str) -> Result<Vec<Notification>> {
	let before = token.notifications().len();
	let table = table_holding(model, address)?;
	let Some(location) = table.locate(address) else {
		return Err(FormatError::NotATable(address));
	};
	let segment = table.segments()[location.segment].clone();
	let changed = segment.write(model, token, location.field_start, text);
	trace!(
		field = %segment.name,
		element = location.element,
		changed,
		"field written"
	);

	if let SegmentKind::Pointer { format: Some(format) } = &segment.kind {
		if let Some(destination) = model.read_pointer(location.field_start).address() {
			materialize_destination(model, token, location.field_start, destination, format)?;
		}
	}

	if changed {
		resync_children(model, token, &table, location.element, location.segment)?;
	}
	Ok(token.notifications()[before..].to_vec())
}

/// Appends `count` records to the table starting at `start`.
///
/// Returns the notifications recorded on `token` during the call.
pub fn append_elements(model: &mut dyn DataModel, token: &mut Token, start: Address, count: usize) -> Result<Vec<Notification>> {
	let before = token.notifications().len();
	let Some(Run::Table(table)) = model.run_at(start).cloned() else {
		return Err(FormatError::NotATable(start));
	};
	let grown = table.append(model, token, count)?;
	debug!(
		start,
		new_start = grown.start(),
		count = grown.element_count(),
		"elements appended"
	);
	Ok(token.notifications()[before..].to_vec())
}

fn table_holding(model: &dyn DataModel, address: Address) -> Result<TableStreamRun> {
	match model.next_run(address) {
		Some(Run::Table(table)) if table.contains(address) => Ok(table.clone()),
		_ => Err(FormatError::NotATable(address)),
	}
}

/// Gives a pointer's destination the format the pointer field declares.
///
/// Existing bytes are kept when they validate; an erased destination gets a
/// default run. Anything else is left as a plain pointer destination.
fn materialize_destination(
	model: &mut dyn DataModel,
	token: &mut Token,
	source: Address,
	destination: Address,
	format: &str,
) -> Result<()> {
	if destination >= model.len() {
		return Ok(());
	}
	match model.run_at(destination) {
		None | Some(Run::NoInfo(_)) => {}
		Some(_) => return Ok(()),
	}
	let strategy = RunStrategy::for_format(format)?;
	let name = model.anchor_at(destination).unwrap_or_default().to_string();
	if strategy.try_add_format_at_destination(model, token, source, destination, &name) {
		return Ok(());
	}
	let length = strategy.length_for_new_run(model, source).max(1);
	let erased = model
		.bytes()
		.get(destination..destination + length)
		.is_some_and(|bytes| bytes.iter().all(|&b| b == ERASE_BYTE));
	if erased {
		strategy.write_new_run(model, token, source, destination, &name)?;
	} else {
		debug!(destination, format, "destination bytes do not fit pointer format");
	}
	Ok(())
}

/// Resynchronizes every `parent/field` stream governed by `segment` of `element`.
fn resync_children(
	model: &mut dyn DataModel,
	token: &mut Token,
	table: &TableStreamRun,
	element: usize,
	segment: usize,
) -> Result<()> {
	let mut children = BTreeSet::new();
	let element_start = table.element_start(element);
	let element_end = element_start + table.element_width();
	for (field, _) in table.pointer_fields() {
		if field < element_start || field >= element_end {
			continue;
		}
		if let Some(destination) = model.read_pointer(field).address() {
			children.insert(destination);
		}
	}
	if let Some(name) = model.anchor_at(table.start()) {
		for run in model.runs() {
			if let Run::Table(child) = run {
				if matches!(child.end(), EndStrategy::LengthFromParent(link) if link.parent == name) {
					children.insert(child.start());
				}
			}
		}
	}

	for start in children {
		let Some(Run::Table(child)) = model.run_at(start).cloned() else {
			continue;
		};
		if !matches!(child.end(), EndStrategy::LengthFromParent(_)) {
			continue;
		}
		let updated = child.update_from_parent(model, token, segment)?;
		if updated.element_count() != child.element_count() {
			debug!(
				child = start,
				from = child.element_count(),
				to = updated.element_count(),
				"child stream resynchronized"
			);
		}
	}
	Ok(())
}
