//! The byte buffer, its run index and its anchors.
//!
//! [`DataModel`] is the interface every run operation goes through; [`Model`]
//! is the in-memory implementation. All mutation takes a `&mut Token` that
//! records the change for undo.

use std::collections::{BTreeMap, HashMap};

use hexweave_primitives::{
	Address, ERASE_BYTE, ModelDelta, Notification, POINTER_WIDTH, PointerTarget, SortedSpan, align_up,
};
use tracing::{debug, error, trace};

use crate::config::ModelSettings;
use crate::error::{FormatError, Result};
use crate::factory::RunStrategy;
use crate::run::Run;

#[cfg(test)]
mod tests;

/// The change token threaded through every edit.
pub type Token = ModelDelta<Run>;

/// Access to the buffer and its structure.
pub trait DataModel {
	/// Allocation and validation settings.
	fn settings(&self) -> &ModelSettings;

	/// The whole buffer.
	fn bytes(&self) -> &[u8];

	fn len(&self) -> usize {
		self.bytes().len()
	}

	fn is_empty(&self) -> bool {
		self.bytes().is_empty()
	}

	fn byte(&self, address: Address) -> Option<u8> {
		self.bytes().get(address).copied()
	}

	/// Reads a little-endian value of up to 4 bytes. Bytes past the end read as 0.
	fn read_value(&self, address: Address, width: usize) -> u32 {
		(0..width.min(4)).fold(0, |value, i| value | (u32::from(self.byte(address + i).unwrap_or(0)) << (8 * i)))
	}

	fn read_pointer(&self, address: Address) -> PointerTarget {
		PointerTarget::decode(self.read_value(address, POINTER_WIDTH))
	}

	/// Writes one byte. Returns true if it changed.
	fn write_byte(&mut self, token: &mut Token, address: Address, value: u8) -> bool;

	fn write_bytes(&mut self, token: &mut Token, address: Address, values: &[u8]) {
		for (offset, &value) in values.iter().enumerate() {
			self.write_byte(token, address + offset, value);
		}
	}

	/// Writes a little-endian value of up to 4 bytes.
	fn write_value(&mut self, token: &mut Token, address: Address, width: usize, value: u32) {
		let bytes = value.to_le_bytes();
		self.write_bytes(token, address, &bytes[..width.min(4)]);
	}

	/// Writes raw pointer bytes without touching run bookkeeping.
	fn write_pointer(&mut self, token: &mut Token, address: Address, destination: Option<Address>) {
		self.write_value(token, address, POINTER_WIDTH, PointerTarget::encode(destination));
	}

	/// The run containing `address`, else the first run after it.
	fn next_run(&self, address: Address) -> Option<&Run>;

	/// The run starting exactly at `address`.
	fn run_at(&self, address: Address) -> Option<&Run>;

	/// Every run in address order.
	fn runs(&self) -> Box<dyn Iterator<Item = &Run> + '_>;

	/// Registers `run`, replacing anything it overlaps, and records the pointers it holds.
	fn observe_run_written(&mut self, token: &mut Token, run: Run);

	/// Binds `name` to the start of `run` and registers the run.
	///
	/// Pointers that were waiting for `name` are written and become sources of the run.
	fn observe_anchor_written(&mut self, token: &mut Token, name: &str, run: Run) -> Result<()>;

	/// Removes every run overlapping `start..start + length`.
	fn clear_format(&mut self, token: &mut Token, start: Address, length: usize);

	/// Makes room for `run` to be `minimum_length` bytes long, moving it if needed.
	fn relocate_for_expansion(&mut self, token: &mut Token, run: &Run, minimum_length: usize) -> Result<Run>;

	fn address_of_anchor(&self, name: &str) -> Option<Address>;

	fn anchor_at(&self, address: Address) -> Option<&str>;

	/// Every anchor in address order.
	fn anchors(&self) -> Vec<(String, Address)>;

	/// Pointers written to `name` before it existed.
	fn unmapped_sources_to_anchor(&self, name: &str) -> SortedSpan;

	/// Records that the pointer at `source` is meant to point at `name`.
	fn add_unmapped_source(&mut self, name: &str, source: Address);

	/// Points the pointer at `source` at `destination`, moving it between runs' source sets.
	fn retarget_pointer(&mut self, token: &mut Token, source: Address, destination: Option<Address>);
}

/// In-memory [`DataModel`].
#[derive(Debug, Default)]
pub struct Model {
	bytes: Vec<u8>,
	runs: BTreeMap<Address, Run>,
	anchors: HashMap<String, Address>,
	anchor_names: BTreeMap<Address, String>,
	unmapped: BTreeMap<String, SortedSpan>,
	settings: ModelSettings,
}

impl Model {
	/// Wraps a buffer with default settings and no runs.
	pub fn new(bytes: Vec<u8>) -> Self {
		Self::with_settings(bytes, ModelSettings::default())
	}

	pub fn with_settings(bytes: Vec<u8>, settings: ModelSettings) -> Self {
		Self {
			bytes,
			settings,
			..Self::default()
		}
	}

	pub fn set_settings(&mut self, settings: ModelSettings) {
		self.settings = settings;
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.bytes
	}

	/// Undoes everything recorded in `token`.
	///
	/// Pending unmapped sources are not tracked by tokens and stay as they are.
	pub fn revert(&mut self, token: Token) {
		let undo = token.into_undo();
		undo.revert_bytes(&mut self.bytes);
		for start in &undo.added_runs {
			self.runs.remove(start);
		}
		for (start, run) in undo.removed_runs {
			self.runs.insert(start, run);
		}
		for name in &undo.added_anchors {
			if let Some(address) = self.anchors.remove(name) {
				self.anchor_names.remove(&address);
			}
		}
		for (name, address) in undo.removed_anchors {
			self.anchor_names.insert(address, name.clone());
			self.anchors.insert(name, address);
		}
		debug!(len = self.bytes.len(), runs = self.runs.len(), "token reverted");
	}

	fn remove_run(&mut self, token: &mut Token, start: Address) -> Option<Run> {
		let run = self.runs.remove(&start)?;
		token.record_run_removed(start, run.clone());
		token.notify(Notification::RunRemoved { start });
		Some(run)
	}

	fn insert_run(&mut self, token: &mut Token, run: Run) {
		let start = run.start();
		if let Some(previous) = self.runs.insert(start, run) {
			token.record_run_removed(start, previous);
		}
		token.record_run_added(start);
	}

	fn unbind_anchor(&mut self, token: &mut Token, address: Address) {
		if let Some(name) = self.anchor_names.remove(&address) {
			self.anchors.remove(&name);
			token.record_anchor_removed(&name, address);
		}
	}

	fn bind_anchor(&mut self, token: &mut Token, name: &str, address: Address) {
		self.anchors.insert(name.to_string(), address);
		self.anchor_names.insert(address, name.to_string());
		token.record_anchor_added(name);
		token.notify(Notification::AnchorWritten {
			name: name.to_string(),
			address,
		});
	}

	/// Starts of runs overlapping `start..end`.
	fn overlapping(&self, start: Address, end: Address) -> Vec<Address> {
		let mut starts: Vec<Address> = self
			.runs
			.range(start..end.max(start + 1))
			.map(|(&address, _)| address)
			.collect();
		if let Some((&address, run)) = self.runs.range(..start).next_back() {
			if run.end() > start {
				starts.insert(0, address);
			}
		}
		starts
	}

	/// Adds `source` to the run at `destination`, creating one if nothing is there.
	fn add_source(&mut self, token: &mut Token, source: Address, destination: Address, format: Option<&str>) {
		if let Some(existing) = self.runs.get(&destination) {
			if existing.pointer_sources().contains(source) {
				return;
			}
			let updated = existing.with_sources(existing.pointer_sources().with(source));
			self.insert_run(token, updated);
			return;
		}
		if self.next_run(destination).is_some_and(|run| run.contains(destination)) {
			return;
		}

		if let Some(format) = format {
			match RunStrategy::for_format(format) {
				Ok(strategy) => {
					let name = self.anchor_at(destination).unwrap_or_default().to_string();
					if strategy.try_add_format_at_destination(self, token, source, destination, &name) {
						return;
					}
				}
				Err(err) => error!(format, %err, "pointer format has no strategy"),
			}
		}
		self.observe_run_written(token, Run::no_info(destination, source));
	}

	/// Removes `source` from the run at `destination`.
	///
	/// Unanchored no-info runs with no sources left are dropped.
	fn remove_source(&mut self, token: &mut Token, source: Address, destination: Address) {
		let Some(existing) = self.runs.get(&destination) else {
			return;
		};
		if !existing.pointer_sources().contains(source) {
			return;
		}
		let sources = existing.pointer_sources().without(source);
		if sources.is_empty() && matches!(existing, Run::NoInfo(_)) && !self.anchor_names.contains_key(&destination) {
			self.remove_run(token, destination);
			return;
		}
		let updated = existing.with_sources(sources);
		self.insert_run(token, updated);
	}

	/// Moves a pointer source recorded on the run at `destination` from `from` to `to`.
	fn move_source(&mut self, token: &mut Token, destination: Address, from: Address, to: Address) {
		let Some(existing) = self.runs.get(&destination) else {
			return;
		};
		if !existing.pointer_sources().contains(from) {
			return;
		}
		let updated = existing.with_sources(existing.pointer_sources().without(from).with(to));
		self.insert_run(token, updated);
	}

	fn is_free(&self, start: Address, end: Address, ignore: Option<(Address, Address)>) -> bool {
		if end > self.bytes.len() {
			return false;
		}
		let outside = |address: Address| ignore.is_none_or(|(low, high)| address < low || address >= high);
		if !(start..end).filter(|&address| outside(address)).all(|address| self.bytes[address] == ERASE_BYTE) {
			return false;
		}
		self.overlapping(start, end).into_iter().all(|address| ignore.is_some_and(|(low, _)| address == low))
	}

	fn find_free_space(&self, length: usize, exclude: (Address, Address)) -> Option<Address> {
		let alignment = self.settings.alignment;
		let needed = length + self.settings.free_space_buffer;
		let mut candidate = align_up(self.settings.free_space_start, alignment);
		while candidate + needed <= self.bytes.len() {
			let overlaps_self = candidate < exclude.1 && candidate + needed > exclude.0;
			if overlaps_self {
				candidate = align_up(exclude.1, alignment);
				continue;
			}
			match (candidate..candidate + needed).find(|&address| self.bytes[address] != ERASE_BYTE) {
				Some(used) => candidate = align_up(used + 1, alignment),
				None => match self.overlapping(candidate, candidate + needed).last() {
					Some(&start) => {
						let end = self.runs.get(&start).map_or(start + 1, Run::end);
						candidate = align_up(end.max(candidate + 1), alignment);
					}
					None => return Some(candidate),
				},
			}
		}
		None
	}
}

impl DataModel for Model {
	fn settings(&self) -> &ModelSettings {
		&self.settings
	}

	fn bytes(&self) -> &[u8] {
		&self.bytes
	}

	fn write_byte(&mut self, token: &mut Token, address: Address, value: u8) -> bool {
		token.change_data(&mut self.bytes, address, value)
	}

	fn next_run(&self, address: Address) -> Option<&Run> {
		if let Some((_, run)) = self.runs.range(..=address).next_back() {
			if run.contains(address) {
				return Some(run);
			}
		}
		self.runs.range(address + 1..).next().map(|(_, run)| run)
	}

	fn run_at(&self, address: Address) -> Option<&Run> {
		self.runs.get(&address)
	}

	fn runs(&self) -> Box<dyn Iterator<Item = &Run> + '_> {
		Box::new(self.runs.values())
	}

	fn observe_run_written(&mut self, token: &mut Token, run: Run) {
		let start = run.start();
		let mut sources = run.pointer_sources().clone();
		for existing in self.overlapping(start, run.end()) {
			if let Some(removed) = self.remove_run(token, existing) {
				if existing == start {
					sources = sources.union(removed.pointer_sources());
				} else {
					self.unbind_anchor(token, existing);
				}
			}
		}
		let run = if &sources == run.pointer_sources() { run } else { run.with_sources(sources) };
		let fields = run.pointer_fields();
		trace!(start, length = run.length(), format = %run.format(), "run written");
		self.insert_run(token, run);
		token.notify(Notification::RunWritten { start });

		for (source, format) in fields {
			if let Some(destination) = self.read_pointer(source).address() {
				if destination < self.bytes.len() {
					self.add_source(token, source, destination, format.as_deref());
				}
			}
		}
	}

	fn observe_anchor_written(&mut self, token: &mut Token, name: &str, run: Run) -> Result<()> {
		if name.is_empty() || name.contains(|c: char| c.is_whitespace() || "<>[]\"".contains(c)) {
			return Err(FormatError::parse(name, "anchor names cannot be empty or contain spaces or brackets"));
		}
		let address = run.start();
		if let Some(&previous) = self.anchors.get(name) {
			if previous != address {
				self.unbind_anchor(token, previous);
			}
		}
		if self.anchor_names.get(&address).is_some_and(|existing| existing != name) {
			self.unbind_anchor(token, address);
		}
		if self.anchor_names.get(&address).is_none() {
			self.bind_anchor(token, name, address);
		}

		let mut run = run;
		if let Some(waiting) = self.unmapped.remove(name) {
			for source in &waiting {
				self.write_pointer(token, source, Some(address));
			}
			debug!(name, sources = waiting.len(), "unmapped pointers resolved");
			run = run.with_sources(run.pointer_sources().union(&waiting));
		}
		self.observe_run_written(token, run);
		Ok(())
	}

	fn clear_format(&mut self, token: &mut Token, start: Address, length: usize) {
		for existing in self.overlapping(start, start + length.max(1)) {
			let Some(removed) = self.remove_run(token, existing) else {
				continue;
			};
			self.unbind_anchor(token, existing);
			for (source, _) in removed.pointer_fields() {
				if let Some(destination) = self.read_pointer(source).address() {
					self.remove_source(token, source, destination);
				}
			}
		}
	}

	fn relocate_for_expansion(&mut self, token: &mut Token, run: &Run, minimum_length: usize) -> Result<Run> {
		let start = run.start();
		let current = run.length();
		if minimum_length <= current {
			return Ok(run.clone());
		}
		if self.is_free(start + current, start + minimum_length, Some((start, start + current))) {
			trace!(start, current, minimum_length, "run extended in place");
			return Ok(run.clone());
		}

		let destination = match self.find_free_space(minimum_length, (start, start + current.max(1))) {
			Some(destination) => destination,
			None => {
				let old_len = self.bytes.len();
				let destination = align_up(old_len, self.settings.alignment);
				let new_len = destination + minimum_length;
				if new_len > self.settings.max_length {
					return Err(FormatError::OutOfSpace { length: minimum_length });
				}
				self.bytes.resize(new_len, ERASE_BYTE);
				token.record_expansion(old_len, new_len);
				debug!(old_len, new_len, "buffer expanded for relocation");
				destination
			}
		};

		let data = self.bytes.get(start..start + current).map(<[u8]>::to_vec).unwrap_or_default();
		self.write_bytes(token, destination, &data);
		self.write_bytes(token, start, &vec![ERASE_BYTE; current]);
		for source in run.pointer_sources() {
			self.write_pointer(token, source, Some(destination));
		}

		let fields = run.pointer_fields();
		self.remove_run(token, start);
		let moved = run.relocated(destination);
		self.insert_run(token, moved.clone());
		if let Some(name) = self.anchor_names.get(&start).cloned() {
			self.unbind_anchor(token, start);
			self.bind_anchor(token, &name, destination);
		}
		for (source, _) in fields {
			let moved_source = source - start + destination;
			if let Some(target) = self.read_pointer(moved_source).address() {
				self.move_source(token, target, source, moved_source);
			}
			for waiting in self.unmapped.values_mut() {
				if waiting.remove(source) {
					waiting.insert(moved_source);
				}
			}
		}

		token.notify(Notification::DataMoved {
			from: start,
			to: destination,
			length: current,
		});
		debug!(from = start, to = destination, length = current, "run relocated");
		Ok(moved)
	}

	fn address_of_anchor(&self, name: &str) -> Option<Address> {
		self.anchors.get(name).copied()
	}

	fn anchor_at(&self, address: Address) -> Option<&str> {
		self.anchor_names.get(&address).map(String::as_str)
	}

	fn anchors(&self) -> Vec<(String, Address)> {
		self.anchor_names
			.iter()
			.map(|(&address, name)| (name.clone(), address))
			.collect()
	}

	fn unmapped_sources_to_anchor(&self, name: &str) -> SortedSpan {
		self.unmapped.get(name).cloned().unwrap_or_default()
	}

	fn add_unmapped_source(&mut self, name: &str, source: Address) {
		for waiting in self.unmapped.values_mut() {
			waiting.remove(source);
		}
		self.unmapped.entry(name.to_string()).or_default().insert(source);
	}

	fn retarget_pointer(&mut self, token: &mut Token, source: Address, destination: Option<Address>) {
		if let Some(old) = self.read_pointer(source).address() {
			if Some(old) != destination {
				self.remove_source(token, source, old);
			}
		}
		self.write_pointer(token, source, destination);
		if destination.is_some() {
			for waiting in self.unmapped.values_mut() {
				waiting.remove(source);
			}
			self.unmapped.retain(|_, waiting| !waiting.is_empty());
		}
		if let Some(destination) = destination.filter(|&d| d < self.bytes.len()) {
			self.add_source(token, source, destination, None);
		}
	}
}
