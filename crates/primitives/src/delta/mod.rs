//! The change token threaded through every structural edit.
//!
//! A [`ModelDelta`] records every byte the edit touched (first old value, latest
//! new value), every run and anchor it replaced, and the notifications a
//! presentation layer may want to react to. Reverting a delta restores the model
//! to the state it had before the first recorded change.
//!
//! ```text
//! caller ──&mut ModelDelta──► model.write_value ──► change_data (bytes)
//!                         └─► model.observe_run_written ──► record_run_removed / added
//!                         └─► model.relocate_for_expansion ──► notify(DataMoved)
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::address::Address;

#[cfg(test)]
mod tests;

/// One byte's change inside a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteChange {
	/// Value before the delta's first write to this address.
	pub old: u8,
	/// Value after the delta's latest write to this address.
	pub new: u8,
}

/// Something a presentation layer may want to know about after an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
	/// A run moved to make room for growth.
	DataMoved {
		/// Start of the run before relocation.
		from: Address,
		/// Start of the run after relocation.
		to: Address,
		/// Number of bytes copied.
		length: usize,
	},
	/// A run was registered or replaced at `start`.
	RunWritten {
		/// Start of the registered run.
		start: Address,
	},
	/// A run was removed from the index.
	RunRemoved {
		/// Start of the removed run.
		start: Address,
	},
	/// An anchor name was bound to an address.
	AnchorWritten {
		/// The anchor name.
		name: String,
		/// The bound address.
		address: Address,
	},
	/// The buffer grew to make room for relocated data.
	BufferExpanded {
		/// Length before growth.
		old_len: usize,
		/// Length after growth.
		new_len: usize,
	},
}

/// Undoable record of one edit against a byte buffer and its run index.
///
/// `R` is the run snapshot type kept for metadata undo.
#[derive(Debug)]
pub struct ModelDelta<R> {
	data: BTreeMap<Address, ByteChange>,
	removed_runs: BTreeMap<Address, R>,
	added_runs: BTreeSet<Address>,
	removed_anchors: BTreeMap<String, Address>,
	added_anchors: BTreeSet<String>,
	original_len: Option<usize>,
	notifications: Vec<Notification>,
}

impl<R> Default for ModelDelta<R> {
	fn default() -> Self {
		Self {
			data: BTreeMap::new(),
			removed_runs: BTreeMap::new(),
			added_runs: BTreeSet::new(),
			removed_anchors: BTreeMap::new(),
			added_anchors: BTreeSet::new(),
			original_len: None,
			notifications: Vec::new(),
		}
	}
}

impl<R> ModelDelta<R> {
	/// Creates an empty delta.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true if the delta recorded nothing.
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
			&& self.removed_runs.is_empty()
			&& self.added_runs.is_empty()
			&& self.removed_anchors.is_empty()
			&& self.added_anchors.is_empty()
			&& self.original_len.is_none()
	}

	/// Returns true if any byte changed value.
	pub fn has_data_change(&self) -> bool {
		self.data.values().any(|change| change.old != change.new)
	}

	/// Writes `value` at `address` in `bytes`, recording the change.
	///
	/// Returns false (and records nothing) when the byte already holds `value`.
	/// Addresses outside `bytes` are ignored.
	pub fn change_data(&mut self, bytes: &mut [u8], address: Address, value: u8) -> bool {
		let Some(slot) = bytes.get_mut(address) else {
			return false;
		};
		if *slot == value {
			return false;
		}
		self.data
			.entry(address)
			.and_modify(|change| change.new = value)
			.or_insert(ByteChange { old: *slot, new: value });
		*slot = value;
		true
	}

	/// Writes a run of bytes starting at `address`.
	pub fn change_range(&mut self, bytes: &mut [u8], address: Address, values: &[u8]) {
		for (offset, &value) in values.iter().enumerate() {
			self.change_data(bytes, address + offset, value);
		}
	}

	/// Recorded byte changes, ordered by address.
	pub fn data_changes(&self) -> impl Iterator<Item = (Address, ByteChange)> + '_ {
		self.data.iter().map(|(&address, &change)| (address, change))
	}

	/// Records that the buffer grew from `old_len`.
	pub fn record_expansion(&mut self, old_len: usize, new_len: usize) {
		self.original_len.get_or_insert(old_len);
		self.notify(Notification::BufferExpanded { old_len, new_len });
	}

	/// Records that `run` was removed from the index at `start`.
	///
	/// Only the first snapshot per address is kept, and runs added by this same
	/// delta are not snapshotted.
	pub fn record_run_removed(&mut self, start: Address, run: R) {
		if self.added_runs.contains(&start) {
			return;
		}
		self.removed_runs.entry(start).or_insert(run);
	}

	/// Records that a run was inserted into the index at `start`.
	pub fn record_run_added(&mut self, start: Address) {
		self.added_runs.insert(start);
	}

	/// Records that `name` was unbound from `address`.
	pub fn record_anchor_removed(&mut self, name: &str, address: Address) {
		if self.added_anchors.contains(name) {
			return;
		}
		self.removed_anchors.entry(name.to_string()).or_insert(address);
	}

	/// Records that `name` was bound.
	pub fn record_anchor_added(&mut self, name: &str) {
		self.added_anchors.insert(name.to_string());
	}

	/// Appends a notification.
	pub fn notify(&mut self, notification: Notification) {
		self.notifications.push(notification);
	}

	/// Notifications recorded so far, in order.
	pub fn notifications(&self) -> &[Notification] {
		&self.notifications
	}

	/// Removes and returns the notifications recorded so far.
	pub fn take_notifications(&mut self) -> Vec<Notification> {
		std::mem::take(&mut self.notifications)
	}

	/// Splits the delta into the pieces needed to undo it.
	pub fn into_undo(self) -> UndoParts<R> {
		UndoParts {
			data: self.data,
			removed_runs: self.removed_runs,
			added_runs: self.added_runs,
			removed_anchors: self.removed_anchors,
			added_anchors: self.added_anchors,
			original_len: self.original_len,
		}
	}
}

/// The contents of a consumed [`ModelDelta`], ready to be applied in reverse.
#[derive(Debug)]
pub struct UndoParts<R> {
	/// Byte changes; restore each `old` value.
	pub data: BTreeMap<Address, ByteChange>,
	/// Run snapshots to reinsert.
	pub removed_runs: BTreeMap<Address, R>,
	/// Run starts to drop before reinserting snapshots.
	pub added_runs: BTreeSet<Address>,
	/// Anchor bindings to restore.
	pub removed_anchors: BTreeMap<String, Address>,
	/// Anchor names to unbind before restoring.
	pub added_anchors: BTreeSet<String>,
	/// Buffer length to truncate back to, if the buffer grew.
	pub original_len: Option<usize>,
}

impl<R> UndoParts<R> {
	/// Restores the recorded bytes and truncates any growth.
	pub fn revert_bytes(&self, bytes: &mut Vec<u8>) {
		for (&address, change) in self.data.iter().rev() {
			if let Some(slot) = bytes.get_mut(address) {
				*slot = change.old;
			}
		}
		if let Some(len) = self.original_len {
			bytes.truncate(len);
		}
	}
}
