use smallvec::SmallVec;

use crate::address::Address;

/// An ordered set of unique addresses.
///
/// Runs use this for their pointer sources: most runs have one or two sources,
/// so the addresses live inline until the set grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortedSpan {
	items: SmallVec<[Address; 2]>,
}

impl SortedSpan {
	/// Creates an empty span.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a span holding one address.
	pub fn single(address: Address) -> Self {
		let mut span = Self::new();
		span.items.push(address);
		span
	}

	/// Number of addresses in the span.
	pub fn len(&self) -> usize {
		self.items.len()
	}

	/// Returns true if the span has no addresses.
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Returns true if `address` is in the span.
	pub fn contains(&self, address: Address) -> bool {
		self.items.binary_search(&address).is_ok()
	}

	/// Iterates the addresses in ascending order.
	pub fn iter(&self) -> impl Iterator<Item = Address> + '_ {
		self.items.iter().copied()
	}

	/// The lowest address, if any.
	pub fn first(&self) -> Option<Address> {
		self.items.first().copied()
	}

	/// Returns the addresses as a slice.
	pub fn as_slice(&self) -> &[Address] {
		&self.items
	}

	/// Returns a copy of this span with `address` added.
	pub fn with(&self, address: Address) -> Self {
		let mut span = self.clone();
		span.insert(address);
		span
	}

	/// Returns a copy of this span with `address` removed.
	pub fn without(&self, address: Address) -> Self {
		let mut span = self.clone();
		span.remove(address);
		span
	}

	/// Returns the union of two spans.
	pub fn union(&self, other: &SortedSpan) -> Self {
		let mut span = self.clone();
		for address in other.iter() {
			span.insert(address);
		}
		span
	}

	/// Adds `address`, keeping order. Returns false if it was already present.
	pub fn insert(&mut self, address: Address) -> bool {
		match self.items.binary_search(&address) {
			Ok(_) => false,
			Err(index) => {
				self.items.insert(index, address);
				true
			}
		}
	}

	/// Removes `address`. Returns false if it was absent.
	pub fn remove(&mut self, address: Address) -> bool {
		match self.items.binary_search(&address) {
			Ok(index) => {
				self.items.remove(index);
				true
			}
			Err(_) => false,
		}
	}
}

impl FromIterator<Address> for SortedSpan {
	fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
		let mut span = Self::new();
		for address in iter {
			span.insert(address);
		}
		span
	}
}

impl<'a> IntoIterator for &'a SortedSpan {
	type Item = Address;
	type IntoIter = std::iter::Copied<std::slice::Iter<'a, Address>>;

	fn into_iter(self) -> Self::IntoIter {
		self.items.iter().copied()
	}
}
