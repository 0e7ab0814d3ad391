//! Buffer addresses and the 4-byte pointer encoding used inside cartridge images.

use std::fmt;

/// A byte offset into the model's buffer.
pub type Address = usize;

/// The value that marks free space in the buffer.
pub const ERASE_BYTE: u8 = 0xFF;

/// Mapped base address of the cartridge. Stored pointers are `POINTER_OFFSET + address`.
pub const POINTER_OFFSET: u32 = 0x0800_0000;

/// Width in bytes of a stored pointer.
pub const POINTER_WIDTH: usize = 4;

/// Largest buffer a stored pointer can reach.
pub const MAX_POINTER_SPAN: usize = 0x0200_0000;

/// The decoded meaning of a raw 4-byte pointer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerTarget {
	/// The raw value was zero.
	Null,
	/// The raw value points at a buffer address.
	Address(Address),
	/// The raw value is neither null nor inside the mapped cartridge window.
	Invalid(u32),
}

impl PointerTarget {
	/// Decodes a raw little-endian pointer value.
	pub fn decode(raw: u32) -> Self {
		if raw == 0 {
			return Self::Null;
		}
		match raw.checked_sub(POINTER_OFFSET) {
			Some(address) if (address as usize) < MAX_POINTER_SPAN => Self::Address(address as usize),
			_ => Self::Invalid(raw),
		}
	}

	/// Encodes a destination into the raw value stored in the buffer.
	pub fn encode(destination: Option<Address>) -> u32 {
		match destination {
			Some(address) => POINTER_OFFSET + address as u32,
			None => 0,
		}
	}

	/// Returns the destination address, if the pointer has one.
	pub fn address(self) -> Option<Address> {
		match self {
			Self::Address(address) => Some(address),
			Self::Null | Self::Invalid(_) => None,
		}
	}

	/// Returns true for a null pointer or one whose destination lies below `limit`.
	pub fn is_valid_within(self, limit: usize) -> bool {
		match self {
			Self::Null => true,
			Self::Address(address) => address < limit,
			Self::Invalid(_) => false,
		}
	}
}

impl fmt::Display for PointerTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => f.write_str("<null>"),
			Self::Address(address) => write!(f, "<{address:06X}>"),
			Self::Invalid(raw) => write!(f, "<{:06X}>", raw.wrapping_sub(POINTER_OFFSET)),
		}
	}
}

/// Formats an address the way it appears in pointer text (`06X`).
pub fn format_address(address: Address) -> String {
	format!("{address:06X}")
}

/// Parses a hexadecimal address, with or without a `0x` prefix.
pub fn parse_address(text: &str) -> Option<Address> {
	let text = text.trim();
	let digits = text
		.strip_prefix("0x")
		.or_else(|| text.strip_prefix("0X"))
		.unwrap_or(text);
	if digits.is_empty() {
		return None;
	}
	usize::from_str_radix(digits, 16).ok()
}

/// Rounds `address` up to the next multiple of `alignment` (a power of two).
pub fn align_up(address: Address, alignment: usize) -> Address {
	if alignment <= 1 {
		return address;
	}
	(address + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decode_pointer_window() {
		assert_eq!(PointerTarget::decode(0), PointerTarget::Null);
		assert_eq!(PointerTarget::decode(0x0800_0100), PointerTarget::Address(0x100));
		assert_eq!(PointerTarget::decode(0x0012_3456), PointerTarget::Invalid(0x0012_3456));
		assert_eq!(PointerTarget::decode(0x0A00_0000), PointerTarget::Invalid(0x0A00_0000));
	}

	#[test]
	fn encode_round_trips_destination() {
		let raw = PointerTarget::encode(Some(0x1234));
		assert_eq!(PointerTarget::decode(raw).address(), Some(0x1234));
		assert_eq!(PointerTarget::encode(None), 0);
	}

	#[test]
	fn display_matches_record_text() {
		assert_eq!(PointerTarget::Address(0xABC).to_string(), "<000ABC>");
		assert_eq!(PointerTarget::Null.to_string(), "<null>");
	}

	#[test]
	fn parse_address_accepts_prefix() {
		assert_eq!(parse_address("0x1F0"), Some(0x1F0));
		assert_eq!(parse_address("001F0"), Some(0x1F0));
		assert_eq!(parse_address(""), None);
		assert_eq!(parse_address("xyz"), None);
	}

	#[test]
	fn align_up_rounds_to_power_of_two() {
		assert_eq!(align_up(5, 4), 8);
		assert_eq!(align_up(8, 4), 8);
		assert_eq!(align_up(7, 1), 7);
	}
}
