//! Byte-level primitives shared by the run model: addresses and pointers,
//! ordered address sets, the undoable change token, and the text codec.

/// Buffer addresses and pointer encoding.
pub mod address;
/// Undoable change token.
pub mod delta;
/// Partial (subsequence) matching for completion.
pub mod partial;
/// Ordered sets of unique addresses.
pub mod span;
/// Terminated text codec.
pub mod text;

pub use address::{
	Address, ERASE_BYTE, MAX_POINTER_SPAN, POINTER_OFFSET, POINTER_WIDTH, PointerTarget, align_up,
	format_address, parse_address,
};
pub use delta::{ByteChange, ModelDelta, Notification, UndoParts};
pub use partial::matches_partial;
pub use span::SortedSpan;
