//! Terminated text as stored in the buffer.
//!
//! Printable ASCII maps to itself, `0x0A` is a newline, and `0xFF` ends the
//! string. Fixed-width fields pad the bytes after the terminator with `0x00`.
//! In record text a string is always double-quoted; `\"`, `\\`, `\n` and `\XX`
//! (any other raw byte) are the escapes.

#[cfg(test)]
mod tests;

/// Byte that ends a stored string.
pub const TEXT_TERMINATOR: u8 = 0xFF;

/// Byte used to fill a fixed-width field after its terminator.
pub const TEXT_PADDING: u8 = 0x00;

/// Returns true if `byte` is a character the codec can represent.
pub fn is_text_byte(byte: u8) -> bool {
	byte == b'\n' || (0x20..=0x7E).contains(&byte)
}

/// Length of the stored string including its terminator, if it has one.
pub fn terminated_length(bytes: &[u8]) -> Option<usize> {
	bytes.iter().position(|&b| b == TEXT_TERMINATOR).map(|index| index + 1)
}

/// Decodes a terminated string, or `None` if it is unterminated or holds a
/// byte outside the character set.
pub fn decode(bytes: &[u8]) -> Option<String> {
	let end = terminated_length(bytes)? - 1;
	let body = &bytes[..end];
	if !body.iter().all(|&b| is_text_byte(b)) {
		return None;
	}
	Some(body.iter().map(|&b| b as char).collect())
}

/// Renders stored bytes as quoted record text, escaping anything unprintable.
///
/// Stops at the terminator; an unterminated slice is rendered in full.
pub fn quote(bytes: &[u8]) -> String {
	let end = terminated_length(bytes).map_or(bytes.len(), |len| len - 1);
	let mut out = String::with_capacity(end + 2);
	out.push('"');
	for &byte in &bytes[..end] {
		match byte {
			b'"' => out.push_str("\\\""),
			b'\\' => out.push_str("\\\\"),
			b'\n' => out.push_str("\\n"),
			b if is_text_byte(b) => out.push(b as char),
			b => out.push_str(&format!("\\{b:02X}")),
		}
	}
	out.push('"');
	out
}

/// Converts record text (quoted or bare) to the bytes it stands for, without a terminator.
pub fn unquote(text: &str) -> Vec<u8> {
	let text = text.trim();
	let text = text.strip_prefix('"').unwrap_or(text);
	let text = match text.strip_suffix('"') {
		Some(inner) if !inner.ends_with('\\') || inner.ends_with("\\\\") => inner,
		_ => text,
	};

	let mut out = Vec::with_capacity(text.len());
	let mut chars = text.chars().peekable();
	while let Some(ch) = chars.next() {
		if ch != '\\' {
			out.push(char_to_byte(ch));
			continue;
		}
		match chars.next() {
			Some('n') => out.push(b'\n'),
			Some('"') => out.push(b'"'),
			Some('\\') | None => out.push(b'\\'),
			Some(high) => {
				let low = chars.peek().copied();
				match (high.to_digit(16), low.and_then(|c| c.to_digit(16))) {
					(Some(h), Some(l)) => {
						chars.next();
						out.push((h * 16 + l) as u8);
					}
					_ => {
						out.push(b'\\');
						out.push(char_to_byte(high));
					}
				}
			}
		}
	}
	out
}

/// Encodes text into a field of exactly `width` bytes.
///
/// The text is truncated so the terminator always fits.
pub fn encode_fixed(text: &str, width: usize) -> Vec<u8> {
	if width == 0 {
		return Vec::new();
	}
	let mut bytes = unquote(text);
	bytes.truncate(width - 1);
	bytes.push(TEXT_TERMINATOR);
	bytes.resize(width, TEXT_PADDING);
	bytes
}

/// Encodes text followed by its terminator, with no padding.
pub fn encode_terminated(text: &str) -> Vec<u8> {
	let mut bytes = unquote(text);
	bytes.push(TEXT_TERMINATOR);
	bytes
}

fn char_to_byte(ch: char) -> u8 {
	match u8::try_from(ch) {
		Ok(b) if is_text_byte(b) => b,
		_ => b'?',
	}
}
