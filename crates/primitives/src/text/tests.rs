use proptest::prelude::*;

use super::*;

#[test]
fn test_decode_requires_terminator() {
	assert_eq!(decode(b"abc\xFF\x00"), Some("abc".to_string()));
	assert_eq!(decode(b"abc"), None);
	assert_eq!(decode(&[0xFF]), Some(String::new()));
}

#[test]
fn test_decode_rejects_unknown_bytes() {
	assert_eq!(decode(&[b'a', 0x01, 0xFF]), None);
}

#[test]
fn test_encode_fixed_pads_after_terminator() {
	assert_eq!(encode_fixed("\"hi\"", 5), vec![b'h', b'i', 0xFF, 0x00, 0x00]);
}

#[test]
fn test_encode_fixed_truncates_to_fit_terminator() {
	assert_eq!(encode_fixed("abcdef", 3), vec![b'a', b'b', 0xFF]);
	assert!(encode_fixed("abc", 0).is_empty());
}

#[test]
fn test_quote_escapes() {
	assert_eq!(quote(b"a\"b\\c\n\x01\xFF"), "\"a\\\"b\\\\c\\n\\01\"");
}

#[test]
fn test_unquote_reverses_escapes() {
	assert_eq!(unquote("\"a\\\"b\\\\c\\n\\01\""), b"a\"b\\c\n\x01".to_vec());
	assert_eq!(unquote("plain"), b"plain".to_vec());
}

#[test]
fn test_non_ascii_becomes_question_mark() {
	assert_eq!(unquote("é"), b"?".to_vec());
}

proptest! {
	#[test]
	fn quoted_text_survives_storage(body in "[ -~]{0,12}") {
		let stored = encode_terminated(&quote(body.as_bytes()));
		prop_assert_eq!(decode(&stored), Some(body));
	}
}
