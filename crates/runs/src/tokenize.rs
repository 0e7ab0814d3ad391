//! Splitting record text into field tokens.
//!
//! A record line is a whitespace-separated list of values. Quoted strings and
//! parenthesised tuples may contain spaces and commas, a trailing `,` only
//! separates fields, a `label:` token belongs to the value after it, and
//! anything from a `#` outside quotes is a comment.

/// Starts a comment in record text.
pub const COMMENT_START: char = '#';

/// Splits one record line into field tokens.
///
/// ```
/// use hexweave_runs::tokenize::tokenize_line;
///
/// let tokens = tokenize_line(r#"field1: "a value, with comma" field2: (1 2 3)"#);
/// assert_eq!(tokens, vec![r#"field1: "a value, with comma""#, "field2: (1 2 3)"]);
/// ```
pub fn tokenize_line(line: &str) -> Vec<String> {
	let mut words: Vec<String> = line.split_whitespace().map(str::to_string).collect();

	recombine(&mut words, '"', '"');
	recombine(&mut words, '(', ')');

	// Trailing separators only count outside quotes and tuples.
	for word in &mut words {
		if word.ends_with(',') && !inside_group(word) {
			word.pop();
		}
	}

	if let Some(comment) = words.iter().position(|word| word.starts_with(COMMENT_START)) {
		words.truncate(comment);
	}
	words.retain(|word| !word.is_empty());

	attach_labels(words)
}

/// Splits on whitespace, keeping quoted groups together. Used inside tuples.
pub fn split_words(text: &str) -> Vec<String> {
	let mut words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
	recombine(&mut words, '"', '"');
	words
}

/// Re-joins words that were split inside a `start ... end` group.
///
/// A word opens a group when it starts with `start` but does not also close it;
/// following words are merged into it until the group closes.
pub fn recombine(words: &mut Vec<String>, start: char, end: char) {
	let mut i = 0;
	while i + 1 < words.len() {
		if is_open(&words[i], start, end) {
			let next = words.remove(i + 1);
			words[i].push(' ');
			words[i].push_str(&next);
		} else {
			i += 1;
		}
	}
}

/// Returns the value part of a `label: value` token.
pub fn strip_label(token: &str) -> &str {
	match token.split_once(": ") {
		Some((label, value)) if is_label(label) => value.trim_start(),
		_ => token,
	}
}

fn is_open(word: &str, start: char, end: char) -> bool {
	let Some(rest) = word.strip_prefix(start) else {
		return false;
	};
	if start == end {
		return !closes_quote(rest);
	}
	let depth = word.chars().fold(0i32, |depth, ch| match ch {
		c if c == start => depth + 1,
		c if c == end => depth - 1,
		_ => depth,
	});
	depth > 0
}

fn closes_quote(rest: &str) -> bool {
	let trimmed = rest.trim_end_matches(',');
	let Some(body) = trimmed.strip_suffix('"') else {
		return false;
	};
	let escapes = body.chars().rev().take_while(|&c| c == '\\').count();
	escapes % 2 == 0
}

fn inside_group(word: &str) -> bool {
	let value = strip_label(word);
	(value.starts_with('"') && !closes_quote(&value[1..])) || is_open(value, '(', ')')
}

fn is_label(text: &str) -> bool {
	!text.is_empty()
		&& text
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '~')
}

fn attach_labels(words: Vec<String>) -> Vec<String> {
	let mut tokens: Vec<String> = Vec::with_capacity(words.len());
	let mut pending: Option<String> = None;
	for word in words {
		if let Some(label) = pending.take() {
			tokens.push(format!("{label} {word}"));
			continue;
		}
		match word.strip_suffix(':') {
			Some(label) if is_label(label) => pending = Some(word),
			_ => tokens.push(word),
		}
	}
	tokens.extend(pending);
	tokens
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn quotes_and_tuples_stay_whole() {
		let tokens = tokenize_line(r#"field1: "a value, with comma" field2: (1 2 3)"#);
		assert_eq!(tokens, vec![r#"field1: "a value, with comma""#, "field2: (1 2 3)"]);
	}

	#[test]
	fn trailing_commas_separate_fields() {
		assert_eq!(tokenize_line("1, 2, <000100>"), vec!["1", "2", "<000100>"]);
	}

	#[test]
	fn comments_are_dropped() {
		assert_eq!(tokenize_line("5 Tackle # starter move"), vec!["5", "Tackle"]);
		assert_eq!(tokenize_line("1 #c 2"), vec!["1"]);
	}

	#[test]
	fn quoted_comment_marker_is_text() {
		assert_eq!(tokenize_line(r##""#1 pick", 3"##), vec![r##""#1 pick""##, "3"]);
	}

	#[test]
	fn nested_parentheses_recombine() {
		assert_eq!(tokenize_line("(1 (2 3)) 4"), vec!["(1 (2 3))", "4"]);
	}

	#[test]
	fn strip_label_leaves_colors_alone() {
		assert_eq!(strip_label("hp: 45"), "45");
		assert_eq!(strip_label("31:0:12"), "31:0:12");
		assert_eq!(strip_label(r#""a: b""#), r#""a: b""#);
	}

	proptest! {
		#[test]
		fn plain_words_round_trip(words in proptest::collection::vec("[a-z0-9]{1,6}", 0..8)) {
			let line = words.join(", ");
			prop_assert_eq!(tokenize_line(&line), words);
		}
	}
}
