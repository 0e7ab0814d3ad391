//! Completion candidates for record text.

use hexweave_primitives::matches_partial;

use super::TableStreamRun;
use crate::model::DataModel;
use crate::segment::{SegmentKind, TupleElement, enum_options, quote_option};
use crate::tokenize::{split_words, strip_label, tokenize_line};

/// One completion: the label to show and the full line that replaces the caret's line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutocompleteItem {
	/// Text shown in the completion list.
	pub display: String,
	/// Replacement for the whole line.
	pub line_text: String,
}

impl AutocompleteItem {
	fn new(display: impl Into<String>, line_text: impl Into<String>) -> Self {
		Self {
			display: display.into(),
			line_text: line_text.into(),
		}
	}
}

impl TableStreamRun {
	/// Offers values for the field under the caret.
	///
	/// `content` is the serialized run; `caret_line` selects the line being
	/// edited and `caret_char` is a character offset within it. Enum fields and
	/// tuple elements with a source offer matching labels, 1-bit tuple elements
	/// offer `false`/`true`.
	pub fn autocomplete(&self, model: &dyn DataModel, content: &str, caret_line: usize, caret_char: usize) -> Vec<AutocompleteItem> {
		let line = content.lines().nth(caret_line).unwrap_or("");
		let caret = line.char_indices().nth(caret_char).map_or(line.len(), |(index, _)| index);
		let (line_start, line_end) = line.split_at(caret);
		if self.is_single_element() {
			return self.single_element_options(model, line_start, line_end);
		}

		let mut tokens = tokenize_line(line_start);
		let starts_new_token = line_start.ends_with(char::is_whitespace)
			&& tokens.last().is_none_or(|last| !is_open_group(strip_label(last)));
		if tokens.is_empty() || starts_new_token {
			tokens.push(String::new());
		}
		if tokens.len() > self.segments.len() {
			return Vec::new();
		}

		let index = tokens.len() - 1;
		let mut current = strip_label(&tokens[index]).to_string();
		if line_start.ends_with(char::is_whitespace) && !starts_new_token {
			current.push(' ');
		}
		let mut prefix = tokens[..index].join(", ");
		if index > 0 {
			prefix.push_str(", ");
		}

		let candidates = match &self.segments[index].kind {
			SegmentKind::Enum { source } => filtered_options(model, source, &current)
				.into_iter()
				.map(|option| {
					let quoted = quote_option(&option);
					(option, format!("{prefix}{quoted}{line_end}"))
				})
				.collect(),
			SegmentKind::Tuple { elements } => tuple_candidates(model, elements, &current)
				.into_iter()
				.map(|(option, tuple_text, closed)| {
					let mut rest = line_end.trim();
					if closed {
						rest = rest.strip_prefix(')').unwrap_or(rest);
					}
					(option, format!("{prefix}{tuple_text}{rest}"))
				})
				.collect(),
			_ => Vec::new(),
		};

		candidates
			.into_iter()
			.map(|(display, mut line_text)| {
				if tokenize_line(&line_text).len() < self.segments.len() {
					line_text.push_str(", ");
				}
				AutocompleteItem::new(display, line_text)
			})
			.collect()
	}

	fn single_element_options(&self, model: &dyn DataModel, line_start: &str, line_end: &str) -> Vec<AutocompleteItem> {
		if line_start.matches(':').count() != 1 {
			return Vec::new();
		}
		let Some((name, current)) = line_start.split_once(':') else {
			return Vec::new();
		};
		let name = name.trim();
		let Some(segment) = self.segments.iter().find(|segment| segment.name == name) else {
			return Vec::new();
		};
		let current = current.trim_start();

		match &segment.kind {
			SegmentKind::Enum { source } => filtered_options(model, source, current.trim_end())
				.into_iter()
				.map(|option| {
					let line_text = format!("{name}: {}{line_end}", quote_option(&option));
					AutocompleteItem::new(option, line_text)
				})
				.collect(),
			SegmentKind::Tuple { elements } => tuple_candidates(model, elements, current)
				.into_iter()
				.map(|(option, tuple_text, _)| AutocompleteItem::new(option, format!("{name}: {tuple_text}")))
				.collect(),
			_ => Vec::new(),
		}
	}
}

fn is_open_group(token: &str) -> bool {
	let opens = token.chars().filter(|&c| c == '(').count();
	let closes = token.chars().filter(|&c| c == ')').count();
	opens > closes || (token.starts_with('"') && (token.len() == 1 || !token.ends_with('"')))
}

fn filtered_options(model: &dyn DataModel, source: &str, partial: &str) -> Vec<String> {
	enum_options(model, source)
		.unwrap_or_default()
		.into_iter()
		.filter(|option| matches_partial(option, partial))
		.collect()
}

/// Candidates for the tuple element under the caret: `(display, tuple text, closed)`.
fn tuple_candidates(model: &dyn DataModel, elements: &[TupleElement], current: &str) -> Vec<(String, String, bool)> {
	let inner = current.trim_start_matches('(').trim_end_matches(')');
	let mut words = split_words(inner);
	if words.is_empty() || inner.ends_with(char::is_whitespace) {
		words.push(String::new());
	}
	let visible: Vec<&TupleElement> = elements.iter().filter(|element| element.is_visible()).collect();
	if words.len() > visible.len() {
		return Vec::new();
	}

	let position = words.len() - 1;
	let element = visible[position];
	let partial = words[position].trim_matches('"');
	let options = match (&element.source, element.bits) {
		(Some(source), _) => filtered_options(model, source, partial),
		(None, 1) => ["false", "true"]
			.into_iter()
			.filter(|option| matches_partial(option, partial))
			.map(str::to_string)
			.collect(),
		(None, _) => Vec::new(),
	};

	let closed = words.len() == visible.len();
	options
		.into_iter()
		.map(|option| {
			let mut text = String::from("(");
			for previous in &words[..position] {
				text.push_str(previous);
				text.push(' ');
			}
			text.push_str(&quote_option(&option));
			text.push(if closed { ')' } else { ' ' });
			(option, text, closed)
		})
		.collect()
}
