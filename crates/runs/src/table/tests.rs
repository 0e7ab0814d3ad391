use pretty_assertions::assert_eq;

use super::*;
use crate::factory::apply_format;
use crate::model::Model;
use crate::run::Run;

fn names_model() -> Model {
	let mut bytes = vec![0xFF; 0x100];
	bytes[..12].copy_from_slice(b"Ash\xFFBo\xFF\0Ash\xFF");
	let mut model = Model::new(bytes);
	let mut token = Token::new();
	apply_format(&mut model, &mut token, "names", 0, "[name\"\"4]3").unwrap();
	model
}

fn item(display: &str, line_text: &str) -> AutocompleteItem {
	AutocompleteItem {
		display: display.into(),
		line_text: line_text.into(),
	}
}

fn table(model: &mut Model, name: &str, start: Address, format: &str) -> TableStreamRun {
	let mut token = Token::new();
	match apply_format(model, &mut token, name, start, format).unwrap() {
		Run::Table(table) => table,
		other => panic!("expected a table, found {other:?}"),
	}
}

#[test]
fn serializes_one_line_per_record() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x20, &[1, 2, 3, 4, 5, 6]);
	let stats = table(&mut model, "stats", 0x20, "[hp. atk.]3");
	assert_eq!(stats.serialize(&model), "1, 2\n3, 4\n5, 6");
	assert_eq!(stats.serialize_element(&model, 1), "3, 4");
}

#[test]
fn short_text_writes_empty_values() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x20, &[1, 2, 3, 4, 5, 6]);
	let stats = table(&mut model, "stats", 0x20, "[hp. atk.]3");
	let after = stats.deserialize(&mut model, &mut token, "9, 8\n7").unwrap();
	assert_eq!(after.element_count(), 3);
	assert_eq!(&model.bytes()[0x20..0x26], &[9, 8, 7, 0, 0, 0]);
}

#[test]
fn fixed_tables_ignore_extra_lines() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x20, &[1, 2, 3, 4]);
	let stats = table(&mut model, "stats", 0x20, "[hp. atk.]2");
	let after = stats.deserialize(&mut model, &mut token, "1, 1\n2, 2\n3, 3").unwrap();
	assert_eq!(after.element_count(), 2);
	assert_eq!(model.bytes()[0x24], 0xFF);
}

#[test]
fn long_text_grows_the_stream_first() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x20, &[1, 2, 3, 4]);
	let pairs = table(&mut model, "pairs", 0x20, "[a. b.]!FFFF");
	assert_eq!(pairs.element_count(), 2);

	let after = pairs
		.deserialize(&mut model, &mut token, "1, 2\n3, 4\n5, 6\n7, 8")
		.unwrap();
	assert_eq!(after.start(), 0x20);
	assert_eq!(after.element_count(), 4);
	assert_eq!(&model.bytes()[0x20..0x2A], &[1, 2, 3, 4, 5, 6, 7, 8, 0xFF, 0xFF]);
}

#[test]
fn single_record_tables_use_labelled_lines() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x20, &[1, b'A', b'b', 0xFF, 0]);
	let header = table(&mut model, "header", 0x20, "[hp. name\"\"4]1");
	assert!(header.is_single_element());
	assert_eq!(header.serialize(&model), "  hp:   1\n  name: \"Ab\"");

	header.deserialize(&mut model, &mut token, "hp: 7\nname: \"Zz\"").unwrap();
	assert_eq!(&model.bytes()[0x20..0x25], &[7, b'Z', b'z', 0xFF, 0]);
}

#[test]
fn labels_come_from_the_first_text_field() {
	let model = names_model();
	let Some(Run::Table(names)) = model.run_at(0) else {
		panic!("names table missing");
	};
	assert_eq!(
		names.read_labels(&model),
		Some(vec!["Ash".to_string(), "Bo".to_string(), "Ash".to_string()])
	);
}

#[test]
fn match_tolerance_allows_a_bad_tail() {
	let mut model = names_model();
	let mut token = Token::new();
	// Ten 2-byte strings, the last unterminated.
	let mut bytes = b"a\xFF".repeat(9);
	bytes.extend_from_slice(b"zz");
	model.write_bytes(&mut token, 0x40, &bytes);
	assert!(TableStreamRun::try_parse(&model, 0x40, SortedSpan::new(), "", "[s\"\"2]10").is_ok());

	model.write_bytes(&mut token, 0x42, b"zz");
	assert!(matches!(
		TableStreamRun::try_parse(&model, 0x40, SortedSpan::new(), "", "[s\"\"2]10"),
		Err(FormatError::Mismatch { address: 0x40, .. })
	));
}

#[test]
fn element_matches_checks_one_record() {
	let mut model = names_model();
	let mut token = Token::new();
	let mut bytes = b"a\xFF".repeat(9);
	bytes.extend_from_slice(b"zz");
	model.write_bytes(&mut token, 0x40, &bytes);
	let run = TableStreamRun::try_parse(&model, 0x40, SortedSpan::new(), "", "[s\"\"2]10").unwrap();

	assert!(run.element_matches(&model, 0));
	assert!(!run.element_matches(&model, 9));
	assert!(run.data_matches(&model, 9));
	assert!(!run.data_matches(&model, 10));
}

#[test]
fn pending_anchor_is_accepted_optimistically() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x40, &[0; 8]);
	model.add_unmapped_source("later", 0x80);
	assert!(TableStreamRun::try_parse(&model, 0x40, SortedSpan::new(), "", "[s\"\"2]4").is_err());
	assert!(TableStreamRun::try_parse(&model, 0x40, SortedSpan::new(), "later", "[s\"\"2]4").is_ok());
}

#[test]
fn search_finds_enum_values() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x40, &[0, 5, 1, 7, 1, 9]);
	let learn = table(&mut model, "learn", 0x40, "[move.names lvl.]3");
	assert_eq!(learn.search(&model, "names", 1), vec![(0x42, 0x42), (0x44, 0x44)]);
	assert_eq!(learn.search(&model, "other", 1), vec![]);
}

#[test]
fn locate_finds_record_and_field() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x20, &[1, b'A', 0xFF, 0, 0, 2, b'B', 0xFF, 0, 0]);
	let rows = table(&mut model, "rows", 0x20, "[hp. name\"\"4]2");
	assert_eq!(
		rows.locate(0x27),
		Some(FieldLocation {
			element: 1,
			segment: 1,
			field_start: 0x26,
		})
	);
	assert_eq!(rows.locate(0x2A), None);
	assert_eq!(rows.locate(0x1F), None);
}

#[test]
fn end_code_helpers() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x20, &[1, 2, 0xFF, 0xFF]);
	let pairs = table(&mut model, "pairs", 0x20, "[a. b.]!FFFF");
	assert_eq!(pairs.create_default(), vec![0xFF, 0xFF]);

	let copy = pairs.duplicate(&model, 0x80, SortedSpan::new(), vec![Segment::new("c", 2, SegmentKind::Integer)]);
	assert_eq!(copy.format(), "[c:]!FFFF");
	assert_eq!(copy.element_count(), 0);

	let emptied = pairs.try_write_new_end_token(&mut model, &mut token).unwrap();
	assert_eq!(emptied.element_count(), 0);
	assert_eq!(emptied.length(), 2);
}

#[test]
fn fixed_tables_have_no_end_token() {
	let mut model = names_model();
	let mut token = Token::new();
	let Some(Run::Table(names)) = model.run_at(0).cloned() else {
		panic!("names table missing");
	};
	assert!(names.create_default().is_empty());
	assert!(names.try_write_new_end_token(&mut model, &mut token).is_none());
	assert!(!names.can_append());
}

#[test]
fn data_format_describes_fields() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x20, &[7, b'A', b'b', 0xFF, 0]);
	let rows = table(&mut model, "rows", 0x20, "[hp. name\"\"4]1");
	assert_eq!(
		rows.data_format(&model, 0x20),
		DataFormat::Integer {
			field: FieldPosition {
				element: 0,
				segment: 0,
				field_start: 0x20,
				position: 0,
				width: 1,
			},
			value: 7,
		}
	);
	let DataFormat::Text { text, field } = rows.data_format(&model, 0x22) else {
		panic!("expected text");
	};
	assert_eq!(&*text, "\"Ab\"");
	assert_eq!(field.position, 1);
}

#[test]
fn text_cache_resets_when_reading_backwards() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x20, &[7, b'A', b'b', 0xFF, 0]);
	let rows = table(&mut model, "rows", 0x20, "[hp. name\"\"4]1");

	rows.data_format(&model, 0x22);
	assert_eq!(rows.text_cache_position(), Some((0x21, 1)));
	rows.data_format(&model, 0x23);
	assert_eq!(rows.text_cache_position(), Some((0x21, 1)));
	rows.data_format(&model, 0x21);
	assert_eq!(rows.text_cache_position(), Some((0x21, 0)));
}

#[test]
fn bytes_after_the_records_are_the_end_code() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x20, &[1, 2, 0xFF, 0xFF]);
	let pairs = table(&mut model, "pairs", 0x20, "[a. b.]!FFFF");
	assert_eq!(
		pairs.data_format(&model, 0x23),
		DataFormat::EndStream {
			stream_end: 0x22,
			position: 1,
			length: 2,
		}
	);
}

#[test]
fn autocomplete_offers_matching_labels() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x40, &[0, 5, 1, 7]);
	let learn = table(&mut model, "learn", 0x40, "[move.names lvl.]2");

	let items = learn.autocomplete(&model, "Ash, 5\nBo, 7", 0, 3);
	let lines: Vec<&str> = items.iter().map(|item| item.line_text.as_str()).collect();
	assert_eq!(lines, vec!["Ash, 5", "Ash~2, 5"]);

	let items = learn.autocomplete(&model, "Ash, 5\nB", 1, 1);
	assert_eq!(items, vec![item("Bo", "Bo, ")]);
}

#[test]
fn autocomplete_starts_a_new_field_after_whitespace() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x40, &[5, 0, 7, 1]);
	let learn = table(&mut model, "learn", 0x40, "[lvl. move.names]2");

	let items = learn.autocomplete(&model, "5, ", 0, 3);
	let lines: Vec<&str> = items.iter().map(|item| item.line_text.as_str()).collect();
	assert_eq!(lines, vec!["5, Ash", "5, Bo", "5, Ash~2"]);
	assert!(learn.autocomplete(&model, "5, Ash, 9", 0, 9).is_empty());
}

#[test]
fn autocomplete_completes_tuple_elements() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x40, &[0, 0, 0, 0]);
	let moves = table(&mut model, "moves", 0x40, "[pair:|t|level:::.|move::::.names]2");

	let items = moves.autocomplete(&model, "(5 B", 0, 4);
	assert_eq!(items, vec![item("Bo", "(5 Bo)")]);

	let items = moves.autocomplete(&model, "(5 ", 0, 3);
	assert_eq!(items.len(), 3);
	assert_eq!(items[0].line_text, "(5 Ash)");
}

#[test]
fn autocomplete_on_single_record_tables() {
	let mut model = names_model();
	let mut token = Token::new();
	model.write_bytes(&mut token, 0x40, &[0, 3]);
	let header = table(&mut model, "header", 0x40, "[lead.names lvl.]1");
	let items = header.autocomplete(&model, "  lead: b\n  lvl: 3", 0, 9);
	assert_eq!(items, vec![item("Bo", "lead: Bo")]);
	assert!(header.autocomplete(&model, "  lead: b\n  lvl: 3", 1, 8).is_empty());
}
