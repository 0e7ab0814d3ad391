use pretty_assertions::assert_eq;

use hexweave_primitives::MAX_POINTER_SPAN;

use super::*;
use crate::run::{NoInfoRun, TextRun};

fn tight() -> ModelSettings {
	ModelSettings {
		free_space_buffer: 0,
		..ModelSettings::default()
	}
}

fn text_run(start: Address, length: usize) -> Run {
	Run::Text(TextRun {
		start,
		length,
		sources: SortedSpan::new(),
	})
}

/// A model with a pointer at 0x00 to the text run "AB" at 0x10.
fn pointed_text() -> Model {
	let mut bytes = vec![0xFF; 0x40];
	bytes[0x10..0x13].copy_from_slice(b"AB\xFF");
	let mut model = Model::with_settings(bytes, tight());
	let mut token = Token::new();
	model.observe_run_written(&mut token, text_run(0x10, 3));
	model.write_pointer(&mut token, 0, Some(0x10));
	model.observe_run_written(&mut token, Run::pointer(0));
	model
}

#[test]
fn next_run_finds_containing_or_following_run() {
	let model = pointed_text();
	assert_eq!(model.next_run(0x11).map(Run::start), Some(0x10));
	assert_eq!(model.next_run(0x02).map(Run::start), Some(0));
	assert_eq!(model.next_run(0x05).map(Run::start), Some(0x10));
	assert!(model.next_run(0x13).is_none());
}

#[test]
fn pointer_runs_register_their_destination() {
	let model = pointed_text();
	assert_eq!(model.read_pointer(0), PointerTarget::Address(0x10));
	assert!(model.run_at(0x10).unwrap().pointer_sources().contains(0));
}

#[test]
fn new_runs_replace_overlaps_and_keep_sources() {
	let mut model = Model::new(vec![0xFF; 0x40]);
	let mut token = Token::new();
	model.observe_run_written(&mut token, Run::no_info(0x10, 0x30));
	model.observe_anchor_written(&mut token, "inner", Run::no_info(0x12, 0x34)).unwrap();

	model.observe_run_written(&mut token, text_run(0x10, 3));
	let run = model.run_at(0x10).unwrap();
	assert!(matches!(run, Run::Text(_)));
	assert_eq!(run.pointer_sources(), &SortedSpan::single(0x30));
	assert!(model.run_at(0x12).is_none());
	assert_eq!(model.address_of_anchor("inner"), None);
	assert!(
		token
			.notifications()
			.contains(&Notification::RunRemoved { start: 0x12 })
	);
}

#[test]
fn anchors_resolve_waiting_pointers() {
	let mut model = Model::new(vec![0xFF; 0x40]);
	let mut token = Token::new();
	model.add_unmapped_source("later", 0x20);
	let run = Run::NoInfo(NoInfoRun {
		start: 0x30,
		sources: SortedSpan::new(),
	});
	model.observe_anchor_written(&mut token, "later", run).unwrap();

	assert_eq!(model.read_pointer(0x20), PointerTarget::Address(0x30));
	assert!(model.run_at(0x30).unwrap().pointer_sources().contains(0x20));
	assert!(model.unmapped_sources_to_anchor("later").is_empty());
	assert_eq!(model.anchors(), vec![("later".to_string(), 0x30)]);
}

#[test]
fn rebinding_a_name_moves_it() {
	let mut model = Model::new(vec![0xFF; 0x40]);
	let mut token = Token::new();
	model.observe_anchor_written(&mut token, "a", Run::no_info(0x10, 0)).unwrap();
	model.observe_anchor_written(&mut token, "a", Run::no_info(0x20, 4)).unwrap();
	assert_eq!(model.address_of_anchor("a"), Some(0x20));
	assert_eq!(model.anchor_at(0x10), None);
	assert_eq!(model.anchor_at(0x20), Some("a"));
}

#[test]
fn anchor_names_are_validated() {
	let mut model = Model::new(vec![0xFF; 0x40]);
	let mut token = Token::new();
	for name in ["", "two words", "a<b", "x]"] {
		assert!(
			matches!(
				model.observe_anchor_written(&mut token, name, Run::no_info(0x10, 0)),
				Err(FormatError::Parse { .. })
			),
			"{name:?}"
		);
	}
	assert!(model.run_at(0x10).is_none());
}

#[test]
fn growth_into_free_bytes_stays_in_place() {
	let mut model = pointed_text();
	let mut token = Token::new();
	let run = model.run_at(0x10).cloned().unwrap();
	let grown = model.relocate_for_expansion(&mut token, &run, 6).unwrap();
	assert_eq!(grown.start(), 0x10);
	assert!(token.notifications().is_empty());
}

#[test]
fn blocked_growth_moves_the_run_and_repoints() {
	let mut model = pointed_text();
	let mut token = Token::new();
	model.write_byte(&mut token, 0x13, 0);
	let run = model.run_at(0x10).cloned().unwrap();

	let moved = model.relocate_for_expansion(&mut token, &run, 6).unwrap();
	assert_eq!(moved.start(), 4);
	assert_eq!(model.read_pointer(0), PointerTarget::Address(4));
	assert_eq!(&model.bytes()[4..7], b"AB\xFF");
	assert_eq!(&model.bytes()[0x10..0x13], &[0xFF; 3]);
	assert!(model.run_at(0x10).is_none());
	assert!(model.run_at(4).unwrap().pointer_sources().contains(0));
	assert!(token.notifications().contains(&Notification::DataMoved {
		from: 0x10,
		to: 4,
		length: 3,
	}));
}

fn crowded(max_length: usize) -> (Model, Run) {
	let mut bytes = vec![0; 0x10];
	bytes[..2].copy_from_slice(b"A\xFF");
	let settings = ModelSettings {
		max_length,
		..tight()
	};
	let mut model = Model::with_settings(bytes, settings);
	let mut token = Token::new();
	model.observe_anchor_written(&mut token, "msg", text_run(0, 2)).unwrap();
	let run = model.run_at(0).cloned().unwrap();
	(model, run)
}

#[test]
fn no_free_space_grows_the_buffer() {
	let (mut model, run) = crowded(MAX_POINTER_SPAN);
	let mut token = Token::new();
	let moved = model.relocate_for_expansion(&mut token, &run, 8).unwrap();
	assert_eq!(moved.start(), 0x10);
	assert_eq!(model.len(), 0x18);
	assert_eq!(&model.bytes()[0x10..0x12], b"A\xFF");
	assert_eq!(model.address_of_anchor("msg"), Some(0x10));
	assert!(token.notifications().contains(&Notification::BufferExpanded {
		old_len: 0x10,
		new_len: 0x18,
	}));
}

#[test]
fn growth_past_the_limit_fails() {
	let (mut model, run) = crowded(0x14);
	let mut token = Token::new();
	assert_eq!(
		model.relocate_for_expansion(&mut token, &run, 8).unwrap_err(),
		FormatError::OutOfSpace { length: 8 }
	);
	assert_eq!(model.len(), 0x10);
	assert!(token.is_empty());
}

#[test]
fn revert_restores_bytes_runs_and_anchors() {
	let (mut model, run) = crowded(MAX_POINTER_SPAN);
	let before = model.bytes().to_vec();
	let mut token = Token::new();
	model.relocate_for_expansion(&mut token, &run, 8).unwrap();

	model.revert(token);
	assert_eq!(model.bytes(), &before[..]);
	assert!(matches!(model.run_at(0), Some(Run::Text(_))));
	assert!(model.run_at(0x10).is_none());
	assert_eq!(model.address_of_anchor("msg"), Some(0));
	assert_eq!(model.anchor_at(0x10), None);
}

#[test]
fn clearing_a_pointer_drops_its_bare_destination() {
	let mut model = Model::new(vec![0xFF; 0x40]);
	let mut token = Token::new();
	model.write_pointer(&mut token, 0, Some(0x20));
	model.observe_run_written(&mut token, Run::pointer(0));
	assert!(matches!(model.run_at(0x20), Some(Run::NoInfo(_))));

	model.clear_format(&mut token, 0, 4);
	assert!(model.run_at(0).is_none());
	assert!(model.run_at(0x20).is_none());
}

#[test]
fn retargeting_moves_the_source() {
	let mut model = pointed_text();
	let mut token = Token::new();
	model.retarget_pointer(&mut token, 0, Some(0x30));
	assert_eq!(model.read_pointer(0), PointerTarget::Address(0x30));
	assert!(!model.run_at(0x10).unwrap().pointer_sources().contains(0));
	assert!(model.run_at(0x30).unwrap().pointer_sources().contains(0));

	model.retarget_pointer(&mut token, 0, None);
	assert_eq!(model.read_pointer(0), PointerTarget::Null);
	assert!(model.run_at(0x30).is_none());
}

#[test]
fn values_are_little_endian_and_zero_past_the_end() {
	let model = Model::new(vec![0x34, 0x12, 0x78, 0x56]);
	assert_eq!(model.read_value(0, 2), 0x1234);
	assert_eq!(model.read_value(0, 4), 0x5678_1234);
	assert_eq!(model.read_value(3, 4), 0x56);
	assert_eq!(model.read_value(0x10, 2), 0);
}

#[test]
fn unchanged_writes_record_nothing() {
	let mut model = Model::new(vec![7; 4]);
	let mut token = Token::new();
	assert!(!model.write_byte(&mut token, 1, 7));
	assert!(!model.write_byte(&mut token, 9, 1));
	assert!(token.is_empty());
	assert!(model.write_byte(&mut token, 1, 8));
	assert!(token.has_data_change());
}
