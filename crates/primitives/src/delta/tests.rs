use super::{ModelDelta, Notification};

type Delta = ModelDelta<&'static str>;

#[test]
fn test_change_data_records_first_old_value() {
	let mut bytes = vec![0u8; 4];
	let mut delta = Delta::new();
	assert!(delta.change_data(&mut bytes, 1, 5));
	assert!(delta.change_data(&mut bytes, 1, 9));
	let changes: Vec<_> = delta.data_changes().collect();
	assert_eq!(changes.len(), 1);
	assert_eq!(changes[0].1.old, 0);
	assert_eq!(changes[0].1.new, 9);
	assert_eq!(bytes[1], 9);
}

#[test]
fn test_change_data_skips_identical_values() {
	let mut bytes = vec![7u8; 2];
	let mut delta = Delta::new();
	assert!(!delta.change_data(&mut bytes, 0, 7));
	assert!(delta.is_empty());
	assert!(!delta.change_data(&mut bytes, 10, 1));
}

#[test]
fn test_revert_restores_bytes_and_length() {
	let mut bytes = vec![1, 2, 3];
	let mut delta = Delta::new();
	delta.change_range(&mut bytes, 0, &[9, 9]);
	bytes.extend_from_slice(&[0xFF; 4]);
	delta.record_expansion(3, 7);
	delta.change_data(&mut bytes, 5, 0);

	let undo = delta.into_undo();
	undo.revert_bytes(&mut bytes);
	assert_eq!(bytes, vec![1, 2, 3]);
}

#[test]
fn test_run_snapshot_kept_only_once() {
	let mut delta = Delta::new();
	delta.record_run_removed(10, "original");
	delta.record_run_removed(10, "replacement");
	let undo = delta.into_undo();
	assert_eq!(undo.removed_runs.get(&10), Some(&"original"));
}

#[test]
fn test_runs_added_in_delta_are_not_snapshotted() {
	let mut delta = Delta::new();
	delta.record_run_added(20);
	delta.record_run_removed(20, "fresh");
	let undo = delta.into_undo();
	assert!(undo.removed_runs.is_empty());
	assert!(undo.added_runs.contains(&20));
}

#[test]
fn test_notifications_are_ordered() {
	let mut delta = Delta::new();
	delta.notify(Notification::RunWritten { start: 4 });
	delta.notify(Notification::DataMoved { from: 4, to: 64, length: 8 });
	assert_eq!(delta.notifications().len(), 2);
	let taken = delta.take_notifications();
	assert_eq!(taken[1], Notification::DataMoved { from: 4, to: 64, length: 8 });
	assert!(delta.notifications().is_empty());
}
