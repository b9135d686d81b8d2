use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;

use super::*;
use crate::clock::ManualClock;

fn detached(name: &str, writable: bool) -> (Table, Arc<ManualClock>) {
	let clock = Arc::new(ManualClock::new());
	let table = Table::new(name, writable, clock.clone(), Weak::new());
	(table, clock)
}

fn payload(items: &[&str]) -> Payload {
	Payload::new(items.iter().map(|s| (*s).to_owned()).collect())
}

#[test]
fn published_table_round_trips_values() {
	let (table, _) = detached("T", true);
	table.set("k", "v").unwrap();
	table.set_i32("answer", 42).unwrap();
	table.set_f64("ratio", 0.5).unwrap();

	assert_eq!(table.get("k").unwrap(), "v");
	assert_eq!(table.get_i32("answer").unwrap(), 42);
	assert_eq!(table.get_f64("ratio").unwrap(), 0.5);
	assert_eq!(table.keys(), vec!["answer", "k", "ratio"]);
}

#[test]
fn accessors_report_missing_and_unparsable_values() {
	let (table, _) = detached("T", true);
	table.set("word", "seven").unwrap();

	assert!(matches!(table.get("nope"), Err(Error::KeyNotFound { key }) if key == "nope"));
	assert!(matches!(table.get_i32("word"), Err(Error::Parse { value, .. }) if value == "seven"));
	assert!(matches!(table.get_f64("word"), Err(Error::Parse { .. })));
	assert!(matches!(table.get_i32("nope"), Err(Error::KeyNotFound { .. })));
}

#[test]
fn subscribed_table_rejects_mutation() {
	let (table, _) = detached("T", false);

	assert!(matches!(table.set("k", "v"), Err(Error::NotWritable { .. })));
	assert!(matches!(table.set_i32("k", 1), Err(Error::NotWritable { .. })));
	assert!(matches!(table.remove("k"), Err(Error::NotWritable { .. })));
	assert!(matches!(table.set_interval(100), Err(Error::NotWritable { .. })));
	assert!(matches!(table.send(), Err(Error::NotWritable { .. })));
}

#[test]
fn clear_is_allowed_on_subscribed_tables() {
	let (table, _) = detached("T", false);
	table.receive("T", &payload(&["k", "v"])).unwrap();
	assert_eq!(table.len(), 1);

	table.clear();
	assert!(table.is_empty());
}

#[test]
fn reserved_key_cannot_be_set() {
	let (table, _) = detached("T", true);
	assert!(matches!(table.set(UPDATE_INTERVAL_KEY, "5"), Err(Error::ReservedKey { .. })));
}

#[test]
fn remove_drops_entry() {
	let (table, _) = detached("T", true);
	table.set("k", "v").unwrap();
	table.remove("k").unwrap();
	table.remove("absent").unwrap();
	assert!(!table.exists("k"));
}

#[test]
fn set_interval_normalizes_non_positive_values() {
	let (table, _) = detached("T", true);
	table.set_interval(250).unwrap();
	assert_eq!(table.interval(), Some(250));

	table.set_interval(0).unwrap();
	assert_eq!(table.interval(), None);

	table.set_interval(-5).unwrap();
	assert_eq!(table.interval(), None);
}

#[test]
fn set_stamps_last_update() {
	let (table, clock) = detached("T", true);
	assert_eq!(table.last_update(), None);

	clock.advance(Duration::from_millis(10));
	table.set("k", "v").unwrap();
	assert_eq!(table.last_update(), Some(clock.now()));
}

#[test]
fn staleness_threshold_is_two_and_a_half_intervals() {
	let (table, clock) = detached("T", true);
	table.set_interval(100).unwrap();
	table.set("k", "v").unwrap();

	clock.advance(Duration::from_millis(249));
	assert!(!table.is_stale());

	clock.advance(Duration::from_millis(2));
	assert!(table.is_stale());
}

#[test]
fn tables_without_interval_are_never_stale() {
	let (table, clock) = detached("T", true);
	table.set("k", "v").unwrap();
	clock.advance(Duration::from_secs(3600));
	assert!(!table.is_stale());

	let (never_updated, clock) = detached("U", false);
	clock.advance(Duration::from_secs(3600));
	assert!(!never_updated.is_stale());
}

#[test]
fn interval_without_any_update_counts_as_stale() {
	let (table, _) = detached("T", true);
	table.set_interval(100).unwrap();
	assert!(table.is_stale());
}

#[test]
fn receive_replaces_mapping_and_applies_interval() {
	let (table, clock) = detached("A", false);
	clock.advance(Duration::from_millis(5));

	let applied = table.receive("A", &payload(&["k1", "k2", UPDATE_INTERVAL_KEY, "v1", "v2", "1000"])).unwrap();
	assert!(applied);
	assert_eq!(table.get("k1").unwrap(), "v1");
	assert_eq!(table.interval(), Some(1000));
	assert_eq!(table.last_update(), Some(clock.now()));
	assert!(!table.exists(UPDATE_INTERVAL_KEY));

	table.receive("A", &payload(&["k1", UPDATE_INTERVAL_KEY, "v1b", "1000"])).unwrap();
	assert_eq!(table.snapshot(), HashMap::from([("k1".to_owned(), "v1b".to_owned())]));
}

#[test]
fn receive_ignores_other_names() {
	let (table, _) = detached("A", false);
	let applied = table.receive("B", &payload(&["k", "v"])).unwrap();
	assert!(!applied);
	assert!(table.is_empty());
	assert_eq!(table.last_update(), None);
}

#[test]
fn malformed_receipt_leaves_table_untouched() {
	let (table, _) = detached("A", false);
	table.receive("A", &payload(&["k", "v"])).unwrap();
	let before = table.last_update();

	assert!(matches!(table.receive("A", &payload(&["k", "v", "x"])), Err(Error::MalformedPayload { len: 3 })));
	assert_eq!(table.get("k").unwrap(), "v");
	assert_eq!(table.last_update(), before);
}

#[test]
fn unparsable_interval_keeps_previous_value() {
	let (table, _) = detached("A", false);
	table.receive("A", &payload(&[UPDATE_INTERVAL_KEY, "200"])).unwrap();
	table.receive("A", &payload(&[UPDATE_INTERVAL_KEY, "often"])).unwrap();
	assert_eq!(table.interval(), Some(200));
}

#[test]
fn published_table_refuses_remote_payloads() {
	let (table, _) = detached("A", true);
	assert!(matches!(table.receive("A", &payload(&["k", "v"])), Err(Error::NotSubscribed { .. })));
}

#[test]
fn change_callback_fires_on_receipt() {
	let (table, _) = detached("A", false);
	let hits = Arc::new(AtomicUsize::new(0));
	let seen = hits.clone();
	table.on_change(move |t| {
		assert_eq!(t.get("k").unwrap(), "v");
		seen.fetch_add(1, Ordering::SeqCst);
	});

	table.receive("A", &payload(&["k", "v"])).unwrap();
	table.receive("B", &payload(&["k", "v"])).unwrap();
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn stale_callback_requires_subscribed_table() {
	let (table, _) = detached("A", true);
	assert!(matches!(table.on_stale(|_| {}), Err(Error::NotSubscribed { .. })));
}

#[test]
fn stale_callback_fires_once_per_episode() {
	let (table, clock) = detached("A", false);
	let hits = Arc::new(AtomicUsize::new(0));
	let seen = hits.clone();
	table
		.on_stale(move |_| {
			seen.fetch_add(1, Ordering::SeqCst);
		})
		.unwrap();

	table.receive("A", &payload(&[UPDATE_INTERVAL_KEY, "100"])).unwrap();
	assert!(!table.poll_stale());

	clock.advance(Duration::from_millis(300));
	assert!(table.poll_stale());
	assert!(table.poll_stale());
	assert_eq!(hits.load(Ordering::SeqCst), 1);

	table.receive("A", &payload(&[UPDATE_INTERVAL_KEY, "100"])).unwrap();
	assert!(!table.poll_stale());

	clock.advance(Duration::from_millis(300));
	assert!(table.poll_stale());
	assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn detached_send_reports_not_connected() {
	let (table, _) = detached("A", true);
	assert!(matches!(table.send(), Err(Error::NotConnected)));
	assert_eq!(table.last_update(), None);
}
