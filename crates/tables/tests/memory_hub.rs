//! Two registries exchanging tables through one in-process hub.

use std::sync::mpsc;
use std::time::Duration;

use nettables::{MemoryHub, Role, Tables, TablesOptions, UPDATE_INTERVAL_KEY, codec};
use pretty_assertions::assert_eq;

const WAIT: Duration = Duration::from_secs(5);

fn pair(hub: &MemoryHub) -> (Tables, Tables) {
	let server = Tables::start_server(hub, TablesOptions::default()).unwrap();
	let client = Tables::start(hub, Role::Client, None, TablesOptions::default()).unwrap();
	(server, client)
}

#[test]
fn published_values_reach_the_other_side() {
	let hub = MemoryHub::new();
	let (server, client) = pair(&hub);

	let inbound = client.subscribe("FromServer").unwrap();
	let (tx, rx) = mpsc::channel();
	inbound.on_change(move |t| tx.send(t.snapshot()).unwrap());

	let outbound = server.publish("FromServer").unwrap();
	// Initial advertisement of an empty mapping.
	assert!(rx.recv_timeout(WAIT).unwrap().is_empty());

	outbound.set_interval(5000).unwrap();
	outbound.set("ServerKey-0", "ServerVal-0").unwrap();
	outbound.send().unwrap();

	let snapshot = rx.recv_timeout(WAIT).unwrap();
	assert_eq!(snapshot.get("ServerKey-0").map(String::as_str), Some("ServerVal-0"));
	assert_eq!(inbound.interval(), Some(5000));
	assert!(!inbound.exists(UPDATE_INTERVAL_KEY));
}

#[test]
fn late_subscriber_sees_retained_value() {
	let hub = MemoryHub::new();
	let (server, client) = pair(&hub);

	let outbound = server.publish("Late").unwrap();
	outbound.set("k", "v").unwrap();
	outbound.send().unwrap();

	let retained = hub.retained("Late").unwrap();
	assert_eq!(codec::decode(retained.as_slice()).unwrap()["k"], "v");

	let inbound = client.subscribe("Late").unwrap();
	let deadline = std::time::Instant::now() + WAIT;
	while !inbound.exists("k") && std::time::Instant::now() < deadline {
		std::thread::sleep(Duration::from_millis(5));
	}
	assert_eq!(inbound.get("k").unwrap(), "v");
}

#[test]
fn shutdown_detaches_peer() {
	let hub = MemoryHub::new();
	let (server, client) = pair(&hub);
	assert_eq!(hub.peer_count(), 2);

	client.shutdown();
	assert_eq!(hub.peer_count(), 1);
	drop(server);
	assert_eq!(hub.peer_count(), 0);
}

#[test]
fn dropped_publication_does_not_echo_into_new_subscription() {
	let hub = MemoryHub::new();
	let (server, client) = pair(&hub);

	let own = server.publish("X").unwrap();
	own.set("k", "stale-local").unwrap();
	own.send().unwrap();
	server.drop_table("X");
	assert!(hub.retained("X").is_none());

	let view = server.subscribe("X").unwrap();
	let (tx, rx) = mpsc::channel();
	view.on_change(move |t| tx.send(t.snapshot()).unwrap());
	assert!(view.is_empty());

	let remote = client.publish("X").unwrap();
	remote.set("k", "remote").unwrap();
	remote.send().unwrap();

	let mut latest = rx.recv_timeout(WAIT).unwrap();
	while latest.get("k").map(String::as_str) != Some("remote") {
		latest = rx.recv_timeout(WAIT).unwrap();
	}
	assert_eq!(view.get("k").unwrap(), "remote");
}
