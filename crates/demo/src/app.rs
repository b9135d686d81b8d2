//! Server and client loops.
//!
//! Each side publishes one table, subscribes to the other side's table, and prints
//! every received snapshot. Loops run until `iterations` sends have been made, or
//! forever when no limit is given.

use std::thread;

use anyhow::Context;
use nettables::{Connector, Table, Tables, TablesOptions};
use tracing::{debug, info};

use crate::config::DemoConfig;

pub const SERVER_TABLE: &str = "FromServer";
pub const CLIENT_TABLE: &str = "FromClient";

/// Lines printed for a received snapshot, sorted by key.
pub fn render(table: &Table) -> Vec<String> {
	let snapshot = table.snapshot();
	let mut keys: Vec<_> = snapshot.keys().collect();
	keys.sort();
	keys.into_iter().map(|key| format!("{key} => {}", snapshot[key])).collect()
}

fn watch(table: &Table) -> anyhow::Result<()> {
	table.on_change(|table| {
		for line in render(table) {
			println!("{line}");
		}
		println!();
	});
	table.on_stale(|table| {
		println!("\nTable expired: {}\n", table.name());
	})?;
	Ok(())
}

fn options(config: &DemoConfig) -> TablesOptions {
	TablesOptions::default().with_stale_poll(config.stale_poll())
}

/// Runs the server side: publishes [`SERVER_TABLE`], subscribes [`CLIENT_TABLE`].
pub fn run_server(connector: &dyn Connector, config: &DemoConfig, iterations: Option<u64>) -> anyhow::Result<()> {
	let tables = Tables::start_server(connector, options(config)).context("failed to start server")?;
	info!(port = config.port, "server started");
	let published = tables.publish(SERVER_TABLE)?;
	let subscribed = tables.subscribe(CLIENT_TABLE)?;
	watch(&subscribed)?;
	published.set_interval(config.update_interval_ms)?;

	for i in counter(iterations) {
		thread::sleep(config.publish_period());
		if i % 10 == 0 {
			published.clear();
		}
		published.set(format!("ServerKey-{i}"), format!("ServerVal-{i}"))?;
		published.send()?;
		debug!(iteration = i, "server sent");
	}

	tables.shutdown();
	Ok(())
}

/// Runs the client side against `endpoint`: publishes [`CLIENT_TABLE`], subscribes
/// [`SERVER_TABLE`].
pub fn run_client(connector: &dyn Connector, endpoint: &str, config: &DemoConfig, iterations: Option<u64>) -> anyhow::Result<()> {
	let tables = Tables::start_client(connector, endpoint, options(config)).with_context(|| format!("failed to start client for {endpoint}"))?;
	info!(endpoint, "client started");
	let published = tables.publish(CLIENT_TABLE)?;
	let subscribed = tables.subscribe(SERVER_TABLE)?;
	watch(&subscribed)?;
	published.set_interval(config.update_interval_ms)?;

	for i in counter(iterations) {
		thread::sleep(config.publish_period());
		published.set(format!("ClientKey-{}", i % 10), format!("ClientVal-{i}"))?;
		published.send()?;
		debug!(iteration = i, "client sent");
	}

	tables.shutdown();
	Ok(())
}

fn counter(limit: Option<u64>) -> impl Iterator<Item = u64> {
	(0..).take_while(move |i| limit.is_none_or(|limit| *i < limit))
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use nettables::{MemoryHub, codec};
	use pretty_assertions::assert_eq;

	use super::*;

	fn fast() -> DemoConfig {
		DemoConfig {
			publish_period_ms: 1,
			..DemoConfig::default()
		}
	}

	fn retained(hub: &MemoryHub, name: &str) -> HashMap<String, String> {
		let payload = hub.retained(name).unwrap();
		codec::decode(payload.as_slice()).unwrap()
	}

	#[test]
	fn server_clears_every_ten_iterations() {
		let hub = MemoryHub::new();
		run_server(&hub, &fast(), Some(12)).unwrap();

		let mut map = retained(&hub, SERVER_TABLE);
		assert_eq!(map.remove(nettables::UPDATE_INTERVAL_KEY).as_deref(), Some("5000"));
		let mut keys: Vec<_> = map.into_keys().collect();
		keys.sort();
		assert_eq!(keys, vec!["ServerKey-10", "ServerKey-11"]);
	}

	#[test]
	fn client_cycles_ten_keys() {
		let hub = MemoryHub::new();
		run_client(&hub, "127.0.0.1", &fast(), Some(13)).unwrap();

		let map = retained(&hub, CLIENT_TABLE);
		assert_eq!(map.len(), 11);
		assert_eq!(map["ClientKey-2"], "ClientVal-12");
		assert_eq!(map["ClientKey-3"], "ClientVal-3");
	}

	#[test]
	fn client_rejects_bad_endpoint() {
		let hub = MemoryHub::new();
		assert!(run_client(&hub, "not an address", &fast(), Some(0)).is_err());
	}

	#[test]
	fn render_sorts_keys() {
		let hub = MemoryHub::new();
		let tables = Tables::start_server(&hub, TablesOptions::default()).unwrap();
		let table = tables.publish("T").unwrap();
		table.set("b", "2").unwrap();
		table.set("a", "1").unwrap();
		assert_eq!(render(&table), vec!["a => 1", "b => 2"]);
	}

	#[test]
	fn counter_respects_limit() {
		assert_eq!(counter(Some(3)).collect::<Vec<_>>(), vec![0, 1, 2]);
		assert_eq!(counter(None).take(5).count(), 5);
	}
}
