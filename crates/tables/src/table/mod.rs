//! Named key-value table.
//!
//! A [`Table`] is a cheap handle onto one named mapping. Published tables accept local
//! writes and broadcast the whole mapping on [`Table::send`]; subscribed tables are
//! replaced wholesale by each remote receipt and only ever read locally.
//!
//! # Staleness
//!
//! A table with a declared update interval is stale once more than
//! `interval * STALE_FACTOR` has passed since its last update. [`Table::is_stale`] is
//! a pure query; [`Table::poll_stale`] additionally fires the stale callback on the
//! fresh-to-stale edge, once per episode. The next receipt re-arms it.
//!
//! # Locking
//!
//! Mutable state sits behind a per-table mutex, independent of the registry lock.
//! Callbacks are cloned out and invoked after the lock is released, so a callback may
//! freely read the table or call [`Table::send`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::codec::{self, Payload, UPDATE_INTERVAL_KEY, WireInterval};
use crate::registry::Shared;
use crate::{Error, Result};

/// Multiplier applied to the update interval to get the staleness threshold.
pub const STALE_FACTOR: f64 = 2.5;

/// Handler invoked with the table that changed or went stale.
pub type TableCallback = Arc<dyn Fn(&Table) + Send + Sync>;

struct TableState {
	data: HashMap<String, String>,
	interval: Option<u32>,
	last_update: Option<Instant>,
	/// Set once the current staleness episode has been reported.
	stale_reported: bool,
	on_change: Option<TableCallback>,
	on_stale: Option<TableCallback>,
}

struct TableShared {
	name: String,
	writable: bool,
	clock: Arc<dyn Clock>,
	registry: Weak<Shared>,
	/// Serializes snapshot-and-push so payloads leave in snapshot order.
	send_order: Mutex<()>,
	state: Mutex<TableState>,
}

/// Handle to one named table.
///
/// Clones refer to the same table.
#[derive(Clone)]
pub struct Table {
	shared: Arc<TableShared>,
}

impl Table {
	pub(crate) fn new(name: &str, writable: bool, clock: Arc<dyn Clock>, registry: Weak<Shared>) -> Self {
		Self {
			shared: Arc::new(TableShared {
				name: name.to_owned(),
				writable,
				clock,
				registry,
				send_order: Mutex::new(()),
				state: Mutex::new(TableState {
					data: HashMap::new(),
					interval: None,
					last_update: None,
					stale_reported: false,
					on_change: None,
					on_stale: None,
				}),
			}),
		}
	}

	/// Table name.
	pub fn name(&self) -> &str {
		&self.shared.name
	}

	/// `true` for published tables, `false` for subscribed ones.
	pub fn is_writable(&self) -> bool {
		self.shared.writable
	}

	/// Returns `true` if both handles refer to the same table.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}

	fn ensure_writable(&self) -> Result<()> {
		if self.shared.writable {
			Ok(())
		} else {
			Err(Error::NotWritable {
				name: self.shared.name.clone(),
			})
		}
	}

	/// Declared update interval in milliseconds, `None` when there is none.
	pub fn interval(&self) -> Option<u32> {
		self.shared.state.lock().interval
	}

	/// Declares the update interval advertised to subscribers.
	///
	/// Values `<= 0` clear the interval.
	///
	/// # Errors
	///
	/// [`Error::NotWritable`] on a subscribed table.
	pub fn set_interval(&self, ms: i32) -> Result<()> {
		self.ensure_writable()?;
		self.shared.state.lock().interval = codec::normalize_interval(ms);
		Ok(())
	}

	/// Inserts or overwrites an entry.
	///
	/// # Errors
	///
	/// [`Error::NotWritable`] on a subscribed table, [`Error::ReservedKey`] for
	/// [`UPDATE_INTERVAL_KEY`].
	pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
		self.ensure_writable()?;
		let key = key.into();
		if key == UPDATE_INTERVAL_KEY {
			return Err(Error::ReservedKey { key });
		}
		let now = self.shared.clock.now();
		let mut state = self.shared.state.lock();
		state.data.insert(key, value.into());
		state.last_update = Some(now);
		Ok(())
	}

	/// Stores a float in its string form.
	pub fn set_f64(&self, key: impl Into<String>, value: f64) -> Result<()> {
		self.set(key, value.to_string())
	}

	/// Stores an integer in its string form.
	pub fn set_i32(&self, key: impl Into<String>, value: i32) -> Result<()> {
		self.set(key, value.to_string())
	}

	/// Removes an entry. Absent keys are ignored.
	///
	/// # Errors
	///
	/// [`Error::NotWritable`] on a subscribed table.
	pub fn remove(&self, key: &str) -> Result<()> {
		self.ensure_writable()?;
		self.shared.state.lock().data.remove(key);
		Ok(())
	}

	/// Empties the mapping without pushing anything.
	///
	/// Allowed on subscribed tables; it only drops the local copy until the next receipt.
	pub fn clear(&self) {
		self.shared.state.lock().data.clear();
	}

	/// Returns the value stored under `key`.
	///
	/// # Errors
	///
	/// [`Error::KeyNotFound`] when absent.
	pub fn get(&self, key: &str) -> Result<String> {
		self.shared.state.lock().data.get(key).cloned().ok_or_else(|| Error::KeyNotFound { key: key.to_owned() })
	}

	/// Returns the value under `key` parsed as a float.
	///
	/// # Errors
	///
	/// [`Error::KeyNotFound`] when absent, [`Error::Parse`] when not a float.
	pub fn get_f64(&self, key: &str) -> Result<f64> {
		self.get_parsed(key)
	}

	/// Returns the value under `key` parsed as an integer.
	///
	/// # Errors
	///
	/// [`Error::KeyNotFound`] when absent, [`Error::Parse`] when not an integer.
	pub fn get_i32(&self, key: &str) -> Result<i32> {
		self.get_parsed(key)
	}

	fn get_parsed<T>(&self, key: &str) -> Result<T>
	where
		T: std::str::FromStr,
		T::Err: fmt::Display,
	{
		let value = self.get(key)?;
		match value.parse::<T>() {
			Ok(parsed) => Ok(parsed),
			Err(e) => Err(Error::Parse {
				key: key.to_owned(),
				reason: e.to_string(),
				value,
			}),
		}
	}

	/// Returns `true` if `key` is present.
	pub fn exists(&self, key: &str) -> bool {
		self.shared.state.lock().data.contains_key(key)
	}

	/// Keys in sorted order.
	pub fn keys(&self) -> Vec<String> {
		let mut keys: Vec<_> = self.shared.state.lock().data.keys().cloned().collect();
		keys.sort();
		keys
	}

	/// Copy of the current mapping.
	pub fn snapshot(&self) -> HashMap<String, String> {
		self.shared.state.lock().data.clone()
	}

	/// Number of entries.
	pub fn len(&self) -> usize {
		self.shared.state.lock().data.len()
	}

	/// Returns `true` when the mapping is empty.
	pub fn is_empty(&self) -> bool {
		self.shared.state.lock().data.is_empty()
	}

	/// Instant of the last local write or remote receipt.
	pub fn last_update(&self) -> Option<Instant> {
		self.shared.state.lock().last_update
	}

	/// Replaces the change callback.
	///
	/// Runs on the sender's thread after [`Table::send`], and on the registry's
	/// dispatch thread after a remote receipt.
	pub fn on_change(&self, callback: impl Fn(&Table) + Send + Sync + 'static) {
		self.shared.state.lock().on_change = Some(Arc::new(callback));
	}

	/// Replaces the stale callback.
	///
	/// # Errors
	///
	/// [`Error::NotSubscribed`] on a published table.
	pub fn on_stale(&self, callback: impl Fn(&Table) + Send + Sync + 'static) -> Result<()> {
		if self.shared.writable {
			return Err(Error::NotSubscribed {
				name: self.shared.name.clone(),
			});
		}
		self.shared.state.lock().on_stale = Some(Arc::new(callback));
		Ok(())
	}

	/// Returns `true` when the table has missed [`STALE_FACTOR`] update intervals.
	///
	/// Tables without an interval are never stale.
	pub fn is_stale(&self) -> bool {
		let now = self.shared.clock.now();
		is_stale_at(&self.shared.state.lock(), now)
	}

	/// Evaluates staleness and fires the stale callback on the fresh-to-stale edge.
	///
	/// Returns the current staleness. While the table stays stale, repeated polls do
	/// not fire again.
	pub fn poll_stale(&self) -> bool {
		let now = self.shared.clock.now();
		let callback = {
			let mut state = self.shared.state.lock();
			if !is_stale_at(&state, now) {
				state.stale_reported = false;
				return false;
			}
			if state.stale_reported {
				return true;
			}
			state.stale_reported = true;
			state.on_stale.clone()
		};
		tracing::debug!(table = %self.shared.name, "table.stale");
		if let Some(callback) = callback {
			callback(self);
		}
		true
	}

	/// Broadcasts the current mapping and interval, then fires the change callback.
	///
	/// # Errors
	///
	/// [`Error::NotWritable`] on a subscribed table, plus anything
	/// [`Tables::push`](crate::Tables::push) reports.
	pub fn send(&self) -> Result<()> {
		self.ensure_writable()?;
		{
			let _order = self.shared.send_order.lock();
			let payload = self.encode_for_send();
			let registry = self.shared.registry.upgrade().ok_or(Error::NotConnected)?;
			registry.push(&self.shared.name, payload)?;
			self.mark_sent();
		}
		self.notify_change();
		Ok(())
	}

	/// Snapshots the mapping with the interval entry.
	pub(crate) fn encode_for_send(&self) -> Payload {
		let state = self.shared.state.lock();
		codec::encode_with_interval(&state.data, state.interval)
	}

	/// Stamps the update time once a payload has been accepted by the transport.
	pub(crate) fn mark_sent(&self) {
		let now = self.shared.clock.now();
		self.shared.state.lock().last_update = Some(now);
	}

	/// Applies a remote payload addressed to `name`.
	///
	/// Returns `Ok(false)` without touching anything when `name` is not this table's.
	/// Otherwise the mapping is replaced wholesale, the interval entry is applied, and
	/// the change callback fires on the calling thread.
	///
	/// # Errors
	///
	/// [`Error::NotSubscribed`] on a published table, [`Error::MalformedPayload`] for an
	/// odd-length payload. Neither mutates the table.
	pub fn receive(&self, name: &str, payload: &Payload) -> Result<bool> {
		if name != self.shared.name {
			return Ok(false);
		}
		if self.shared.writable {
			return Err(Error::NotSubscribed {
				name: self.shared.name.clone(),
			});
		}

		let mut data = codec::decode(payload.as_slice())?;
		let interval = codec::take_interval(&mut data);
		let now = self.shared.clock.now();
		let callback = {
			let mut state = self.shared.state.lock();
			state.data = data;
			state.last_update = Some(now);
			state.stale_reported = false;
			match interval {
				WireInterval::Declared(interval) => state.interval = interval,
				WireInterval::Absent => {}
				WireInterval::Invalid(raw) => {
					tracing::warn!(table = %self.shared.name, value = %raw, "ignoring unparsable update interval");
				}
			}
			state.on_change.clone()
		};
		tracing::trace!(table = %self.shared.name, len = payload.len(), "table.receive");
		if let Some(callback) = callback {
			callback(self);
		}
		Ok(true)
	}

	fn notify_change(&self) {
		let callback = self.shared.state.lock().on_change.clone();
		if let Some(callback) = callback {
			callback(self);
		}
	}
}

fn is_stale_at(state: &TableState, now: Instant) -> bool {
	let Some(interval) = state.interval else {
		return false;
	};
	match state.last_update {
		Some(at) => now.saturating_duration_since(at) > stale_threshold(interval),
		None => true,
	}
}

fn stale_threshold(interval_ms: u32) -> Duration {
	let micros = f64::from(interval_ms) * STALE_FACTOR * 1000.0;
	Duration::from_micros(micros.round() as u64)
}

impl fmt::Debug for Table {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Table")
			.field("name", &self.shared.name)
			.field("writable", &self.shared.writable)
			.field("interval", &self.interval())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests;
