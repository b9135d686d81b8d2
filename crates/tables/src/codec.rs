//! Flat payload codec.
//!
//! A mapping of `n` entries travels as `2n` strings: the keys occupy positions
//! `[0, n)` and each value sits at its key's offset plus `n`. The publisher's update
//! interval rides along under [`UPDATE_INTERVAL_KEY`] as a stringified integer, with
//! `-1` meaning "no interval".

use std::collections::HashMap;
use std::iter;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reserved key carrying the publisher's update interval in milliseconds.
pub const UPDATE_INTERVAL_KEY: &str = "_UPDATE_INTERVAL";

/// Wire value of [`UPDATE_INTERVAL_KEY`] when no interval is declared.
pub const NO_INTERVAL: i32 = -1;

/// Flat ordered string sequence exchanged with the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Vec<String>);

impl Payload {
	/// Wraps a raw string sequence.
	pub fn new(items: Vec<String>) -> Self {
		Self(items)
	}

	/// Returns the raw sequence.
	pub fn as_slice(&self) -> &[String] {
		&self.0
	}

	/// Number of strings in the sequence (twice the number of entries).
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` for an empty sequence.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Unwraps into the raw sequence.
	pub fn into_inner(self) -> Vec<String> {
		self.0
	}
}

impl From<Vec<String>> for Payload {
	fn from(items: Vec<String>) -> Self {
		Self(items)
	}
}

/// Encodes a mapping as `[keys.., values..]`.
pub fn encode(map: &HashMap<String, String>) -> Payload {
	encode_entries(map.iter().map(|(k, v)| (k.as_str(), v.as_str())), map.len())
}

/// Encodes a mapping plus the reserved interval entry.
pub fn encode_with_interval(map: &HashMap<String, String>, interval: Option<u32>) -> Payload {
	let interval = interval_to_wire(interval);
	let entries = map
		.iter()
		.filter(|(k, _)| k.as_str() != UPDATE_INTERVAL_KEY)
		.map(|(k, v)| (k.as_str(), v.as_str()))
		.chain(iter::once((UPDATE_INTERVAL_KEY, interval.as_str())));
	encode_entries(entries, map.len() + 1)
}

fn encode_entries<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>, hint: usize) -> Payload {
	let mut keys = Vec::with_capacity(hint * 2);
	let mut values = Vec::with_capacity(hint);
	// Keys and values are collected in one pass so both halves share one order.
	for (key, value) in entries {
		keys.push(key.to_owned());
		values.push(value.to_owned());
	}
	keys.append(&mut values);
	Payload(keys)
}

/// Decodes `[keys.., values..]` back into a mapping.
///
/// Duplicate keys keep the value that appears last.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] when the sequence length is odd.
pub fn decode(items: &[String]) -> Result<HashMap<String, String>> {
	if items.len() % 2 != 0 {
		return Err(Error::MalformedPayload { len: items.len() });
	}
	let (keys, values) = items.split_at(items.len() / 2);
	Ok(keys.iter().cloned().zip(values.iter().cloned()).collect())
}

/// Interval entry found in a decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireInterval {
	/// The payload carried no interval entry.
	Absent,
	/// The payload declared an interval; `None` is the no-interval sentinel.
	Declared(Option<u32>),
	/// The entry was present but did not parse as an integer.
	Invalid(String),
}

/// Removes the reserved interval entry from a decoded mapping and interprets it.
pub fn take_interval(map: &mut HashMap<String, String>) -> WireInterval {
	let Some(raw) = map.remove(UPDATE_INTERVAL_KEY) else {
		return WireInterval::Absent;
	};
	match raw.parse::<i32>() {
		Ok(ms) => WireInterval::Declared(normalize_interval(ms)),
		Err(_) => WireInterval::Invalid(raw),
	}
}

/// Maps a signed millisecond count onto the declared-interval domain.
///
/// Anything `<= 0` means "no interval".
pub fn normalize_interval(ms: i32) -> Option<u32> {
	u32::try_from(ms).ok().filter(|ms| *ms > 0)
}

fn interval_to_wire(interval: Option<u32>) -> String {
	match interval {
		Some(ms) => ms.to_string(),
		None => NO_INTERVAL.to_string(),
	}
}
