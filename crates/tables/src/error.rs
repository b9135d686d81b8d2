//! Error types for table and registry operations.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by [`Table`](crate::Table) and [`Tables`](crate::Tables).
///
/// Every variant is a local, synchronous usage error. Nothing is retried internally.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	/// A mutation was attempted on a subscribed table.
	#[error("table is read-only: {name}")]
	NotWritable {
		/// Table name.
		name: String,
	},

	/// A subscriber-only operation was attempted on a published table.
	#[error("table is local: {name}")]
	NotSubscribed {
		/// Table name.
		name: String,
	},

	/// The name is already registered with the opposite direction.
	#[error("table already exists but does not share writable state: {name} (writable: {writable})")]
	DirectionMismatch {
		/// Table name.
		name: String,
		/// Writable state of the existing table.
		writable: bool,
	},

	/// No table with this name is registered.
	#[error("no such table: {name}")]
	UnknownTable {
		/// Table name.
		name: String,
	},

	/// The transport was never initialized or has been shut down.
	#[error("transport not initialized")]
	NotConnected,

	/// A payload with an odd number of elements cannot be split into pairs.
	#[error("payload contains an odd number of elements ({len})")]
	MalformedPayload {
		/// Number of elements received.
		len: usize,
	},

	/// The key is not present in the table.
	#[error("no such key: {key}")]
	KeyNotFound {
		/// Requested key.
		key: String,
	},

	/// The key collides with the reserved update-interval key.
	#[error("key is reserved for the update interval: {key}")]
	ReservedKey {
		/// Offending key.
		key: String,
	},

	/// A stored value is not a valid number of the requested type.
	#[error("value for {key} is not a valid number: {value:?} ({reason})")]
	Parse {
		/// Requested key.
		key: String,
		/// Stored string value.
		value: String,
		/// Parser message.
		reason: String,
	},

	/// The transport rejected an operation.
	#[error(transparent)]
	Transport(#[from] TransportError),
}

/// Result type for table and registry operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
