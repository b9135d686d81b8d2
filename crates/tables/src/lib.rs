//! Directional publish/subscribe key-value tables.
//!
//! This crate layers named string tables over a generic shared-table transport:
//! * [`Tables`]: the registry context; creates tables and enforces that a name is
//!   either published or subscribed, never both
//! * [`Table`]: one named mapping with its update interval, staleness tracking and
//!   change/stale callbacks
//! * [`codec`]: the flat `[keys.., values..]` payload format tables travel in
//! * [`Transport`] / [`Connector`]: the contract a network adapter implements
//! * [`MemoryHub`]: an in-process transport for tests and single-process setups

#![warn(missing_docs)]

pub mod clock;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod memory;
pub mod registry;
pub mod table;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Payload, UPDATE_INTERVAL_KEY};
pub use endpoint::{DEFAULT_PORT, Endpoint};
pub use error::{Error, Result};
pub use memory::MemoryHub;
pub use registry::{Tables, TablesOptions};
pub use table::{STALE_FACTOR, Table};
pub use transport::{Connector, Receipt, ReceiverSink, Role, Transport, TransportError};
