//! Table registry.
//!
//! # Purpose
//!
//! - Own the set of named tables for one transport connection.
//! - Enforce directionality: a name is either published or subscribed, never both.
//! - Bind table lifecycle to the transport: an initial push on publish, a receiver
//!   registration on subscribe, an unregistration or withdrawal on drop.
//!
//! # Mental model
//!
//! - [`Tables`] is constructed only after the transport came up, and is torn down by
//!   [`Tables::shutdown`] (also on drop). There is no ambient global instance.
//! - The directory mutex guards the name map and every transport bind/unbind/push.
//!   Each [`Table`] carries its own lock for its contents.
//! - Inbound payloads reach the registry as [`Receipt`] messages on a channel. A
//!   dedicated dispatch thread drains it, applies receipts to tables, and sweeps
//!   subscribed tables for staleness every [`TablesOptions::stale_poll`].
//!
//! # Invariants
//!
//! 1. At most one table exists per name, and concurrent creators of one name observe a
//!    single winner.
//!    - Enforced in: `Tables::get_or_create`
//!    - Tested by: `registry::tests::concurrent_publish_creates_one_table`
//! 2. Lock order is directory, then table. No path acquires the directory lock while
//!    holding a table's state lock, and no callback runs under either.
//!    - Enforced in: `Table::send`, `dispatch::deliver`, `dispatch::sweep_stale`
//!    - Tested by: `registry::tests::change_callback_may_send_from_dispatch_thread`
//! 3. Only published tables are pushed; only subscribed tables receive.
//!    - Enforced in: `Shared::push_locked`, `dispatch::deliver`
//!    - Tested by: `registry::tests::push_rejects_subscribed_table`

mod dispatch;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::clock::{Clock, SystemClock};
use crate::codec::Payload;
use crate::endpoint::Endpoint;
use crate::table::Table;
use crate::transport::{Connector, Receipt, ReceiverSink, Role, Transport, TransportError};
use crate::{Error, Result};

/// Default period of the staleness sweep.
pub const DEFAULT_STALE_POLL: Duration = Duration::from_millis(100);

/// Registry construction options.
#[derive(Clone)]
pub struct TablesOptions {
	/// Period at which subscribed tables are checked for staleness.
	pub stale_poll: Duration,
	/// Time source shared by all tables.
	pub clock: Arc<dyn Clock>,
}

impl TablesOptions {
	/// Overrides the staleness sweep period.
	#[must_use]
	pub fn with_stale_poll(mut self, period: Duration) -> Self {
		self.stale_poll = period;
		self
	}

	/// Overrides the time source.
	#[must_use]
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}
}

impl Default for TablesOptions {
	fn default() -> Self {
		Self {
			stale_poll: DEFAULT_STALE_POLL,
			clock: Arc::new(SystemClock),
		}
	}
}

impl fmt::Debug for TablesOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TablesOptions").field("stale_poll", &self.stale_poll).finish_non_exhaustive()
	}
}

/// Name map and connection flag, guarded together.
struct Directory {
	tables: HashMap<String, Table>,
	connected: bool,
}

/// State shared between the registry handle, its tables, and the dispatch thread.
pub(crate) struct Shared {
	role: Role,
	transport: Arc<dyn Transport>,
	clock: Arc<dyn Clock>,
	receipts: mpsc::UnboundedSender<Receipt>,
	directory: Mutex<Directory>,
}

impl Shared {
	/// Pushes a payload for a registered, published table.
	pub(crate) fn push(&self, name: &str, payload: Payload) -> Result<()> {
		let directory = self.directory.lock();
		self.push_locked(&directory, name, payload)
	}

	fn push_locked(&self, directory: &Directory, name: &str, payload: Payload) -> Result<()> {
		if !directory.connected {
			return Err(Error::NotConnected);
		}
		let table = directory.tables.get(name).ok_or_else(|| Error::UnknownTable { name: name.to_owned() })?;
		if !table.is_writable() {
			return Err(Error::NotWritable { name: name.to_owned() });
		}
		trace!(table = %name, len = payload.len(), "registry.push");
		self.transport.publish_payload(name, payload)?;
		Ok(())
	}

	fn find(&self, name: &str) -> Option<Table> {
		self.directory.lock().tables.get(name).cloned()
	}

	fn subscribed(&self) -> Vec<Table> {
		self.directory.lock().tables.values().filter(|t| !t.is_writable()).cloned().collect()
	}
}

/// Registry of named tables bound to one transport connection.
pub struct Tables {
	shared: Arc<Shared>,
	dispatch: Mutex<Option<dispatch::DispatchHandle>>,
}

impl Tables {
	/// Initializes a transport through `connector` and builds a registry on it.
	///
	/// # Errors
	///
	/// Propagates transport initialization failures and dispatch thread spawn errors.
	pub fn start(connector: &dyn Connector, role: Role, endpoint: Option<&Endpoint>, options: TablesOptions) -> Result<Self> {
		let transport = connector.initialize(role, endpoint)?;
		info!(role = role.as_str(), endpoint = ?endpoint, "transport initialized");
		Self::with_transport(transport, role, options)
	}

	/// Starts in the acceptor role.
	pub fn start_server(connector: &dyn Connector, options: TablesOptions) -> Result<Self> {
		Self::start(connector, Role::Server, None, options)
	}

	/// Starts in the initiator role, connecting to an address or team number.
	///
	/// # Errors
	///
	/// [`TransportError::InvalidEndpoint`] when `endpoint` is neither.
	pub fn start_client(connector: &dyn Connector, endpoint: &str, options: TablesOptions) -> Result<Self> {
		let endpoint = Endpoint::parse(endpoint)?;
		Self::start(connector, Role::Client, Some(&endpoint), options)
	}

	/// Builds a registry over an already initialized transport.
	///
	/// # Errors
	///
	/// Fails only if the dispatch thread cannot be spawned.
	pub fn with_transport(transport: Arc<dyn Transport>, role: Role, options: TablesOptions) -> Result<Self> {
		let (receipts, rx) = mpsc::unbounded_channel();
		let shared = Arc::new(Shared {
			role,
			transport,
			clock: options.clock,
			receipts,
			directory: Mutex::new(Directory {
				tables: HashMap::new(),
				connected: true,
			}),
		});
		let handle = dispatch::spawn(Arc::downgrade(&shared), rx, options.stale_poll).map_err(TransportError::from)?;
		Ok(Self {
			shared,
			dispatch: Mutex::new(Some(handle)),
		})
	}

	/// Role the transport was opened in.
	pub fn role(&self) -> Role {
		self.shared.role
	}

	/// `true` when this process is the initiator.
	pub fn is_client(&self) -> bool {
		self.shared.role == Role::Client
	}

	/// `true` until [`Tables::shutdown`].
	pub fn is_connected(&self) -> bool {
		self.shared.directory.lock().connected
	}

	/// Creates or fetches a published table.
	///
	/// A newly created table is sent immediately, advertising an empty mapping.
	///
	/// # Errors
	///
	/// [`Error::DirectionMismatch`] if `name` is subscribed, [`Error::NotConnected`]
	/// after shutdown, and transport failures of the initial push.
	pub fn publish(&self, name: &str) -> Result<Table> {
		self.get_or_create(name, true)
	}

	/// Creates or fetches a subscribed table.
	///
	/// A newly created table is registered with the transport as the receiver for `name`.
	///
	/// # Errors
	///
	/// [`Error::DirectionMismatch`] if `name` is published, [`Error::NotConnected`]
	/// after shutdown, and transport registration failures.
	pub fn subscribe(&self, name: &str) -> Result<Table> {
		self.get_or_create(name, false)
	}

	fn get_or_create(&self, name: &str, writable: bool) -> Result<Table> {
		let shared = &self.shared;
		let mut directory = shared.directory.lock();
		if !directory.connected {
			return Err(Error::NotConnected);
		}

		if let Some(table) = directory.tables.get(name) {
			if table.is_writable() != writable {
				return Err(Error::DirectionMismatch {
					name: name.to_owned(),
					writable: table.is_writable(),
				});
			}
			return Ok(table.clone());
		}

		let table = Table::new(name, writable, Arc::clone(&shared.clock), Arc::downgrade(shared));
		directory.tables.insert(name.to_owned(), table.clone());

		let bound = if writable {
			let payload = table.encode_for_send();
			shared.push_locked(&directory, name, payload).map(|()| table.mark_sent())
		} else {
			let sink = ReceiverSink::from_sender(name, shared.receipts.clone());
			shared.transport.register_receiver(name, sink).map_err(Error::from)
		};
		if let Err(e) = bound {
			directory.tables.remove(name);
			return Err(e);
		}

		debug!(table = %name, writable, "registry.create");
		Ok(table)
	}

	/// Looks up a table without creating it.
	pub fn get(&self, name: &str) -> Option<Table> {
		self.shared.find(name)
	}

	/// Registered names in sorted order.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<_> = self.shared.directory.lock().tables.keys().cloned().collect();
		names.sort();
		names
	}

	/// Number of registered tables.
	pub fn len(&self) -> usize {
		self.shared.directory.lock().tables.len()
	}

	/// Returns `true` when no tables are registered.
	pub fn is_empty(&self) -> bool {
		self.shared.directory.lock().tables.is_empty()
	}

	/// Unbinds a table from the transport and forgets it. Unknown names are ignored.
	///
	/// A dropped published table is withdrawn, so the name can be subscribed afterwards
	/// without seeing this side's own last payload.
	pub fn drop_table(&self, name: &str) {
		let mut directory = self.shared.directory.lock();
		let Some(table) = directory.tables.remove(name) else {
			return;
		};
		if table.is_writable() {
			self.shared.transport.withdraw(name);
		} else {
			self.shared.transport.unregister_receiver(name);
		}
		debug!(table = %name, writable = table.is_writable(), "registry.drop");
	}

	/// Pushes an encoded payload for a published table.
	///
	/// Used by [`Table::send`]; exposed for callers that encode themselves.
	///
	/// # Errors
	///
	/// [`Error::NotConnected`], [`Error::UnknownTable`], [`Error::NotWritable`], or a
	/// transport failure.
	pub fn push(&self, name: &str, payload: Payload) -> Result<()> {
		self.shared.push(name, payload)
	}

	/// Disconnects: forgets all tables, unbinds receivers, stops dispatch, closes the
	/// transport. Idempotent.
	///
	/// Table handles held elsewhere stay readable; sending through them fails with
	/// [`Error::NotConnected`].
	pub fn shutdown(&self) {
		{
			let mut directory = self.shared.directory.lock();
			if !directory.connected {
				return;
			}
			directory.connected = false;
			for (name, table) in directory.tables.drain() {
				if !table.is_writable() {
					self.shared.transport.unregister_receiver(&name);
				}
			}
		}
		if let Some(handle) = self.dispatch.lock().take() {
			handle.stop();
		}
		self.shared.transport.close();
		info!(role = self.shared.role.as_str(), "registry shut down");
	}
}

impl Drop for Tables {
	fn drop(&mut self) {
		self.shutdown();
	}
}

impl fmt::Debug for Tables {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Tables")
			.field("role", &self.shared.role)
			.field("tables", &self.names())
			.finish_non_exhaustive()
	}
}
