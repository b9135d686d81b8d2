//! Contract between the table registry and a shared-table transport.
//!
//! The registry never touches sockets. A [`Connector`] brings a [`Transport`] up for a
//! given [`Role`]; the transport then accepts outbound payloads via
//! [`Transport::publish_payload`] and hands inbound ones to the [`ReceiverSink`]
//! registered for their name, from whatever thread it runs on.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::codec::Payload;
use crate::endpoint::Endpoint;

/// Which side of the connection this process opened.
///
/// Only affects connection setup. Both roles can publish and subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
	/// Initiator: connects to a remote server.
	Client,
	/// Acceptor: listens for inbound peers.
	Server,
}

impl Role {
	/// Stable lowercase label for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Client => "client",
			Self::Server => "server",
		}
	}
}

/// Errors raised by transport adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
	/// Socket or thread setup failed.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	/// The endpoint is neither an IP address nor a team number.
	#[error("invalid IP address or team number: {0}")]
	InvalidEndpoint(String),
	/// A client role was requested without an endpoint.
	#[error("client role requires an endpoint")]
	MissingEndpoint,
	/// The transport has been closed.
	#[error("transport closed")]
	Closed,
}

/// One inbound payload tagged with the table name it was published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
	/// Table name.
	pub name: String,
	/// Raw payload.
	pub payload: Payload,
}

/// Delivery handle a transport invokes for inbound data on one name.
///
/// Delivery only enqueues onto the registry's dispatch channel, so it never blocks
/// and never runs table callbacks on the transport's thread.
#[derive(Debug, Clone)]
pub struct ReceiverSink {
	name: String,
	tx: mpsc::UnboundedSender<Receipt>,
}

impl ReceiverSink {
	/// Wraps a dispatch channel sender for `name`.
	pub fn from_sender(name: impl Into<String>, tx: mpsc::UnboundedSender<Receipt>) -> Self {
		Self { name: name.into(), tx }
	}

	/// Name this sink was registered for.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Forwards a payload to the registry.
	///
	/// Returns `false` once the registry has gone away.
	pub fn deliver(&self, payload: Payload) -> bool {
		self.tx
			.send(Receipt {
				name: self.name.clone(),
				payload,
			})
			.is_ok()
	}
}

/// A live shared-table connection.
pub trait Transport: Send + Sync + 'static {
	/// Routes future data tagged `name` to `sink`, replacing any earlier sink.
	///
	/// Implementations that already hold a value for `name` deliver it immediately.
	fn register_receiver(&self, name: &str, sink: ReceiverSink) -> Result<(), TransportError>;

	/// Stops routing data tagged `name`. Unknown names are ignored.
	fn unregister_receiver(&self, name: &str);

	/// Publishes a payload under `name`. Best effort; there is no acknowledgement.
	fn publish_payload(&self, name: &str, payload: Payload) -> Result<(), TransportError>;

	/// Gives up local ownership of `name`: forgets this side's last published value
	/// so the name may later be subscribed. Unknown names are ignored.
	fn withdraw(&self, name: &str);

	/// Tears the connection down. Later publishes fail with [`TransportError::Closed`].
	fn close(&self) {}
}

/// Brings up a [`Transport`].
pub trait Connector {
	/// Establishes the connection for `role`.
	///
	/// `endpoint` names the remote server and is required for [`Role::Client`].
	fn initialize(&self, role: Role, endpoint: Option<&Endpoint>) -> Result<Arc<dyn Transport>, TransportError>;
}

impl<F> Connector for F
where
	F: Fn(Role, Option<&Endpoint>) -> Result<Arc<dyn Transport>, TransportError>,
{
	fn initialize(&self, role: Role, endpoint: Option<&Endpoint>) -> Result<Arc<dyn Transport>, TransportError> {
		self(role, endpoint)
	}
}
