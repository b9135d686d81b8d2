//! TCP transport for [`nettables`].
//!
//! The server role binds a listener, retains the latest payload per table name and
//! relays every update to all other connected peers. The client role connects to a
//! server address (or a team number resolved to one), reconnecting with a fixed
//! backoff, and replays its own published tables after each reconnect.
//!
//! Frames are a `u32` little-endian length followed by a postcard-encoded [`Frame`].

#![warn(missing_docs)]

pub mod frame;
mod hub;
mod outbox;
mod peer;
mod transport;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use nettables::{Connector, DEFAULT_PORT, Endpoint, Role, Transport, TransportError};

pub use frame::{Frame, MAX_FRAME_LEN};
pub use transport::TcpTransport;

/// Delay between client connection attempts.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Builds [`TcpTransport`]s for [`nettables::Tables::start`].
#[derive(Debug, Clone)]
pub struct TcpConnector {
	/// Listen address in the server role.
	pub bind: SocketAddr,
	/// Port used for endpoints that do not name one.
	pub port: u16,
	/// Delay between client connection attempts.
	pub reconnect_backoff: Duration,
}

impl TcpConnector {
	/// Overrides the server listen address.
	#[must_use]
	pub fn with_bind(mut self, bind: SocketAddr) -> Self {
		self.bind = bind;
		self
	}

	/// Overrides the default port for client endpoints.
	#[must_use]
	pub fn with_port(mut self, port: u16) -> Self {
		self.port = port;
		self
	}

	/// Overrides the reconnect delay.
	#[must_use]
	pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
		self.reconnect_backoff = backoff;
		self
	}
}

impl Default for TcpConnector {
	fn default() -> Self {
		Self {
			bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
			port: DEFAULT_PORT,
			reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
		}
	}
}

impl Connector for TcpConnector {
	fn initialize(&self, role: Role, endpoint: Option<&Endpoint>) -> Result<Arc<dyn Transport>, TransportError> {
		let transport = match role {
			Role::Server => TcpTransport::listen(self.bind)?,
			Role::Client => {
				let endpoint = endpoint.ok_or(TransportError::MissingEndpoint)?;
				TcpTransport::connect(endpoint.socket_addr(self.port), self.reconnect_backoff)?
			}
		};
		Ok(Arc::new(transport))
	}
}
