//! In-process transport.
//!
//! A [`MemoryHub`] plays the part of the shared network table: every transport it
//! initializes is one peer, published values are retained per name, and each publish
//! is delivered to the receivers other peers registered for that name.
//! A peer never receives its own publications, retained or live.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::codec::Payload;
use crate::endpoint::Endpoint;
use crate::transport::{Connector, ReceiverSink, Role, Transport, TransportError};

/// Latest payload for a name and the peer that published it.
struct Retained {
	owner: u64,
	payload: Payload,
}

#[derive(Default)]
struct HubState {
	/// Latest payload per name.
	retained: HashMap<String, Retained>,
	/// Receivers keyed by peer, then by name.
	receivers: HashMap<u64, HashMap<String, ReceiverSink>>,
	next_peer: u64,
}

/// Shared in-memory table space.
#[derive(Clone, Default)]
pub struct MemoryHub {
	state: Arc<RwLock<HubState>>,
}

impl MemoryHub {
	/// Creates an empty hub.
	pub fn new() -> Self {
		Self::default()
	}

	/// Attaches a new peer.
	pub fn transport(&self) -> Arc<MemoryTransport> {
		let mut state = self.state.write();
		let peer = state.next_peer;
		state.next_peer += 1;
		state.receivers.insert(peer, HashMap::new());
		Arc::new(MemoryTransport {
			hub: self.clone(),
			peer,
			closed: AtomicBool::new(false),
		})
	}

	/// Latest payload published under `name`, if any.
	pub fn retained(&self, name: &str) -> Option<Payload> {
		self.state.read().retained.get(name).map(|r| r.payload.clone())
	}

	/// Number of attached peers.
	pub fn peer_count(&self) -> usize {
		self.state.read().receivers.len()
	}
}

impl std::fmt::Debug for MemoryHub {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.read();
		f.debug_struct("MemoryHub")
			.field("retained", &state.retained.len())
			.field("peers", &state.receivers.len())
			.finish()
	}
}

impl Connector for MemoryHub {
	fn initialize(&self, role: Role, _endpoint: Option<&Endpoint>) -> Result<Arc<dyn Transport>, TransportError> {
		tracing::debug!(role = role.as_str(), "memory.attach");
		Ok(self.transport())
	}
}

/// One peer attached to a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryTransport {
	hub: MemoryHub,
	peer: u64,
	closed: AtomicBool,
}

impl Transport for MemoryTransport {
	fn register_receiver(&self, name: &str, sink: ReceiverSink) -> Result<(), TransportError> {
		if self.closed.load(Ordering::Acquire) {
			return Err(TransportError::Closed);
		}
		let mut state = self.hub.state.write();
		if let Some(retained) = state.retained.get(name)
			&& retained.owner != self.peer
		{
			sink.deliver(retained.payload.clone());
		}
		state.receivers.entry(self.peer).or_default().insert(name.to_owned(), sink);
		Ok(())
	}

	fn unregister_receiver(&self, name: &str) {
		if let Some(receivers) = self.hub.state.write().receivers.get_mut(&self.peer) {
			receivers.remove(name);
		}
	}

	fn publish_payload(&self, name: &str, payload: Payload) -> Result<(), TransportError> {
		if self.closed.load(Ordering::Acquire) {
			return Err(TransportError::Closed);
		}
		let mut state = self.hub.state.write();
		for (peer, receivers) in &state.receivers {
			if *peer == self.peer {
				continue;
			}
			if let Some(sink) = receivers.get(name) {
				sink.deliver(payload.clone());
			}
		}
		tracing::trace!(table = %name, len = payload.len(), "memory.publish");
		state.retained.insert(name.to_owned(), Retained { owner: self.peer, payload });
		Ok(())
	}

	fn withdraw(&self, name: &str) {
		let mut state = self.hub.state.write();
		if state.retained.get(name).is_some_and(|r| r.owner == self.peer) {
			state.retained.remove(name);
		}
	}

	fn close(&self) {
		if !self.closed.swap(true, Ordering::AcqRel) {
			self.hub.state.write().receivers.remove(&self.peer);
		}
	}
}
