//! Per-process table space shared by every connection of one transport.
//!
//! Keeps the latest payload per name, the local receivers, and an [`Outbox`] per
//! connected peer. Only the server role relays a peer's update to the other peers.
//! Names published locally are never handed to local receivers, and withdrawing one
//! frees it for remote updates again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use nettables::{Payload, ReceiverSink, Role};
use parking_lot::Mutex;
use tracing::trace;

use crate::frame::Frame;
use crate::outbox::Outbox;

/// Identifier of one connected peer.
pub(crate) type PeerId = u64;

#[derive(Default)]
struct HubState {
	retained: HashMap<String, Payload>,
	/// Names this process publishes.
	published: HashSet<String>,
	receivers: HashMap<String, ReceiverSink>,
	peers: HashMap<PeerId, Arc<Outbox>>,
	next_peer: PeerId,
}

pub(crate) struct Hub {
	role: Role,
	state: Mutex<HubState>,
}

impl Hub {
	pub(crate) fn new(role: Role) -> Self {
		Self {
			role,
			state: Mutex::new(HubState::default()),
		}
	}

	pub(crate) fn role(&self) -> Role {
		self.role
	}

	pub(crate) fn register_receiver(&self, name: &str, sink: ReceiverSink) {
		let mut state = self.state.lock();
		if !state.published.contains(name)
			&& let Some(payload) = state.retained.get(name)
		{
			sink.deliver(payload.clone());
		}
		state.receivers.insert(name.to_owned(), sink);
	}

	pub(crate) fn unregister_receiver(&self, name: &str) {
		self.state.lock().receivers.remove(name);
	}

	/// Retains a locally published payload and queues it to every peer.
	pub(crate) fn publish_local(&self, name: &str, payload: Payload) {
		let mut state = self.state.lock();
		for outbox in state.peers.values() {
			outbox.push(name, payload.clone());
		}
		state.published.insert(name.to_owned());
		state.retained.insert(name.to_owned(), payload);
	}

	/// Forgets a local publication so remote updates for `name` apply again.
	pub(crate) fn withdraw(&self, name: &str) {
		let mut state = self.state.lock();
		if state.published.remove(name) {
			state.retained.remove(name);
			trace!(table = %name, "hub.withdraw");
		}
	}

	/// Adds a peer and queues the values it should see first.
	///
	/// A server replays everything it retains. A client replays only its own
	/// published values so the server learns them again after a reconnect.
	pub(crate) fn attach_peer(&self, outbox: Arc<Outbox>) -> PeerId {
		let mut state = self.state.lock();
		let id = state.next_peer;
		state.next_peer += 1;

		for (name, payload) in &state.retained {
			if self.role == Role::Server || state.published.contains(name) {
				outbox.push(name, payload.clone());
			}
		}
		trace!(peer = id, replay = outbox.len(), "hub.attach");
		state.peers.insert(id, outbox);
		id
	}

	pub(crate) fn detach_peer(&self, id: PeerId) {
		self.state.lock().peers.remove(&id);
	}

	/// Applies a frame read from peer `from`.
	pub(crate) fn apply_remote(&self, from: PeerId, frame: Frame) {
		let Frame::Update { name, payload } = frame;
		let mut state = self.state.lock();
		if state.published.contains(&name) {
			trace!(table = %name, peer = from, "ignoring remote update for locally published table");
			return;
		}
		if let Some(sink) = state.receivers.get(&name) {
			sink.deliver(payload.clone());
		}
		if self.role == Role::Server {
			for (peer, outbox) in &state.peers {
				if *peer != from {
					outbox.push(&name, payload.clone());
				}
			}
		}
		trace!(table = %name, peer = from, len = payload.len(), "hub.remote");
		state.retained.insert(name, payload);
	}

	pub(crate) fn peer_count(&self) -> usize {
		self.state.lock().peers.len()
	}

	pub(crate) fn retained(&self, name: &str) -> Option<Payload> {
		self.state.lock().retained.get(name).cloned()
	}
}

#[cfg(test)]
mod tests {
	use nettables::Receipt;
	use pretty_assertions::assert_eq;
	use tokio::sync::mpsc;

	use super::*;

	fn payload(items: &[&str]) -> Payload {
		Payload::new(items.iter().map(|s| (*s).to_owned()).collect())
	}

	fn update(name: &str, items: &[&str]) -> Frame {
		Frame::Update {
			name: name.to_owned(),
			payload: payload(items),
		}
	}

	fn names(outbox: &Outbox) -> Vec<String> {
		let mut out = Vec::new();
		while let Some(frame) = outbox.pop() {
			out.push(frame.name().to_owned());
		}
		out.sort();
		out
	}

	fn attach(hub: &Hub) -> (PeerId, Arc<Outbox>) {
		let outbox = Arc::new(Outbox::default());
		(hub.attach_peer(outbox.clone()), outbox)
	}

	#[test]
	fn server_relays_to_other_peers_and_local_receivers() {
		let hub = Hub::new(Role::Server);
		let (a, a_out) = attach(&hub);
		let (_, b_out) = attach(&hub);
		let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<Receipt>();
		hub.register_receiver("T", ReceiverSink::from_sender("T", sink_tx));

		hub.apply_remote(a, update("T", &["k", "v"]));

		assert!(a_out.pop().is_none());
		assert_eq!(names(&b_out), vec!["T"]);
		assert_eq!(sink_rx.try_recv().unwrap().payload, payload(&["k", "v"]));
	}

	#[test]
	fn client_does_not_relay() {
		let hub = Hub::new(Role::Client);
		let (a, _) = attach(&hub);
		let (_, b_out) = attach(&hub);

		hub.apply_remote(a, update("T", &[]));
		assert!(b_out.pop().is_none());
		assert_eq!(hub.retained("T"), Some(payload(&[])));
	}

	#[test]
	fn new_peers_get_a_replay_by_role() {
		let server = Hub::new(Role::Server);
		server.publish_local("Mine", payload(&[]));
		server.apply_remote(99, update("Theirs", &[]));
		let (_, outbox) = attach(&server);
		assert_eq!(names(&outbox), vec!["Mine", "Theirs"]);

		let client = Hub::new(Role::Client);
		client.publish_local("Mine", payload(&[]));
		client.apply_remote(99, update("Theirs", &[]));
		let (_, outbox) = attach(&client);
		assert_eq!(names(&outbox), vec!["Mine"]);
	}

	#[test]
	fn late_receiver_gets_retained_value() {
		let hub = Hub::new(Role::Client);
		hub.apply_remote(0, update("T", &["k", "v"]));
		let (tx, mut rx) = mpsc::unbounded_channel();
		hub.register_receiver("T", ReceiverSink::from_sender("T", tx));
		assert_eq!(rx.try_recv().unwrap().name, "T");
	}

	#[test]
	fn remote_cannot_overwrite_local_publication() {
		let hub = Hub::new(Role::Server);
		hub.publish_local("Mine", payload(&["k", "v"]));
		hub.apply_remote(0, update("Mine", &[]));
		assert_eq!(hub.retained("Mine"), Some(payload(&["k", "v"])));
	}

	#[test]
	fn withdrawn_name_accepts_remote_updates() {
		let hub = Hub::new(Role::Server);
		hub.publish_local("X", payload(&[]));
		hub.withdraw("X");
		hub.withdraw("never-published");
		assert_eq!(hub.retained("X"), None);

		let (tx, mut rx) = mpsc::unbounded_channel();
		hub.register_receiver("X", ReceiverSink::from_sender("X", tx));
		assert!(rx.try_recv().is_err());

		hub.apply_remote(0, update("X", &["k", "remote"]));
		assert_eq!(rx.try_recv().unwrap().payload, payload(&["k", "remote"]));
	}

	#[test]
	fn slow_peer_queue_holds_one_entry_per_name() {
		let hub = Hub::new(Role::Server);
		let (_, outbox) = attach(&hub);
		for i in 0..500 {
			hub.publish_local("A", payload(&["i", &i.to_string()]));
			hub.publish_local("B", payload(&["i", &i.to_string()]));
		}
		assert_eq!(outbox.len(), 2);
		assert_eq!(outbox.pop().map(|f| f.name().to_owned()).as_deref(), Some("A"));
	}
}
