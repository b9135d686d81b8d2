//! Per-peer outbound queue holding at most one pending payload per table name.
//!
//! Only the latest value of a table matters to a peer, so a newer payload replaces
//! an unsent one in place. A slow reader therefore costs one entry per name, not one
//! per publish.

use std::collections::{HashMap, VecDeque};

use nettables::Payload;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::frame::Frame;

#[derive(Default)]
struct Pending {
	/// Names in first-queued order.
	order: VecDeque<String>,
	latest: HashMap<String, Payload>,
}

#[derive(Default)]
pub(crate) struct Outbox {
	pending: Mutex<Pending>,
	ready: Notify,
}

impl Outbox {
	/// Queues `payload` for `name`, replacing any payload not yet written.
	pub(crate) fn push(&self, name: &str, payload: Payload) {
		{
			let mut pending = self.pending.lock();
			if pending.latest.insert(name.to_owned(), payload).is_none() {
				pending.order.push_back(name.to_owned());
			}
		}
		self.ready.notify_one();
	}

	/// Takes the oldest pending frame.
	pub(crate) fn pop(&self) -> Option<Frame> {
		let mut pending = self.pending.lock();
		let name = pending.order.pop_front()?;
		let payload = pending.latest.remove(&name)?;
		Some(Frame::Update { name, payload })
	}

	/// Waits until something was pushed since the last wake-up.
	pub(crate) async fn ready(&self) {
		self.ready.notified().await;
	}

	pub(crate) fn len(&self) -> usize {
		self.pending.lock().order.len()
	}
}
