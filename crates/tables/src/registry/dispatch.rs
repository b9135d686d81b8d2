//! Dispatch thread: applies inbound receipts and sweeps for staleness.
//!
//! Runs a current-thread tokio runtime on a dedicated OS thread. Change callbacks for
//! remote receipts and all stale callbacks execute here, never on the transport's
//! thread and never under a registry or table lock.

use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::Shared;
use crate::transport::Receipt;

const THREAD_NAME: &str = "nettables-dispatch";

/// Owner handle for the dispatch thread.
pub(super) struct DispatchHandle {
	cancel: CancellationToken,
	thread: Option<JoinHandle<()>>,
}

impl DispatchHandle {
	/// Cancels the loop and joins the thread.
	///
	/// Skips the join when called from the dispatch thread itself, e.g. a callback that
	/// shuts the registry down.
	pub(super) fn stop(mut self) {
		self.cancel.cancel();
		let Some(thread) = self.thread.take() else {
			return;
		};
		if thread.thread().id() == std::thread::current().id() {
			return;
		}
		if thread.join().is_err() {
			warn!("dispatch thread panicked");
		}
	}
}

pub(super) fn spawn(shared: Weak<Shared>, rx: mpsc::UnboundedReceiver<Receipt>, stale_poll: Duration) -> std::io::Result<DispatchHandle> {
	let cancel = CancellationToken::new();
	let token = cancel.clone();
	let thread = std::thread::Builder::new().name(THREAD_NAME.to_owned()).spawn(move || {
		let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
			Ok(runtime) => runtime,
			Err(e) => {
				warn!(error = %e, "failed to build dispatch runtime");
				return;
			}
		};
		runtime.block_on(run(shared, rx, stale_poll, token));
	})?;
	Ok(DispatchHandle {
		cancel,
		thread: Some(thread),
	})
}

async fn run(shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<Receipt>, stale_poll: Duration, cancel: CancellationToken) {
	let mut sweep = tokio::time::interval(stale_poll.max(Duration::from_millis(1)));
	sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			receipt = rx.recv() => {
				let Some(receipt) = receipt else { break };
				let Some(shared) = shared.upgrade() else { break };
				deliver(&shared, receipt);
			}
			_ = sweep.tick() => {
				let Some(shared) = shared.upgrade() else { break };
				sweep_stale(&shared);
			}
		}
	}
	trace!("dispatch.exit");
}

fn deliver(shared: &Shared, receipt: Receipt) {
	let Some(table) = shared.find(&receipt.name) else {
		trace!(table = %receipt.name, "dropping receipt for unregistered table");
		return;
	};
	if table.is_writable() {
		trace!(table = %receipt.name, "dropping receipt for published table");
		return;
	}
	if let Err(e) = table.receive(&receipt.name, &receipt.payload) {
		warn!(table = %receipt.name, error = %e, "discarding remote payload");
	}
}

fn sweep_stale(shared: &Shared) {
	for table in shared.subscribed() {
		table.poll_stale();
	}
}
