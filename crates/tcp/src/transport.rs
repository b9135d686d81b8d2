//! [`TcpTransport`]: owns the network thread and bridges the hub to the
//! [`Transport`] contract.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nettables::{Payload, ReceiverSink, Role, Transport, TransportError};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub::Hub;
use crate::peer::run_peer;

const THREAD_NAME: &str = "nettables-tcp";

/// TCP transport in either role.
pub struct TcpTransport {
	hub: Arc<Hub>,
	cancel: CancellationToken,
	local_addr: Option<SocketAddr>,
	thread: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
	/// Binds `addr` and accepts peers on a background thread.
	///
	/// # Errors
	///
	/// [`TransportError::Io`] if the address cannot be bound or the runtime cannot
	/// be built.
	pub fn listen(addr: SocketAddr) -> Result<Self, TransportError> {
		let std_listener = std::net::TcpListener::bind(addr)?;
		std_listener.set_nonblocking(true)?;
		let local_addr = std_listener.local_addr()?;

		let runtime = build_runtime()?;
		let listener = {
			let _guard = runtime.enter();
			TcpListener::from_std(std_listener)?
		};
		info!(addr = %local_addr, "listening");

		let hub = Arc::new(Hub::new(Role::Server));
		let cancel = CancellationToken::new();
		let thread = spawn(runtime, accept_loop(listener, hub.clone(), cancel.clone()))?;
		Ok(Self {
			hub,
			cancel,
			local_addr: Some(local_addr),
			thread: Mutex::new(Some(thread)),
		})
	}

	/// Connects to `addr` on a background thread, retrying every `backoff` until
	/// closed.
	///
	/// Returns immediately; publishes made while disconnected are retained and
	/// replayed once the connection comes up.
	///
	/// # Errors
	///
	/// [`TransportError::Io`] if the runtime or thread cannot be created.
	pub fn connect(addr: SocketAddr, backoff: Duration) -> Result<Self, TransportError> {
		let runtime = build_runtime()?;
		let hub = Arc::new(Hub::new(Role::Client));
		let cancel = CancellationToken::new();
		let thread = spawn(runtime, connect_loop(addr, backoff, hub.clone(), cancel.clone()))?;
		Ok(Self {
			hub,
			cancel,
			local_addr: None,
			thread: Mutex::new(Some(thread)),
		})
	}

	/// Bound address in the server role.
	pub fn local_addr(&self) -> Option<SocketAddr> {
		self.local_addr
	}

	/// Role this transport was opened in.
	pub fn role(&self) -> Role {
		self.hub.role()
	}

	/// Number of currently connected peers.
	pub fn peer_count(&self) -> usize {
		self.hub.peer_count()
	}

	/// Latest payload seen for `name`, local or remote.
	pub fn retained(&self, name: &str) -> Option<Payload> {
		self.hub.retained(name)
	}
}

impl Transport for TcpTransport {
	fn register_receiver(&self, name: &str, sink: ReceiverSink) -> Result<(), TransportError> {
		if self.cancel.is_cancelled() {
			return Err(TransportError::Closed);
		}
		self.hub.register_receiver(name, sink);
		Ok(())
	}

	fn unregister_receiver(&self, name: &str) {
		self.hub.unregister_receiver(name);
	}

	fn publish_payload(&self, name: &str, payload: Payload) -> Result<(), TransportError> {
		if self.cancel.is_cancelled() {
			return Err(TransportError::Closed);
		}
		self.hub.publish_local(name, payload);
		Ok(())
	}

	fn withdraw(&self, name: &str) {
		self.hub.withdraw(name);
	}

	fn close(&self) {
		self.cancel.cancel();
		let Some(thread) = self.thread.lock().take() else {
			return;
		};
		if thread.thread().id() == std::thread::current().id() {
			return;
		}
		if thread.join().is_err() {
			warn!("network thread panicked");
		}
	}
}

impl Drop for TcpTransport {
	fn drop(&mut self) {
		self.close();
	}
}

impl std::fmt::Debug for TcpTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TcpTransport")
			.field("role", &self.hub.role())
			.field("local_addr", &self.local_addr)
			.field("closed", &self.cancel.is_cancelled())
			.finish_non_exhaustive()
	}
}

fn build_runtime() -> std::io::Result<Runtime> {
	tokio::runtime::Builder::new_current_thread().enable_io().enable_time().build()
}

fn spawn<F>(runtime: Runtime, task: F) -> std::io::Result<JoinHandle<()>>
where
	F: Future<Output = ()> + Send + 'static,
{
	std::thread::Builder::new().name(THREAD_NAME.to_owned()).spawn(move || {
		runtime.block_on(task);
	})
}

async fn accept_loop(listener: TcpListener, hub: Arc<Hub>, cancel: CancellationToken) {
	loop {
		tokio::select! {
			_ = cancel.cancelled() => break,
			res = listener.accept() => match res {
				Ok((stream, addr)) => {
					if let Err(e) = stream.set_nodelay(true) {
						debug!(peer = %addr, error = %e, "set_nodelay failed");
					}
					info!(peer = %addr, "peer connected");
					let hub = hub.clone();
					let cancel = cancel.clone();
					tokio::spawn(async move {
						let label = addr.to_string();
						run_peer(stream, hub, cancel, &label).await;
						info!(peer = %label, "peer disconnected");
					});
				}
				Err(e) => warn!(error = %e, "accept failed"),
			},
		}
	}
	debug!("accept loop stopped");
}

async fn connect_loop(addr: SocketAddr, backoff: Duration, hub: Arc<Hub>, cancel: CancellationToken) {
	let label = addr.to_string();
	loop {
		let attempt = tokio::select! {
			_ = cancel.cancelled() => break,
			attempt = TcpStream::connect(addr) => attempt,
		};
		match attempt {
			Ok(stream) => {
				if let Err(e) = stream.set_nodelay(true) {
					debug!(peer = %label, error = %e, "set_nodelay failed");
				}
				info!(peer = %label, "connected");
				run_peer(stream, hub.clone(), cancel.clone(), &label).await;
				info!(peer = %label, "disconnected");
			}
			Err(e) => debug!(peer = %label, error = %e, retry_in = ?backoff, "connect failed"),
		}
		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = tokio::time::sleep(backoff) => {}
		}
	}
	debug!("connect loop stopped");
}
