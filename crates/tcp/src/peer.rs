//! One connected peer: a writer task draining the peer's outbox and a read loop
//! feeding the hub.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::frame::{read_frame, write_frame};
use crate::hub::Hub;
use crate::outbox::Outbox;

/// Serves one stream until it closes, errors, or `cancel` fires.
pub(crate) async fn run_peer<S>(stream: S, hub: Arc<Hub>, cancel: CancellationToken, label: &str)
where
	S: AsyncRead + AsyncWrite + Send + 'static,
{
	let (mut reader, mut writer) = tokio::io::split(stream);
	let outbox = Arc::new(Outbox::default());
	let id = hub.attach_peer(outbox.clone());
	let done = cancel.child_token();

	let writer_done = done.clone();
	let writer_label = label.to_owned();
	let writer_task = tokio::spawn(async move {
		'write: loop {
			while let Some(frame) = outbox.pop() {
				if let Err(e) = write_frame(&mut writer, &frame).await {
					tracing::debug!(peer = %writer_label, error = %e, "write failed");
					break 'write;
				}
			}
			tokio::select! {
				_ = writer_done.cancelled() => break,
				_ = outbox.ready() => {}
			}
		}
		writer_done.cancel();
	});

	loop {
		let read = tokio::select! {
			_ = done.cancelled() => break,
			read = read_frame(&mut reader) => read,
		};
		match read {
			Ok(Some(frame)) => hub.apply_remote(id, frame),
			Ok(None) => break,
			Err(e) => {
				tracing::warn!(peer = %label, error = %e, "dropping peer after read error");
				break;
			}
		}
	}

	hub.detach_peer(id);
	done.cancel();
	let _ = writer_task.await;
}
