//! Wire frames: `u32` little-endian length prefix, then a postcard body.

use std::io::{Error as IoError, ErrorKind};

use nettables::Payload;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Message exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
	/// Latest payload for a named table.
	Update {
		/// Table name.
		name: String,
		/// Flat `[keys.., values..]` payload.
		payload: Payload,
	},
}

impl Frame {
	/// Table name the frame refers to.
	pub fn name(&self) -> &str {
		match self {
			Self::Update { name, .. } => name,
		}
	}
}

/// Writes one frame and flushes.
///
/// # Errors
///
/// [`ErrorKind::InvalidData`] if the body cannot be encoded or exceeds
/// [`MAX_FRAME_LEN`]; otherwise the underlying I/O error.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
	W: AsyncWrite + Unpin,
{
	let buf = postcard::to_allocvec(frame).map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))?;
	let len = u32::try_from(buf.len())
		.ok()
		.filter(|len| *len <= MAX_FRAME_LEN)
		.ok_or_else(|| IoError::new(ErrorKind::InvalidData, format!("frame of {} bytes exceeds limit", buf.len())))?;
	writer.write_u32_le(len).await?;
	writer.write_all(&buf).await?;
	writer.flush().await?;
	Ok(())
}

/// Reads one frame. Returns `Ok(None)` on a clean end of stream before a length prefix.
///
/// # Errors
///
/// [`ErrorKind::InvalidData`] for oversized or undecodable bodies, and any I/O
/// error including an end of stream inside a frame.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Frame>>
where
	R: AsyncRead + Unpin,
{
	let len = match reader.read_u32_le().await {
		Ok(len) => len,
		Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
		Err(e) => return Err(e),
	};
	if len > MAX_FRAME_LEN {
		return Err(IoError::new(ErrorKind::InvalidData, format!("frame length {len} exceeds limit")));
	}
	let mut buf = vec![0u8; len as usize];
	reader.read_exact(&mut buf).await?;
	postcard::from_bytes(&buf)
		.map(Some)
		.map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn update(name: &str, items: &[&str]) -> Frame {
		Frame::Update {
			name: name.to_owned(),
			payload: Payload::new(items.iter().map(|s| (*s).to_owned()).collect()),
		}
	}

	#[tokio::test]
	async fn frames_cross_a_duplex_stream() -> std::io::Result<()> {
		let (mut a, mut b) = tokio::io::duplex(1024);
		let first = update("FromServer", &["k", "v"]);
		let second = update("FromClient", &[]);

		write_frame(&mut a, &first).await?;
		write_frame(&mut a, &second).await?;
		drop(a);

		assert_eq!(read_frame(&mut b).await?, Some(first));
		assert_eq!(read_frame(&mut b).await?, Some(second));
		assert_eq!(read_frame(&mut b).await?, None);
		Ok(())
	}

	#[tokio::test]
	async fn oversized_length_is_rejected() -> std::io::Result<()> {
		let (mut a, mut b) = tokio::io::duplex(64);
		a.write_u32_le(MAX_FRAME_LEN + 1).await?;

		let err = read_frame(&mut b).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::InvalidData);
		Ok(())
	}

	#[tokio::test]
	async fn truncated_body_is_an_error() -> std::io::Result<()> {
		let (mut a, mut b) = tokio::io::duplex(64);
		a.write_u32_le(10).await?;
		a.write_all(&[1, 2, 3]).await?;
		drop(a);

		let err = read_frame(&mut b).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
		Ok(())
	}

	#[tokio::test]
	async fn garbage_body_is_invalid_data() -> std::io::Result<()> {
		let (mut a, mut b) = tokio::io::duplex(64);
		a.write_u32_le(2).await?;
		a.write_all(&[0xff, 0xff]).await?;

		let err = read_frame(&mut b).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::InvalidData);
		Ok(())
	}
}
