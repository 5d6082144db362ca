// Copyright 2022 pyke.io
//           2019-2021 Tauri Programme within The Commons Conservancy
//                     [https://tauri.studio/]
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Length-prefixed framing over an `interprocess` local socket stream.
//!
//! Generalizes the line-delimited handshake `millennium::request_single_instance_lock`
//! uses for its single-instance lock into a full binary frame format: a
//! little-endian `i32` message identifier followed by a little-endian `u32`
//! payload length and the payload bytes.

use interprocess::local_socket::tokio::LocalSocketStream;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::{
	error::{Error, Result},
	message::Frame,
};

/// Frames larger than this are refused; nothing in this protocol legitimately
/// sends a multi-megabyte payload (the biggest opaque object is an appcast
/// item), so this is a defense against a corrupt or malicious peer.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

pub struct FramedStream {
	inner: LocalSocketStream,
}

impl FramedStream {
	pub fn new(inner: LocalSocketStream) -> Self {
		Self { inner }
	}

	pub async fn connect(name: impl AsRef<str>) -> Result<Self> {
		let inner = LocalSocketStream::connect(name.as_ref()).await?;
		Ok(Self { inner })
	}

	pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
		let mut buf = Vec::with_capacity(8 + frame.payload.len());
		buf.extend_from_slice(&frame.id.to_le_bytes());
		buf.extend_from_slice(&(frame.payload.len() as u32).to_le_bytes());
		buf.extend_from_slice(&frame.payload);
		self.inner.write_all(&buf).await?;
		self.inner.flush().await?;
		Ok(())
	}

	pub async fn read_frame(&mut self) -> Result<Frame> {
		let mut header = [0u8; 8];
		self.inner.read_exact(&mut header).await?;
		let id = i32::from_le_bytes(header[0..4].try_into().unwrap());
		let len = u32::from_le_bytes(header[4..8].try_into().unwrap());
		if len > MAX_FRAME_LEN {
			return Err(Error::MalformedMessage(format!("frame length {len} exceeds maximum")));
		}
		let mut payload = vec![0u8; len as usize];
		self.inner.read_exact(&mut payload).await?;
		Ok(Frame { id, payload })
	}

	/// Splits into independent read/write halves so a reader loop and a
	/// writer handle can live on different tasks.
	pub fn split(self) -> (FramedReader, FramedWriter) {
		let (read_half, write_half) = tokio::io::split(self.inner);
		(FramedReader { inner: read_half }, FramedWriter { inner: write_half })
	}
}

pub struct FramedReader {
	inner: ReadHalf<LocalSocketStream>,
}

impl FramedReader {
	pub async fn read_frame(&mut self) -> Result<Frame> {
		let mut header = [0u8; 8];
		self.inner.read_exact(&mut header).await?;
		let id = i32::from_le_bytes(header[0..4].try_into().unwrap());
		let len = u32::from_le_bytes(header[4..8].try_into().unwrap());
		if len > MAX_FRAME_LEN {
			return Err(Error::MalformedMessage(format!("frame length {len} exceeds maximum")));
		}
		let mut payload = vec![0u8; len as usize];
		self.inner.read_exact(&mut payload).await?;
		Ok(Frame { id, payload })
	}
}

pub struct FramedWriter {
	inner: WriteHalf<LocalSocketStream>,
}

impl FramedWriter {
	pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
		let mut buf = Vec::with_capacity(8 + frame.payload.len());
		buf.extend_from_slice(&frame.id.to_le_bytes());
		buf.extend_from_slice(&(frame.payload.len() as u32).to_le_bytes());
		buf.extend_from_slice(&frame.payload);
		self.inner.write_all(&buf).await?;
		self.inner.flush().await?;
		Ok(())
	}
}

/// Builds the deterministic local-socket endpoint name for a host bundle
/// identifier, per spec: `<identifier>.installer`.
pub fn updater_endpoint_name(identifier: &str) -> String {
	#[cfg(windows)]
	{
		format!("{identifier}.installer")
	}
	#[cfg(not(windows))]
	{
		format!("/tmp/{identifier}.installer.sock")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn endpoint_name_is_deterministic() {
		let a = updater_endpoint_name("io.pyke.millennium.testapp");
		let b = updater_endpoint_name("io.pyke.millennium.testapp");
		assert_eq!(a, b);
		assert!(a.contains("io.pyke.millennium.testapp"));
	}
}
