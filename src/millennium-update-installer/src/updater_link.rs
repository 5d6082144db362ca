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

//! The server endpoint the updater connects to.
//!
//! Generalized from `millennium::request_single_instance_lock`'s
//! `LocalSocketListener::bind` + `incoming()` loop, but enforcing exactly one
//! live connection instead of fanning every connection out to a callback.

use std::sync::Arc;

use interprocess::local_socket::tokio::{LocalSocketListener, LocalSocketStream};
use tokio::sync::{mpsc, Mutex};

use crate::{
	error::{Error, Result},
	message::Frame,
	transport::{FramedStream, FramedWriter},
};

/// Inbound messages from the updater, plus lifecycle events, multiplexed onto
/// a single channel for the stage controller to select over.
pub enum UpdaterEvent {
	Connected,
	Message(Frame),
	Invalidated,
}

/// A cheaply cloneable handle for sending frames to whichever updater
/// connection is currently active, if any.
#[derive(Clone)]
pub struct UpdaterSender {
	writer: Arc<Mutex<Option<FramedWriter>>>,
}

impl UpdaterSender {
	pub async fn send(&self, frame: Frame) -> Result<()> {
		let mut guard = self.writer.lock().await;
		match guard.as_mut() {
			Some(writer) => writer.write_frame(&frame).await,
			None => Err(Error::PeerVanished("updater")),
		}
	}

	pub async fn is_connected(&self) -> bool {
		self.writer.lock().await.is_some()
	}
}

/// Accepts exactly one inbound connection from the updater at a time and
/// drives its read loop; call [`UpdaterLink::sender`] for a handle that can
/// send frames back concurrently.
pub struct UpdaterLink {
	listener: LocalSocketListener,
	writer: Arc<Mutex<Option<FramedWriter>>>,
	events_tx: mpsc::UnboundedSender<UpdaterEvent>,
}

impl UpdaterLink {
	/// Binds the deterministically-named endpoint. Events (connect, message,
	/// invalidation) are pushed onto `events_tx` as they occur.
	pub fn bind(endpoint_name: &str, events_tx: mpsc::UnboundedSender<UpdaterEvent>) -> Result<Self> {
		let listener = LocalSocketListener::bind(endpoint_name)?;
		Ok(Self { listener, writer: Arc::new(Mutex::new(None)), events_tx })
	}

	/// A cloneable sender usable for as long as the link is running.
	pub fn sender(&self) -> UpdaterSender {
		UpdaterSender { writer: self.writer.clone() }
	}

	/// Accepts connections until the socket is closed. The first connection
	/// is kept and read from in a loop; any subsequent connection is rejected
	/// immediately, without disturbing the first.
	pub async fn run(mut self) {
		loop {
			let incoming = match self.listener.accept().await {
				Ok(stream) => stream,
				Err(_) => return,
			};
			let already_connected = self.writer.lock().await.is_some();
			if already_connected {
				tracing::warn!(error = %Error::SecondUpdaterConnection, "dropping a second updater connection attempt");
				drop(incoming);
				continue;
			}

			let (mut reader, writer) = FramedStream::new(incoming).split();
			*self.writer.lock().await = Some(writer);
			let _ = self.events_tx.send(UpdaterEvent::Connected);

			loop {
				match reader.read_frame().await {
					Ok(frame) => {
						if self.events_tx.send(UpdaterEvent::Message(frame)).is_err() {
							return;
						}
					}
					Err(_) => break,
				}
			}

			*self.writer.lock().await = None;
			let _ = self.events_tx.send(UpdaterEvent::Invalidated);
		}
	}
}

/// Opens a connection to an already-bound updater endpoint. Only used by
/// tests and by the updater side of the protocol, never by the daemon.
pub async fn connect(endpoint_name: &str) -> Result<FramedStream> {
	let stream = LocalSocketStream::connect(endpoint_name).await?;
	Ok(FramedStream::new(stream))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::MessageId;

	fn unique_endpoint_name(label: &str) -> String {
		let pid = std::process::id();
		#[cfg(windows)]
		{
			format!("updater-link-test-{label}-{pid}")
		}
		#[cfg(not(windows))]
		{
			format!("/tmp/updater-link-test-{label}-{pid}.sock")
		}
	}

	#[tokio::test]
	async fn accepts_first_connection_and_rejects_second() {
		let name = unique_endpoint_name("reject-second");
		let _ = std::fs::remove_file(&name);
		let (tx, mut rx) = mpsc::unbounded_channel();
		let link = UpdaterLink::bind(&name, tx).unwrap();
		let sender = link.sender();
		let handle = tokio::spawn(link.run());

		let _first = connect(&name).await.unwrap();
		assert!(matches!(rx.recv().await.unwrap(), UpdaterEvent::Connected));
		assert!(sender.is_connected().await);

		let _second = connect(&name).await.unwrap();
		// the second connection is dropped without ever producing a Connected event
		// for it; the first link keeps running undisturbed.
		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		assert!(sender.is_connected().await);

		handle.abort();
		let _ = std::fs::remove_file(&name);
	}

	#[tokio::test]
	async fn forwards_frames_from_the_updater() {
		let name = unique_endpoint_name("forward-frames");
		let _ = std::fs::remove_file(&name);
		let (tx, mut rx) = mpsc::unbounded_channel();
		let link = UpdaterLink::bind(&name, tx).unwrap();
		let handle = tokio::spawn(link.run());

		let mut client = connect(&name).await.unwrap();
		assert!(matches!(rx.recv().await.unwrap(), UpdaterEvent::Connected));

		client.write_frame(&Frame::empty(MessageId::UpdaterAlivePong)).await.unwrap();
		match rx.recv().await.unwrap() {
			UpdaterEvent::Message(frame) => assert_eq!(frame.id, MessageId::UpdaterAlivePong as i32),
			_ => panic!("expected a message event"),
		}

		handle.abort();
		let _ = std::fs::remove_file(&name);
	}

	#[tokio::test]
	async fn sender_reports_peer_vanished_once_updater_disconnects() {
		let name = unique_endpoint_name("peer-vanished");
		let _ = std::fs::remove_file(&name);
		let (tx, mut rx) = mpsc::unbounded_channel();
		let link = UpdaterLink::bind(&name, tx).unwrap();
		let sender = link.sender();
		let handle = tokio::spawn(link.run());

		let client = connect(&name).await.unwrap();
		assert!(matches!(rx.recv().await.unwrap(), UpdaterEvent::Connected));
		drop(client);
		assert!(matches!(rx.recv().await.unwrap(), UpdaterEvent::Invalidated));

		assert!(matches!(sender.send(Frame::empty(MessageId::UpdaterAlivePing)).await, Err(Error::PeerVanished("updater"))));

		handle.abort();
		let _ = std::fs::remove_file(&name);
	}
}
