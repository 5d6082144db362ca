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

//! The link to the UI agent process.
//!
//! Unlike [`crate::updater_link`], the daemon is the client here: the agent
//! owns a well-known endpoint and the daemon connects out to it, the same
//! direction `millennium::request_single_instance_lock` connects to an
//! already-bound listener when it isn't the first instance.

use std::{path::Path, sync::Arc};

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::{
	error::{Error, Result},
	message::Frame,
	transport::{FramedStream, FramedWriter},
};

/// Message identifiers private to the agent link. These never cross the
/// updater link and are not part of the wire protocol the updater speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
enum AgentMessageId {
	RegisterRelaunchBundlePath = 0,
	RegisterRelaunchBundlePathReply = 1,
	RegisterInstallationInfo = 2,
	ShowProgress = 3,
	StopProgress = 4,
	Relaunch = 5,
}

/// Lifecycle events the stage controller reacts to.
pub enum AgentEvent {
	Connected,
	Invalidated,
}

type PendingPidReply = Arc<Mutex<Option<oneshot::Sender<u32>>>>;

/// Bidirectional link to the UI agent.
pub struct AgentLink {
	writer: FramedWriter,
	pending_pid_reply: PendingPidReply,
}

impl AgentLink {
	/// Connects to the agent's well-known endpoint and starts a background
	/// reader task. `AgentEvent::Connected` is pushed immediately; further
	/// events follow from the reader task as they occur.
	pub async fn connect(endpoint_name: &str, events_tx: mpsc::UnboundedSender<AgentEvent>) -> Result<(Self, tokio::task::JoinHandle<()>)> {
		let stream = FramedStream::connect(endpoint_name).await?;
		let (mut reader, writer) = stream.split();
		let _ = events_tx.send(AgentEvent::Connected);

		let pending_pid_reply: PendingPidReply = Arc::new(Mutex::new(None));
		let reader_pending = pending_pid_reply.clone();
		let reader_handle = tokio::spawn(async move {
			loop {
				match reader.read_frame().await {
					Ok(frame) if frame.id == AgentMessageId::RegisterRelaunchBundlePathReply as i32 => {
						let Ok(bytes) = frame.payload.as_slice().try_into() else { continue };
						let pid = u32::from_le_bytes(bytes);
						if let Some(sender) = reader_pending.lock().await.take() {
							let _ = sender.send(pid);
						}
					}
					Ok(_) => {
						// no other inbound message types are defined on this link; ignore.
					}
					Err(_) => break,
				}
			}
			let _ = events_tx.send(AgentEvent::Invalidated);
		});

		Ok((Self { writer, pending_pid_reply }, reader_handle))
	}

	/// Asks the agent to resolve a process id for the bundle it will relaunch.
	/// The caller is expected to wrap this in a deadline (the stage
	/// controller's PID-retrieval timer); a dropped reader resolves this to
	/// [`Error::PeerVanished`] rather than hanging forever.
	pub async fn register_relaunch_bundle_path(&mut self, path: &Path) -> Result<u32> {
		let (tx, rx) = oneshot::channel();
		*self.pending_pid_reply.lock().await = Some(tx);
		let payload = path.to_string_lossy().into_owned().into_bytes();
		self.writer.write_frame(&Frame::new_raw(AgentMessageId::RegisterRelaunchBundlePath as i32, payload)).await?;
		rx.await.map_err(|_| Error::PeerVanished("agent"))
	}

	/// Publishes an appcast summary so the agent can broadcast discovery of
	/// the pending install.
	pub async fn register_installation_info(&mut self, encoded: Vec<u8>) -> Result<()> {
		self.writer.write_frame(&Frame::new_raw(AgentMessageId::RegisterInstallationInfo as i32, encoded)).await
	}

	pub async fn show_progress(&mut self) -> Result<()> {
		self.writer.write_frame(&Frame::new_raw(AgentMessageId::ShowProgress as i32, Vec::new())).await
	}

	pub async fn stop_progress(&mut self) -> Result<()> {
		self.writer.write_frame(&Frame::new_raw(AgentMessageId::StopProgress as i32, Vec::new())).await
	}

	pub async fn relaunch(&mut self, path: &Path) -> Result<()> {
		let payload = path.to_string_lossy().into_owned().into_bytes();
		self.writer.write_frame(&Frame::new_raw(AgentMessageId::Relaunch as i32, payload)).await
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use interprocess::local_socket::tokio::LocalSocketListener;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	use super::*;

	fn unique_endpoint_name(label: &str) -> String {
		let pid = std::process::id();
		#[cfg(windows)]
		{
			format!("agent-link-test-{label}-{pid}")
		}
		#[cfg(not(windows))]
		{
			format!("/tmp/agent-link-test-{label}-{pid}.sock")
		}
	}

	/// Minimal stand-in for the real agent: accepts one connection, replies to
	/// a `RegisterRelaunchBundlePath` request with a fixed pid.
	async fn spawn_fake_agent(name: String, pid_reply: u32) -> tokio::task::JoinHandle<()> {
		let listener = LocalSocketListener::bind(name).unwrap();
		tokio::spawn(async move {
			let mut conn = listener.accept().await.unwrap();
			let mut header = [0u8; 8];
			conn.read_exact(&mut header).await.unwrap();
			let len = u32::from_le_bytes(header[4..8].try_into().unwrap());
			let mut payload = vec![0u8; len as usize];
			conn.read_exact(&mut payload).await.unwrap();

			let reply_id = (AgentMessageId::RegisterRelaunchBundlePathReply as i32).to_le_bytes();
			let reply_payload = pid_reply.to_le_bytes();
			let mut out = Vec::new();
			out.extend_from_slice(&reply_id);
			out.extend_from_slice(&(reply_payload.len() as u32).to_le_bytes());
			out.extend_from_slice(&reply_payload);
			conn.write_all(&out).await.unwrap();
			conn.flush().await.unwrap();
			// keep the connection open briefly so the client's reader doesn't
			// observe an immediate disconnect race.
			tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		})
	}

	#[tokio::test]
	async fn register_relaunch_bundle_path_resolves_pid() {
		let name = unique_endpoint_name("pid-reply");
		let _ = std::fs::remove_file(&name);
		let _agent = spawn_fake_agent(name.clone(), 4242).await;
		tokio::time::sleep(std::time::Duration::from_millis(20)).await;

		let (tx, _rx) = mpsc::unbounded_channel();
		let (mut link, _reader) = AgentLink::connect(&name, tx).await.unwrap();
		let pid = link.register_relaunch_bundle_path(&PathBuf::from("/Applications/Example.app")).await.unwrap();
		assert_eq!(pid, 4242);

		let _ = std::fs::remove_file(&name);
	}

	#[tokio::test]
	async fn invalidation_is_reported_when_agent_disconnects() {
		let name = unique_endpoint_name("invalidate");
		let _ = std::fs::remove_file(&name);
		let listener = LocalSocketListener::bind(&name).unwrap();
		let server = tokio::spawn(async move {
			let conn = listener.accept().await.unwrap();
			drop(conn);
		});

		let (tx, mut rx) = mpsc::unbounded_channel();
		let (_link, reader) = AgentLink::connect(&name, tx).await.unwrap();
		assert!(matches!(rx.recv().await.unwrap(), AgentEvent::Connected));
		assert!(matches!(rx.recv().await.unwrap(), AgentEvent::Invalidated));

		let _ = server.await;
		let _ = reader.await;
		let _ = std::fs::remove_file(&name);
	}
}
