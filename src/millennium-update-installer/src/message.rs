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

//! Framed control messages exchanged with the updater and agent peers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifiers for the closed set of messages the daemon sends or receives.
///
/// All fixed-size numeric payloads referenced in the doc comments are
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MessageId {
	// Daemon -> Updater
	ExtractionStarted = 0,
	ExtractedWithProgress = 1,
	ArchiveExtractionFailed = 2,
	ValidationStarted = 3,
	InstallationStartedStage1 = 4,
	InstallationFinishedStage1 = 5,
	InstallationFinishedStage2 = 6,
	InstallationFinishedStage3 = 7,
	UpdaterAlivePing = 8,
	// Updater -> Daemon
	InstallationInput = 100,
	SentUpdateAppcastItemData = 101,
	ResumeToStage2 = 102,
	UpdaterAlivePong = 103,
}

impl MessageId {
	pub fn from_i32(value: i32) -> Option<Self> {
		Some(match value {
			0 => Self::ExtractionStarted,
			1 => Self::ExtractedWithProgress,
			2 => Self::ArchiveExtractionFailed,
			3 => Self::ValidationStarted,
			4 => Self::InstallationStartedStage1,
			5 => Self::InstallationFinishedStage1,
			6 => Self::InstallationFinishedStage2,
			7 => Self::InstallationFinishedStage3,
			8 => Self::UpdaterAlivePing,
			100 => Self::InstallationInput,
			101 => Self::SentUpdateAppcastItemData,
			102 => Self::ResumeToStage2,
			103 => Self::UpdaterAlivePong,
			_ => return None,
		})
	}
}

/// A decoded frame: an identifier plus its raw payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
	pub id: i32,
	pub payload: Vec<u8>,
}

impl Frame {
	pub fn new(id: MessageId, payload: Vec<u8>) -> Self {
		Self { id: id as i32, payload }
	}

	pub fn empty(id: MessageId) -> Self {
		Self::new(id, Vec::new())
	}

	/// Builds a frame from a raw identifier, for links (e.g. the agent link)
	/// whose message identifiers aren't part of the updater wire protocol
	/// enumerated by [`MessageId`].
	pub fn new_raw(id: i32, payload: Vec<u8>) -> Self {
		Self { id, payload }
	}
}

/// `{can_install_silently: u8, target_terminated: u8}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage1Result {
	pub can_install_silently: bool,
	pub target_terminated: bool,
}

impl Stage1Result {
	pub fn encode(self) -> Vec<u8> {
		vec![self.can_install_silently as u8, self.target_terminated as u8]
	}

	pub fn decode(bytes: &[u8]) -> Result<Self> {
		if bytes.len() != 2 {
			return Err(Error::MalformedMessage("stage1 result must be 2 bytes".into()));
		}
		Ok(Self {
			can_install_silently: bytes[0] != 0,
			target_terminated: bytes[1] != 0,
		})
	}
}

/// `{relaunch: u8, show_ui: u8}` (inbound `RESUME_TO_STAGE_2` command)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage2Command {
	pub relaunch: bool,
	pub show_ui: bool,
}

impl Stage2Command {
	pub fn decode(bytes: &[u8]) -> Result<Self> {
		if bytes.len() != 2 {
			return Err(Error::MalformedMessage("stage2 command must be 2 bytes".into()));
		}
		Ok(Self {
			relaunch: bytes[0] != 0,
			show_ui: bytes[1] != 0,
		})
	}

	#[cfg(test)]
	pub fn encode(self) -> Vec<u8> {
		vec![self.relaunch as u8, self.show_ui as u8]
	}
}

/// `{cancelled: u8, target_terminated: u8}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage2Result {
	pub cancelled: bool,
	pub target_terminated: bool,
}

impl Stage2Result {
	pub fn encode(self) -> Vec<u8> {
		vec![self.cancelled as u8, self.target_terminated as u8]
	}

	#[cfg(test)]
	pub fn decode(bytes: &[u8]) -> Result<Self> {
		if bytes.len() != 2 {
			return Err(Error::MalformedMessage("stage2 result must be 2 bytes".into()));
		}
		Ok(Self {
			cancelled: bytes[0] != 0,
			target_terminated: bytes[1] != 0,
		})
	}
}

/// Encodes a progress report as an IEEE 754 double, little-endian, 8 bytes.
pub fn encode_progress(value: f64) -> Vec<u8> {
	value.to_le_bytes().to_vec()
}

/// Decodes a progress report.
pub fn decode_progress(bytes: &[u8]) -> Result<f64> {
	let array: [u8; 8] = bytes
		.try_into()
		.map_err(|_| Error::MalformedMessage("progress report must be 8 bytes".into()))?;
	Ok(f64::from_le_bytes(array))
}

/// An envelope wrapping an "opaque archived object" with a schema tag.
///
/// Decoding refuses any `schema` that doesn't match `T::SCHEMA`, mirroring
/// `serde_json`'s own "unknown variant" rejection for internally tagged
/// enums -- [`Error::UnknownSchema`] is raised either way.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<'a> {
	schema: String,
	data: &'a serde_json::value::RawValue,
}

/// A type that can be carried inside a schema-tagged envelope.
pub trait ArchivedObject: Serialize + for<'de> Deserialize<'de> {
	const SCHEMA: &'static str;
}

pub fn encode_object<T: ArchivedObject>(value: &T) -> Result<Vec<u8>> {
	#[derive(Serialize)]
	struct Owned<'a, T> {
		schema: &'static str,
		data: &'a T,
	}
	let owned = Owned { schema: T::SCHEMA, data: value };
	Ok(serde_json::to_vec(&owned)?)
}

pub fn decode_object<T: ArchivedObject>(bytes: &[u8]) -> Result<T> {
	let envelope: Envelope = serde_json::from_slice(bytes)?;
	if envelope.schema != T::SCHEMA {
		return Err(Error::UnknownSchema(envelope.schema));
	}
	Ok(serde_json::from_str(envelope.data.get())?)
}

#[cfg(test)]
mod tests {
	use serde::{Deserialize, Serialize};

	use super::*;

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	struct Example {
		value: u32,
	}

	impl ArchivedObject for Example {
		const SCHEMA: &'static str = "example.v1";
	}

	#[test]
	fn progress_round_trips() {
		let encoded = encode_progress(0.5);
		assert_eq!(encoded, vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xE0, 0x3F]);
		assert_eq!(decode_progress(&encoded).unwrap(), 0.5);
	}

	#[test]
	fn stage1_result_round_trips() {
		let result = Stage1Result { can_install_silently: true, target_terminated: false };
		assert_eq!(Stage1Result::decode(&result.encode()).unwrap(), result);
	}

	#[test]
	fn stage2_command_decodes() {
		let command = Stage2Command { relaunch: true, show_ui: false };
		assert_eq!(Stage2Command::decode(&command.encode()).unwrap(), command);
	}

	#[test]
	fn archived_object_round_trips() {
		let value = Example { value: 42 };
		let encoded = encode_object(&value).unwrap();
		let decoded: Example = decode_object(&encoded).unwrap();
		assert_eq!(decoded, value);
	}

	#[test]
	fn archived_object_rejects_unknown_schema() {
		let bytes = serde_json::to_vec(&serde_json::json!({ "schema": "not-example", "data": { "value": 1 } })).unwrap();
		let result: Result<Example> = decode_object(&bytes);
		assert!(matches!(result, Err(Error::UnknownSchema(_))));
	}

	#[test]
	fn unknown_message_id_is_rejected() {
		assert!(MessageId::from_i32(9999).is_none());
		assert_eq!(MessageId::from_i32(0), Some(MessageId::ExtractionStarted));
	}
}
