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

use std::path::PathBuf;

/// Errors that can occur while the installer daemon is running.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// A peer sent a frame we could not decode.
	#[error("malformed message from peer: {0}")]
	MalformedMessage(String),
	/// A second updater connection was attempted while one was already active.
	#[error("a second updater connection was rejected")]
	SecondUpdaterConnection,
	/// A peer link was invalidated before the installation could complete.
	#[error("{0} link was lost before the installation completed")]
	PeerVanished(&'static str),
	/// A required field was missing from an inbound message.
	#[error("missing required field `{0}` in installation input")]
	MissingField(&'static str),
	/// The host bundle identifier resolved from disk did not match the configured one.
	#[error("host bundle identifier mismatch: expected `{expected}`, found `{found}`")]
	IdentifierMismatch { expected: String, found: String },
	/// No installation input (or no agent connection) arrived before the startup deadline.
	#[error("no installation input or agent connection within the startup deadline")]
	StartupDeadline,
	/// The agent did not resolve a relaunch PID before the deadline.
	#[error("agent did not resolve a relaunch process id in time")]
	PidDeadline,
	/// No unarchiver was available for the downloaded archive.
	#[error("no unarchiver available for archive `{0}`")]
	NoSuitableUnarchiver(PathBuf),
	/// The unarchiver reported a failure. This is the single recoverable category;
	/// the stage controller rewinds to `AwaitingInputs` instead of exiting.
	#[error("extraction failed: {0}")]
	Extraction(String),
	/// No install source (bundle or package) could be located inside the extracted archive.
	#[error("no installable bundle or package found in extracted archive")]
	BundleMissingInArchive,
	/// The host (or, for a package update, the archive) has no public key to verify against.
	#[error("no public key available to verify against")]
	MissingPublicKey,
	/// The archive signature did not verify under the expected public key.
	#[error("archive signature did not verify")]
	SignatureMismatch,
	/// Signing keys rotated and code-signing continuity could not be established.
	#[error("code-signing continuity check failed: {0}")]
	CodeSigningDiscontinuity(&'static str),
	/// Failed to construct the installer backend.
	#[error("failed to construct installer backend: {0}")]
	InstallerConstruction(String),
	/// Installer backend stage 1 (prepare) failed.
	#[error("installer stage 1 failed: {0}")]
	Stage1Failed(String),
	/// Installer backend stage 2 (apply) failed.
	#[error("installer stage 2 failed: {0}")]
	Stage2Failed(String),
	/// Installer backend stage 3 (finalize) failed.
	#[error("installer stage 3 failed: {0}")]
	Stage3Failed(String),
	/// Stage 2 was explicitly cancelled by the installer backend.
	#[error("installation was cancelled")]
	InstallationCancelled,
	/// An unrecognized schema tag was encountered while decoding an opaque object.
	#[error("unrecognized schema tag: {0}")]
	UnknownSchema(String),
	/// JSON (de)serialization failure not caused by an unrecognized schema tag.
	#[error("JSON error: {0}")]
	Json(serde_json::Error),
	/// Failed to decode base64.
	#[error("failed to decode base64: {0}")]
	Base64Decode(#[from] base64::DecodeError),
	/// Failed to decode or verify a minisign signature or key.
	#[error("signature error: {0}")]
	Minisign(#[from] minisign_verify::Error),
	/// IO error.
	#[error("{0}")]
	Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
	fn from(error: serde_json::Error) -> Self {
		if error.to_string().contains("unknown variant") {
			Self::UnknownSchema(error.to_string())
		} else {
			Self::Json(error)
		}
	}
}

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

impl Error {
	/// Whether this error is recoverable (the stage controller rewinds to
	/// `AwaitingInputs`) rather than fatal (teardown + non-zero exit).
	///
	/// Only extraction failures are recoverable; every other category is fatal
	/// per the propagation policy.
	pub fn is_recoverable(&self) -> bool {
		matches!(self, Error::Extraction(_))
	}
}
