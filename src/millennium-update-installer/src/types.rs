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

//! Core data model shared across the wire protocol and the state machine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
	error::{Error, Result},
	message::ArchivedObject,
};

/// Wraps the reverse-DNS-style bundle identifier used to name the updater
/// link endpoint and to check identity against a resolved bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostBundleIdentifier(pub String);

impl std::fmt::Display for HostBundleIdentifier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for HostBundleIdentifier {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// Received once from the updater (possibly replaced after an extraction
/// failure so the updater can resubmit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationInput {
	/// Path to the currently-installed host bundle (or package receipt).
	pub host_bundle_path: PathBuf,
	/// Staging directory the updater prepared for this install.
	pub staging_directory: PathBuf,
	/// File name of the downloaded archive, relative to `staging_directory`.
	pub archive_file_name: String,
	/// Optional password protecting the archive (used by password-capable
	/// archive formats; ignored otherwise).
	pub decryption_password: Option<String>,
	/// Detached signature for the archive, printable-encoded (base64).
	pub signature: String,
	/// Path to relaunch once the installation completes.
	pub relaunch_path: PathBuf,
}

impl ArchivedObject for InstallationInput {
	const SCHEMA: &'static str = "installation-input.v1";
}

impl InstallationInput {
	/// Full path to the downloaded archive.
	pub fn archive_path(&self) -> PathBuf {
		self.staging_directory.join(&self.archive_file_name)
	}

	/// Validates the cross-field invariants on the input itself. Identifier
	/// equality against the configured identifier is checked separately by
	/// the caller, since it requires resolving `host_bundle_path` from disk.
	pub fn validate_shape(&self) -> Result<()> {
		if self.relaunch_path.as_os_str().is_empty() {
			return Err(Error::MissingField("relaunch_path"));
		}
		if !self.archive_path().starts_with(&self.staging_directory) {
			return Err(Error::MalformedMessage("archive file must reside under the staging directory".into()));
		}
		Ok(())
	}
}

/// Resolved from a bundle (or package) path on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
	/// Identifier read from the bundle's metadata.
	pub identifier: HostBundleIdentifier,
	/// Path to the bundle (or package) itself.
	pub bundle_path: PathBuf,
	/// Version string read from the bundle's metadata.
	pub version: String,
	/// Public key used to verify update signatures, base64-encoded, if present.
	pub public_key: Option<String>,
}

/// Why a validation attempt failed, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
	Accepted,
	MissingPublicKeyOnHost,
	MissingPublicKeyOnNewBundle,
	SignatureMismatch,
	CodeSigningDiscontinuity,
	BundleMissingInArchive,
}

/// The outcome of running the validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationDecision {
	pub accepted: bool,
	pub reason: ValidationReason,
}

impl ValidationDecision {
	pub fn accept() -> Self {
		Self { accepted: true, reason: ValidationReason::Accepted }
	}

	pub fn reject(reason: ValidationReason) -> Self {
		debug_assert!(reason != ValidationReason::Accepted);
		Self { accepted: false, reason }
	}

	pub fn into_result(self) -> Result<()> {
		if self.accepted {
			Ok(())
		} else {
			Err(match self.reason {
				ValidationReason::Accepted => unreachable!(),
				ValidationReason::MissingPublicKeyOnHost | ValidationReason::MissingPublicKeyOnNewBundle => Error::MissingPublicKey,
				ValidationReason::SignatureMismatch => Error::SignatureMismatch,
				ValidationReason::CodeSigningDiscontinuity => Error::CodeSigningDiscontinuity("identities differ or one side is unsigned"),
				ValidationReason::BundleMissingInArchive => Error::BundleMissingInArchive,
			})
		}
	}
}

/// Raw appcast item payload, opaque to this crate beyond what's needed to
/// build an [`InstallationInfo`] summary for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppcastItemData {
	pub version: String,
	pub short_version_string: Option<String>,
	pub title: Option<String>,
	pub release_notes_url: Option<String>,
}

impl ArchivedObject for AppcastItemData {
	const SCHEMA: &'static str = "appcast-item.v1";
}

/// Summary published to the agent so it can broadcast discovery of the
/// pending install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationInfo {
	pub item: AppcastItemData,
	pub can_install_silently: bool,
}

impl ArchivedObject for InstallationInfo {
	const SCHEMA: &'static str = "installation-info.v1";
}
