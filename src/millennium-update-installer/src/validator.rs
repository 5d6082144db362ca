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

//! Applies the signature and code-signing trust policy to an accepted
//! extraction before any installer stage is allowed to run.

use std::path::Path;

use crate::{
	bundle,
	signing::{identities_match, CodeSigningVerifier, SignatureVerifier},
	types::{HostInfo, ValidationDecision, ValidationReason},
};

pub struct Validator<'a> {
	pub signature_verifier: &'a dyn SignatureVerifier,
	pub code_signing_verifier: &'a dyn CodeSigningVerifier,
}

impl<'a> Validator<'a> {
	pub fn new(signature_verifier: &'a dyn SignatureVerifier, code_signing_verifier: &'a dyn CodeSigningVerifier) -> Self {
		Self { signature_verifier, code_signing_verifier }
	}

	/// Validates `(host_info, downloaded_archive, extracted_path, signature)`.
	/// Resolves the install source itself as the first step.
	pub fn validate(&self, host_info: &HostInfo, archive_data: &[u8], extracted_path: &Path, signature: &str) -> ValidationDecision {
		let (install_source, is_package) = match bundle::resolve_install_source(extracted_path) {
			Ok(found) => found,
			Err(_) => return ValidationDecision::reject(ValidationReason::BundleMissingInArchive),
		};

		if is_package {
			return self.validate_package(host_info, archive_data, signature);
		}

		self.validate_bundle(host_info, archive_data, &install_source, signature)
	}

	fn validate_package(&self, host_info: &HostInfo, archive_data: &[u8], signature: &str) -> ValidationDecision {
		let Some(public_key) = &host_info.public_key else {
			return ValidationDecision::reject(ValidationReason::MissingPublicKeyOnHost);
		};
		match self.signature_verifier.verify(archive_data, signature, public_key) {
			Ok(true) => ValidationDecision::accept(),
			_ => ValidationDecision::reject(ValidationReason::SignatureMismatch),
		}
	}

	fn validate_bundle(&self, host_info: &HostInfo, archive_data: &[u8], install_source: &Path, signature: &str) -> ValidationDecision {
		let new_info = match bundle::resolve_host_info(install_source) {
			Ok(info) => info,
			Err(_) => return ValidationDecision::reject(ValidationReason::BundleMissingInArchive),
		};
		let Some(new_public_key) = &new_info.public_key else {
			return ValidationDecision::reject(ValidationReason::MissingPublicKeyOnNewBundle);
		};

		match self.signature_verifier.verify(archive_data, signature, new_public_key) {
			Ok(true) => {}
			_ => return ValidationDecision::reject(ValidationReason::SignatureMismatch),
		}

		let keys_match = host_info.public_key.as_deref().map(|old| old == new_public_key.as_str()).unwrap_or(false);

		if keys_match {
			// Keys match: if the new bundle happens to be code-signed, that
			// signature must not be internally broken. An unsigned new bundle
			// is fine here -- the trust already comes from the matching key.
			if self.code_signing_verifier.identity(install_source).is_some() && !self.code_signing_verifier.is_intrinsically_valid(install_source) {
				return ValidationDecision::reject(ValidationReason::CodeSigningDiscontinuity);
			}
			ValidationDecision::accept()
		} else {
			// Keys rotated: the new key is untrusted on its own, so continuity
			// must be anchored in code-signing identity on both sides.
			let host_identity = self.code_signing_verifier.identity(&host_info.bundle_path);
			let new_identity = self.code_signing_verifier.identity(install_source);
			match (host_identity, new_identity) {
				(Some(host_identity), Some(new_identity)) if identities_match(&host_identity, &new_identity) => ValidationDecision::accept(),
				_ => ValidationDecision::reject(ValidationReason::CodeSigningDiscontinuity),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;
	use crate::{
		signing::NullCodeSigningVerifier,
		types::HostBundleIdentifier,
	};

	struct AlwaysValid;
	impl SignatureVerifier for AlwaysValid {
		fn verify(&self, _data: &[u8], _sig: &str, _key: &str) -> crate::error::Result<bool> {
			Ok(true)
		}
	}

	struct AlwaysInvalid;
	impl SignatureVerifier for AlwaysInvalid {
		fn verify(&self, _data: &[u8], _sig: &str, _key: &str) -> crate::error::Result<bool> {
			Ok(false)
		}
	}

	struct StubCodeSigning {
		identity: Option<&'static str>,
		valid: bool,
	}
	impl CodeSigningVerifier for StubCodeSigning {
		fn identity(&self, _bundle_path: &Path) -> Option<String> {
			self.identity.map(str::to_string)
		}
		fn is_intrinsically_valid(&self, _bundle_path: &Path) -> bool {
			self.valid
		}
	}

	fn host_info(public_key: Option<&str>) -> HostInfo {
		HostInfo {
			identifier: HostBundleIdentifier("com.example.app".into()),
			bundle_path: PathBuf::from("/Applications/Example.app"),
			version: "1.0.0".into(),
			public_key: public_key.map(str::to_string),
		}
	}

	fn setup_extracted_app(dir: &tempfile::TempDir, identifier: &str, version: &str, public_key: Option<&str>) -> PathBuf {
		let app_path = dir.path().join("Example.app");
		std::fs::create_dir_all(app_path.join("Contents")).unwrap();
		let mut dict = plist::Dictionary::new();
		dict.insert("CFBundleIdentifier".into(), plist::Value::String(identifier.into()));
		dict.insert("CFBundleShortVersionString".into(), plist::Value::String(version.into()));
		if let Some(pk) = public_key {
			dict.insert("UpdaterPublicKey".into(), plist::Value::String(pk.into()));
		}
		plist::Value::Dictionary(dict).to_file_xml(app_path.join("Contents").join("Info.plist")).unwrap();
		app_path
	}

	#[test]
	fn package_update_requires_host_public_key() {
		let verifier = AlwaysValid;
		let codesign = NullCodeSigningVerifier;
		let validator = Validator::new(&verifier, &codesign);
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("Update.msi"), b"").unwrap();

		let decision = validator.validate(&host_info(None), b"data", dir.path(), "sig");
		assert!(!decision.accepted);
		assert_eq!(decision.reason, ValidationReason::MissingPublicKeyOnHost);
	}

	#[test]
	fn package_update_accepted_when_signature_verifies() {
		let verifier = AlwaysValid;
		let codesign = NullCodeSigningVerifier;
		let validator = Validator::new(&verifier, &codesign);
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("Update.msi"), b"").unwrap();

		let decision = validator.validate(&host_info(Some("pk")), b"data", dir.path(), "sig");
		assert!(decision.accepted);
	}

	#[test]
	fn bundle_update_rejects_signature_mismatch() {
		let verifier = AlwaysInvalid;
		let codesign = NullCodeSigningVerifier;
		let validator = Validator::new(&verifier, &codesign);
		let dir = tempfile::tempdir().unwrap();
		setup_extracted_app(&dir, "com.example.app", "2.0.0", Some("new-key"));

		let decision = validator.validate(&host_info(Some("new-key")), b"data", dir.path(), "sig");
		assert!(!decision.accepted);
		assert_eq!(decision.reason, ValidationReason::SignatureMismatch);
	}

	#[test]
	fn bundle_update_accepted_with_matching_keys_and_no_code_signing() {
		let verifier = AlwaysValid;
		let codesign = StubCodeSigning { identity: None, valid: false };
		let validator = Validator::new(&verifier, &codesign);
		let dir = tempfile::tempdir().unwrap();
		setup_extracted_app(&dir, "com.example.app", "2.0.0", Some("same-key"));

		let decision = validator.validate(&host_info(Some("same-key")), b"data", dir.path(), "sig");
		assert!(decision.accepted);
	}

	#[test]
	fn bundle_update_rejects_matching_keys_with_broken_code_signature() {
		let verifier = AlwaysValid;
		let codesign = StubCodeSigning { identity: Some("id"), valid: false };
		let validator = Validator::new(&verifier, &codesign);
		let dir = tempfile::tempdir().unwrap();
		setup_extracted_app(&dir, "com.example.app", "2.0.0", Some("same-key"));

		let decision = validator.validate(&host_info(Some("same-key")), b"data", dir.path(), "sig");
		assert!(!decision.accepted);
		assert_eq!(decision.reason, ValidationReason::CodeSigningDiscontinuity);
	}

	#[test]
	fn key_rotation_accepted_when_code_signing_identities_match() {
		let verifier = AlwaysValid;
		let codesign = StubCodeSigning { identity: Some("identifier \"com.example.app\"" ), valid: true };
		let validator = Validator::new(&verifier, &codesign);
		let dir = tempfile::tempdir().unwrap();
		setup_extracted_app(&dir, "com.example.app", "2.0.0", Some("new-key"));

		let decision = validator.validate(&host_info(Some("old-key")), b"data", dir.path(), "sig");
		assert!(decision.accepted);
	}

	#[test]
	fn key_rotation_rejected_when_either_side_unsigned() {
		let verifier = AlwaysValid;
		let codesign = StubCodeSigning { identity: None, valid: false };
		let validator = Validator::new(&verifier, &codesign);
		let dir = tempfile::tempdir().unwrap();
		setup_extracted_app(&dir, "com.example.app", "2.0.0", Some("new-key"));

		let decision = validator.validate(&host_info(Some("old-key")), b"data", dir.path(), "sig");
		assert!(!decision.accepted);
		assert_eq!(decision.reason, ValidationReason::CodeSigningDiscontinuity);
	}
}
