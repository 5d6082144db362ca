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

//! Signature and code-signing primitives consumed by the validator.

use std::path::Path;

use minisign_verify::{PublicKey, Signature};

use crate::error::{Error, Result};

/// Verifies a detached signature over a byte stream against a public key.
///
/// Both public key and signature are expected base64-encoded, matching the
/// printable encoding used on the wire.
pub trait SignatureVerifier: Send + Sync {
	fn verify(&self, data: &[u8], signature_b64: &str, public_key_b64: &str) -> Result<bool>;
}

/// `minisign`-backed implementation, grounded in `millennium`'s updater core
/// (`verify_signature`).
#[derive(Debug, Default, Clone, Copy)]
pub struct MinisignVerifier;

impl SignatureVerifier for MinisignVerifier {
	fn verify(&self, data: &[u8], signature_b64: &str, public_key_b64: &str) -> Result<bool> {
		let public_key = PublicKey::decode(public_key_b64).map_err(Error::Minisign)?;
		let signature = Signature::decode(signature_b64).map_err(Error::Minisign)?;
		match public_key.verify(data, &signature, true) {
			Ok(()) => Ok(true),
			Err(minisign_verify::Error::SignatureError) => Ok(false),
			Err(e) => Err(Error::Minisign(e)),
		}
	}
}

/// Whether a bundle is intrinsically code-signed and, if so, its
/// designated-requirement-style identity.
pub trait CodeSigningVerifier: Send + Sync {
	/// `None` if the bundle is not code-signed at all.
	fn identity(&self, bundle_path: &Path) -> Option<String>;
	/// Whether the existing signature on `bundle_path` is intrinsically valid
	/// (not tampered with, not expired, etc). Only meaningful if `identity`
	/// returned `Some`.
	fn is_intrinsically_valid(&self, bundle_path: &Path) -> bool;
}

/// Shells out to the system `codesign` tool, grounded in `cargo-packager`'s
/// `codesign/macos.rs` (`Command::new("codesign")` + checked output).
#[derive(Debug, Default, Clone, Copy)]
pub struct MacCodesignVerifier;

impl MacCodesignVerifier {
	fn run(bundle_path: &Path, args: &[&str]) -> std::result::Result<std::process::Output, std::io::Error> {
		std::process::Command::new("codesign").args(args).arg(bundle_path).output()
	}
}

impl CodeSigningVerifier for MacCodesignVerifier {
	fn identity(&self, bundle_path: &Path) -> Option<String> {
		let output = Self::run(bundle_path, &["-d", "-r", "-"]).ok()?;
		if !output.status.success() {
			return None;
		}
		let stderr = String::from_utf8_lossy(&output.stderr);
		// `codesign -d -r -` prints `designated => <requirement>` to stderr.
		stderr
			.lines()
			.find_map(|line| line.strip_prefix("designated => ").map(str::trim).map(str::to_string))
	}

	fn is_intrinsically_valid(&self, bundle_path: &Path) -> bool {
		Self::run(bundle_path, &["--verify", "--deep", "--strict"]).map(|o| o.status.success()).unwrap_or(false)
	}
}

/// Used on platforms without a native code-signing authority. An unsigned
/// bundle is always rejected on the key-rotation continuity path, so this is
/// a conservative (never falsely-valid) stand-in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCodeSigningVerifier;

impl CodeSigningVerifier for NullCodeSigningVerifier {
	fn identity(&self, _bundle_path: &Path) -> Option<String> {
		None
	}

	fn is_intrinsically_valid(&self, _bundle_path: &Path) -> bool {
		false
	}
}

/// Compares two code-signing identities the way a designated requirement
/// comparison would: exact match of the identity string. Real designated
/// requirements can express more (certificate chain anchors, wildcard
/// organizational units); this crate only receives the canonicalized
/// identity string `codesign -d -r -` already resolved to, so a string
/// comparison is the correct level for this boundary.
pub fn identities_match(host_identity: &str, new_identity: &str) -> bool {
	host_identity == new_identity
}

#[cfg(test)]
mod tests {
	use super::*;

	struct StubVerifier(bool);
	impl SignatureVerifier for StubVerifier {
		fn verify(&self, _data: &[u8], _sig: &str, _key: &str) -> Result<bool> {
			Ok(self.0)
		}
	}

	#[test]
	fn stub_verifier_reports_configured_result() {
		let verifier = StubVerifier(true);
		assert!(verifier.verify(b"data", "sig", "key").unwrap());
		let verifier = StubVerifier(false);
		assert!(!verifier.verify(b"data", "sig", "key").unwrap());
	}

	#[test]
	fn identity_comparison_is_exact() {
		assert!(identities_match("identifier \"com.example.app\"", "identifier \"com.example.app\""));
		assert!(!identities_match("identifier \"com.example.app\"", "identifier \"com.example.other\""));
	}

	#[test]
	fn null_verifier_never_reports_signed() {
		let verifier = NullCodeSigningVerifier;
		assert_eq!(verifier.identity(Path::new("/nonexistent")), None);
		assert!(!verifier.is_intrinsically_valid(Path::new("/nonexistent")));
	}
}
