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

//! Idempotent teardown, run on every exit path.

use std::path::{Path, PathBuf};

/// Best-effort removal of the staging directory and the daemon's own bundle.
/// Safe to call multiple times: a missing path is not an error. The staging
/// directory is optional because a daemon that never received an
/// installation input never had one to clean up.
///
/// Removing `own_bundle_path` unconditionally replicates the original
/// behavior: the installer considers its own executable bundle transient and
/// always deletes it on exit.
pub fn remove_staging_and_self(staging_directory: Option<&Path>, own_bundle_path: Option<&Path>) {
	if let Some(staging_directory) = staging_directory {
		if staging_directory.exists() {
			if let Err(error) = std::fs::remove_dir_all(staging_directory) {
				tracing::warn!(path = %staging_directory.display(), %error, "failed to remove staging directory");
			}
		}
	}
	if let Some(own_bundle_path) = own_bundle_path {
		if own_bundle_path.exists() {
			let result = if own_bundle_path.is_dir() { std::fs::remove_dir_all(own_bundle_path) } else { std::fs::remove_file(own_bundle_path) };
			if let Err(error) = result {
				tracing::warn!(path = %own_bundle_path.display(), %error, "failed to remove own bundle path");
			}
		}
	}
}

/// Resolves the daemon's own bundle path, used as `own_bundle_path` above.
/// On macOS this is the installer's own `.app`; elsewhere, the directory
/// containing the running executable.
pub fn own_bundle_path() -> Option<PathBuf> {
	let exe = std::env::current_exe().ok()?;
	let mut candidate = exe.as_path();
	while let Some(parent) = candidate.parent() {
		if candidate.extension().map(|e| e == "app").unwrap_or(false) {
			return Some(candidate.to_path_buf());
		}
		candidate = parent;
	}
	exe.parent().map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn removes_staging_directory() {
		let dir = tempfile::tempdir().unwrap();
		let staging = dir.path().join("staging");
		std::fs::create_dir_all(&staging).unwrap();
		std::fs::write(staging.join("file"), b"data").unwrap();

		remove_staging_and_self(Some(&staging), None);
		assert!(!staging.exists());
	}

	#[test]
	fn tolerates_missing_staging_directory() {
		let dir = tempfile::tempdir().unwrap();
		let staging = dir.path().join("does-not-exist");
		// must not panic
		remove_staging_and_self(Some(&staging), None);
	}

	#[test]
	fn removes_own_bundle_path_when_present() {
		let dir = tempfile::tempdir().unwrap();
		let staging = dir.path().join("staging");
		std::fs::create_dir_all(&staging).unwrap();
		let own_bundle = dir.path().join("Installer.app");
		std::fs::create_dir_all(&own_bundle).unwrap();

		remove_staging_and_self(Some(&staging), Some(&own_bundle));
		assert!(!own_bundle.exists());
	}
}
