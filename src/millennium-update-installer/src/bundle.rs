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

//! Bundle metadata extraction: read the public signing key, version and
//! identifier out of a bundle on disk, and locate the install source
//! (bundle or package) inside an extracted archive.

use std::path::{Path, PathBuf};

use crate::{
	error::{Error, Result},
	types::{HostBundleIdentifier, HostInfo},
};

const PACKAGE_EXTENSIONS: &[&str] = &["msi", "pkg", "deb", "rpm", "appimage"];

const KEY_IDENTIFIER: &str = "CFBundleIdentifier";
const KEY_VERSION: &str = "CFBundleShortVersionString";
const KEY_PUBLIC_KEY: &str = "UpdaterPublicKey";

fn metadata_plist_path(bundle_path: &Path) -> PathBuf {
	if bundle_path.extension().map(|e| e == "app").unwrap_or(false) && bundle_path.is_dir() {
		bundle_path.join("Contents").join("Info.plist")
	} else {
		bundle_path.with_extension("plist")
	}
}

/// Resolves [`HostInfo`] from a bundle (or package) path on disk.
pub fn resolve_host_info(bundle_path: &Path) -> Result<HostInfo> {
	let plist_path = metadata_plist_path(bundle_path);
	let value = plist::Value::from_file(&plist_path).map_err(|e| Error::MalformedMessage(format!("failed to read bundle metadata at {}: {e}", plist_path.display())))?;
	let dict = value
		.as_dictionary()
		.ok_or_else(|| Error::MalformedMessage("bundle metadata is not a dictionary".into()))?;

	let identifier = dict
		.get(KEY_IDENTIFIER)
		.and_then(|v| v.as_string())
		.ok_or_else(|| Error::MalformedMessage(format!("bundle metadata missing `{KEY_IDENTIFIER}`")))?
		.to_string();
	let version = dict
		.get(KEY_VERSION)
		.and_then(|v| v.as_string())
		.ok_or_else(|| Error::MalformedMessage(format!("bundle metadata missing `{KEY_VERSION}`")))?
		.to_string();
	let public_key = dict.get(KEY_PUBLIC_KEY).and_then(|v| v.as_string()).map(str::to_string);

	Ok(HostInfo {
		identifier: HostBundleIdentifier(identifier),
		bundle_path: bundle_path.to_path_buf(),
		version,
		public_key,
	})
}

/// Locates the install source within an extracted archive: either a `.app`
/// bundle directory, or a recognized package file. Returns `(path,
/// is_package)`. Searches one level deep, mirroring the expectation that an
/// archive's top-level entry is the thing to install.
pub fn resolve_install_source(extracted_root: &Path) -> Result<(PathBuf, bool)> {
	let entries = std::fs::read_dir(extracted_root)?;
	for entry in entries {
		let entry = entry?;
		let path = entry.path();
		if path.is_dir() && path.extension().map(|e| e == "app").unwrap_or(false) {
			return Ok((path, false));
		}
		if path.is_file() {
			if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
				if PACKAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
					return Ok((path, true));
				}
			}
		}
	}
	Err(Error::BundleMissingInArchive)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn package_extensions_are_recognized() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("Update.msi"), b"").unwrap();
		let (path, is_package) = resolve_install_source(dir.path()).unwrap();
		assert!(is_package);
		assert_eq!(path.file_name().unwrap(), "Update.msi");
	}

	#[test]
	fn app_bundle_is_recognized_as_non_package() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir(dir.path().join("Example.app")).unwrap();
		let (path, is_package) = resolve_install_source(dir.path()).unwrap();
		assert!(!is_package);
		assert_eq!(path.file_name().unwrap(), "Example.app");
	}

	#[test]
	fn missing_install_source_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("readme.txt"), b"").unwrap();
		assert!(matches!(resolve_install_source(dir.path()), Err(Error::BundleMissingInArchive)));
	}
}
