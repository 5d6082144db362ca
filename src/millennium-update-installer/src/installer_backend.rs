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

//! The external installer backend collaborator, modeled as a trait with two
//! concrete implementations: swapping a bundle directory in place, and
//! invoking a platform package tool.
//!
//! All three stages run on a blocking worker task, so implementations are
//! free to block.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Three-stage interface the stage controller drives.
pub trait InstallerBackend: Send {
	/// Prepares the install. Runs while the host may still be running.
	fn perform_first_stage(&mut self) -> Result<()>;
	/// Applies the update. May run while the host is still running if
	/// `displays_user_progress()` is false and the backend supports it;
	/// otherwise waits are enforced by the stage controller, not here.
	fn perform_second_stage(&mut self, allowing_ui: bool) -> Result<()>;
	/// Finalizes the swap. Only called after the host has terminated.
	fn perform_third_stage(&mut self) -> Result<()>;
	/// Releases any resources (temporary backups, file handles) held by the
	/// backend. Must be safe to call even if a stage never ran.
	fn cleanup(&mut self);

	/// Whether this backend can complete without prompting the user.
	fn can_install_silently(&self) -> bool;
	/// Whether this backend shows its own progress UI (if true, the daemon
	/// should not additionally ask the agent to show progress).
	fn displays_user_progress(&self) -> bool;
	/// Where the installed bundle (or package) ends up living. Used to
	/// compute the relaunch path.
	fn installation_path_for(&self, host_bundle_path: &Path) -> PathBuf;
}

/// Swaps a `.app`-style bundle directory in place: moves the current bundle
/// aside, moves the new one in, and removes the backup on success.
///
/// Grounded in `millennium::updater::core`'s macOS `copy_files_and_run`,
/// which backs up the current bundle with `Move::from_source(..).to_dest(..)`
/// before extracting the replacement over it.
pub struct BundleInstaller {
	host_bundle_path: PathBuf,
	new_bundle_path: PathBuf,
	backup_path: Option<PathBuf>,
	can_install_silently: bool,
}

impl BundleInstaller {
	pub fn new(host_bundle_path: PathBuf, new_bundle_path: PathBuf) -> Result<Self> {
		if !new_bundle_path.exists() {
			return Err(Error::InstallerConstruction(format!("new bundle not found at {}", new_bundle_path.display())));
		}
		Ok(Self { host_bundle_path, new_bundle_path, backup_path: None, can_install_silently: true })
	}
}

impl InstallerBackend for BundleInstaller {
	fn perform_first_stage(&mut self) -> Result<()> {
		// Nothing to prepare beyond confirming both paths exist; the actual
		// swap happens in stage 2/3 so the host can keep running until then.
		if !self.host_bundle_path.exists() {
			return Err(Error::Stage1Failed(format!("host bundle not found at {}", self.host_bundle_path.display())));
		}
		Ok(())
	}

	fn perform_second_stage(&mut self, _allowing_ui: bool) -> Result<()> {
		let backup_path = self.host_bundle_path.with_extension("update-backup");
		if backup_path.exists() {
			std::fs::remove_dir_all(&backup_path).map_err(|e| Error::Stage2Failed(e.to_string()))?;
		}
		std::fs::rename(&self.host_bundle_path, &backup_path).map_err(|e| Error::Stage2Failed(e.to_string()))?;
		self.backup_path = Some(backup_path);
		Ok(())
	}

	fn perform_third_stage(&mut self) -> Result<()> {
		let result = std::fs::rename(&self.new_bundle_path, &self.host_bundle_path);
		match result {
			Ok(()) => Ok(()),
			Err(e) => {
				// restore the backup so the host isn't left without a bundle
				if let Some(backup_path) = &self.backup_path {
					let _ = std::fs::rename(backup_path, &self.host_bundle_path);
				}
				Err(Error::Stage3Failed(e.to_string()))
			}
		}
	}

	fn cleanup(&mut self) {
		if let Some(backup_path) = self.backup_path.take() {
			let _ = std::fs::remove_dir_all(backup_path);
		}
	}

	fn can_install_silently(&self) -> bool {
		self.can_install_silently
	}

	fn displays_user_progress(&self) -> bool {
		false
	}

	fn installation_path_for(&self, host_bundle_path: &Path) -> PathBuf {
		host_bundle_path.to_path_buf()
	}
}

/// Invokes a platform package tool on the downloaded package file, grounded
/// in `cargo-packager`'s `Command::new(..).output_ok()` shelling pattern.
pub struct PackageInstaller {
	package_path: PathBuf,
	host_bundle_path: PathBuf,
	allow_interaction: bool,
}

impl PackageInstaller {
	pub fn new(package_path: PathBuf, host_bundle_path: PathBuf, allow_interaction: bool) -> Result<Self> {
		if !package_path.exists() {
			return Err(Error::InstallerConstruction(format!("package not found at {}", package_path.display())));
		}
		Ok(Self { package_path, host_bundle_path, allow_interaction })
	}

	fn package_tool(&self) -> (&'static str, Vec<String>) {
		let path = self.package_path.to_string_lossy().to_string();
		if cfg!(target_os = "macos") {
			("installer", vec!["-pkg".into(), path, "-target".into(), "/".into()])
		} else if cfg!(target_os = "windows") {
			("msiexec", vec!["/i".into(), path, if self.allow_interaction { "/passive".into() } else { "/quiet".into() }])
		} else {
			("dpkg", vec!["-i".into(), path])
		}
	}
}

impl InstallerBackend for PackageInstaller {
	fn perform_first_stage(&mut self) -> Result<()> {
		Ok(())
	}

	fn perform_second_stage(&mut self, _allowing_ui: bool) -> Result<()> {
		Ok(())
	}

	fn perform_third_stage(&mut self) -> Result<()> {
		let (tool, args) = self.package_tool();
		let output = std::process::Command::new(tool).args(&args).output().map_err(|e| Error::Stage3Failed(e.to_string()))?;
		if !output.status.success() {
			return Err(Error::Stage3Failed(format!("{tool} exited with {}", output.status)));
		}
		Ok(())
	}

	fn cleanup(&mut self) {}

	fn can_install_silently(&self) -> bool {
		!self.allow_interaction
	}

	fn displays_user_progress(&self) -> bool {
		self.allow_interaction
	}

	fn installation_path_for(&self, host_bundle_path: &Path) -> PathBuf {
		host_bundle_path.to_path_buf()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bundle_installer_swaps_directories() {
		let dir = tempfile::tempdir().unwrap();
		let host_path = dir.path().join("Example.app");
		let new_path = dir.path().join("staging").join("Example.app");
		std::fs::create_dir_all(&host_path).unwrap();
		std::fs::write(host_path.join("old"), b"old").unwrap();
		std::fs::create_dir_all(&new_path).unwrap();
		std::fs::write(new_path.join("new"), b"new").unwrap();

		let mut installer = BundleInstaller::new(host_path.clone(), new_path).unwrap();
		installer.perform_first_stage().unwrap();
		installer.perform_second_stage(false).unwrap();
		installer.perform_third_stage().unwrap();
		installer.cleanup();

		assert!(host_path.join("new").exists());
		assert!(!host_path.join("old").exists());
		assert!(!host_path.with_extension("update-backup").exists());
	}

	#[test]
	fn bundle_installer_construction_fails_without_new_bundle() {
		let dir = tempfile::tempdir().unwrap();
		let result = BundleInstaller::new(dir.path().join("Host.app"), dir.path().join("missing.app"));
		assert!(result.is_err());
	}
}
