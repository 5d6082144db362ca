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

//! The archive unarchiver, generalized from `millennium::updater::core`'s
//! per-platform `copy_files_and_run` extraction into a small trait with two
//! concrete formats.

use std::{
	fs::File,
	io::Read,
	path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Streams extraction progress and reports success or failure for a single
/// archive format.
pub trait Unarchiver {
	/// Extracts `archive_path` into `destination`, invoking `on_progress`
	/// with a fraction in `[0.0, 1.0]` as entries are written.
	fn extract(&self, archive_path: &Path, destination: &Path, password: Option<&str>, on_progress: &mut dyn FnMut(f64)) -> Result<()>;
}

/// Picks an unarchiver by file extension. Returns `None` (surfaced by the
/// caller as [`Error::NoSuitableUnarchiver`]) if the archive's format isn't
/// recognized.
pub fn unarchiver_for(archive_path: &Path) -> Option<Box<dyn Unarchiver>> {
	let name = archive_path.file_name()?.to_str()?.to_lowercase();
	if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
		Some(Box::new(TarGzUnarchiver))
	} else if name.ends_with(".zip") {
		Some(Box::new(ZipUnarchiver))
	} else {
		None
	}
}

/// `.tar.gz` extraction, grounded in `millennium`'s use of the `tar` and
/// `flate2` crates for its macOS/Linux update archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzUnarchiver;

impl Unarchiver for TarGzUnarchiver {
	fn extract(&self, archive_path: &Path, destination: &Path, _password: Option<&str>, on_progress: &mut dyn FnMut(f64)) -> Result<()> {
		let file = File::open(archive_path)?;
		let decoder = flate2::read::GzDecoder::new(file);
		let mut archive = tar::Archive::new(decoder);

		// `tar::Archive` only exposes a forward-only entry iterator, so total
		// entry count isn't known up front; report coarse progress as entries
		// land instead of a byte-accurate fraction.
		let entries: Vec<_> = archive.entries()?.collect::<std::io::Result<_>>()?;
		let total = entries.len().max(1);
		for (index, mut entry) in entries.into_iter().enumerate() {
			entry.unpack_in(destination)?;
			on_progress((index + 1) as f64 / total as f64);
		}
		Ok(())
	}
}

/// `.zip` extraction, grounded in `millennium`'s optional `zip` dependency
/// (used there for the Windows installer archive). Supports the archive's
/// optional decryption password via ZipCrypto.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipUnarchiver;

impl Unarchiver for ZipUnarchiver {
	fn extract(&self, archive_path: &Path, destination: &Path, password: Option<&str>, on_progress: &mut dyn FnMut(f64)) -> Result<()> {
		let file = File::open(archive_path)?;
		let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::Extraction(e.to_string()))?;
		let total = archive.len().max(1);

		for index in 0..archive.len() {
			let mut entry = match password {
				Some(password) => archive.by_index_decrypt(index, password.as_bytes()).map_err(|e| Error::Extraction(e.to_string()))?.map_err(|_| Error::Extraction("incorrect archive password".into()))?,
				None => archive.by_index(index).map_err(|e| Error::Extraction(e.to_string()))?,
			};
			let Some(enclosed) = entry.enclosed_name().map(Path::to_path_buf) else {
				return Err(Error::Extraction(format!("archive entry {index} has an unsafe path")));
			};
			let out_path: PathBuf = destination.join(enclosed);
			if entry.is_dir() {
				std::fs::create_dir_all(&out_path)?;
			} else {
				if let Some(parent) = out_path.parent() {
					std::fs::create_dir_all(parent)?;
				}
				let mut out_file = File::create(&out_path)?;
				std::io::copy(&mut entry, &mut out_file)?;
			}
			on_progress((index + 1) as f64 / total as f64);
		}
		Ok(())
	}
}

/// Reads an entire file into memory, used for the *downloaded archive* the
/// validator verifies the signature against.
pub fn read_archive(archive_path: &Path) -> Result<Vec<u8>> {
	let mut file = File::open(archive_path)?;
	let mut buffer = Vec::new();
	file.read_to_end(&mut buffer)?;
	Ok(buffer)
}
