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

//! `tracing` subscriber setup for the installer daemon.
//!
//! Every state transition, message send/receive, and fatal-exit reason is
//! logged at `info`/`warn`/`error` by the modules that own them; this only
//! wires up where those events go. Cryptographic material (signatures,
//! public keys) is never logged -- callers pass only the `--log-filter`
//! string, never key material, through this setup.

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. `filter` is an `EnvFilter`
/// string (e.g. `"info"` or `"millennium_update_installer=debug"`); falls
/// back to `info` if it fails to parse.
pub fn init(filter: &str) {
	let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_target(false)
		.with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
		.with_writer(std::io::stderr)
		.init();
}
