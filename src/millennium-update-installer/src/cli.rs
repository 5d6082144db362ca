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

//! The command-line surface the launching updater invokes this binary with.
//!
//! The daemon is launched with its host bundle identifier and an
//! interaction-allowed flag. The agent endpoint name is the one extra piece
//! of wiring this crate needs from its launcher, since it does not assume a
//! single global UI-agent discovery mechanism (see DESIGN.md). The staging
//! directory is not a CLI argument: it arrives later, as part of the
//! `InstallationInput` the updater sends over the local socket once
//! connected.

use clap::Parser;

/// Auxiliary process that installs a downloaded Millennium application update.
#[derive(Debug, Parser)]
#[command(name = "millennium-update-installer", version, about)]
pub struct Cli {
	/// Reverse-DNS-style identifier of the host bundle being updated.
	pub host_bundle_identifier: String,

	/// Local-socket endpoint name for the UI agent link.
	#[arg(long)]
	pub agent_endpoint: String,

	/// Whether the daemon may prompt the user (e.g. for a package install
	/// that requires authorization).
	#[arg(long, default_value_t = false)]
	pub allow_interaction: bool,

	/// `tracing_subscriber` `EnvFilter` string.
	#[arg(long, default_value = "info")]
	pub log_filter: String,
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn cli_definition_is_valid() {
		Cli::command().debug_assert();
	}

	#[test]
	fn parses_required_arguments() {
		let cli = Cli::parse_from([
			"millennium-update-installer",
			"io.pyke.millennium.testapp",
			"--agent-endpoint",
			"io.pyke.millennium.testapp.agent",
		]);
		assert_eq!(cli.host_bundle_identifier, "io.pyke.millennium.testapp");
		assert_eq!(cli.agent_endpoint, "io.pyke.millennium.testapp.agent");
		assert!(!cli.allow_interaction);
		assert_eq!(cli.log_filter, "info");
	}

	#[test]
	fn parses_allow_interaction_flag() {
		let cli = Cli::parse_from([
			"millennium-update-installer",
			"io.pyke.millennium.testapp",
			"--agent-endpoint",
			"io.pyke.millennium.testapp.agent",
			"--allow-interaction",
		]);
		assert!(cli.allow_interaction);
	}
}
