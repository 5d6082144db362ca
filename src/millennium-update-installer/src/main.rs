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

//! Process entry point. Parses the CLI, wires up a concrete
//! [`SignatureVerifier`]/[`CodeSigningVerifier`] pair for the current
//! platform, and runs the [`StageController`] to completion.

use clap::Parser;
use millennium_update_installer::{
	cli::Cli,
	logging,
	signing::{CodeSigningVerifier, MinisignVerifier, SignatureVerifier},
	stage_controller::{StageController, Timeouts},
	types::HostBundleIdentifier,
};

#[cfg(target_os = "macos")]
fn code_signing_verifier() -> Box<dyn CodeSigningVerifier> {
	Box::new(millennium_update_installer::signing::MacCodesignVerifier)
}

#[cfg(not(target_os = "macos"))]
fn code_signing_verifier() -> Box<dyn CodeSigningVerifier> {
	Box::new(millennium_update_installer::signing::NullCodeSigningVerifier)
}

fn signature_verifier() -> Box<dyn SignatureVerifier> {
	Box::new(MinisignVerifier)
}

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init(&cli.log_filter);

	tracing::info!(identifier = %cli.host_bundle_identifier, "starting update installer daemon");

	let controller = StageController::new(
		HostBundleIdentifier(cli.host_bundle_identifier),
		cli.allow_interaction,
		cli.agent_endpoint,
		signature_verifier(),
		code_signing_verifier(),
		Timeouts::default(),
	);

	let controller = match controller {
		Ok(controller) => controller,
		Err(error) => {
			tracing::error!(%error, "failed to start installer daemon");
			std::process::exit(1);
		}
	};

	match controller.run().await {
		Ok(()) => std::process::exit(0),
		Err(error) => {
			tracing::error!(%error, "installer daemon exited with an error");
			std::process::exit(1);
		}
	}
}
