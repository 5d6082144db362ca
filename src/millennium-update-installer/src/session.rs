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

//! The session state record the stage controller mutates. Owned exclusively
//! by the main scheduler; the installer worker sequence only ever receives
//! copies of what it needs and posts results back.

use crate::types::{HostBundleIdentifier, HostInfo, InstallationInput};

/// Installation phases, in the order the daemon passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Idle,
	AwaitingInputs,
	Extracting,
	Validating,
	Stage1Running,
	AwaitingHostTermination,
	Stage2Running,
	Stage3Running,
	Finalizing,
	Exiting,
}

/// The bootstrap gate: installation may begin only once both events have
/// been observed, each at most once. Replaces a numeric `agent_bootstrap_counter`
/// reaching 2, which a reconnect could trip early by firing either event
/// twice. This latch ignores a repeated event instead of counting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapGate {
	#[default]
	None,
	OnlyValidator,
	OnlyAgent,
	Both,
}

impl BootstrapGate {
	/// Records a validator-success event. Returns `true` iff this call is the
	/// one that completes the gate.
	pub fn advance_validator(&mut self) -> bool {
		match *self {
			BootstrapGate::None => {
				*self = BootstrapGate::OnlyValidator;
				false
			}
			BootstrapGate::OnlyAgent => {
				*self = BootstrapGate::Both;
				true
			}
			BootstrapGate::OnlyValidator | BootstrapGate::Both => false,
		}
	}

	/// Records an agent-connected event. Returns `true` iff this call is the
	/// one that completes the gate.
	pub fn advance_agent(&mut self) -> bool {
		match *self {
			BootstrapGate::None => {
				*self = BootstrapGate::OnlyAgent;
				false
			}
			BootstrapGate::OnlyValidator => {
				*self = BootstrapGate::Both;
				true
			}
			BootstrapGate::OnlyAgent | BootstrapGate::Both => false,
		}
	}

	pub fn is_complete(&self) -> bool {
		matches!(self, BootstrapGate::Both)
	}
}

/// The per-process session record.
pub struct DaemonSession {
	pub identifier: HostBundleIdentifier,
	pub allow_interaction: bool,
	pub phase: Phase,

	pub host_info: Option<HostInfo>,
	pub installation_input: Option<InstallationInput>,

	pub bootstrap_gate: BootstrapGate,

	/// Set by the updater's `RESUME_TO_STAGE_2` command.
	pub should_show_ui: bool,
	pub should_relaunch: bool,

	pub performed_stage1: bool,
	pub performed_stage2: bool,
	pub performed_stage3: bool,
	/// Guards against two concurrent stage-2 worker dispatches: stage 2 can be
	/// triggered either by `RESUME_TO_STAGE_2` or by host termination, and
	/// both trigger points must collapse into a single execution.
	pub stage2_in_flight: bool,
	/// Set when `RESUME_TO_STAGE_2` arrives before `performed_stage1`; fires
	/// stage 2 immediately once stage 1 completes.
	pub stage2_requested: bool,

	/// Cleared once validation completes; used by the startup deadline check.
	pub received_installation_input: bool,
	pub received_updater_pong: bool,

	/// Set at the top of stage 1 execution; gates whether an updater-link
	/// invalidation is treated as fatal.
	pub will_complete_installation: bool,
	/// Set once the bootstrap gate completes; gates whether an agent-link
	/// invalidation is treated as fatal.
	pub installation_begun: bool,

	/// Cleared at stage 3 success; guards the 0.7s progress-deferral timer.
	pub should_launch_installer_progress: bool,
}

impl DaemonSession {
	pub fn new(identifier: HostBundleIdentifier, allow_interaction: bool) -> Self {
		Self {
			identifier,
			allow_interaction,
			phase: Phase::Idle,
			host_info: None,
			installation_input: None,
			bootstrap_gate: BootstrapGate::default(),
			should_show_ui: false,
			should_relaunch: false,
			performed_stage1: false,
			performed_stage2: false,
			performed_stage3: false,
			stage2_in_flight: false,
			stage2_requested: false,
			received_installation_input: false,
			received_updater_pong: false,
			will_complete_installation: false,
			installation_begun: false,
			should_launch_installer_progress: false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bootstrap_gate_completes_on_both_distinct_events() {
		let mut gate = BootstrapGate::default();
		assert!(!gate.advance_validator());
		assert!(gate.advance_agent());
		assert!(gate.is_complete());
	}

	#[test]
	fn bootstrap_gate_ignores_repeated_events() {
		let mut gate = BootstrapGate::default();
		assert!(!gate.advance_validator());
		assert!(!gate.advance_validator());
		assert!(!gate.is_complete());
		assert!(gate.advance_agent());
		// a further repeat of either event after completion is a no-op.
		assert!(!gate.advance_agent());
		assert!(!gate.advance_validator());
		assert!(gate.is_complete());
	}

	#[test]
	fn bootstrap_gate_completes_regardless_of_event_order() {
		let mut gate = BootstrapGate::default();
		assert!(!gate.advance_agent());
		assert!(gate.advance_validator());
		assert!(gate.is_complete());
	}
}
