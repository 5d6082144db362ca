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

//! The installation state machine. Synchronizes the agent link, updater
//! link, validator and termination watcher, and enforces the ordering and
//! timeouts the installation protocol requires.
//!
//! Runs as a single `async fn run(&mut self)` event loop over one `select!`,
//! so message handlers execute atomically with respect to each other: there
//! is no interior concurrency over [`DaemonSession`] state, only a single
//! task ever mutates it.

use std::{path::PathBuf, pin::Pin, time::Duration};

use tokio::{
	sync::mpsc,
	task::JoinHandle,
	time::Sleep,
};

use crate::{
	agent_link::{AgentEvent, AgentLink},
	archive,
	bundle,
	cleanup,
	error::{Error, Result},
	installer_backend::{BundleInstaller, InstallerBackend, PackageInstaller},
	message::{self, Frame, MessageId, Stage1Result, Stage2Command, Stage2Result},
	session::{BootstrapGate, DaemonSession, Phase},
	signing::{CodeSigningVerifier, SignatureVerifier},
	termination::TerminationHandle,
	transport,
	types::{AppcastItemData, HostBundleIdentifier, InstallationInfo, InstallationInput},
	updater_link::{UpdaterEvent, UpdaterLink, UpdaterSender},
};

/// The four armed timers/deadlines the state machine enforces. Exposed so
/// tests can shrink them (see `tests/protocol.rs`) instead of waiting on the
/// production durations.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
	pub first_message: Duration,
	pub pid_retrieval: Duration,
	pub progress_deferral: Duration,
	pub exit_delay: Duration,
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			first_message: Duration::from_secs(7),
			pid_retrieval: Duration::from_secs(5),
			progress_deferral: Duration::from_millis(700),
			exit_delay: Duration::from_millis(500),
		}
	}
}

/// Owns every resource the running daemon needs for its entire lifetime.
pub struct StageController {
	session: DaemonSession,
	/// Set once an `InstallationInput` has been accepted, mirroring
	/// `session.installation_input`'s staging path; kept as its own field so
	/// cleanup still has somewhere to look if the daemon exits before any
	/// input ever arrives.
	staging_directory: Option<PathBuf>,
	agent_endpoint_name: String,
	signature_verifier: Box<dyn SignatureVerifier>,
	code_signing_verifier: Box<dyn CodeSigningVerifier>,
	timeouts: Timeouts,

	updater_link: Option<UpdaterLink>,
	updater_sender: UpdaterSender,
	updater_events: mpsc::UnboundedReceiver<UpdaterEvent>,
	updater_task: Option<JoinHandle<()>>,

	agent: Option<AgentLink>,
	agent_events: mpsc::UnboundedReceiver<AgentEvent>,
	agent_task: Option<JoinHandle<()>>,

	termination: Option<TerminationHandle>,
	awaiting_termination: bool,
	installer: Option<Box<dyn InstallerBackend>>,

	first_message_timer: Option<Pin<Box<Sleep>>>,
	progress_deferral_timer: Option<Pin<Box<Sleep>>>,

	exit_result: Option<Result<()>>,
}

impl StageController {
	/// Binds the updater endpoint synchronously (this is the only fallible
	/// part of construction that doesn't need an async runtime). The agent
	/// link is connected lazily, inside [`StageController::run`].
	pub fn new(
		identifier: HostBundleIdentifier,
		allow_interaction: bool,
		agent_endpoint_name: String,
		signature_verifier: Box<dyn SignatureVerifier>,
		code_signing_verifier: Box<dyn CodeSigningVerifier>,
		timeouts: Timeouts,
	) -> Result<Self> {
		let endpoint_name = transport::updater_endpoint_name(identifier.as_ref());
		let (updater_tx, updater_events) = mpsc::unbounded_channel();
		let updater_link = UpdaterLink::bind(&endpoint_name, updater_tx)?;
		let updater_sender = updater_link.sender();
		let (_agent_tx, agent_events) = mpsc::unbounded_channel();

		Ok(Self {
			session: DaemonSession::new(identifier, allow_interaction),
			staging_directory: None,
			agent_endpoint_name,
			signature_verifier,
			code_signing_verifier,
			timeouts,
			updater_link: Some(updater_link),
			updater_sender,
			updater_events,
			updater_task: None,
			agent: None,
			agent_events,
			agent_task: None,
			termination: None,
			awaiting_termination: false,
			installer: None,
			first_message_timer: None,
			progress_deferral_timer: None,
			exit_result: None,
		})
	}

	/// Runs the daemon to completion. Returns `Ok(())` for a successful
	/// install, `Err` otherwise; the caller maps this to an exit code.
	/// Staging directory and self-bundle removal happen unconditionally
	/// before returning, on every path.
	pub async fn run(mut self) -> Result<()> {
		if let Some(link) = self.updater_link.take() {
			self.updater_task = Some(tokio::spawn(link.run()));
		}

		let (agent_tx, agent_events) = mpsc::unbounded_channel();
		self.agent_events = agent_events;
		if let Err(error) = self.connect_agent(agent_tx).await {
			self.teardown_links();
			cleanup::remove_staging_and_self(self.staging_directory.as_deref(), cleanup::own_bundle_path().as_deref());
			return Err(error);
		}

		self.first_message_timer = Some(Box::pin(tokio::time::sleep(self.timeouts.first_message)));
		self.session.phase = Phase::AwaitingInputs;

		loop {
			tokio::select! {
				Some(event) = self.updater_events.recv() => self.handle_updater_event(event).await,
				Some(event) = self.agent_events.recv() => self.handle_agent_event(event).await,
				_ = Self::fire(&mut self.first_message_timer) => self.handle_first_message_deadline().await,
				_ = Self::fire(&mut self.progress_deferral_timer) => self.handle_progress_deferral().await,
				_ = Self::wait_termination(&self.termination), if self.awaiting_termination => self.handle_host_terminated().await,
			}

			if let Some(result) = self.exit_result.take() {
				self.teardown_links();
				cleanup::remove_staging_and_self(self.staging_directory.as_deref(), cleanup::own_bundle_path().as_deref());
				return result;
			}
		}
	}

	async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
		match timer.as_mut() {
			Some(sleep) => sleep.await,
			None => std::future::pending().await,
		}
	}

	async fn wait_termination(handle: &Option<TerminationHandle>) {
		match handle {
			Some(handle) => handle.wait().await,
			None => std::future::pending().await,
		}
	}

	fn teardown_links(&mut self) {
		if let Some(task) = self.updater_task.take() {
			task.abort();
		}
		if let Some(task) = self.agent_task.take() {
			task.abort();
		}
		self.agent = None;
	}

	async fn fatal(&mut self, error: Error) {
		tracing::error!(error = %error, "installer daemon exiting with a fatal error");
		self.session.phase = Phase::Exiting;
		if let Some(agent) = self.agent.as_mut() {
			let _ = agent.stop_progress().await;
		}
		self.exit_result = Some(Err(error));
	}

	/// Attempts to connect to the agent's endpoint, retrying briefly: the
	/// controlling updater may still be starting the agent process. The
	/// total backoff stays well under the first-message deadline.
	async fn connect_agent(&mut self, events_tx: mpsc::UnboundedSender<AgentEvent>) -> Result<()> {
		let mut last_error = None;
		for attempt in 0..5u32 {
			match AgentLink::connect(&self.agent_endpoint_name, events_tx.clone()).await {
				Ok((link, task)) => {
					self.agent = Some(link);
					self.agent_task = Some(task);
					return Ok(());
				}
				Err(error) => {
					last_error = Some(error);
					tokio::time::sleep(Duration::from_millis(200 * (attempt as u64 + 1))).await;
				}
			}
		}
		Err(last_error.unwrap_or(Error::PeerVanished("agent")))
	}

	// ---- updater events ----

	async fn handle_updater_event(&mut self, event: UpdaterEvent) {
		match event {
			UpdaterEvent::Connected => tracing::info!("updater connected"),
			UpdaterEvent::Invalidated => {
				if !self.session.will_complete_installation {
					self.fatal(Error::PeerVanished("updater")).await;
				} else {
					tracing::warn!("updater link invalidated after installation neared completion; continuing");
				}
			}
			UpdaterEvent::Message(frame) => self.handle_updater_message(frame).await,
		}
	}

	async fn handle_updater_message(&mut self, frame: Frame) {
		match MessageId::from_i32(frame.id) {
			Some(MessageId::InstallationInput) => self.handle_installation_input(frame.payload).await,
			Some(MessageId::SentUpdateAppcastItemData) => self.handle_appcast(frame.payload).await,
			Some(MessageId::ResumeToStage2) => self.handle_resume_to_stage2(frame.payload).await,
			Some(MessageId::UpdaterAlivePong) => self.session.received_updater_pong = true,
			_ => self.fatal(Error::MalformedMessage(format!("unexpected message id {}", frame.id))).await,
		}
	}

	async fn handle_installation_input(&mut self, payload: Vec<u8>) {
		let input: InstallationInput = match message::decode_object(&payload) {
			Ok(input) => input,
			Err(error) => return self.fatal(error).await,
		};
		if let Err(error) = input.validate_shape() {
			return self.fatal(error).await;
		}
		let host_info = match bundle::resolve_host_info(&input.host_bundle_path) {
			Ok(info) => info,
			Err(error) => return self.fatal(error).await,
		};
		if host_info.identifier != self.session.identifier {
			return self
				.fatal(Error::IdentifierMismatch { expected: self.session.identifier.0.clone(), found: host_info.identifier.0.clone() })
				.await;
		}

		self.staging_directory = Some(input.staging_directory.clone());
		self.session.host_info = Some(host_info);
		self.session.installation_input = Some(input);
		self.session.received_installation_input = true;
		self.first_message_timer = None;
		self.session.phase = Phase::Extracting;
		self.begin_extraction().await;
	}

	async fn begin_extraction(&mut self) {
		let _ = self.updater_sender.send(Frame::empty(MessageId::ExtractionStarted)).await;
		let input = self.session.installation_input.clone().expect("installation input set before extraction begins");
		let archive_path = input.archive_path();
		let destination = input.staging_directory.clone();
		let password = input.decryption_password.clone();

		let Some(unarchiver) = archive::unarchiver_for(&archive_path) else {
			tracing::warn!(error = %Error::NoSuitableUnarchiver(archive_path.clone()), "rewinding to await a new installation input");
			let _ = self.updater_sender.send(Frame::empty(MessageId::ArchiveExtractionFailed)).await;
			self.session.installation_input = None;
			self.session.phase = Phase::AwaitingInputs;
			return;
		};

		let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f64>();
		let blocking_archive_path = archive_path.clone();
		let extraction = tokio::task::spawn_blocking(move || {
			let mut on_progress = |p: f64| {
				let _ = progress_tx.send(p);
			};
			unarchiver.extract(&blocking_archive_path, &destination, password.as_deref(), &mut on_progress)
		});

		let updater_sender = self.updater_sender.clone();
		let forward = tokio::spawn(async move {
			while let Some(progress) = progress_rx.recv().await {
				let _ = updater_sender.send(Frame::new(MessageId::ExtractedWithProgress, message::encode_progress(progress))).await;
			}
		});

		let result = match extraction.await {
			Ok(result) => result,
			Err(join_error) => Err(Error::Extraction(join_error.to_string())),
		};
		let _ = forward.await;

		match result {
			Ok(()) => self.begin_validation(&archive_path).await,
			Err(error) => {
				tracing::warn!(error = %error, "extraction failed; awaiting a new installation input");
				let _ = self.updater_sender.send(Frame::empty(MessageId::ArchiveExtractionFailed)).await;
				self.session.installation_input = None;
				self.session.phase = Phase::AwaitingInputs;
			}
		}
	}

	async fn begin_validation(&mut self, archive_path: &std::path::Path) {
		self.session.phase = Phase::Validating;
		let _ = self.updater_sender.send(Frame::empty(MessageId::ValidationStarted)).await;

		let host_info = self.session.host_info.clone().expect("host info resolved before validation");
		let input = self.session.installation_input.clone().expect("installation input retained through validation");
		let archive_data = match archive::read_archive(archive_path) {
			Ok(data) => data,
			Err(error) => return self.fatal(error).await,
		};

		let validator = crate::validator::Validator::new(self.signature_verifier.as_ref(), self.code_signing_verifier.as_ref());
		let decision = validator.validate(&host_info, &archive_data, &input.staging_directory, &input.signature);
		match decision.into_result() {
			Ok(()) => self.on_validation_success().await,
			Err(error) => self.fatal(error).await,
		}
	}

	async fn on_validation_success(&mut self) {
		let _ = self.updater_sender.send(Frame::empty(MessageId::InstallationStartedStage1)).await;
		if self.session.bootstrap_gate.advance_validator() {
			self.begin_stage1_pid_retrieval().await;
		}
	}

	async fn handle_resume_to_stage2(&mut self, payload: Vec<u8>) {
		let command = match Stage2Command::decode(&payload) {
			Ok(command) => command,
			Err(error) => return self.fatal(error).await,
		};
		self.session.should_relaunch = command.relaunch;
		self.session.should_show_ui = command.show_ui;
		self.session.stage2_requested = true;
		if self.session.performed_stage1 {
			self.maybe_run_stage2().await;
		}
	}

	async fn handle_appcast(&mut self, payload: Vec<u8>) {
		let Ok(item) = message::decode_object::<AppcastItemData>(&payload) else {
			tracing::debug!("dropping appcast item with an unrecognized schema");
			return;
		};
		let can_install_silently = self.installer.as_ref().map(|installer| installer.can_install_silently()).unwrap_or(false);
		let info = InstallationInfo { item, can_install_silently };
		let Ok(encoded) = message::encode_object(&info) else { return };
		if let Some(agent) = self.agent.as_mut() {
			let _ = agent.register_installation_info(encoded).await;
		}
	}

	// ---- agent events ----

	async fn handle_agent_event(&mut self, event: AgentEvent) {
		match event {
			AgentEvent::Connected => {
				if self.session.bootstrap_gate.advance_agent() {
					self.begin_stage1_pid_retrieval().await;
				}
			}
			AgentEvent::Invalidated => {
				if !self.session.installation_begun {
					self.fatal(Error::PeerVanished("agent")).await;
				} else {
					tracing::warn!("agent link invalidated after installation began; progress UI and relaunch are unavailable");
				}
			}
		}
	}

	// ---- stage 1 ----

	async fn begin_stage1_pid_retrieval(&mut self) {
		self.session.installation_begun = true;
		let relaunch_path = self.session.installation_input.as_ref().expect("installation input present once validated").relaunch_path.clone();

		let Some(agent) = self.agent.as_mut() else {
			return self.fatal(Error::PeerVanished("agent")).await;
		};
		match tokio::time::timeout(self.timeouts.pid_retrieval, agent.register_relaunch_bundle_path(&relaunch_path)).await {
			Ok(Ok(pid)) => {
				self.termination = Some(TerminationHandle::watch(pid));
				self.session.phase = Phase::Stage1Running;
				self.run_stage1().await;
			}
			Ok(Err(error)) => self.fatal(error).await,
			Err(_elapsed) => self.fatal(Error::PidDeadline).await,
		}
	}

	async fn run_stage1(&mut self) {
		self.session.will_complete_installation = true;
		let host_info = self.session.host_info.clone().expect("host info present before stage 1");
		let staging_directory = self
			.session
			.installation_input
			.as_ref()
			.expect("installation input retained through stage 1")
			.staging_directory
			.clone();
		let allow_interaction = self.session.allow_interaction;

		let result = tokio::task::spawn_blocking(move || -> Result<(Box<dyn InstallerBackend>, bool)> {
			let (install_source, is_package) = bundle::resolve_install_source(&staging_directory)?;
			let mut installer: Box<dyn InstallerBackend> = if is_package {
				Box::new(PackageInstaller::new(install_source, host_info.bundle_path.clone(), allow_interaction)?)
			} else {
				Box::new(BundleInstaller::new(host_info.bundle_path.clone(), install_source)?)
			};
			installer.perform_first_stage()?;
			let can_install_silently = installer.can_install_silently();
			Ok((installer, can_install_silently))
		})
		.await;

		match result {
			Ok(Ok((installer, can_install_silently))) => {
				self.installer = Some(installer);
				self.session.performed_stage1 = true;
				let target_terminated = self.termination.as_ref().map(TerminationHandle::terminated).unwrap_or(false);
				let payload = Stage1Result { can_install_silently, target_terminated }.encode();
				let _ = self.updater_sender.send(Frame::new(MessageId::InstallationFinishedStage1, payload)).await;
				self.begin_host_termination_wait().await;
				if self.session.stage2_requested {
					self.maybe_run_stage2().await;
				}
			}
			Ok(Err(error)) => self.fatal(error).await,
			Err(join_error) => self.fatal(Error::InstallerConstruction(join_error.to_string())).await,
		}
	}

	async fn begin_host_termination_wait(&mut self) {
		self.session.phase = Phase::AwaitingHostTermination;
		self.session.received_updater_pong = false;
		self.awaiting_termination = true;
		let _ = self.updater_sender.send(Frame::empty(MessageId::UpdaterAlivePing)).await;

		let installer_shows_progress = self.installer.as_ref().map(|installer| installer.displays_user_progress()).unwrap_or(false);
		if self.session.should_show_ui && !installer_shows_progress {
			self.session.should_launch_installer_progress = true;
			self.progress_deferral_timer = Some(Box::pin(tokio::time::sleep(self.timeouts.progress_deferral)));
		}
	}

	async fn handle_first_message_deadline(&mut self) {
		if !self.session.received_installation_input {
			self.fatal(Error::StartupDeadline).await;
		}
	}

	async fn handle_progress_deferral(&mut self) {
		self.progress_deferral_timer = None;
		if !self.session.should_launch_installer_progress {
			return;
		}
		let updater_alive = self.updater_sender.is_connected().await && self.session.received_updater_pong;
		if !updater_alive {
			if let Some(agent) = self.agent.as_mut() {
				let _ = agent.show_progress().await;
			}
		}
	}

	// ---- stage 2 ----

	async fn maybe_run_stage2(&mut self) {
		if self.session.performed_stage2 || self.session.stage2_in_flight {
			return;
		}
		self.session.stage2_in_flight = true;
		self.session.phase = Phase::Stage2Running;

		let Some(mut installer) = self.installer.take() else {
			self.session.stage2_in_flight = false;
			return self.fatal(Error::Stage2Failed("installer backend missing".into())).await;
		};
		let allowing_ui = self.session.should_show_ui;
		let result = tokio::task::spawn_blocking(move || {
			let result = installer.perform_second_stage(allowing_ui);
			(installer, result)
		})
		.await;
		self.session.stage2_in_flight = false;

		match result {
			Ok((installer, Ok(()))) => {
				self.installer = Some(installer);
				self.session.performed_stage2 = true;
				let target_terminated = self.termination.as_ref().map(TerminationHandle::terminated).unwrap_or(false);
				let payload = Stage2Result { cancelled: false, target_terminated }.encode();
				let _ = self.updater_sender.send(Frame::new(MessageId::InstallationFinishedStage2, payload)).await;
			}
			Ok((installer, Err(Error::InstallationCancelled))) => {
				self.installer = Some(installer);
				let target_terminated = self.termination.as_ref().map(TerminationHandle::terminated).unwrap_or(false);
				let payload = Stage2Result { cancelled: true, target_terminated }.encode();
				let _ = self.updater_sender.send(Frame::new(MessageId::InstallationFinishedStage2, payload)).await;
				self.fatal(Error::InstallationCancelled).await;
			}
			Ok((mut installer, Err(error))) => {
				installer.cleanup();
				self.fatal(error).await;
			}
			Err(join_error) => self.fatal(Error::Stage2Failed(join_error.to_string())).await,
		}
	}

	// ---- stage 3 ----

	async fn handle_host_terminated(&mut self) {
		self.awaiting_termination = false;
		if let Some(termination) = self.termination.as_ref() {
			tracing::info!(pid = termination.pid(), "host process terminated; starting stage 3");
		}
		self.session.phase = Phase::Stage3Running;
		self.run_stage3().await;
	}

	async fn run_stage3(&mut self) {
		self.maybe_run_stage2().await;
		if matches!(self.session.phase, Phase::Exiting) {
			return;
		}

		let Some(mut installer) = self.installer.take() else {
			return self.fatal(Error::Stage3Failed("installer backend missing".into())).await;
		};
		let result = tokio::task::spawn_blocking(move || {
			let result = installer.perform_third_stage();
			(installer, result)
		})
		.await;

		match result {
			Ok((mut installer, Ok(()))) => {
				self.session.performed_stage3 = true;
				self.session.should_launch_installer_progress = false;
				self.progress_deferral_timer = None;
				if let Some(agent) = self.agent.as_mut() {
					let _ = agent.stop_progress().await;
				}
				let _ = self.updater_sender.send(Frame::empty(MessageId::InstallationFinishedStage3)).await;

				let host_info = self.session.host_info.clone().expect("host info present at stage 3");
				let input = self.session.installation_input.clone().expect("installation input present at stage 3");
				let install_path = installer.installation_path_for(&host_info.bundle_path);
				let relaunch_path = if install_path != host_info.bundle_path || input.relaunch_path == host_info.bundle_path {
					install_path
				} else {
					input.relaunch_path.clone()
				};
				if self.session.should_relaunch {
					if let Some(agent) = self.agent.as_mut() {
						let _ = agent.relaunch(&relaunch_path).await;
					}
				}

				installer.cleanup();
				self.schedule_exit().await;
			}
			Ok((mut installer, Err(error))) => {
				installer.cleanup();
				self.fatal(error).await;
			}
			Err(join_error) => self.fatal(Error::Stage3Failed(join_error.to_string())).await,
		}
	}

	/// Exits at least [`Timeouts::exit_delay`] after `INSTALLATION_FINISHED_STAGE_3`,
	/// so a relaunched application gets the first chance at OS-level
	/// activation.
	async fn schedule_exit(&mut self) {
		self.session.phase = Phase::Finalizing;
		tokio::time::sleep(self.timeouts.exit_delay).await;
		self.session.phase = Phase::Exiting;
		self.exit_result = Some(Ok(()));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::signing::{MinisignVerifier, NullCodeSigningVerifier};

	fn test_controller(identifier: &str, agent_endpoint: &str) -> StageController {
		StageController::new(
			HostBundleIdentifier(identifier.into()),
			false,
			agent_endpoint.into(),
			Box::new(MinisignVerifier),
			Box::new(NullCodeSigningVerifier),
			Timeouts { first_message: Duration::from_millis(50), pid_retrieval: Duration::from_millis(50), progress_deferral: Duration::from_millis(20), exit_delay: Duration::from_millis(10) },
		)
		.unwrap()
	}

	#[tokio::test]
	async fn startup_fails_fast_when_agent_never_connects() {
		let pid = std::process::id();
		let identifier = format!("controller-test-startup-{pid}");
		#[cfg(not(windows))]
		let _ = std::fs::remove_file(transport::updater_endpoint_name(&identifier));

		let controller = test_controller(&identifier, "controller-test-agent-nonexistent-endpoint");
		let result = controller.run().await;
		assert!(result.is_err());
	}

	#[test]
	fn resume_to_stage2_before_stage1_is_stored_not_executed() {
		let mut session = DaemonSession::new(HostBundleIdentifier("com.example.app".into()), false);
		assert!(!session.performed_stage1);
		session.should_relaunch = true;
		session.should_show_ui = true;
		session.stage2_requested = true;
		// storing the command must not by itself mark stage 2 as performed;
		// it only fires once stage 1 has.
		assert!(!session.performed_stage2);
		assert!(session.stage2_requested);
	}

	#[test]
	fn stage2_latch_prevents_a_second_dispatch() {
		let mut session = DaemonSession::new(HostBundleIdentifier("com.example.app".into()), false);
		session.performed_stage1 = true;
		session.stage2_in_flight = true;
		// a second trigger while in flight (or after completion) must be a no-op;
		// `maybe_run_stage2` checks both flags before doing any work.
		assert!(session.stage2_in_flight);
		session.stage2_in_flight = false;
		session.performed_stage2 = true;
		assert!(session.performed_stage2);
	}
}
