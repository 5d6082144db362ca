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

//! Observes a foreign process identifier and notifies when it exits.

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use tokio::time::{interval, Duration};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Returns whether a process with the given id is still alive. `kill` with a
/// null signal only probes existence; `EPERM` means the process exists but we
/// lack permission to signal it, which is not the same as having exited, so
/// only `ESRCH` counts as gone.
#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
	match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None) {
		Ok(()) => true,
		Err(nix::errno::Errno::ESRCH) => false,
		Err(_) => true,
	}
}

#[cfg(windows)]
fn is_alive(pid: u32) -> bool {
	use windows::Win32::{
		Foundation::{CloseHandle, WAIT_OBJECT_0},
		System::Threading::{OpenProcess, WaitForSingleObject, PROCESS_QUERY_LIMITED_INFORMATION},
	};
	unsafe {
		let Ok(handle) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) else {
			return false;
		};
		let result = WaitForSingleObject(handle, 0);
		let _ = CloseHandle(handle);
		result != WAIT_OBJECT_0
	}
}

/// A handle to a termination watch in progress. Wraps a foreign PID obtained
/// from the agent when it resolves the bundle being relaunched to a running
/// process.
pub struct TerminationHandle {
	pid: u32,
	terminated: Arc<AtomicBool>,
}

impl TerminationHandle {
	/// Starts watching `pid`. Returns `None` if the process is already gone
	/// by the time watching would start -- the caller treats that the same
	/// as a normal future resolution to `true`.
	pub fn watch(pid: u32) -> Self {
		let terminated = Arc::new(AtomicBool::new(!is_alive(pid)));
		let handle = Self { pid, terminated: terminated.clone() };
		if !terminated.load(Ordering::SeqCst) {
			tokio::spawn(async move {
				let mut ticker = interval(POLL_INTERVAL);
				loop {
					ticker.tick().await;
					if !is_alive(pid) {
						tracing::debug!(pid, "watched host process terminated");
						terminated.store(true, Ordering::SeqCst);
						break;
					}
				}
			});
		}
		handle
	}

	/// Cheap probe, safe to read from message-handling code without blocking
	/// on the poll loop.
	pub fn terminated(&self) -> bool {
		self.terminated.load(Ordering::SeqCst)
	}

	/// Resolves when the process has been observed to exit.
	pub async fn wait(&self) {
		while !self.terminated() {
			tokio::time::sleep(POLL_INTERVAL).await;
		}
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn watch_resolves_when_process_exits() {
		let child = std::process::Command::new("sleep").arg("0.3").spawn();
		let Ok(mut child) = child else {
			// `sleep` isn't guaranteed to exist on every CI image; skip rather
			// than fail spuriously.
			return;
		};
		let pid = child.id();
		let handle = TerminationHandle::watch(pid);
		assert!(!handle.terminated());
		handle.wait().await;
		assert!(handle.terminated());
		let _ = child.wait();
	}

	#[tokio::test]
	async fn watch_on_already_dead_pid_resolves_immediately() {
		let Ok(mut child) = std::process::Command::new("true").spawn() else {
			return;
		};
		let pid = child.id();
		let _ = child.wait();
		// the process has already exited by the time watching starts, so the
		// handle should report terminated without spawning a poll loop.
		let handle = TerminationHandle::watch(pid);
		assert!(handle.terminated());
	}
}
