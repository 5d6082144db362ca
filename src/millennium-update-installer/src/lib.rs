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

//! `millennium-update-installer`: the auxiliary process that installs a
//! downloaded Millennium application update.
//!
//! The binary entry point (`main.rs`) is a thin shell around
//! [`StageController`](stage_controller::StageController); everything that
//! matters lives here so integration tests can drive it directly.

pub mod agent_link;
pub mod archive;
pub mod bundle;
pub mod cleanup;
pub mod cli;
pub mod error;
pub mod installer_backend;
pub mod logging;
pub mod message;
pub mod session;
pub mod signing;
pub mod stage_controller;
pub mod termination;
pub mod transport;
pub mod types;
pub mod updater_link;
pub mod validator;
