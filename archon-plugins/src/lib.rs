// Copyright 2025 Archon (https://github.com/archon-engine)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Archon Plugin System
//!
//! Plugins are untrusted. They run inside a WASM sandbox with no
//! filesystem, network, or environment access, and everything they can
//! observe or mutate goes through the [`host::PluginHost`] capability
//! API: the host looks up the caller's granted permissions before every
//! call, enforces the project's read-only latch, and cancels calls that
//! blow their time or fuel budget.
//!
//! Layout mirrors the lifecycle: manifests are parsed and validated
//! ([`manifest`]), capabilities are declared, granted, and audited
//! ([`permissions`]), installed plugins live under `.archon/plugins/`
//! ([`installer`]), secrets resolve through the redaction policy
//! ([`secrets`]), and the sandbox executes compiled components
//! ([`wasm`]).

pub mod error;
pub mod host;
pub mod installer;
pub mod manifest;
pub mod permissions;
pub mod secrets;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use error::{PluginError, PluginResult};
pub use host::{HostConfig, Mutation, PluginHost};
pub use installer::{PluginInfo, PluginInstaller};
pub use manifest::{PluginManifest, PluginType, MANIFEST_FILENAME, PLUGIN_API_VERSION};
pub use permissions::{AuditEntry, Capability, Permission, PermissionGrant, PermissionRegistry};
pub use secrets::{SecretValue, SecretsStore};
#[cfg(feature = "wasm")]
pub use wasm::{SandboxLimits, WasmExecutor};
