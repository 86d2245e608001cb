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

//! Archon Engine
//!
//! Top-level lifecycle and the service surface exposed to the UI/CLI
//! transport. The [`ProjectController`] owns the single open project:
//! it runs the schema-version decision tree on open (read-only latch for
//! newer projects, backup + forward migration for older ones), holds the
//! per-project writer lock that serializes mutations, schedules index
//! rebuilds, and wires the plugin host to everything it is allowed to
//! touch. Nothing reaches storage, search, Git, or plugins except
//! through here.

pub mod controller;
pub mod logging;
pub mod services;

pub use controller::{ProjectController, ProjectInfo};
pub use logging::{LogRecord, LoggingConfig, LoggingService};
pub use services::GrantInfo;
