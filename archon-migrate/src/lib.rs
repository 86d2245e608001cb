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

//! Archon Migration Engine
//!
//! Ordered forward migrations over the on-disk project format. Each
//! registered step names the schema version it produces; execution takes
//! a timestamped backup first, applies the planned steps in order, bumps
//! `schemaVersion` after each success, and verifies the final version.
//! A failed step halts everything and leaves the backup in place — no
//! automatic restore.

pub mod engine;
pub mod error;
pub mod steps;

pub use engine::{MigrationEngine, MigrationReport, StepDescriptor};
pub use error::{MigrateError, MigrateResult};
pub use steps::{ChildrenAndDescriptions, MigrationStep, PropertyShapes, SettingsAndTimestamps};
