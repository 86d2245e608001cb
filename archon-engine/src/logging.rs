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

//! Logging service: tracing setup, reloadable level, recent-log ring.
//!
//! A ring-buffer layer keeps the most recent records in memory for the
//! `GetRecentLogs` surface; the level filter is reloadable at runtime
//! via `SetLogLevel` without restarting the subscriber.

use archon_core::{ArchonError, ErrorCode, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

/// Default number of retained records.
const RING_CAPACITY: usize = 2000;

/// Target used for client-submitted messages (already pushed into the
/// ring directly, so the capture layer skips it).
const CLIENT_TARGET: &str = "archon::client";

/// One captured log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Current logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// An `EnvFilter` directive string, e.g. `info` or `archon=debug`.
    pub level: String,
    pub ring_capacity: usize,
}

type Ring = Arc<RwLock<VecDeque<LogRecord>>>;

struct RingLayer {
    records: Ring,
    capacity: usize,
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message
                .push_str(&format!("{}={value:?}", field.name()));
        }
    }
}

impl<S: Subscriber> Layer<S> for RingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target() == CLIENT_TARGET {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        push(
            &self.records,
            self.capacity,
            LogRecord {
                timestamp: Utc::now(),
                level: metadata.level().to_string(),
                target: metadata.target().to_string(),
                message: visitor.message,
            },
        );
    }
}

fn push(ring: &Ring, capacity: usize, record: LogRecord) {
    let mut records = ring.write();
    if records.len() >= capacity {
        records.pop_front();
    }
    records.push_back(record);
}

/// Engine logging facade.
pub struct LoggingService {
    records: Ring,
    level: RwLock<String>,
    reload_handle: Option<reload::Handle<EnvFilter, Registry>>,
}

impl LoggingService {
    /// Install the global subscriber (filter + ring + stderr formatter).
    /// If a subscriber is already installed (tests, embedding hosts) the
    /// service still works: the ring is fed directly by `log_message`.
    pub fn init(default_level: &str) -> Arc<Self> {
        let records: Ring = Arc::new(RwLock::new(VecDeque::new()));
        let ring_layer = RingLayer {
            records: Arc::clone(&records),
            capacity: RING_CAPACITY,
        };

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));
        let (filter_layer, reload_handle) = reload::Layer::new(filter);

        let installed = tracing_subscriber::registry()
            .with(filter_layer)
            .with(ring_layer)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .is_ok();

        Arc::new(Self {
            records,
            level: RwLock::new(default_level.to_string()),
            reload_handle: installed.then_some(reload_handle),
        })
    }

    /// A detached service with no global subscriber, for embedding.
    pub fn detached(default_level: &str) -> Arc<Self> {
        Arc::new(Self {
            records: Arc::new(RwLock::new(VecDeque::new())),
            level: RwLock::new(default_level.to_string()),
            reload_handle: None,
        })
    }

    /// `LogMessage`: record a client-originated message.
    pub fn log_message(&self, level: &str, message: &str) {
        push(
            &self.records,
            RING_CAPACITY,
            LogRecord {
                timestamp: Utc::now(),
                level: level.to_uppercase(),
                target: CLIENT_TARGET.to_string(),
                message: message.to_string(),
            },
        );
        match level.to_ascii_lowercase().as_str() {
            "error" => tracing::error!(target: "archon::client", "{message}"),
            "warn" => tracing::warn!(target: "archon::client", "{message}"),
            "debug" => tracing::debug!(target: "archon::client", "{message}"),
            "trace" => tracing::trace!(target: "archon::client", "{message}"),
            _ => tracing::info!(target: "archon::client", "{message}"),
        }
    }

    pub fn config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.level.read().clone(),
            ring_capacity: RING_CAPACITY,
        }
    }

    /// `SetLogLevel` / `UpdateLoggingConfig`: swap the filter directives.
    pub fn set_level(&self, level: &str) -> Result<()> {
        let filter = EnvFilter::try_new(level).map_err(|e| {
            ArchonError::new(ErrorCode::InvalidInput, format!("bad level {level:?}: {e}"))
        })?;
        if let Some(handle) = &self.reload_handle {
            handle.reload(filter).map_err(|e| {
                ArchonError::new(ErrorCode::StorageFailure, format!("filter reload: {e}"))
            })?;
        }
        *self.level.write() = level.to_string();
        tracing::info!(%level, "log level updated");
        Ok(())
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogRecord> {
        self.records
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Sanity check that a directive string parses at a known level.
    pub fn level_is_valid(level: &str) -> bool {
        EnvFilter::try_new(level).is_ok() || level.parse::<LevelFilter>().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_message_lands_in_ring() {
        let service = LoggingService::detached("info");
        service.log_message("warn", "disk almost full");
        service.log_message("info", "carry on");

        let recent = service.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "carry on");
        assert_eq!(recent[1].level, "WARN");
    }

    #[test]
    fn test_ring_is_bounded() {
        let service = LoggingService::detached("info");
        for i in 0..(RING_CAPACITY + 50) {
            service.log_message("info", &format!("m{i}"));
        }
        assert_eq!(service.recent(usize::MAX).len(), RING_CAPACITY);
    }

    #[test]
    fn test_set_level_validates() {
        let service = LoggingService::detached("info");
        assert!(service.set_level("debug").is_ok());
        assert_eq!(service.config().level, "debug");
        assert!(service.set_level("archon=trace,info").is_ok());
        assert!(service.set_level("archon=notalevel").is_err());
    }
}
