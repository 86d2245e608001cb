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

//! Capability-based plugin permissions.
//!
//! A permission is a colon-separated capability, optionally suffixed
//! with a glob scope: `nodes:read`, `git:snapshot`, `secrets:jira*`.
//! Declaring a permission in the manifest grants nothing — grants are a
//! separate runtime act, optionally time-limited, and every host call
//! checks them (expiry included) at the moment of use.

use crate::error::{PluginError, PluginResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Number of audit entries retained.
const AUDIT_CAPACITY: usize = 1000;

/// A capability a plugin can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    NodesRead,
    NodesWrite,
    IndexRead,
    IndexWrite,
    GitCommit,
    GitSnapshot,
    AttachmentsRead,
    Secrets,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::NodesRead => "nodes:read",
            Capability::NodesWrite => "nodes:write",
            Capability::IndexRead => "index:read",
            Capability::IndexWrite => "index:write",
            Capability::GitCommit => "git:commit",
            Capability::GitSnapshot => "git:snapshot",
            Capability::AttachmentsRead => "attachments:read",
            Capability::Secrets => "secrets",
        }
    }

    pub fn all() -> &'static [Capability] {
        &[
            Capability::NodesRead,
            Capability::NodesWrite,
            Capability::IndexRead,
            Capability::IndexWrite,
            Capability::GitCommit,
            Capability::GitSnapshot,
            Capability::AttachmentsRead,
            Capability::Secrets,
        ]
    }

    /// Whether this capability mutates project state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Capability::NodesWrite
                | Capability::IndexWrite
                | Capability::GitCommit
                | Capability::GitSnapshot
        )
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability plus an optional glob scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    pub capability: Capability,
    /// Glob over the capability's target (e.g. a secret key prefix).
    pub scope: Option<String>,
}

impl Permission {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            scope: None,
        }
    }

    pub fn scoped(capability: Capability, scope: impl Into<String>) -> Self {
        Self {
            capability,
            scope: Some(scope.into()),
        }
    }

    /// Whether this permission covers `target` (None = unscoped use).
    pub fn covers(&self, target: Option<&str>) -> bool {
        match (&self.scope, target) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(scope), Some(target)) => glob_match(scope, target),
        }
    }
}

impl FromStr for Permission {
    type Err = PluginError;

    fn from_str(raw: &str) -> PluginResult<Self> {
        // Exact capability strings first.
        for capability in Capability::all() {
            if raw == capability.as_str() {
                return Ok(Permission::new(*capability));
            }
        }
        // Otherwise the longest capability prefix at a ':' boundary, with
        // the remainder as scope.
        for capability in Capability::all() {
            let prefix = capability.as_str();
            if let Some(rest) = raw.strip_prefix(prefix) {
                if let Some(scope) = rest.strip_prefix(':') {
                    if !scope.is_empty() {
                        return Ok(Permission::scoped(*capability, scope));
                    }
                }
            }
        }
        Err(PluginError::UnknownPermission(raw.to_string()))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}:{scope}", self.capability),
            None => write!(f, "{}", self.capability),
        }
    }
}

/// Minimal `*`-glob matcher over permission scopes.
fn glob_match(pattern: &str, target: &str) -> bool {
    fn inner(pattern: &[u8], target: &[u8]) -> bool {
        match (pattern.first(), target.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&pattern[1..], target)
                    || (!target.is_empty() && inner(pattern, &target[1..]))
            }
            (Some(p), Some(t)) if p == t => inner(&pattern[1..], &target[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), target.as_bytes())
}

/// A granted permission, optionally expiring.
#[derive(Debug, Clone)]
pub struct PermissionGrant {
    pub permission: Permission,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PermissionGrant {
    fn live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expiry| now < expiry).unwrap_or(true)
    }
}

/// One capability check, for the audit trail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub plugin_id: String,
    pub permission: String,
    pub granted: bool,
}

/// In-memory grant table with an audit ring, guarded by its own lock.
#[derive(Default)]
pub struct PermissionRegistry {
    grants: RwLock<HashMap<String, Vec<PermissionGrant>>>,
    audit: RwLock<VecDeque<AuditEntry>>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `permission` to `plugin_id`, permanently or until `expires_at`.
    pub fn grant(&self, plugin_id: &str, permission: Permission, expires_at: Option<DateTime<Utc>>) {
        let mut grants = self.grants.write();
        let entry = grants.entry(plugin_id.to_string()).or_default();
        // Re-granting replaces any previous grant of the same permission.
        entry.retain(|g| g.permission != permission);
        entry.push(PermissionGrant {
            permission,
            granted_at: Utc::now(),
            expires_at,
        });
    }

    /// Remove a grant. Returns whether anything was revoked.
    pub fn revoke(&self, plugin_id: &str, permission: &Permission) -> bool {
        let mut grants = self.grants.write();
        match grants.get_mut(plugin_id) {
            Some(entry) => {
                let before = entry.len();
                entry.retain(|g| &g.permission != permission);
                before != entry.len()
            }
            None => false,
        }
    }

    pub fn revoke_all(&self, plugin_id: &str) {
        self.grants.write().remove(plugin_id);
    }

    /// Live grants for a plugin (expired ones are pruned on the way).
    pub fn granted(&self, plugin_id: &str) -> Vec<PermissionGrant> {
        let now = Utc::now();
        let mut grants = self.grants.write();
        let Some(entry) = grants.get_mut(plugin_id) else {
            return Vec::new();
        };
        entry.retain(|g| g.live(now));
        entry.clone()
    }

    /// Check and audit a capability use. Expiries are evaluated now, not
    /// at grant time.
    pub fn check(
        &self,
        plugin_id: &str,
        capability: Capability,
        target: Option<&str>,
    ) -> PluginResult<()> {
        let now = Utc::now();
        let allowed = {
            let grants = self.grants.read();
            grants
                .get(plugin_id)
                .map(|entry| {
                    entry.iter().any(|g| {
                        g.live(now) && g.permission.capability == capability && g.permission.covers(target)
                    })
                })
                .unwrap_or(false)
        };

        let wanted = match target {
            Some(target) => format!("{capability}:{target}"),
            None => capability.to_string(),
        };
        {
            let mut audit = self.audit.write();
            if audit.len() >= AUDIT_CAPACITY {
                audit.pop_front();
            }
            audit.push_back(AuditEntry {
                timestamp: now,
                plugin_id: plugin_id.to_string(),
                permission: wanted.clone(),
                granted: allowed,
            });
        }

        if allowed {
            Ok(())
        } else {
            Err(PluginError::Unauthorized {
                plugin: plugin_id.to_string(),
                permission: wanted,
            })
        }
    }

    /// Like [`check`](Self::check) but silent: no audit entry, no error.
    /// Used for per-item filtering after a call-level check passed.
    pub fn allows(&self, plugin_id: &str, capability: Capability, target: Option<&str>) -> bool {
        let now = Utc::now();
        let grants = self.grants.read();
        grants
            .get(plugin_id)
            .map(|entry| {
                entry.iter().any(|g| {
                    g.live(now) && g.permission.capability == capability && g.permission.covers(target)
                })
            })
            .unwrap_or(false)
    }

    /// Most recent audit entries, newest first.
    pub fn recent_audit(&self, limit: usize) -> Vec<AuditEntry> {
        self.audit.read().iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_permission_strings() {
        let plain: Permission = "nodes:read".parse().unwrap();
        assert_eq!(plain.capability, Capability::NodesRead);
        assert_eq!(plain.scope, None);

        let scoped: Permission = "secrets:jira*".parse().unwrap();
        assert_eq!(scoped.capability, Capability::Secrets);
        assert_eq!(scoped.scope.as_deref(), Some("jira*"));

        let deep: Permission = "index:write:reports*".parse().unwrap();
        assert_eq!(deep.capability, Capability::IndexWrite);
        assert_eq!(deep.scope.as_deref(), Some("reports*"));

        for bad in ["nodes", "nodes:delete", "secrets:", "", "shell"] {
            assert!(bad.parse::<Permission>().is_err(), "{bad:?} parsed");
        }
    }

    #[test]
    fn test_glob_scopes() {
        let p = Permission::scoped(Capability::Secrets, "jira*");
        assert!(p.covers(Some("jira.token")));
        assert!(p.covers(Some("jira")));
        assert!(!p.covers(Some("github.token")));
        assert!(!p.covers(None));

        let unscoped = Permission::new(Capability::Secrets);
        assert!(unscoped.covers(Some("anything")));
        assert!(unscoped.covers(None));

        let multi = Permission::scoped(Capability::Secrets, "*.token");
        assert!(multi.covers(Some("jira.token")));
        assert!(!multi.covers(Some("jira.password")));
    }

    #[test]
    fn test_check_requires_grant() {
        let registry = PermissionRegistry::new();
        assert!(registry
            .check("p1", Capability::NodesRead, None)
            .is_err());

        registry.grant("p1", Permission::new(Capability::NodesRead), None);
        assert!(registry.check("p1", Capability::NodesRead, None).is_ok());
        // A grant for one plugin leaks to no other.
        assert!(registry.check("p2", Capability::NodesRead, None).is_err());
    }

    #[test]
    fn test_expired_grants_fail_on_use() {
        let registry = PermissionRegistry::new();
        registry.grant(
            "p1",
            Permission::new(Capability::GitCommit),
            Some(Utc::now() - Duration::seconds(1)),
        );
        assert!(registry.check("p1", Capability::GitCommit, None).is_err());
        assert!(registry.granted("p1").is_empty());

        registry.grant(
            "p1",
            Permission::new(Capability::GitCommit),
            Some(Utc::now() + Duration::hours(1)),
        );
        assert!(registry.check("p1", Capability::GitCommit, None).is_ok());
    }

    #[test]
    fn test_scoped_check() {
        let registry = PermissionRegistry::new();
        registry.grant("p1", Permission::scoped(Capability::Secrets, "jira*"), None);

        assert!(registry
            .check("p1", Capability::Secrets, Some("jira.token"))
            .is_ok());
        assert!(registry
            .check("p1", Capability::Secrets, Some("aws.key"))
            .is_err());
    }

    #[test]
    fn test_audit_records_denials_and_grants() {
        let registry = PermissionRegistry::new();
        registry.grant("p1", Permission::new(Capability::NodesRead), None);
        let _ = registry.check("p1", Capability::NodesRead, None);
        let _ = registry.check("p1", Capability::NodesWrite, None);

        let audit = registry.recent_audit(10);
        assert_eq!(audit.len(), 2);
        assert!(!audit[0].granted);
        assert!(audit[1].granted);
    }

    #[test]
    fn test_revoke() {
        let registry = PermissionRegistry::new();
        let permission = Permission::new(Capability::IndexWrite);
        registry.grant("p1", permission.clone(), None);
        assert!(registry.revoke("p1", &permission));
        assert!(!registry.revoke("p1", &permission));
        assert!(registry.check("p1", Capability::IndexWrite, None).is_err());
    }
}
