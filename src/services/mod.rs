pub mod event_log;
pub mod git_status;
pub mod model_resolver;
pub mod usage_tracker;

use crate::models::UsageEvent;
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Read-only access to the usage event log.
///
/// The on-disk format belongs to the persistence layer; consumers only see
/// chronologically ordered events.
pub trait EventSource {
    /// All events, oldest first
    fn all_events(&self) -> Result<Vec<UsageEvent>>;

    /// Events with `timestamp >= since`, oldest first
    fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageEvent>> {
        let mut events = self.all_events()?;
        events.retain(|e| e.timestamp >= since);
        Ok(events)
    }
}

/// Single git status lookup, separated from caching so tests can count probes
pub trait GitProbe {
    fn probe(&self, path: &std::path::Path) -> GitLookup;
}

/// Outcome of a git status lookup.
///
/// `Miss` (not a repository) and `Failed` (tool unavailable, command error)
/// both suppress the git field, but stay distinguishable for callers and
/// cache persistence.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GitLookup {
    Hit(crate::services::git_status::GitStatus),
    Miss,
    Failed,
}
