//! Log records, index keys, high-water marks and sync actions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-of-truth ordering key of a log line.
///
/// The relational store keeps `log_time` without a zone, so the whole
/// pipeline compares naive timestamps.
pub type Timestamp = NaiveDateTime;

/// Identifier of a launch (the run that owns log records).
pub type LaunchId = i64;

/// Identifier of a project (tenant).
pub type ProjectId = i64;

/// Default prefix of destination index/stream names.
pub const DEFAULT_INDEX_PREFIX: &str = "logs-reportportal";

/// A single log line read from the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub message: String,
    /// Owning test item; `None` for launch-level logs.
    pub item_id: Option<i64>,
    /// Owning launch, either read directly or resolved through the item's
    /// retry lineage.
    pub launch_id: LaunchId,
    pub project_id: ProjectId,
    pub log_time: Timestamp,
}

impl LogRecord {
    pub fn index_key(&self) -> IndexKey {
        IndexKey {
            project_id: self.project_id,
            launch_id: self.launch_id,
        }
    }
}

/// `(project, launch)` pair naming the destination index of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
    pub project_id: ProjectId,
    pub launch_id: LaunchId,
}

impl IndexKey {
    pub fn new(project_id: ProjectId, launch_id: LaunchId) -> Self {
        Self {
            project_id,
            launch_id,
        }
    }

    /// Destination index/stream name, e.g. `logs-reportportal-3-17`.
    pub fn index_name(&self, prefix: &str) -> String {
        format!("{prefix}-{}-{}", self.project_id, self.launch_id)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project={} launch={}", self.project_id, self.launch_id)
    }
}

/// A log document as read back from the search index.
///
/// `log_time` is `None` when the stored document carries no usable
/// timestamp (legacy or malformed documents).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexedLog {
    pub id: Option<i64>,
    pub item_id: Option<i64>,
    pub log_time: Option<Timestamp>,
}

/// High-water mark observed on the destination side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationMark {
    /// The index holds no documents (or does not exist yet).
    Absent,
    /// A document exists but has no usable timestamp.
    Untimed,
    /// Timestamp of the newest indexed document.
    At(Timestamp),
}

impl From<Option<IndexedLog>> for DestinationMark {
    fn from(log: Option<IndexedLog>) -> Self {
        match log {
            None => DestinationMark::Absent,
            Some(IndexedLog { log_time: None, .. }) => DestinationMark::Untimed,
            Some(IndexedLog {
                log_time: Some(ts), ..
            }) => DestinationMark::At(ts),
        }
    }
}

impl fmt::Display for DestinationMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationMark::Absent => f.write_str("absent"),
            DestinationMark::Untimed => f.write_str("present without timestamp"),
            DestinationMark::At(ts) => write!(f, "{ts}"),
        }
    }
}

/// What a single synchronization run does. Computed fresh on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncAction {
    /// Nothing to do: the source is empty or both sides agree.
    None,
    /// The destination has never been populated; migrate everything.
    Full,
    /// The destination lags; migrate records with `log_time >= since`.
    Resume { since: Timestamp },
    /// The destination is ahead; delete documents with `@timestamp >= after`
    /// and stop.
    Rollback { after: Timestamp },
}

impl SyncAction {
    /// Lower bound handed to the fetch stage, `None` for a full fetch.
    pub fn fetch_lower_bound(&self) -> Option<Timestamp> {
        match self {
            SyncAction::Resume { since } => Some(*since),
            _ => None,
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::None => f.write_str("none"),
            SyncAction::Full => f.write_str("full"),
            SyncAction::Resume { since } => write!(f, "resume(since={since})"),
            SyncAction::Rollback { after } => write!(f, "rollback(after={after})"),
        }
    }
}
