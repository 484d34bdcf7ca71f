//! Collaborator traits the sync core is written against.
//!
//! The relational store and the search backend are reached only through
//! these traits, so the decision, grouping and load logic can run against
//! PostgreSQL/Elasticsearch in production and in-memory fakes in tests.
//!
//! # Usage Pattern
//!
//! ```ignore
//! pub async fn run_sync<R: LogRepository, G: SearchIndexGateway>(
//!     repository: &R,
//!     gateway: &G,
//!     opts: &SyncOpts,
//! ) -> Result<SyncReport> {
//!     let source_mark = repository.latest_log_time().await?;
//!     // ...
//! }
//! ```

use crate::types::{IndexKey, IndexedLog, LaunchId, LogRecord, Timestamp};
use anyhow::Result;

/// Read-only queries over the relational store of record.
#[async_trait::async_trait]
pub trait LogRepository: Send + Sync {
    /// `log_time` of the most recent log, `None` when the store is empty.
    async fn latest_log_time(&self) -> Result<Option<Timestamp>>;

    /// Logs whose launch is known directly, ascending by `log_time`.
    ///
    /// With `since`, only logs with `log_time >= since` are returned.
    async fn logs_with_launch(&self, since: Option<Timestamp>) -> Result<Vec<LogRecord>>;

    /// Logs attached to test items, with the launch resolved through the item
    /// or, for retries, through the item it retries.
    ///
    /// Only logs resolving to one of `candidates` are returned, ascending by
    /// `log_time`. `since` bounds `log_time` inclusively as above.
    async fn logs_resolved_through_items(
        &self,
        since: Option<Timestamp>,
        candidates: &[LaunchId],
    ) -> Result<Vec<LogRecord>>;
}

/// Result of one bulk create request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Documents newly created by this request.
    pub created: usize,
    /// Documents skipped because a document with the same id already exists.
    pub already_present: usize,
}

/// Operations on the document-search backend.
#[async_trait::async_trait]
pub trait SearchIndexGateway: Send + Sync {
    /// Destination index/stream name for a `(project, launch)` pair.
    fn index_name(&self, key: IndexKey) -> String;

    /// Newest indexed log across all log indices.
    ///
    /// `Ok(None)` is reserved for a well-defined "no data" answer. Anything
    /// ambiguous (connectivity, timeouts, server errors) must be an `Err`.
    async fn latest_indexed_log(&self) -> Result<Option<IndexedLog>>;

    /// Oldest indexed log across all log indices. Same contract as
    /// [`SearchIndexGateway::latest_indexed_log`].
    async fn earliest_indexed_log(&self) -> Result<Option<IndexedLog>>;

    /// Create all `records` in the index of `key` with a single request and
    /// refresh it before returning.
    ///
    /// Re-submitting a record id that is already indexed is not an error.
    async fn bulk_create(&self, key: IndexKey, records: &[LogRecord]) -> Result<BulkOutcome>;

    /// Delete every indexed log with a timestamp at or after `since` and
    /// return the number of deleted documents.
    async fn delete_logs_since(&self, since: Timestamp) -> Result<u64>;

    /// Delete the whole index/stream of one launch.
    ///
    /// Returns `Ok(false)` when it did not exist.
    async fn delete_launch_index(&self, key: IndexKey) -> Result<bool>;
}
