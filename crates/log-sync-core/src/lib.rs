//! Incremental log synchronization core for log-index-sync
//!
//! Keeps a document-search index of launch logs eventually consistent with
//! the relational store of record, without re-sending what is already
//! indexed.
//!
//! # Architecture
//!
//! - [`decision`] compares the two stores' high-water marks and selects a
//!   [`SyncAction`]
//! - [`fetch`] reads logs in two passes (known launch, then launch resolved
//!   through test items and retries)
//! - [`grouping`] turns both passes into one ordered batch per launch
//! - [`load`] bulk creates each batch and performs rollback deletions
//! - [`sync`] ties the stages into a single run and reports its outcome
//!
//! The stores are reached through [`LogRepository`] and
//! [`SearchIndexGateway`]; the PostgreSQL and Elasticsearch implementations
//! live in their own crates.

pub mod decision;
pub mod error;
pub mod fetch;
pub mod grouping;
pub mod load;
pub mod sync;
pub mod traits;
pub mod types;

pub use decision::{decide, UntimedMarkPolicy};
pub use error::{IntegrityFault, SyncError};
pub use fetch::{fetch_logs, FetchedLogs};
pub use grouping::{candidate_launches, group_by_launch, LaunchBatch};
pub use load::{drop_launch_index, load_batches, rollback, BatchReport};
pub use sync::{inspect, run_sync, SyncOpts, SyncReport, SyncStatus};
pub use traits::{BulkOutcome, LogRepository, SearchIndexGateway};
pub use types::{
    DestinationMark, IndexKey, IndexedLog, LaunchId, LogRecord, ProjectId, SyncAction, Timestamp,
    DEFAULT_INDEX_PREFIX,
};
