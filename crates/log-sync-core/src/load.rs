//! Load stage: bulk creation per launch and range deletion on rollback.

use crate::error::SyncError;
use crate::fetch::bounded;
use crate::grouping::LaunchBatch;
use crate::traits::{BulkOutcome, SearchIndexGateway};
use crate::types::{IndexKey, Timestamp};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{info, warn};

/// A batch that reached the destination (or would have, in a dry run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub key: IndexKey,
    pub index: String,
    pub records: usize,
    pub outcome: BulkOutcome,
}

/// Submit every batch as one bulk create request.
///
/// Batches are submitted in the order given, at most `concurrency` at a
/// time. A failed batch is returned as a [`SyncError::PartialWriteFailure`]
/// and never stops the others.
pub async fn load_batches<G: SearchIndexGateway>(
    gateway: &G,
    batches: Vec<LaunchBatch>,
    concurrency: usize,
    request_timeout: Duration,
) -> (Vec<BatchReport>, Vec<SyncError>) {
    let results: Vec<Result<BatchReport, SyncError>> = stream::iter(batches)
        .map(|batch| load_batch(gateway, batch, request_timeout))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut loaded = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(report) => loaded.push(report),
            Err(e) => failures.push(e),
        }
    }
    (loaded, failures)
}

async fn load_batch<G: SearchIndexGateway>(
    gateway: &G,
    batch: LaunchBatch,
    request_timeout: Duration,
) -> Result<BatchReport, SyncError> {
    let index = gateway.index_name(batch.key);
    let records = batch.records.len();

    match bounded(request_timeout, gateway.bulk_create(batch.key, &batch.records)).await {
        Ok(outcome) => {
            info!(
                "Indexed {} logs into {} ({} already present)",
                outcome.created, index, outcome.already_present
            );
            Ok(BatchReport {
                key: batch.key,
                index,
                records,
                outcome,
            })
        }
        Err(error) => {
            let first = batch.records.first().map(|r| r.log_time);
            let last = batch.records.last().map(|r| r.log_time);
            warn!(
                "Bulk create of {records} logs into {index} ({}) failed for log_time {:?}..={:?}: {error:#}",
                batch.key, first, last
            );
            Err(SyncError::PartialWriteFailure {
                key: batch.key,
                index,
                records,
                error,
            })
        }
    }
}

/// Delete every indexed log at or after `after`.
pub async fn rollback<G: SearchIndexGateway>(
    gateway: &G,
    after: Timestamp,
    request_timeout: Duration,
) -> Result<u64, SyncError> {
    info!("Dropping indexed logs at or after {after}");
    match bounded(request_timeout, gateway.delete_logs_since(after)).await {
        Ok(deleted) => {
            info!("Deleted {deleted} indexed logs at or after {after}");
            Ok(deleted)
        }
        Err(error) => {
            warn!("Deleting indexed logs at or after {after} failed: {error:#}");
            Err(SyncError::RollbackFailure { after, error })
        }
    }
}

/// Delete the index/stream of a single launch.
///
/// Returns `Ok(false)` when the index did not exist.
pub async fn drop_launch_index<G: SearchIndexGateway>(
    gateway: &G,
    key: IndexKey,
    request_timeout: Duration,
) -> Result<bool, SyncError> {
    let index = gateway.index_name(key);
    match bounded(request_timeout, gateway.delete_launch_index(key)).await {
        Ok(true) => {
            info!("Deleted index {index}");
            Ok(true)
        }
        Ok(false) => {
            info!("Index {index} does not exist, nothing to delete");
            Ok(false)
        }
        Err(error) => {
            warn!("Deleting index {index} ({key}) failed: {error:#}");
            Err(SyncError::IndexDeleteFailure { index, error })
        }
    }
}
