//! One synchronization run: decide, fetch, group, load.
//!
//! # Run Overview
//!
//! 1. Read the newest `log_time` from the relational store. An empty store
//!    ends the run; a failed read aborts it before the index is touched.
//! 2. Probe the newest indexed log. Only a clean "no data" answer counts as
//!    an empty index; any other failure aborts.
//! 3. [`decide`] picks the action.
//! 4. `Full`/`Resume` fetch both passes, group them per launch and bulk
//!    create one request per launch, newest launch first. `Rollback` deletes
//!    the range and stops; the next run re-evaluates.
//!
//! Runs against the same source/index pair must not overlap: two runs
//! racing on the same high-water marks can both decide to load the same
//! range or roll back each other's work. Serializing runs is up to the
//! caller.

use crate::decision::{decide, UntimedMarkPolicy};
use crate::error::SyncError;
use crate::fetch::{bounded, fetch_logs};
use crate::grouping::{group_by_launch, LaunchBatch};
use crate::load::{load_batches, rollback, BatchReport};
use crate::traits::{BulkOutcome, LogRepository, SearchIndexGateway};
use crate::types::{DestinationMark, SyncAction, Timestamp};
use std::time::Duration;
use tracing::{info, warn};

/// Options of a synchronization run.
#[derive(Debug, Clone)]
pub struct SyncOpts {
    /// Upper bound for every single repository or gateway call.
    pub request_timeout: Duration,
    /// Maximum number of bulk create requests in flight.
    pub load_concurrency: usize,
    /// Decide, fetch and group, but leave the destination untouched.
    pub dry_run: bool,
    pub untimed_mark_policy: UntimedMarkPolicy,
}

impl Default for SyncOpts {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            load_concurrency: 1,
            dry_run: false,
            untimed_mark_policy: UntimedMarkPolicy::FullMigration,
        }
    }
}

/// Outcome of a run that reached its finished state.
#[derive(Debug)]
pub struct SyncReport {
    pub action: SyncAction,
    pub source_mark: Option<Timestamp>,
    /// `None` when the destination was never probed (empty source).
    pub destination_mark: Option<DestinationMark>,
    /// Batches written (or planned, in a dry run), newest launch first.
    pub indexed: Vec<BatchReport>,
    /// Documents removed by a rollback.
    pub deleted: Option<u64>,
    /// Contained failures: partial writes and failed deletions.
    pub failures: Vec<SyncError>,
    pub dry_run: bool,
}

impl SyncReport {
    fn new(action: SyncAction, source_mark: Option<Timestamp>, dry_run: bool) -> Self {
        Self {
            action,
            source_mark,
            destination_mark: None,
            indexed: Vec::new(),
            deleted: None,
            failures: Vec::new(),
            dry_run,
        }
    }

    /// Whether some batch or deletion failed.
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn indexed_records(&self) -> usize {
        self.indexed.iter().map(|batch| batch.records).sum()
    }
}

pub async fn run_sync<R: LogRepository, G: SearchIndexGateway>(
    repository: &R,
    gateway: &G,
    opts: &SyncOpts,
) -> Result<SyncReport, SyncError> {
    info!("Starting log synchronization");

    let source_mark = bounded(opts.request_timeout, repository.latest_log_time())
        .await
        .map_err(SyncError::SourceUnavailable)?;

    let Some(source_latest) = source_mark else {
        info!("Source holds no logs, nothing to migrate");
        return Ok(SyncReport::new(SyncAction::None, None, opts.dry_run));
    };
    info!("Last log in source: {source_latest}");

    let destination_mark: DestinationMark =
        bounded(opts.request_timeout, gateway.latest_indexed_log())
            .await
            .map_err(SyncError::DestinationProbeFailed)?
            .into();
    info!("Last log in search index: {destination_mark}");

    let action = decide(source_mark, destination_mark, opts.untimed_mark_policy)?;
    info!("Selected sync action: {action}");

    let mut report = SyncReport::new(action, source_mark, opts.dry_run);
    report.destination_mark = Some(destination_mark);

    match action {
        SyncAction::None => {
            info!("Search index has the same logs as the source");
        }
        SyncAction::Full | SyncAction::Resume { .. } => {
            let fetched =
                fetch_logs(repository, action.fetch_lower_bound(), opts.request_timeout).await?;
            let fetched_count = fetched.len();
            let batches = group_by_launch(fetched.with_launch, fetched.resolved)?;
            info!(
                "Grouped {fetched_count} logs into {} launch batches",
                batches.len()
            );

            if opts.dry_run {
                report.indexed = plan_batches(gateway, &batches);
            } else {
                let (indexed, failures) = load_batches(
                    gateway,
                    batches,
                    opts.load_concurrency,
                    opts.request_timeout,
                )
                .await;
                report.indexed = indexed;
                report.failures = failures;
            }
        }
        SyncAction::Rollback { after } => {
            if opts.dry_run {
                info!("Dry run: would drop indexed logs at or after {after}");
            } else {
                match rollback(gateway, after, opts.request_timeout).await {
                    Ok(deleted) => report.deleted = Some(deleted),
                    Err(e) => report.failures.push(e),
                }
            }
        }
    }

    if report.is_degraded() {
        warn!(
            "Log synchronization finished with {} failures ({} logs indexed)",
            report.failures.len(),
            report.indexed_records()
        );
    } else {
        info!(
            "Log synchronization finished ({} logs indexed)",
            report.indexed_records()
        );
    }

    Ok(report)
}

fn plan_batches<G: SearchIndexGateway>(gateway: &G, batches: &[LaunchBatch]) -> Vec<BatchReport> {
    batches
        .iter()
        .map(|batch| {
            let index = gateway.index_name(batch.key);
            info!(
                "Dry run: would index {} logs into {index}",
                batch.records.len()
            );
            BatchReport {
                key: batch.key,
                index,
                records: batch.records.len(),
                outcome: BulkOutcome::default(),
            }
        })
        .collect()
}

/// Both stores' bounds and the action a run would take right now.
#[derive(Debug)]
pub struct SyncStatus {
    pub source_latest: Option<Timestamp>,
    pub destination_earliest: DestinationMark,
    pub destination_latest: DestinationMark,
    pub planned_action: Result<SyncAction, SyncError>,
}

/// Read both stores' high-water marks without changing anything.
pub async fn inspect<R: LogRepository, G: SearchIndexGateway>(
    repository: &R,
    gateway: &G,
    opts: &SyncOpts,
) -> Result<SyncStatus, SyncError> {
    let source_latest = bounded(opts.request_timeout, repository.latest_log_time())
        .await
        .map_err(SyncError::SourceUnavailable)?;
    let destination_latest: DestinationMark =
        bounded(opts.request_timeout, gateway.latest_indexed_log())
            .await
            .map_err(SyncError::DestinationProbeFailed)?
            .into();
    let destination_earliest: DestinationMark =
        bounded(opts.request_timeout, gateway.earliest_indexed_log())
            .await
            .map_err(SyncError::DestinationProbeFailed)?
            .into();

    let planned_action = decide(source_latest, destination_latest, opts.untimed_mark_policy)
        .map_err(SyncError::from);

    Ok(SyncStatus {
        source_latest,
        destination_earliest,
        destination_latest,
        planned_action,
    })
}
