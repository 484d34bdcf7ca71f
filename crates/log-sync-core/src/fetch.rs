//! Fetch stage: the two-pass read of logs from the relational store.
//!
//! Pass one reads logs whose launch is known directly. Its distinct launch
//! ids become the candidates for pass two, which resolves item logs (and
//! logs of retried items) to their launch.

use crate::error::SyncError;
use crate::grouping::candidate_launches;
use crate::traits::LogRepository;
use crate::types::{LogRecord, Timestamp};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Output of both fetch passes, kept apart until grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedLogs {
    pub with_launch: Vec<LogRecord>,
    pub resolved: Vec<LogRecord>,
}

impl FetchedLogs {
    pub fn len(&self) -> usize {
        self.with_launch.len() + self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub async fn fetch_logs<R: LogRepository>(
    repository: &R,
    since: Option<Timestamp>,
    request_timeout: Duration,
) -> Result<FetchedLogs, SyncError> {
    match since {
        Some(since) => info!("Fetching logs with log_time >= {since}"),
        None => info!("Fetching all logs"),
    }

    let with_launch = bounded(request_timeout, repository.logs_with_launch(since))
        .await
        .map_err(SyncError::SourceUnavailable)?;

    let candidates = candidate_launches(&with_launch);
    debug!(
        "Fetched {} logs with a known launch across {} launches",
        with_launch.len(),
        candidates.len()
    );

    let resolved = if candidates.is_empty() {
        Vec::new()
    } else {
        bounded(
            request_timeout,
            repository.logs_resolved_through_items(since, &candidates),
        )
        .await
        .map_err(SyncError::SourceUnavailable)?
    };
    debug!("Fetched {} logs resolved through test items", resolved.len());

    Ok(FetchedLogs {
        with_launch,
        resolved,
    })
}

/// Run a collaborator call under `limit`, turning expiry into an error.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("timed out after {limit:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: anyhow::Result<()> = bounded(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
