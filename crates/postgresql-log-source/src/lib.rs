//! PostgreSQL log repository for log-index-sync
//!
//! Reads ReportPortal launch logs from the relational store of record. Only
//! `SELECT` statements are issued; the schema is owned elsewhere.

mod queries;

use anyhow::{Context, Result};
use log_sync_core::{LaunchId, LogRecord, LogRepository, Timestamp};
use std::time::Duration;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error};

/// PostgreSQL source connection options
#[derive(Clone, Debug)]
pub struct SourceOpts {
    /// PostgreSQL connection URI
    pub source_uri: String,
    /// Upper bound for establishing the connection
    pub connect_timeout: Duration,
}

pub struct PostgresLogRepository {
    client: Client,
}

impl PostgresLogRepository {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect and spawn the connection task.
    pub async fn connect(opts: &SourceOpts) -> Result<Self> {
        let (client, connection) = tokio::time::timeout(
            opts.connect_timeout,
            tokio_postgres::connect(&opts.source_uri, NoTls),
        )
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "Timed out connecting to PostgreSQL after {:?}",
                opts.connect_timeout
            )
        })?
        .context("Failed to connect to PostgreSQL")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {e}");
            }
        });

        Ok(Self::new(client))
    }
}

fn row_to_log(row: &Row) -> Result<LogRecord> {
    let id: i64 = row.try_get("id").context("Invalid log id")?;
    Ok(LogRecord {
        id,
        message: row
            .try_get("log_message")
            .with_context(|| format!("Invalid message of log {id}"))?,
        item_id: row
            .try_get("item_id")
            .with_context(|| format!("Invalid item_id of log {id}"))?,
        launch_id: row
            .try_get("launch_id")
            .with_context(|| format!("Log {id} has no resolvable launch"))?,
        project_id: row
            .try_get("project_id")
            .with_context(|| format!("Invalid project_id of log {id}"))?,
        log_time: row
            .try_get("log_time")
            .with_context(|| format!("Invalid log_time of log {id}"))?,
    })
}

#[async_trait::async_trait]
impl LogRepository for PostgresLogRepository {
    async fn latest_log_time(&self) -> Result<Option<Timestamp>> {
        let row = self
            .client
            .query_one(queries::SELECT_LAST_LOG_TIME, &[])
            .await
            .context("Failed to read last log time")?;
        row.try_get(0).context("Invalid last log time")
    }

    async fn logs_with_launch(&self, since: Option<Timestamp>) -> Result<Vec<LogRecord>> {
        let sql = queries::logs_with_launch(since.is_some());
        debug!("Querying logs with launch: {sql}");

        let rows = match since {
            Some(since) => self.client.query(&sql, &[&since]).await,
            None => self.client.query(&sql, &[]).await,
        }
        .context("Failed to query logs with launch")?;

        rows.iter().map(row_to_log).collect()
    }

    async fn logs_resolved_through_items(
        &self,
        since: Option<Timestamp>,
        candidates: &[LaunchId],
    ) -> Result<Vec<LogRecord>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let sql = queries::logs_resolved_through_items(since.is_some());
        debug!(
            "Querying item logs for {} candidate launches: {sql}",
            candidates.len()
        );

        let candidates = candidates.to_vec();
        let rows = match since {
            Some(since) => self.client.query(&sql, &[&candidates, &since]).await,
            None => self.client.query(&sql, &[&candidates]).await,
        }
        .context("Failed to query logs resolved through test items")?;

        rows.iter().map(row_to_log).collect()
    }
}
