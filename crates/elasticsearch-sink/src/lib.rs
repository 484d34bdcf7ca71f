//! Elasticsearch gateway for log-index-sync
//!
//! Talks to the Elasticsearch REST API over HTTP. Every launch gets its own
//! index (or data stream) named `<prefix>-<project>-<launch>`; probes and
//! range deletions address all of them through `<prefix>-*`.

mod document;
mod search;

pub use document::{bulk_create_body, format_timestamp, parse_timestamp, LogDocument};
pub use search::{
    delete_since_query, edge_log_from_response, edge_log_query, BulkResponse,
    DeleteByQueryResponse, SearchResponse, SortOrder,
};

use anyhow::{Context, Result};
use log_sync_core::{
    BulkOutcome, IndexKey, IndexedLog, LogRecord, SearchIndexGateway, Timestamp,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Elasticsearch connection options
#[derive(Clone, Debug)]
pub struct ElasticOpts {
    /// Base URL, e.g. `http://localhost:9200`
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Prefix of every log index/stream name
    pub index_prefix: String,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
}

pub struct ElasticsearchGateway {
    client: Client,
    host: String,
    username: Option<String>,
    password: Option<String>,
    index_prefix: String,
}

impl ElasticsearchGateway {
    pub fn new(opts: &ElasticOpts) -> Result<Self> {
        let client = Client::builder()
            .timeout(opts.request_timeout)
            .build()
            .context("Failed to build Elasticsearch HTTP client")?;

        Ok(Self {
            client,
            host: opts.host.trim_end_matches('/').to_string(),
            username: opts.username.clone(),
            password: opts.password.clone(),
            index_prefix: opts.index_prefix.clone(),
        })
    }

    /// Wildcard addressing every log index of this deployment.
    pub fn logs_pattern(&self) -> String {
        format!("{}-*", self.index_prefix)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.host, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("{method} {url}");
        let builder = self.client.request(method, url);
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_ref()),
            None => builder,
        }
    }

    async fn edge_log(&self, order: SortOrder) -> Result<Option<IndexedLog>> {
        let path = format!(
            "{}/_search?ignore_unavailable=true&allow_no_indices=true",
            self.logs_pattern()
        );
        let body = edge_log_query(order);
        debug!("Search body: {body}");

        let response = self
            .request(Method::POST, &path)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to search {}", self.logs_pattern()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .context("Failed to read search response")?;
        edge_log_from_response(status, &text)
            .with_context(|| format!("Failed to probe {}", self.logs_pattern()))
    }
}

async fn expect_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("Elasticsearch {operation} returned status {status}: {body}")
}

#[async_trait::async_trait]
impl SearchIndexGateway for ElasticsearchGateway {
    fn index_name(&self, key: IndexKey) -> String {
        key.index_name(&self.index_prefix)
    }

    async fn latest_indexed_log(&self) -> Result<Option<IndexedLog>> {
        self.edge_log(SortOrder::Desc).await
    }

    async fn earliest_indexed_log(&self) -> Result<Option<IndexedLog>> {
        self.edge_log(SortOrder::Asc).await
    }

    async fn bulk_create(&self, key: IndexKey, records: &[LogRecord]) -> Result<BulkOutcome> {
        if records.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let index = self.index_name(key);
        let body = bulk_create_body(records)?;

        let response = self
            .request(Method::PUT, &format!("{index}/_bulk?refresh"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to send bulk request to {index}"))?;

        let response: BulkResponse = expect_success(response, "bulk")
            .await?
            .json()
            .await
            .context("Failed to decode bulk response")?;
        response.outcome()
    }

    async fn delete_logs_since(&self, since: Timestamp) -> Result<u64> {
        let path = format!(
            "{}/_delete_by_query?conflicts=proceed&refresh=true&ignore_unavailable=true&allow_no_indices=true",
            self.logs_pattern()
        );
        let body = delete_since_query(since);
        debug!("Delete by query body: {body}");

        let response = self
            .request(Method::POST, &path)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to delete logs from {}", self.logs_pattern()))?;

        let response: DeleteByQueryResponse = expect_success(response, "delete by query")
            .await?
            .json()
            .await
            .context("Failed to decode delete by query response")?;
        response.deleted()
    }

    async fn delete_launch_index(&self, key: IndexKey) -> Result<bool> {
        let index = self.index_name(key);
        let response = self
            .request(Method::DELETE, &format!("_data_stream/{index}"))
            .send()
            .await
            .with_context(|| format!("Failed to delete data stream {index}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        expect_success(response, "delete data stream").await?;
        Ok(true)
    }
}
