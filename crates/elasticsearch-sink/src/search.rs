//! Request bodies and response shapes of the Elasticsearch REST API.

use crate::document::{format_timestamp, indexed_log_from_source, TIMESTAMP_FIELD};
use anyhow::{Context, Result};
use log_sync_core::{BulkOutcome, IndexedLog, Timestamp};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Single-hit search for the oldest or newest log.
///
/// `unmapped_type` keeps indices without any timestamp mapping from failing
/// the whole search.
pub fn edge_log_query(order: SortOrder) -> Value {
    json!({
        "query": { "match_all": {} },
        "size": 1,
        "sort": [
            { TIMESTAMP_FIELD: { "order": order.as_str(), "unmapped_type": "date" } }
        ]
    })
}

/// Delete-by-query body matching every log at or after `since`.
///
/// `@timestamp` is a millisecond `date`, so the bound is effectively
/// truncated to the millisecond: logs earlier than `since` within the same
/// millisecond are deleted as well. The next resumed run re-creates them.
pub fn delete_since_query(since: Timestamp) -> Value {
    json!({
        "query": {
            "range": { TIMESTAMP_FIELD: { "gte": format_timestamp(since) } }
        }
    })
}

const INDEX_NOT_FOUND: &str = "index_not_found_exception";

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub timed_out: bool,
    #[serde(rename = "_shards", default)]
    pub shards: Option<ShardStats>,
    #[serde(default)]
    pub hits: Option<Hits>,
}

#[derive(Debug, Deserialize)]
pub struct ShardStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub failed: u64,
}

#[derive(Debug, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_source", default)]
    pub source: Option<Value>,
}

impl SearchResponse {
    /// The first hit, or `None` when a complete search matched nothing.
    ///
    /// A timed out search or one with failed shards is an error: the missing
    /// shards may hold the newest logs.
    pub fn first_log(&self) -> Result<Option<IndexedLog>> {
        if self.timed_out {
            anyhow::bail!("search timed out and returned a partial result");
        }
        if let Some(shards) = &self.shards {
            if shards.failed > 0 {
                anyhow::bail!(
                    "search failed on {} of {} shards",
                    shards.failed,
                    shards.total
                );
            }
        }

        let Some(hit) = self.hits.as_ref().and_then(|hits| hits.hits.first()) else {
            return Ok(None);
        };
        Ok(Some(
            hit.source
                .as_ref()
                .map(indexed_log_from_source)
                .unwrap_or_default(),
        ))
    }
}

/// Read the newest/oldest log out of a raw search answer.
///
/// Only an empty result or a 404 whose body is an `index_not_found_exception`
/// means the index holds no logs. Any other 404 (a proxy, a wrong base path)
/// and every other non-2xx status is an error.
pub fn edge_log_from_response(status: u16, body: &str) -> Result<Option<IndexedLog>> {
    if status == 404 && is_index_not_found(body) {
        return Ok(None);
    }
    if !(200..300).contains(&status) {
        anyhow::bail!("Elasticsearch search returned status {status}: {body}");
    }
    let response: SearchResponse =
        serde_json::from_str(body).context("Failed to decode search response")?;
    response.first_log()
}

fn is_index_not_found(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")?
                .get("type")?
                .as_str()
                .map(|kind| kind == INDEX_NOT_FOUND)
        })
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
pub struct BulkItem {
    pub status: u16,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkResponse {
    /// Count created and already-present documents, failing on any other
    /// per-item error.
    pub fn outcome(&self) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        let mut rejected = Vec::new();

        for item in self.items.iter().flat_map(|entry| entry.values()) {
            match item.status {
                200 | 201 => outcome.created += 1,
                409 => outcome.already_present += 1,
                status => rejected.push((status, item.error.as_ref())),
            }
        }

        if let Some((status, error)) = rejected.first() {
            let reason = error
                .and_then(|e| e.get("reason").or_else(|| e.get("type")))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!(
                "{} of {} documents rejected (first: status {status}, {reason})",
                rejected.len(),
                self.items.len()
            );
        }
        Ok(outcome)
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteByQueryResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub failures: Vec<Value>,
}

impl DeleteByQueryResponse {
    pub fn deleted(&self) -> Result<u64> {
        if self.timed_out {
            anyhow::bail!(
                "delete by query timed out after {}ms ({} of {} deleted)",
                self.took,
                self.deleted,
                self.total
            );
        }
        if !self.failures.is_empty() {
            anyhow::bail!(
                "delete by query reported {} failures ({} of {} deleted)",
                self.failures.len(),
                self.deleted,
                self.total
            );
        }
        Ok(self.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_edge_query_sorts_on_timestamp() {
        assert_eq!(
            edge_log_query(SortOrder::Desc),
            json!({
                "query": { "match_all": {} },
                "size": 1,
                "sort": [{ "@timestamp": { "order": "desc", "unmapped_type": "date" } }]
            })
        );
        assert_eq!(
            edge_log_query(SortOrder::Asc)["sort"][0]["@timestamp"]["order"],
            "asc"
        );
    }

    #[test]
    fn test_delete_query_is_inclusive_range() {
        let since = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            delete_since_query(since),
            json!({ "query": { "range": { "@timestamp": { "gte": "2024-01-05T00:00:00" } } } })
        );
    }

    #[test]
    fn test_delete_query_sends_full_precision_bound() {
        let since = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_micro_opt(10, 0, 0, 123_456)
            .unwrap();
        assert_eq!(
            delete_since_query(since)["query"]["range"]["@timestamp"]["gte"],
            "2024-01-05T10:00:00.123456"
        );
    }

    #[test]
    fn test_search_without_hits_is_absent() {
        let response: SearchResponse =
            serde_json::from_value(json!({ "hits": { "total": { "value": 0 }, "hits": [] } }))
                .unwrap();
        assert_eq!(response.first_log().unwrap(), None);

        let response: SearchResponse = serde_json::from_value(json!({ "took": 1 })).unwrap();
        assert_eq!(response.first_log().unwrap(), None);
    }

    #[test]
    fn test_partial_search_is_an_error() {
        let response: SearchResponse = serde_json::from_value(json!({
            "timed_out": false,
            "_shards": { "total": 3, "successful": 1, "skipped": 0, "failed": 2 },
            "hits": { "hits": [] }
        }))
        .unwrap();
        let err = response.first_log().unwrap_err().to_string();
        assert!(err.contains("2 of 3 shards"));

        let response: SearchResponse = serde_json::from_value(json!({
            "timed_out": true,
            "_shards": { "total": 3, "successful": 3, "failed": 0 },
            "hits": { "hits": [] }
        }))
        .unwrap();
        assert!(response.first_log().unwrap_err().to_string().contains("timed out"));
    }

    #[test]
    fn test_index_not_found_is_absent() {
        let body = json!({
            "error": {
                "root_cause": [{ "type": "index_not_found_exception", "reason": "no such index [logs-reportportal-*]" }],
                "type": "index_not_found_exception",
                "reason": "no such index [logs-reportportal-*]"
            },
            "status": 404
        })
        .to_string();
        assert_eq!(edge_log_from_response(404, &body).unwrap(), None);
    }

    #[test]
    fn test_other_404_is_an_error() {
        let html = "<html><head><title>404 Not Found</title></head><body><center><h1>404 Not Found</h1></center><hr><center>nginx</center></body></html>";
        let err = edge_log_from_response(404, html).unwrap_err().to_string();
        assert!(err.contains("status 404"));

        let body = json!({ "error": { "type": "resource_not_found_exception" }, "status": 404 });
        assert!(edge_log_from_response(404, &body.to_string()).is_err());
        assert!(edge_log_from_response(404, "").is_err());
    }

    #[test]
    fn test_server_error_is_an_error() {
        let body = json!({ "error": { "type": "search_phase_execution_exception" }, "status": 503 });
        let err = edge_log_from_response(503, &body.to_string())
            .unwrap_err()
            .to_string();
        assert!(err.contains("status 503"));
    }

    #[test]
    fn test_clean_empty_search_is_absent() {
        let body = json!({
            "timed_out": false,
            "_shards": { "total": 0, "successful": 0, "skipped": 0, "failed": 0 },
            "hits": { "total": { "value": 0, "relation": "eq" }, "hits": [] }
        });
        assert_eq!(edge_log_from_response(200, &body.to_string()).unwrap(), None);
        assert!(edge_log_from_response(200, "not json").is_err());
    }

    #[test]
    fn test_search_hit_is_read() {
        let response: SearchResponse = serde_json::from_value(json!({
            "hits": { "hits": [
                { "_index": ".ds-logs-reportportal-1-2", "_source": {
                    "id": 9, "message": "m", "@timestamp": "2024-01-09T00:00:00"
                } }
            ] }
        }))
        .unwrap();

        let log = response.first_log().unwrap().unwrap();
        assert_eq!(log.id, Some(9));
        assert_eq!(
            log.log_time,
            NaiveDate::from_ymd_opt(2024, 1, 9).unwrap().and_hms_opt(0, 0, 0)
        );
    }

    #[test]
    fn test_hit_without_source_is_untimed() {
        let response: SearchResponse =
            serde_json::from_value(json!({ "hits": { "hits": [ { "_id": "x" } ] } })).unwrap();
        assert_eq!(response.first_log().unwrap(), Some(IndexedLog::default()));
    }

    #[test]
    fn test_bulk_outcome_counts_conflicts_as_present() {
        let response: BulkResponse = serde_json::from_value(json!({
            "took": 3,
            "errors": true,
            "items": [
                { "create": { "_id": "1", "status": 201 } },
                { "create": { "_id": "2", "status": 409, "error": {
                    "type": "version_conflict_engine_exception",
                    "reason": "[2]: version conflict, document already exists"
                } } },
                { "create": { "_id": "3", "status": 201 } }
            ]
        }))
        .unwrap();

        assert_eq!(
            response.outcome().unwrap(),
            BulkOutcome {
                created: 2,
                already_present: 1
            }
        );
    }

    #[test]
    fn test_bulk_outcome_fails_on_rejected_document() {
        let response: BulkResponse = serde_json::from_value(json!({
            "errors": true,
            "items": [
                { "create": { "_id": "1", "status": 201 } },
                { "create": { "_id": "2", "status": 400, "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [@timestamp]"
                } } }
            ]
        }))
        .unwrap();

        let err = response.outcome().unwrap_err().to_string();
        assert!(err.contains("1 of 2 documents rejected"));
        assert!(err.contains("failed to parse field [@timestamp]"));
    }

    #[test]
    fn test_delete_response() {
        let response: DeleteByQueryResponse = serde_json::from_value(json!({
            "took": 147, "timed_out": false, "total": 2, "deleted": 2, "failures": []
        }))
        .unwrap();
        assert_eq!(response.deleted().unwrap(), 2);

        let response: DeleteByQueryResponse = serde_json::from_value(json!({
            "took": 60000, "timed_out": true, "total": 10, "deleted": 4
        }))
        .unwrap();
        assert!(response.deleted().unwrap_err().to_string().contains("timed out"));
    }
}
