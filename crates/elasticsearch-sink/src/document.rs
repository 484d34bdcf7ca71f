//! Log documents and the NDJSON bulk payload.

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use log_sync_core::{IndexedLog, LogRecord, Timestamp};
use serde::Serialize;
use serde_json::Value;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Field holding the log time in every document.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

#[derive(Debug, Serialize)]
pub struct LogDocument<'a> {
    pub id: i64,
    pub message: &'a str,
    #[serde(rename = "itemId", skip_serializing_if = "Option::is_none")]
    pub item_id: Option<i64>,
    #[serde(rename = "launchId")]
    pub launch_id: i64,
    #[serde(rename = "projectId")]
    pub project_id: i64,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
}

impl<'a> From<&'a LogRecord> for LogDocument<'a> {
    fn from(record: &'a LogRecord) -> Self {
        Self {
            id: record.id,
            message: &record.message,
            item_id: record.item_id,
            launch_id: record.launch_id,
            project_id: record.project_id,
            timestamp: format_timestamp(record.log_time),
        }
    }
}

pub fn format_timestamp(ts: Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse `@timestamp` as found in a stored document.
///
/// Accepts naive ISO-8601 with or without fraction, ISO-8601 without
/// seconds, RFC 3339 with an offset (normalized to UTC) and epoch millis.
pub fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.naive_utc()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<Timestamp> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// Read back the fields the sync core cares about from a `_source` object.
pub fn indexed_log_from_source(source: &Value) -> IndexedLog {
    IndexedLog {
        id: source.get("id").and_then(Value::as_i64),
        item_id: source.get("itemId").and_then(Value::as_i64),
        log_time: source.get(TIMESTAMP_FIELD).and_then(parse_timestamp),
    }
}

/// NDJSON body creating every record under its log id.
///
/// Using the log id as `_id` turns a re-submitted record into a
/// version conflict instead of a duplicate document.
pub fn bulk_create_body(records: &[LogRecord]) -> Result<String> {
    let mut body = String::new();
    for record in records {
        let action = serde_json::json!({ "create": { "_id": record.id.to_string() } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&LogDocument::from(record))?);
        body.push('\n');
    }
    Ok(body)
}
