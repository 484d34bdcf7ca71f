//! In-memory stand-ins for the relational store and the search index.

#![allow(dead_code)]

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use log_sync_core::{
    BulkOutcome, IndexKey, IndexedLog, LaunchId, LogRecord, LogRepository, SearchIndexGateway,
    Timestamp, DEFAULT_INDEX_PREFIX,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub fn day(d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn log(id: i64, project_id: i64, launch_id: LaunchId, log_time: Timestamp) -> LogRecord {
    LogRecord {
        id,
        message: format!("message {id}"),
        item_id: None,
        launch_id,
        project_id,
        log_time,
    }
}

pub fn item_log(
    id: i64,
    project_id: i64,
    launch_id: LaunchId,
    item_id: i64,
    log_time: Timestamp,
) -> LogRecord {
    LogRecord {
        item_id: Some(item_id),
        ..log(id, project_id, launch_id, log_time)
    }
}

#[derive(Default)]
pub struct FakeRepository {
    /// Logs with a directly known launch.
    pub with_launch: Vec<LogRecord>,
    /// Item logs, already carrying the launch their lineage resolves to.
    pub via_items: Vec<LogRecord>,
    /// Return item logs regardless of the candidate filter.
    pub ignore_candidates: bool,
    pub fail: bool,
    pub latest_delay: Option<Duration>,
    pub with_launch_calls: Mutex<Vec<Option<Timestamp>>>,
    pub via_items_calls: Mutex<Vec<(Option<Timestamp>, Vec<LaunchId>)>>,
}

impl FakeRepository {
    pub fn new(with_launch: Vec<LogRecord>, via_items: Vec<LogRecord>) -> Self {
        Self {
            with_launch,
            via_items,
            ..Default::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.with_launch_calls.lock().unwrap().len() + self.via_items_calls.lock().unwrap().len()
    }
}

fn since_filter(records: &[LogRecord], since: Option<Timestamp>) -> Vec<LogRecord> {
    let mut selected: Vec<LogRecord> = records
        .iter()
        .filter(|r| since.map_or(true, |since| r.log_time >= since))
        .cloned()
        .collect();
    selected.sort_by_key(|r| r.log_time);
    selected
}

#[async_trait::async_trait]
impl LogRepository for FakeRepository {
    async fn latest_log_time(&self) -> Result<Option<Timestamp>> {
        if let Some(delay) = self.latest_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("connection refused");
        }
        Ok(self
            .with_launch
            .iter()
            .chain(self.via_items.iter())
            .map(|r| r.log_time)
            .max())
    }

    async fn logs_with_launch(&self, since: Option<Timestamp>) -> Result<Vec<LogRecord>> {
        self.with_launch_calls.lock().unwrap().push(since);
        Ok(since_filter(&self.with_launch, since))
    }

    async fn logs_resolved_through_items(
        &self,
        since: Option<Timestamp>,
        candidates: &[LaunchId],
    ) -> Result<Vec<LogRecord>> {
        self.via_items_calls
            .lock()
            .unwrap()
            .push((since, candidates.to_vec()));
        Ok(since_filter(&self.via_items, since)
            .into_iter()
            .filter(|r| self.ignore_candidates || candidates.contains(&r.launch_id))
            .collect())
    }
}

#[derive(Default)]
pub struct FakeGateway {
    /// Indexed documents keyed by (index, log id).
    pub docs: Mutex<BTreeMap<(String, i64), Option<Timestamp>>>,
    pub probe_error: bool,
    pub fail_indices: HashSet<String>,
    pub fail_delete: bool,
    pub bulk_calls: Mutex<Vec<(String, Vec<i64>)>>,
    pub delete_calls: Mutex<Vec<Timestamp>>,
}

impl FakeGateway {
    pub fn with_docs(docs: &[LogRecord]) -> Self {
        let gateway = Self::default();
        {
            let mut stored = gateway.docs.lock().unwrap();
            for record in docs {
                stored.insert(
                    (index_of(record.index_key()), record.id),
                    Some(record.log_time),
                );
            }
        }
        gateway
    }

    /// Add a legacy document that has no timestamp.
    pub fn insert_untimed(&self, index: &str, id: i64) {
        self.docs
            .lock()
            .unwrap()
            .insert((index.to_string(), id), None);
    }

    pub fn ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.docs.lock().unwrap().keys().map(|(_, id)| *id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn mutation_count(&self) -> usize {
        self.bulk_calls.lock().unwrap().len() + self.delete_calls.lock().unwrap().len()
    }

    fn edge(&self, newest: bool) -> Result<Option<IndexedLog>> {
        if self.probe_error {
            anyhow::bail!("error sending request: connection reset");
        }
        let docs = self.docs.lock().unwrap();
        // untimed documents sort last, like a missing sort value in a search
        let timed = docs.iter().filter_map(|((_, id), ts)| ts.map(|ts| (ts, *id)));
        let edge = if newest { timed.max() } else { timed.min() };
        Ok(match edge {
            Some((ts, id)) => Some(IndexedLog {
                id: Some(id),
                item_id: None,
                log_time: Some(ts),
            }),
            None if docs.is_empty() => None,
            None => Some(IndexedLog::default()),
        })
    }
}

pub fn index_of(key: IndexKey) -> String {
    key.index_name(DEFAULT_INDEX_PREFIX)
}

#[async_trait::async_trait]
impl SearchIndexGateway for FakeGateway {
    fn index_name(&self, key: IndexKey) -> String {
        index_of(key)
    }

    async fn latest_indexed_log(&self) -> Result<Option<IndexedLog>> {
        self.edge(true)
    }

    async fn earliest_indexed_log(&self) -> Result<Option<IndexedLog>> {
        self.edge(false)
    }

    async fn bulk_create(&self, key: IndexKey, records: &[LogRecord]) -> Result<BulkOutcome> {
        let index = index_of(key);
        self.bulk_calls
            .lock()
            .unwrap()
            .push((index.clone(), records.iter().map(|r| r.id).collect()));
        if self.fail_indices.contains(&index) {
            anyhow::bail!("HTTP 413 Payload Too Large");
        }
        let mut docs = self.docs.lock().unwrap();
        let mut outcome = BulkOutcome::default();
        for record in records {
            let slot = (index.clone(), record.id);
            if docs.contains_key(&slot) {
                outcome.already_present += 1;
            } else {
                docs.insert(slot, Some(record.log_time));
                outcome.created += 1;
            }
        }
        Ok(outcome)
    }

    async fn delete_logs_since(&self, since: Timestamp) -> Result<u64> {
        self.delete_calls.lock().unwrap().push(since);
        if self.fail_delete {
            anyhow::bail!("HTTP 503 Service Unavailable");
        }
        let mut docs = self.docs.lock().unwrap();
        let before = docs.len();
        docs.retain(|_, ts| ts.map_or(true, |ts| ts < since));
        Ok((before - docs.len()) as u64)
    }

    async fn delete_launch_index(&self, key: IndexKey) -> Result<bool> {
        let index = index_of(key);
        let mut docs = self.docs.lock().unwrap();
        let before = docs.len();
        docs.retain(|(name, _), _| *name != index);
        Ok(docs.len() != before)
    }
}
