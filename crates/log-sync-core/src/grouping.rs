//! Grouping stage: partitions fetched logs into one batch per launch.

use crate::error::IntegrityFault;
use crate::types::{IndexKey, LaunchId, LogRecord};
use std::collections::HashMap;

/// All logs destined for one launch index, ascending by `log_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchBatch {
    pub key: IndexKey,
    pub records: Vec<LogRecord>,
}

/// Distinct launch ids of `records`, in encounter order.
///
/// These are the candidates the second fetch pass resolves item logs
/// against.
pub fn candidate_launches(records: &[LogRecord]) -> Vec<LaunchId> {
    let mut seen = std::collections::HashSet::new();
    records
        .iter()
        .map(|record| record.launch_id)
        .filter(|launch_id| seen.insert(*launch_id))
        .collect()
}

/// Build per-launch batches from the two fetch passes.
///
/// `with_launch` seeds one batch per launch. Every record of `resolved` must
/// land in a batch seeded by `with_launch`; a record naming any other launch,
/// or a project other than its batch's, is an integrity fault and nothing is
/// returned.
///
/// Batches come back in descending launch id order so the newest launches
/// are indexed first.
pub fn group_by_launch(
    with_launch: Vec<LogRecord>,
    resolved: Vec<LogRecord>,
) -> Result<Vec<LaunchBatch>, IntegrityFault> {
    let mut batches: Vec<LaunchBatch> = Vec::new();
    let mut slots: HashMap<LaunchId, usize> = HashMap::new();

    for record in with_launch {
        match slots.get(&record.launch_id) {
            Some(&slot) => push_checked(&mut batches[slot], record)?,
            None => {
                slots.insert(record.launch_id, batches.len());
                batches.push(LaunchBatch {
                    key: record.index_key(),
                    records: vec![record],
                });
            }
        }
    }

    for record in resolved {
        let slot = slots
            .get(&record.launch_id)
            .copied()
            .ok_or(IntegrityFault::UnknownLaunch {
                log_id: record.id,
                launch_id: record.launch_id,
            })?;
        push_checked(&mut batches[slot], record)?;
    }

    for batch in &mut batches {
        // stable: records sharing a log_time keep their fetch order
        batch.records.sort_by_key(|record| record.log_time);
    }

    batches.sort_by(|a, b| b.key.launch_id.cmp(&a.key.launch_id));

    Ok(batches)
}

fn push_checked(batch: &mut LaunchBatch, record: LogRecord) -> Result<(), IntegrityFault> {
    if record.project_id != batch.key.project_id {
        return Err(IntegrityFault::ProjectMismatch {
            log_id: record.id,
            launch_id: record.launch_id,
            expected: batch.key.project_id,
            found: record.project_id,
        });
    }
    batch.records.push(record);
    Ok(())
}
