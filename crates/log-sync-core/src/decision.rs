//! Sync decision engine.
//!
//! Compares the newest `log_time` in the relational store with the newest
//! `@timestamp` in the search index and picks exactly one [`SyncAction`].
//!
//! | source      | destination             | action                   |
//! |-------------|-------------------------|--------------------------|
//! | absent      | any                     | `None`                   |
//! | present     | absent                  | `Full`                   |
//! | present     | present, no timestamp   | `Full` (or integrity)    |
//! | `s`         | `d`, `s == d`           | `None`                   |
//! | `s`         | `d`, `s < d`            | `Rollback { after: s }`  |
//! | `s`         | `d`, `s > d`            | `Resume { since: d }`    |
//!
//! A destination ahead of its source means the source was truncated or
//! rebuilt; resuming forward would keep documents the source no longer has.

use crate::error::IntegrityFault;
use crate::types::{DestinationMark, SyncAction, Timestamp};
use std::cmp::Ordering;

/// What to do when the newest indexed document has no usable timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UntimedMarkPolicy {
    /// Treat the destination as never populated and migrate everything.
    #[default]
    FullMigration,
    /// Refuse to run until the destination is repaired.
    Reject,
}

pub fn decide(
    source: Option<Timestamp>,
    destination: DestinationMark,
    policy: UntimedMarkPolicy,
) -> Result<SyncAction, IntegrityFault> {
    let Some(source) = source else {
        return Ok(SyncAction::None);
    };

    let destination = match destination {
        DestinationMark::Absent => return Ok(SyncAction::Full),
        DestinationMark::Untimed => {
            return match policy {
                UntimedMarkPolicy::FullMigration => Ok(SyncAction::Full),
                UntimedMarkPolicy::Reject => Err(IntegrityFault::UntimedDestinationMark),
            }
        }
        DestinationMark::At(ts) => ts,
    };

    Ok(match source.cmp(&destination) {
        Ordering::Equal => SyncAction::None,
        Ordering::Less => SyncAction::Rollback { after: source },
        Ordering::Greater => SyncAction::Resume { since: destination },
    })
}
