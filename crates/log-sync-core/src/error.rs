//! Error taxonomy of a synchronization run.
//!
//! Only [`SyncError::SourceUnavailable`], [`SyncError::DestinationProbeFailed`]
//! and [`SyncError::IntegrityViolation`] abort a run. The remaining variants are
//! contained per batch and surface through [`crate::SyncReport`].

use crate::types::{IndexKey, LaunchId, ProjectId, Timestamp};
use thiserror::Error;

/// Data-integrity faults found while grouping or deciding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFault {
    #[error("log {log_id} resolved to launch {launch_id}, which is not in the primary batch")]
    UnknownLaunch { log_id: i64, launch_id: LaunchId },

    #[error("log {log_id} of launch {launch_id} belongs to project {found}, expected {expected}")]
    ProjectMismatch {
        log_id: i64,
        launch_id: LaunchId,
        expected: ProjectId,
        found: ProjectId,
    },

    #[error("newest indexed log has no usable timestamp")]
    UntimedDestinationMark,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("source unavailable: {0:#}")]
    SourceUnavailable(anyhow::Error),

    #[error("destination probe failed: {0:#}")]
    DestinationProbeFailed(anyhow::Error),

    #[error("integrity violation: {0}")]
    IntegrityViolation(IntegrityFault),

    #[error("bulk create of {records} logs into {index} ({key}) failed: {error:#}")]
    PartialWriteFailure {
        key: IndexKey,
        index: String,
        records: usize,
        error: anyhow::Error,
    },

    #[error("deleting logs at or after {after} failed: {error:#}")]
    RollbackFailure {
        after: Timestamp,
        error: anyhow::Error,
    },

    #[error("deleting index {index} failed: {error:#}")]
    IndexDeleteFailure { index: String, error: anyhow::Error },
}

impl SyncError {
    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::SourceUnavailable(_)
                | SyncError::DestinationProbeFailed(_)
                | SyncError::IntegrityViolation(_)
        )
    }
}

impl From<IntegrityFault> for SyncError {
    fn from(fault: IntegrityFault) -> Self {
        SyncError::IntegrityViolation(fault)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_fatal_classification() {
        let after = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        assert!(SyncError::SourceUnavailable(anyhow::anyhow!("down")).is_fatal());
        assert!(SyncError::DestinationProbeFailed(anyhow::anyhow!("refused")).is_fatal());
        assert!(SyncError::from(IntegrityFault::UntimedDestinationMark).is_fatal());

        assert!(!SyncError::PartialWriteFailure {
            key: IndexKey::new(1, 2),
            index: "logs-reportportal-1-2".to_string(),
            records: 3,
            error: anyhow::anyhow!("413"),
        }
        .is_fatal());
        assert!(!SyncError::RollbackFailure {
            after,
            error: anyhow::anyhow!("500"),
        }
        .is_fatal());
        assert!(!SyncError::IndexDeleteFailure {
            index: "logs-reportportal-1-2".to_string(),
            error: anyhow::anyhow!("500"),
        }
        .is_fatal());
    }

    #[test]
    fn test_integrity_message_names_log_and_launch() {
        let err = SyncError::from(IntegrityFault::UnknownLaunch {
            log_id: 42,
            launch_id: 7,
        });
        let message = err.to_string();
        assert!(message.contains("log 42"));
        assert!(message.contains("launch 7"));
    }
}
