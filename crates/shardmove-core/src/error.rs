//! Error types for shardmove Core
//!
//! Two layers:
//! - [`MigrationError`] for a whole project migration
//! - [`JobError`] for operations on the job registry

use crate::job::{JobId, JobStatus};
use shardmove_copy::{CopyError, StoreError};
use shardmove_routing::RoutingError;

/// Main migration error type
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Shard assignment or cutover failed
    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    /// A project-scoped copy or pipeline discovery failed
    #[error("copy failed: {0}")]
    Copy(#[from] CopyError),

    /// A store could not be reached or resolved
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Job registry operation failed
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// The project already has a migration in flight
    #[error("project {project_id} is already migrating (job {job_id})")]
    MigrationInProgress {
        /// Project being migrated
        project_id: String,
        /// Job that holds the project
        job_id: JobId,
    },

    /// Pipeline tasks did not all finish before the deadline
    #[error("pipeline migration timed out after {timeout_secs}s")]
    TimedOut {
        /// Configured wait in seconds
        timeout_secs: u64,
    },

    /// The pending routing entry was gone or foreign at cutover
    #[error("cutover skipped: {0}")]
    CutoverSkipped(String),

    /// Cancelled through the trigger's token or the job registry
    #[error("migration cancelled")]
    Cancelled,

    /// The background job ended without producing a result
    #[error("migration job aborted: {0}")]
    Aborted(String),

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl MigrationError {
    /// Check if the error is raised before any data is copied
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Routing(e) => e.is_fatal(),
            Self::MigrationInProgress { .. } | Self::Config(_) => true,
            _ => false,
        }
    }

    /// Check if re-triggering the migration may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Copy(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            Self::TimedOut { .. } | Self::Routing(RoutingError::RoutingCommitFailed { .. }) => true,
            _ => false,
        }
    }

    /// Status a job ends in when its run fails with this error
    #[inline]
    #[must_use]
    pub fn terminal_status(&self) -> JobStatus {
        match self {
            Self::TimedOut { .. } => JobStatus::TimedOut,
            _ => JobStatus::Failed,
        }
    }
}

/// Job registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// No job with this id
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Transition not allowed by the job state machine
    #[error("job {job_id}: illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Job being updated
        job_id: JobId,
        /// Current status
        from: JobStatus,
        /// Requested status
        to: JobStatus,
    },
}
