//! Migration job record
//!
//! Defines the job surface of a project migration:
//! - Job identity (ULID, sortable by creation)
//! - The job status machine
//! - Live progress counters and their snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use ulid::Ulid;

/// Unique job identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Generate new job ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Shard chosen, pending rule written, job accepted
    Assigned,
    /// Copies in progress
    Running,
    /// Routing committed; source rows still await cleanup
    CompletedPendingCleanup,
    /// Routing committed and cleanup acknowledged
    Completed,
    /// Stopped on an error; no cutover
    Failed,
    /// Pipeline tasks missed the deadline; no cutover
    TimedOut,
}

impl JobStatus {
    /// Statuses reachable from `self`
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [JobStatus] {
        use JobStatus::*;
        match self {
            Assigned => &[Running, Failed],
            Running => &[CompletedPendingCleanup, Failed, TimedOut],
            CompletedPendingCleanup => &[Completed],
            Completed | Failed | TimedOut => &[],
        }
    }

    #[inline]
    #[must_use]
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// No further transition possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Holds the project: a new migration of it is refused
    #[inline]
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Assigned | Self::Running)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::CompletedPendingCleanup => "completed_pending_cleanup",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Pipelines counted when the run started
    pub pipelines_expected: usize,
    /// Pipelines handed to the pool
    pub pipelines_discovered: usize,
    /// Pipeline tasks that copied every domain
    pub pipelines_migrated: usize,
    /// Pipeline tasks that stopped on an error or cancellation
    pub pipelines_failed: usize,
    /// Project-scoped domains fully copied
    pub project_domains_copied: usize,
    /// Rows written to the target shard
    pub rows_copied: usize,
    /// Most pipeline tasks copying at once
    pub peak_in_flight: usize,
}

/// Live counters shared by the tasks of one run
#[derive(Debug, Default)]
pub struct ProgressTracker {
    pipelines_expected: AtomicUsize,
    pipelines_discovered: AtomicUsize,
    pipelines_migrated: AtomicUsize,
    pipelines_failed: AtomicUsize,
    project_domains_copied: AtomicUsize,
    rows_copied: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ProgressTracker {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_expected(&self, count: usize) {
        self.pipelines_expected.store(count, Ordering::Relaxed);
    }

    pub fn pipeline_discovered(&self) {
        self.pipelines_discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pipeline_migrated(&self) {
        self.pipelines_migrated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pipeline_failed(&self) {
        self.pipelines_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn project_domain_copied(&self) {
        self.project_domains_copied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rows_copied(&self, rows: usize) {
        self.rows_copied.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record the number of pipeline tasks currently copying
    pub fn observe_in_flight(&self, in_flight: usize) {
        self.peak_in_flight.fetch_max(in_flight, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> JobProgress {
        JobProgress {
            pipelines_expected: self.pipelines_expected.load(Ordering::Relaxed),
            pipelines_discovered: self.pipelines_discovered.load(Ordering::Relaxed),
            pipelines_migrated: self.pipelines_migrated.load(Ordering::Relaxed),
            pipelines_failed: self.pipelines_failed.load(Ordering::Relaxed),
            project_domains_copied: self.project_domains_copied.load(Ordering::Relaxed),
            rows_copied: self.rows_copied.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}

/// One entry of a job's status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: JobStatus,
    pub at: DateTime<Utc>,
}

/// Snapshot of a migration job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub id: JobId,
    /// Operator who triggered the migration
    pub user_id: String,
    pub project_id: String,
    /// Data source tag used for shard selection
    pub data_tag: Option<String>,
    pub status: JobStatus,
    /// Data source the project is moving to
    pub data_source_name: String,
    /// Pending rule value held in the routing cache
    pub pending_rule: String,
    pub history: Vec<StatusChange>,
    /// Reason of a failed or timed-out run
    pub error: Option<String>,
    pub progress: JobProgress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MigrationJob {
    /// New job in `Assigned`
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        data_tag: Option<String>,
        data_source_name: impl Into<String>,
        pending_rule: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            project_id: project_id.into(),
            data_tag,
            status: JobStatus::Assigned,
            data_source_name: data_source_name.into(),
            pending_rule: pending_rule.into(),
            history: vec![StatusChange {
                status: JobStatus::Assigned,
                at: now,
            }],
            error: None,
            progress: JobProgress::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Statuses visited, oldest first
    #[must_use]
    pub fn statuses(&self) -> Vec<JobStatus> {
        self.history.iter().map(|change| change.status).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_unique_and_sortable() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 26);
    }

    #[test]
    fn happy_path_is_allowed() {
        use JobStatus::*;
        let path = [Assigned, Running, CompletedPendingCleanup, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_statuses_have_no_exit() {
        use JobStatus::*;
        for status in [Completed, Failed, TimedOut] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(Running));
        }
        assert!(!CompletedPendingCleanup.is_terminal());
        assert!(!Assigned.can_transition_to(CompletedPendingCleanup));
        assert!(!Assigned.can_transition_to(TimedOut));
    }

    #[test]
    fn only_assigned_and_running_hold_the_project() {
        use JobStatus::*;
        assert!(Assigned.is_active());
        assert!(Running.is_active());
        assert!(!CompletedPendingCleanup.is_active());
        assert!(!Failed.is_active());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::CompletedPendingCleanup).unwrap();
        assert_eq!(json, "\"completed_pending_cleanup\"");
        assert_eq!(JobStatus::TimedOut.to_string(), "timed_out");
    }

    #[test]
    fn tracker_snapshot() {
        let tracker = ProgressTracker::new();
        tracker.set_expected(3);
        tracker.pipeline_discovered();
        tracker.pipeline_migrated();
        tracker.rows_copied(25);
        tracker.rows_copied(3);

        let progress = tracker.snapshot();
        assert_eq!(progress.pipelines_expected, 3);
        assert_eq!(progress.pipelines_discovered, 1);
        assert_eq!(progress.pipelines_migrated, 1);
        assert_eq!(progress.rows_copied, 28);
    }

    #[test]
    fn new_job_starts_assigned() {
        let job = MigrationJob::new("admin", "p1", None, "ds_0", "migratingDs_0");
        assert_eq!(job.status, JobStatus::Assigned);
        assert_eq!(job.statuses(), vec![JobStatus::Assigned]);
    }
}
