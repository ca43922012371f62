//! Job registry
//!
//! Holds every migration job of this process, enforces the status machine,
//! and broadcasts each status change. At most one job per project is active
//! at a time.

use crate::error::{JobError, MigrationError};
use crate::job::{JobId, JobStatus, MigrationJob, ProgressTracker, StatusChange};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 256;

/// Status change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub project_id: String,
    pub status: JobStatus,
}

/// Live handles of a registered job
#[derive(Debug, Clone)]
pub struct RegisteredJob {
    pub id: JobId,
    /// Counters the run updates
    pub progress: Arc<ProgressTracker>,
    /// Cancels this run only
    pub cancel: CancellationToken,
}

#[derive(Debug)]
struct JobEntry {
    job: MigrationJob,
    progress: Arc<ProgressTracker>,
    cancel: CancellationToken,
}

impl JobEntry {
    fn snapshot(&self) -> MigrationJob {
        let mut job = self.job.clone();
        job.progress = self.progress.snapshot();
        job
    }
}

/// Concurrent job table with status events
#[derive(Debug)]
pub struct JobRegistry {
    jobs: DashMap<JobId, JobEntry>,
    active: DashMap<String, JobId>,
    events: broadcast::Sender<JobEvent>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            jobs: DashMap::new(),
            active: DashMap::new(),
            events,
        }
    }

    /// Register a freshly assigned job
    ///
    /// # Errors
    /// `MigrationError::MigrationInProgress` if the project already has an
    /// active job.
    pub fn register(
        &self,
        job: MigrationJob,
        cancel: CancellationToken,
    ) -> Result<RegisteredJob, MigrationError> {
        match self.active.entry(job.project_id.clone()) {
            Entry::Occupied(entry) => Err(MigrationError::MigrationInProgress {
                project_id: job.project_id,
                job_id: *entry.get(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(job.id);
                let registered = RegisteredJob {
                    id: job.id,
                    progress: Arc::new(ProgressTracker::new()),
                    cancel: cancel.clone(),
                };
                let event = JobEvent {
                    job_id: job.id,
                    project_id: job.project_id.clone(),
                    status: job.status,
                };
                self.jobs.insert(
                    job.id,
                    JobEntry {
                        job,
                        progress: Arc::clone(&registered.progress),
                        cancel,
                    },
                );
                let _ = self.events.send(event);
                Ok(registered)
            }
        }
    }

    /// Move a job to `to`, recording `error` when given
    ///
    /// # Errors
    /// - `JobError::NotFound` for an unknown id
    /// - `JobError::IllegalTransition` when the status machine forbids it
    pub fn transition(
        &self,
        job_id: JobId,
        to: JobStatus,
        error: Option<String>,
    ) -> Result<MigrationJob, JobError> {
        let snapshot = {
            let mut entry = self.jobs.get_mut(&job_id).ok_or(JobError::NotFound(job_id))?;
            let from = entry.job.status;
            if !from.can_transition_to(to) {
                return Err(JobError::IllegalTransition { job_id, from, to });
            }
            let now = Utc::now();
            entry.job.status = to;
            entry.job.updated_at = now;
            entry.job.history.push(StatusChange { status: to, at: now });
            if error.is_some() {
                entry.job.error = error;
            }
            entry.snapshot()
        };

        if !to.is_active() {
            self.active
                .remove_if(&snapshot.project_id, |_, active| *active == job_id);
            metrics::counter!("shardmove_jobs_total", "status" => to.as_str()).increment(1);
        }
        tracing::info!(%job_id, project_id = %snapshot.project_id, status = %to, "job status changed");

        let _ = self.events.send(JobEvent {
            job_id,
            project_id: snapshot.project_id.clone(),
            status: to,
        });
        Ok(snapshot)
    }

    /// Current snapshot of a job
    #[must_use]
    pub fn get(&self, job_id: JobId) -> Option<MigrationJob> {
        self.jobs.get(&job_id).map(|entry| entry.snapshot())
    }

    /// Snapshots of all jobs, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<MigrationJob> {
        let mut jobs: Vec<_> = self.jobs.iter().map(|entry| entry.snapshot()).collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    /// Active job of a project
    #[must_use]
    pub fn active_job(&self, project_id: &str) -> Option<JobId> {
        self.active.get(project_id).map(|id| *id)
    }

    /// Receive every following status change
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Request cancellation of a running job
    ///
    /// Returns `false` when the job already left the active statuses.
    ///
    /// # Errors
    /// `JobError::NotFound` for an unknown id.
    pub fn cancel(&self, job_id: JobId) -> Result<bool, JobError> {
        let entry = self.jobs.get(&job_id).ok_or(JobError::NotFound(job_id))?;
        if !entry.job.status.is_active() {
            return Ok(false);
        }
        tracing::info!(%job_id, project_id = %entry.job.project_id, "job cancellation requested");
        entry.cancel.cancel();
        Ok(true)
    }

    /// Acknowledge post-cutover cleanup of a job
    ///
    /// # Errors
    /// `JobError::IllegalTransition` unless the job is `CompletedPendingCleanup`.
    pub fn mark_cleaned_up(&self, job_id: JobId) -> Result<MigrationJob, JobError> {
        self.transition(job_id, JobStatus::Completed, None)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn job(project_id: &str) -> MigrationJob {
        MigrationJob::new("admin", project_id, None, "ds_0", "migratingDs_0")
    }

    #[test]
    fn register_and_get() {
        let registry = JobRegistry::new();
        let registered = registry.register(job("p1"), CancellationToken::new()).unwrap();

        let snapshot = registry.get(registered.id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Assigned);
        assert_eq!(registry.active_job("p1"), Some(registered.id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn second_active_job_for_project_rejected() {
        let registry = JobRegistry::new();
        let first = registry.register(job("p1"), CancellationToken::new()).unwrap();

        let err = registry.register(job("p1"), CancellationToken::new()).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MigrationInProgress { job_id, .. } if job_id == first.id
        ));
        assert!(registry.register(job("p2"), CancellationToken::new()).is_ok());
    }

    #[test]
    fn terminal_status_releases_project() {
        let registry = JobRegistry::new();
        let first = registry.register(job("p1"), CancellationToken::new()).unwrap();
        registry.transition(first.id, JobStatus::Running, None).unwrap();
        let failed = registry
            .transition(first.id, JobStatus::Failed, Some("boom".into()))
            .unwrap();

        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(
            failed.statuses(),
            vec![JobStatus::Assigned, JobStatus::Running, JobStatus::Failed]
        );
        assert_eq!(registry.active_job("p1"), None);
        assert!(registry.register(job("p1"), CancellationToken::new()).is_ok());
    }

    #[test]
    fn illegal_transition_rejected() {
        let registry = JobRegistry::new();
        let registered = registry.register(job("p1"), CancellationToken::new()).unwrap();

        let err = registry
            .transition(registered.id, JobStatus::Completed, None)
            .unwrap_err();
        assert_eq!(
            err,
            JobError::IllegalTransition {
                job_id: registered.id,
                from: JobStatus::Assigned,
                to: JobStatus::Completed,
            }
        );
        assert!(matches!(
            registry.mark_cleaned_up(registered.id),
            Err(JobError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn unknown_job() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        assert_eq!(registry.cancel(id), Err(JobError::NotFound(id)));
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn cleanup_completes_job() {
        let registry = JobRegistry::new();
        let registered = registry.register(job("p1"), CancellationToken::new()).unwrap();
        registry.transition(registered.id, JobStatus::Running, None).unwrap();
        registry
            .transition(registered.id, JobStatus::CompletedPendingCleanup, None)
            .unwrap();

        let done = registry.mark_cleaned_up(registered.id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[test]
    fn cancel_trips_token_only_while_active() {
        let registry = JobRegistry::new();
        let token = CancellationToken::new();
        let registered = registry.register(job("p1"), token.clone()).unwrap();

        assert!(registry.cancel(registered.id).unwrap());
        assert!(token.is_cancelled());

        registry.transition(registered.id, JobStatus::Failed, None).unwrap();
        assert!(!registry.cancel(registered.id).unwrap());
    }

    #[test]
    fn progress_is_live_in_snapshots() {
        let registry = JobRegistry::new();
        let registered = registry.register(job("p1"), CancellationToken::new()).unwrap();
        registered.progress.rows_copied(42);

        assert_eq!(registry.get(registered.id).unwrap().progress.rows_copied, 42);
    }

    #[tokio::test]
    async fn subscribers_see_status_changes() {
        let registry = JobRegistry::new();
        let mut events = registry.subscribe();

        let registered = registry.register(job("p1"), CancellationToken::new()).unwrap();
        registry.transition(registered.id, JobStatus::Running, None).unwrap();

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!(first.status, JobStatus::Assigned);
        assert_eq!(second.status, JobStatus::Running);
        assert_eq!(second.project_id, "p1");
    }

    #[test]
    fn list_is_ordered_by_creation() {
        let registry = JobRegistry::new();
        let a = registry.register(job("p1"), CancellationToken::new()).unwrap();
        let b = registry.register(job("p2"), CancellationToken::new()).unwrap();

        let ids: Vec<_> = registry.list().into_iter().map(|j| j.id).collect();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
    }
}
