//! Migration coordinator
//!
//! Runs one project migration as a detached background job:
//! - Assigns the target shard synchronously and registers the job
//! - Counts pipelines, discovers them page by page into the bounded pool
//! - Copies the project-scoped domains in order
//! - Waits for every pipeline task, bounded by the configured timeout
//! - Cuts routing over only when all of the above succeeded

use crate::completion::CompletionLatch;
use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::job::{JobId, JobStatus, MigrationJob};
use crate::pipeline::{discover_pipelines, PipelineContext};
use crate::pipeline_pool::{PipelinePool, PipelineTask};
use crate::registry::{JobRegistry, RegisteredJob};
use futures::FutureExt;
use shardmove_copy::{copy_domain, Owner, SourceStore, TargetStore, PROJECT_DOMAINS};
use shardmove_routing::{
    CutoverOutcome, RoutingAssignment, RoutingAssignor, RoutingCutover, ShardResolver,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Acceptance acknowledgement of a migration trigger
#[derive(Debug)]
pub struct JobTicket {
    pub job_id: JobId,
    /// Background run; resolves to the final job snapshot
    pub handle: JoinHandle<Result<MigrationJob, MigrationError>>,
}

impl JobTicket {
    /// Wait for the background run to end
    ///
    /// # Errors
    /// `MigrationError::Aborted` if the run task was aborted, or a registry
    /// error while recording the final status.
    pub async fn wait(self) -> Result<MigrationJob, MigrationError> {
        self.handle
            .await
            .map_err(|e| MigrationError::Aborted(e.to_string()))?
    }
}

/// Orchestrates project migrations
///
/// Cheap to clone; clones share the job registry.
#[derive(Debug, Clone)]
pub struct MigrationCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: MigrationConfig,
    source: Arc<dyn SourceStore>,
    shards: Arc<dyn ShardResolver>,
    assignor: RoutingAssignor,
    cutover: RoutingCutover,
    jobs: Arc<JobRegistry>,
}

impl MigrationCoordinator {
    /// Create a coordinator over the legacy `source` and the shard `shards`
    #[must_use]
    pub fn new(
        config: MigrationConfig,
        source: Arc<dyn SourceStore>,
        shards: Arc<dyn ShardResolver>,
        assignor: RoutingAssignor,
        cutover: RoutingCutover,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                shards,
                assignor,
                cutover,
                jobs: Arc::new(JobRegistry::new()),
            }),
        }
    }

    /// Trigger the migration of `project_id`
    ///
    /// Returns once the shard is assigned and the job registered; the copy
    /// runs in the background. `cancel` stops the run at its next checkpoint.
    ///
    /// # Errors
    /// - `MigrationError::MigrationInProgress` if the project is already migrating
    /// - `MigrationError::Routing` when no shard is available or the pending
    ///   routing entry conflicts
    #[tracing::instrument(skip(self, cancel))]
    pub async fn migrate_project(
        &self,
        user_id: &str,
        project_id: &str,
        cancel: CancellationToken,
        data_tag: Option<&str>,
    ) -> Result<JobTicket, MigrationError> {
        if let Some(job_id) = self.inner.jobs.active_job(project_id) {
            return Err(MigrationError::MigrationInProgress {
                project_id: project_id.to_string(),
                job_id,
            });
        }

        let assignment = self.inner.assignor.assign(project_id, data_tag).await?;
        let job = MigrationJob::new(
            user_id,
            project_id,
            data_tag.map(str::to_string),
            &assignment.data_source_name,
            &assignment.pending_rule,
        );
        let registered = self.inner.jobs.register(job, cancel.child_token())?;
        let job_id = registered.id;

        tracing::info!(
            %job_id,
            data_source = %assignment.data_source_name,
            pending_rule = %assignment.pending_rule,
            "migration accepted"
        );

        let inner = Arc::clone(&self.inner);
        let user_id = user_id.to_string();
        let handle = tokio::spawn(async move { inner.run(registered, user_id, assignment).await });

        Ok(JobTicket { job_id, handle })
    }

    /// Job registry shared by every run of this coordinator
    #[inline]
    #[must_use]
    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.inner.jobs
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationCoordinator")
            .field("config", &self.config)
            .field("assignor", &self.assignor)
            .field("jobs", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Background body of one job; every failure ends here as a job status
    async fn run(
        &self,
        job: RegisteredJob,
        user_id: String,
        assignment: RoutingAssignment,
    ) -> Result<MigrationJob, MigrationError> {
        self.jobs.transition(job.id, JobStatus::Running, None)?;

        let result = AssertUnwindSafe(self.execute(&job, &user_id, &assignment))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(MigrationError::Aborted("migration task panicked".to_string())));

        let (status, error) = match result {
            Ok(()) => (JobStatus::CompletedPendingCleanup, None),
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    project_id = %assignment.project_id(),
                    error = %e,
                    "migration stopped without cutover"
                );
                (e.terminal_status(), Some(e.to_string()))
            }
        };

        Ok(self.jobs.transition(job.id, status, error)?)
    }

    async fn execute(
        &self,
        job: &RegisteredJob,
        user_id: &str,
        assignment: &RoutingAssignment,
    ) -> Result<(), MigrationError> {
        let project_id = assignment.project_id();
        let target = self.shards.resolve(&assignment.data_source_name)?;

        let expected = self.source.count_pipelines(project_id).await?;
        job.progress.set_expected(expected);
        let latch = Arc::new(CompletionLatch::new(expected));

        let ctx = Arc::new(PipelineContext {
            project_id: project_id.to_string(),
            source: Arc::clone(&self.source),
            target: Arc::clone(&target),
            cancel: job.cancel.clone(),
            progress: Arc::clone(&job.progress),
        });
        let mut pool = PipelinePool::start(expected.min(self.config.max_pipeline_workers), ctx);
        tracing::info!(%project_id, pipelines = expected, workers = pool.size(), "pipeline migration started");

        // every attempt creates one guard, accepted or not
        let mut attempts = 0usize;
        let discovery = discover_pipelines(
            self.source.as_ref(),
            project_id,
            self.config.pipeline_page_size,
            |pipeline| {
                attempts += 1;
                let submitted = pool.submit(PipelineTask::new(pipeline, latch.guard()));
                if submitted.is_ok() {
                    job.progress.pipeline_discovered();
                }
                submitted
            },
        )
        .await;
        pool.close();
        latch.seal(attempts);

        let mut failure = match discovery {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(%project_id, error = %e, "pipeline discovery failed");
                job.cancel.cancel();
                Some(MigrationError::from(e))
            }
        };

        if failure.is_none() {
            if let Err(e) = self.copy_project_domains(job, target.as_ref(), project_id).await {
                job.cancel.cancel();
                failure = Some(e);
            }
        }

        // the pending entry must outlive the wait; it was written before the copies
        if failure.is_none() {
            if let Err(e) = self.cutover.rearm(assignment).await {
                job.cancel.cancel();
                failure = Some(e.into());
            }
        }

        let timeout = self.config.migration_timeout();
        if !latch.wait_timeout(timeout).await {
            job.cancel.cancel();
            tracing::warn!(
                %project_id,
                remaining = latch.state().remaining(),
                timeout_secs = timeout.as_secs(),
                "pipeline tasks did not finish in time"
            );
            pool.detach();
            return Err(failure.unwrap_or(MigrationError::TimedOut {
                timeout_secs: timeout.as_secs(),
            }));
        }

        let stats = pool.stats();
        pool.join().await;
        tracing::info!(
            %project_id,
            succeeded = stats.succeeded,
            failed = stats.failed,
            cancelled = stats.cancelled,
            peak_in_flight = stats.peak_in_flight,
            "pipeline tasks finished"
        );

        if let Some(e) = failure {
            return Err(e);
        }
        if job.cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        match self.cutover.commit(user_id, assignment).await? {
            CutoverOutcome::Committed(rule) => {
                tracing::info!(%project_id, data_source = %rule.data_source_name, "migration cut over");
                Ok(())
            }
            CutoverOutcome::PendingEntryMissing => Err(MigrationError::CutoverSkipped(
                "pending routing entry missing".to_string(),
            )),
            CutoverOutcome::PendingEntryMismatch { found } => Err(MigrationError::CutoverSkipped(
                format!("pending routing entry holds {found}"),
            )),
        }
    }

    /// Copy the project-scoped domains one after another
    async fn copy_project_domains(
        &self,
        job: &RegisteredJob,
        target: &dyn TargetStore,
        project_id: &str,
    ) -> Result<(), MigrationError> {
        let owner = Owner::project(project_id);
        for domain in PROJECT_DOMAINS {
            if job.cancel.is_cancelled() {
                return Err(MigrationError::Cancelled);
            }
            let stats = copy_domain(self.source.as_ref(), target, domain, &owner)
                .await
                .map_err(|e| {
                    tracing::warn!(%project_id, domain = %domain.id, error = %e, "project domain copy failed");
                    e
                })?;
            job.progress.rows_copied(stats.rows);
            job.progress.project_domain_copied();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardmove_copy::{DomainId, MemorySourceStore, MemoryTargetStore};
    use shardmove_routing::{
        DataSource, InMemoryDataSourceCatalog, InMemoryRoutingRegistry, MokaRoutingCache,
        RoutingError, StaticShardResolver,
    };

    struct Fixture {
        source: Arc<MemorySourceStore>,
        shard: Arc<MemoryTargetStore>,
        registry: Arc<InMemoryRoutingRegistry>,
        coordinator: MigrationCoordinator,
    }

    fn fixture(shard_names: &[&str]) -> Fixture {
        let config = MigrationConfig::default();
        let source = Arc::new(MemorySourceStore::new());
        let shard = Arc::new(MemoryTargetStore::new());
        let shards = Arc::new(StaticShardResolver::new());
        let catalog = Arc::new(InMemoryDataSourceCatalog::new());
        for name in shard_names {
            shards.register(*name, shard.clone());
            catalog.register(DataSource::new("prod", "PROCESS", *name));
        }
        let cache = Arc::new(MokaRoutingCache::default());
        let registry = Arc::new(InMemoryRoutingRegistry::new());
        let assignor = config.assignor(catalog, cache.clone());
        let cutover = RoutingCutover::new(cache, registry.clone());
        let coordinator =
            MigrationCoordinator::new(config, source.clone(), shards, assignor, cutover);
        Fixture {
            source,
            shard,
            registry,
            coordinator,
        }
    }

    #[tokio::test]
    async fn empty_project_cuts_over() {
        let f = fixture(&["ds_0"]);

        let ticket = f
            .coordinator
            .migrate_project("admin", "p1", CancellationToken::new(), None)
            .await
            .unwrap();
        let job = ticket.wait().await.unwrap();

        assert_eq!(job.status, JobStatus::CompletedPendingCleanup);
        assert_eq!(job.progress.pipelines_expected, 0);
        let key = f.coordinator.config().scope().key_for("p1");
        assert_eq!(f.registry.rule(&key).unwrap().data_source_name, "ds_0");
    }

    #[tokio::test]
    async fn no_shard_fails_synchronously() {
        let f = fixture(&[]);

        let err = f
            .coordinator
            .migrate_project("admin", "p1", CancellationToken::new(), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::Routing(RoutingError::NoAvailableShard { .. })
        ));
        assert!(f.coordinator.jobs().is_empty());
    }

    #[tokio::test]
    async fn project_domain_failure_skips_cutover() {
        let f = fixture(&["ds_0"]);
        f.source
            .insert_rows(DomainId::AuditResource, &Owner::project("p1"), 4);
        f.source
            .insert_rows(DomainId::Template, &Owner::project("p1"), 3);
        f.source.fail_domain(DomainId::PipelineLabel);

        let job = f
            .coordinator
            .migrate_project("admin", "p1", CancellationToken::new(), None)
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("pipeline_label"));
        let key = f.coordinator.config().scope().key_for("p1");
        assert!(f.registry.rule(&key).is_none());
        // domains before the failing one stay copied, later ones never start
        assert_eq!(f.shard.row_count(DomainId::AuditResource), 4);
        assert_eq!(f.shard.row_count(DomainId::Template), 0);
        assert_eq!(job.progress.project_domains_copied, 3);
    }

    #[tokio::test]
    async fn cancelled_trigger_token_stops_the_run() {
        let f = fixture(&["ds_0"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let job = f
            .coordinator
            .migrate_project("admin", "p1", cancel, None)
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("migration cancelled"));
        assert_eq!(f.registry.update_count(), 0);
    }
}
