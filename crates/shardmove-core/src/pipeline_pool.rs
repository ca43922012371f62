//! Bounded pool for pipeline tasks
//!
//! Provides the concurrency bound of a run:
//! - A task queue drained by a fixed set of workers
//! - A counting semaphore every task holds while it copies
//! - Outcome counters and the peak number of tasks in flight
//!
//! Each queued task carries a [`CompletionGuard`], so the run's latch counts
//! it down once whether it succeeds, fails, is cancelled or is dropped with
//! the pool.

use crate::completion::CompletionGuard;
use crate::pipeline::{migrate_pipeline, PipelineContext};
use serde::Serialize;
use shardmove_copy::{CopyError, PipelineRef};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;

/// Queued unit of work
#[derive(Debug)]
pub struct PipelineTask {
    pub pipeline: PipelineRef,
    guard: CompletionGuard,
}

impl PipelineTask {
    #[must_use]
    pub fn new(pipeline: PipelineRef, guard: CompletionGuard) -> Self {
        Self { pipeline, guard }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Worker tasks (and semaphore permits)
    pub workers: usize,
    /// Tasks accepted by `submit`
    pub submitted: usize,
    /// Tasks that copied every domain
    pub succeeded: usize,
    /// Tasks stopped by a copy error
    pub failed: usize,
    /// Tasks stopped at a cancellation checkpoint
    pub cancelled: usize,
    /// Most tasks holding a permit at once
    pub peak_in_flight: usize,
}

#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl PoolCounters {
    fn enter(&self) -> usize {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        now
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed-size worker pool for the pipeline tasks of one run
#[derive(Debug)]
pub struct PipelinePool {
    size: usize,
    sender: Option<mpsc::UnboundedSender<PipelineTask>>,
    workers: Vec<JoinHandle<()>>,
    permits: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
}

impl PipelinePool {
    /// Spawn `size` workers (at least one) bound to `ctx`
    #[must_use]
    pub fn start(size: usize, ctx: Arc<PipelineContext>) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Arc::new(Mutex::new(receiver));
        let permits = Arc::new(Semaphore::new(size));
        let counters = Arc::new(PoolCounters::default());

        let workers = (0..size)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&queue),
                    Arc::clone(&permits),
                    Arc::clone(&counters),
                    Arc::clone(&ctx),
                ))
            })
            .collect();

        tracing::debug!(project_id = %ctx.project_id, workers = size, "pipeline pool started");

        Self {
            size,
            sender: Some(sender),
            workers,
            permits,
            counters,
        }
    }

    /// Queue a task
    ///
    /// # Errors
    /// `CopyError::SinkClosed` once the pool is closed or its workers are gone.
    pub fn submit(&self, task: PipelineTask) -> Result<(), CopyError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| CopyError::SinkClosed("pipeline pool closed".to_string()))?;
        sender
            .send(task)
            .map_err(|_| CopyError::SinkClosed("pipeline workers stopped".to_string()))?;
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Stop accepting tasks; queued tasks still run
    pub fn close(&mut self) {
        self.sender.take();
    }

    /// Close and wait for every queued task to finish
    pub async fn join(mut self) {
        self.close();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "pipeline worker ended abnormally");
            }
        }
    }

    /// Stop accepting tasks and let the workers run on unobserved
    ///
    /// A task in the middle of a batch write finishes it; tasks still queued
    /// run against the context's cancellation token.
    pub fn detach(mut self) {
        self.close();
        let workers = self.workers.len();
        self.workers.clear();
        tracing::debug!(workers, "pipeline pool detached");
    }

    /// Stop all workers now; unfinished tasks are dropped
    ///
    /// Drops any in-flight `write_rows` future, so only use this with stores
    /// whose writes are cancel-safe.
    pub fn abort(mut self) {
        self.close();
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held
    #[inline]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Get pool statistics
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.size,
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            succeeded: self.counters.succeeded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            cancelled: self.counters.cancelled.load(Ordering::SeqCst),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Worker task (runs in separate tokio task)
async fn worker_loop(
    worker: usize,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<PipelineTask>>>,
    permits: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
    ctx: Arc<PipelineContext>,
) {
    loop {
        let task = queue.lock().await.recv().await;
        let Some(task) = task else { break };

        let Ok(permit) = permits.acquire().await else {
            break;
        };
        ctx.progress.observe_in_flight(counters.enter());
        let outcome = migrate_pipeline(&ctx, &task.pipeline).await;
        counters.leave();
        drop(permit);

        let label = match &outcome {
            Ok(_) => {
                counters.succeeded.fetch_add(1, Ordering::SeqCst);
                ctx.progress.pipeline_migrated();
                "success"
            }
            Err(CopyError::Cancelled) => {
                counters.cancelled.fetch_add(1, Ordering::SeqCst);
                ctx.progress.pipeline_failed();
                tracing::debug!(worker, pipeline_id = %task.pipeline.pipeline_id, "pipeline task cancelled");
                "cancelled"
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                ctx.progress.pipeline_failed();
                tracing::warn!(
                    worker,
                    project_id = %ctx.project_id,
                    pipeline_id = %task.pipeline.pipeline_id,
                    error = %e,
                    "pipeline migration failed"
                );
                "failure"
            }
        };
        metrics::counter!("shardmove_pipeline_tasks_total", "outcome" => label).increment(1);

        drop(task.guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionLatch;
    use crate::job::ProgressTracker;
    use shardmove_copy::{DomainId, MemorySourceStore, MemoryTargetStore, Owner};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct World {
        source: Arc<MemorySourceStore>,
        target: Arc<MemoryTargetStore>,
        ctx: Arc<PipelineContext>,
    }

    fn world() -> World {
        let source = Arc::new(MemorySourceStore::new());
        let target = Arc::new(MemoryTargetStore::new());
        let ctx = Arc::new(PipelineContext {
            project_id: "p1".to_string(),
            source: source.clone(),
            target: target.clone(),
            cancel: CancellationToken::new(),
            progress: Arc::new(ProgressTracker::new()),
        });
        World { source, target, ctx }
    }

    fn submit_all(pool: &PipelinePool, world: &World, latch: &Arc<CompletionLatch>, n: usize) {
        for i in 0..n {
            let pipeline = world.source.insert_pipeline("p1", &format!("pipe-{i}"));
            world
                .source
                .insert_rows(DomainId::PipelineInfo, &Owner::pipeline("p1", &pipeline.pipeline_id), 2);
            pool.submit(PipelineTask::new(pipeline, latch.guard())).unwrap();
        }
        latch.seal(n);
    }

    #[tokio::test]
    async fn runs_every_task_once() {
        let world = world();
        let latch = Arc::new(CompletionLatch::new(5));
        let pool = PipelinePool::start(3, world.ctx.clone());

        submit_all(&pool, &world, &latch, 5);
        latch.wait().await;

        let stats = pool.stats();
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.succeeded, 5);
        assert_eq!(world.target.row_count(DomainId::PipelineInfo), 10);
        assert_eq!(world.ctx.progress.snapshot().pipelines_migrated, 5);
        pool.join().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_never_exceeds_pool_size() {
        let world = world();
        world.source.set_fetch_delay(Duration::from_millis(2));
        let latch = Arc::new(CompletionLatch::new(25));
        let pool = PipelinePool::start(10, world.ctx.clone());

        submit_all(&pool, &world, &latch, 25);
        latch.wait().await;

        let stats = pool.stats();
        assert_eq!(stats.succeeded, 25);
        assert!(stats.peak_in_flight <= 10, "{stats:?}");
        assert!(stats.peak_in_flight > 1, "{stats:?}");
        assert_eq!(pool.available_permits(), 10);
        pool.join().await;
    }

    #[tokio::test]
    async fn failures_still_count_down() {
        let world = world();
        let latch = Arc::new(CompletionLatch::new(3));
        let pool = PipelinePool::start(2, world.ctx.clone());
        world.source.fail_pipeline("pipe-1");

        submit_all(&pool, &world, &latch, 3);
        latch.wait().await;

        let stats = pool.stats();
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(world.ctx.progress.snapshot().pipelines_failed, 1);
        pool.join().await;
    }

    #[tokio::test]
    async fn cancelled_run_skips_copies() {
        let world = world();
        world.ctx.cancel.cancel();
        let latch = Arc::new(CompletionLatch::new(4));
        let pool = PipelinePool::start(2, world.ctx.clone());

        submit_all(&pool, &world, &latch, 4);
        latch.wait().await;

        assert_eq!(pool.stats().cancelled, 4);
        assert_eq!(world.target.total_rows(), 0);
        pool.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn abort_releases_stalled_tasks() {
        let world = world();
        world.source.stall_pipeline("pipe-0");
        let latch = Arc::new(CompletionLatch::new(1));
        let pool = PipelinePool::start(1, world.ctx.clone());

        submit_all(&pool, &world, &latch, 1);
        assert!(!latch.wait_timeout(Duration::from_secs(60)).await);

        pool.abort();
        assert!(latch.wait_timeout(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn detached_workers_finish_their_copy() {
        let world = world();
        world.source.set_fetch_delay(Duration::from_secs(5));
        let latch = Arc::new(CompletionLatch::new(1));
        let pool = PipelinePool::start(1, world.ctx.clone());

        submit_all(&pool, &world, &latch, 1);
        assert!(!latch.wait_timeout(Duration::from_secs(1)).await);

        pool.detach();
        assert!(latch.wait_timeout(Duration::from_secs(600)).await);
        assert_eq!(world.target.row_count(DomainId::PipelineInfo), 2);
        assert_eq!(world.ctx.progress.snapshot().pipelines_migrated, 1);
    }

    #[tokio::test]
    async fn closed_pool_refuses_tasks() {
        let world = world();
        let latch = Arc::new(CompletionLatch::new(1));
        let mut pool = PipelinePool::start(1, world.ctx.clone());
        pool.close();

        let pipeline = world.source.insert_pipeline("p1", "late");
        let err = pool.submit(PipelineTask::new(pipeline, latch.guard())).unwrap_err();

        assert!(matches!(err, CopyError::SinkClosed(_)));
        // the rejected task's guard was dropped with it
        assert_eq!(latch.state().completed, 1);
    }

    #[tokio::test]
    async fn zero_size_is_raised_to_one() {
        let pool = PipelinePool::start(0, world().ctx);
        assert_eq!(pool.size(), 1);
        pool.join().await;
    }
}
