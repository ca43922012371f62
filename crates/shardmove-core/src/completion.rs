//! Completion latch for pipeline tasks
//!
//! A wait-group sized to the pipeline count at scan time. Discovery may find
//! more (or fewer) pipelines than were counted, so the latch is resized when
//! discovery ends and only opens once it is sealed:
//! - every discovered pipeline holds one [`CompletionGuard`]
//! - a guard counts down exactly once, when dropped, whatever the outcome
//! - [`CompletionLatch::wait`] returns when sealed and all guards are gone

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Latch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatchState {
    /// Tasks the latch waits for
    pub expected: usize,
    /// Tasks finished so far
    pub completed: usize,
    /// Discovery finished; `expected` is final
    pub sealed: bool,
}

impl LatchState {
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.sealed && self.completed >= self.expected
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.expected.saturating_sub(self.completed)
    }
}

/// Wait-group over the pipeline tasks of one run
#[derive(Debug)]
pub struct CompletionLatch {
    state: watch::Sender<LatchState>,
}

impl CompletionLatch {
    /// Latch expecting `expected` tasks
    #[must_use]
    pub fn new(expected: usize) -> Self {
        let (state, _) = watch::channel(LatchState {
            expected,
            ..LatchState::default()
        });
        Self { state }
    }

    /// Guard for one task; dropping it counts the task as completed
    #[must_use]
    pub fn guard(self: &Arc<Self>) -> CompletionGuard {
        CompletionGuard {
            latch: Arc::clone(self),
        }
    }

    /// Fix the final task count once discovery is over
    pub fn seal(&self, discovered: usize) {
        self.state.send_modify(|state| {
            if state.expected != discovered {
                tracing::debug!(
                    counted = state.expected,
                    discovered,
                    "pipeline count changed during discovery"
                );
            }
            state.expected = discovered;
            state.sealed = true;
        });
    }

    #[must_use]
    pub fn state(&self) -> LatchState {
        *self.state.borrow()
    }

    /// Wait until the latch opens
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives in `self`, so the channel cannot close while waiting
        let _ = rx.wait_for(LatchState::is_open).await;
    }

    /// Wait at most `timeout`; `true` when the latch opened in time
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    fn count_down(&self) {
        self.state.send_modify(|state| state.completed += 1);
    }
}

/// Counts one task down when dropped
#[derive(Debug)]
pub struct CompletionGuard {
    latch: Arc<CompletionLatch>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.latch.count_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_all_guards_drop() {
        let latch = Arc::new(CompletionLatch::new(3));
        let guards: Vec<_> = (0..3).map(|_| latch.guard()).collect();
        latch.seal(3);

        assert!(!latch.state().is_open());
        drop(guards);
        assert!(latch.wait_timeout(Duration::from_millis(10)).await);
        assert_eq!(latch.state().completed, 3);
    }

    #[tokio::test]
    async fn zero_tasks_opens_on_seal() {
        let latch = CompletionLatch::new(0);
        assert!(!latch.state().is_open());
        latch.seal(0);
        assert!(latch.wait_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn unsealed_latch_stays_closed() {
        let latch = Arc::new(CompletionLatch::new(1));
        drop(latch.guard());

        assert_eq!(latch.state().remaining(), 0);
        assert!(!latch.wait_timeout(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn late_discovery_extends_the_wait() {
        let latch = Arc::new(CompletionLatch::new(2));
        let first = latch.guard();
        let second = latch.guard();
        let late = latch.guard();
        latch.seal(3);

        drop(first);
        drop(second);
        assert!(!latch.wait_timeout(Duration::from_secs(1)).await);

        drop(late);
        assert!(latch.wait_timeout(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn fewer_pipelines_than_counted_still_opens() {
        let latch = Arc::new(CompletionLatch::new(5));
        let guard = latch.guard();
        latch.seal(1);
        drop(guard);
        assert!(latch.wait_timeout(Duration::from_secs(1)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn counts_down_from_many_tasks() {
        let latch = Arc::new(CompletionLatch::new(50));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let guard = latch.guard();
            handles.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                drop(guard);
            }));
        }
        latch.seal(50);

        latch.wait().await;
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(latch.state().completed, 50);
    }
}
