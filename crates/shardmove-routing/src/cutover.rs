//! Routing cutover
//!
//! Promotes a pending routing rule to a committed one. This is the only place
//! where routing visible to the rest of the system changes; until it runs,
//! every reader keeps resolving the project through its old committed rule.

use crate::assignor::RoutingAssignment;
use crate::cache::RoutingCache;
use crate::error::RoutingError;
use crate::registry::RoutingRegistry;
use crate::rule::ShardingRoutingRule;
use std::sync::Arc;

/// What the cutover did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CutoverOutcome {
    /// Pending entry evicted and rule committed
    Committed(ShardingRoutingRule),
    /// No pending entry in the cache (expired or already consumed)
    PendingEntryMissing,
    /// Pending entry belongs to a different assignment
    PendingEntryMismatch {
        /// Value found in the cache
        found: String,
    },
}

impl CutoverOutcome {
    #[inline]
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

/// Commits pending routing rules into the durable registry
pub struct RoutingCutover {
    cache: Arc<dyn RoutingCache>,
    registry: Arc<dyn RoutingRegistry>,
}

impl RoutingCutover {
    #[must_use]
    pub fn new(cache: Arc<dyn RoutingCache>, registry: Arc<dyn RoutingRegistry>) -> Self {
        Self { cache, registry }
    }

    /// Promote the pending rule of `assignment`
    ///
    /// The cache entry is evicted before the registry call, so a refused
    /// commit leaves neither a pending nor a new committed rule: the project
    /// stays on its original shard.
    ///
    /// # Errors
    /// - `RoutingError::RoutingCommitFailed` if the registry answers non-ok
    /// - cache or registry transport errors
    #[tracing::instrument(
        skip(self, assignment),
        fields(project_id = %assignment.project_id(), data_source = %assignment.data_source_name)
    )]
    pub async fn commit(
        &self,
        user_id: &str,
        assignment: &RoutingAssignment,
    ) -> Result<CutoverOutcome, RoutingError> {
        let cache_key = assignment.key.migrating_cache_key();

        let Some(pending) = self.cache.get(&cache_key).await? else {
            tracing::warn!("pending routing rule missing at cutover");
            return Ok(CutoverOutcome::PendingEntryMissing);
        };
        let Some(data_source_name) = assignment.resolve(&pending) else {
            tracing::warn!(found = %pending, expected = %assignment.pending_rule, "pending routing rule mismatch");
            return Ok(CutoverOutcome::PendingEntryMismatch { found: pending });
        };

        self.cache.delete(&cache_key).await?;

        let rule = ShardingRoutingRule::new(&assignment.key, data_source_name);
        let response = self
            .registry
            .update_routing_rule(user_id, rule.clone())
            .await?;

        if !response.is_ok() {
            tracing::warn!(status = response.status, "routing rule update refused");
            return Err(RoutingError::RoutingCommitFailed {
                status: response.status,
                message: response.message.unwrap_or_default(),
            });
        }

        tracing::info!("routing rule committed");
        Ok(CutoverOutcome::Committed(rule))
    }

    /// Put the pending rule of `assignment` back if its cache entry expired
    ///
    /// Returns `true` when the entry had to be restored. A live entry is left
    /// as is, whatever it holds; `commit` reports a mismatch later.
    ///
    /// # Errors
    /// Cache transport errors.
    pub async fn rearm(&self, assignment: &RoutingAssignment) -> Result<bool, RoutingError> {
        let restored = self
            .cache
            .set_if_absent(&assignment.key.migrating_cache_key(), &assignment.pending_rule)
            .await?;
        if restored {
            tracing::warn!(
                project_id = %assignment.project_id(),
                pending_rule = %assignment.pending_rule,
                "pending routing rule expired during the run, restored"
            );
        }
        Ok(restored)
    }
}

impl std::fmt::Debug for RoutingCutover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingCutover").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MokaRoutingCache;
    use crate::registry::{InMemoryRoutingRegistry, MockRoutingRegistry, RegistryResponse};
    use crate::rule::RoutingScope;

    fn assignment() -> RoutingAssignment {
        RoutingAssignment {
            key: RoutingScope::new("prod", "PROCESS", "DB").key_for("p1"),
            pending_rule: "migratingDs_1".to_string(),
            data_source_name: "ds_1".to_string(),
            newly_assigned: true,
        }
    }

    async fn cache_with_pending(value: &str) -> Arc<MokaRoutingCache> {
        let cache = Arc::new(MokaRoutingCache::default());
        cache
            .set_if_absent(&assignment().key.migrating_cache_key(), value)
            .await
            .unwrap();
        cache
    }

    #[tokio::test]
    async fn commits_and_evicts() {
        let cache = cache_with_pending("migratingDs_1").await;
        let registry = Arc::new(InMemoryRoutingRegistry::new());
        let cutover = RoutingCutover::new(cache.clone(), registry.clone());

        let outcome = cutover.commit("admin", &assignment()).await.unwrap();

        assert!(outcome.is_committed());
        let key = assignment().key;
        assert_eq!(registry.rule(&key).unwrap().data_source_name, "ds_1");
        assert_eq!(cache.get(&key.migrating_cache_key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_pending_entry_changes_nothing() {
        let cache = Arc::new(MokaRoutingCache::default());
        let registry = Arc::new(InMemoryRoutingRegistry::new());
        let cutover = RoutingCutover::new(cache, registry.clone());

        let outcome = cutover.commit("admin", &assignment()).await.unwrap();

        assert_eq!(outcome, CutoverOutcome::PendingEntryMissing);
        assert_eq!(registry.update_count(), 0);
    }

    #[tokio::test]
    async fn foreign_pending_entry_is_left_alone() {
        let cache = cache_with_pending("migratingDs_0").await;
        let registry = Arc::new(InMemoryRoutingRegistry::new());
        let cutover = RoutingCutover::new(cache.clone(), registry.clone());

        let outcome = cutover.commit("admin", &assignment()).await.unwrap();

        assert_eq!(
            outcome,
            CutoverOutcome::PendingEntryMismatch { found: "migratingDs_0".to_string() }
        );
        assert!(cache
            .get(&assignment().key.migrating_cache_key())
            .await
            .unwrap()
            .is_some());
        assert_eq!(registry.update_count(), 0);
    }

    #[tokio::test]
    async fn registry_refusal_is_propagated_with_status() {
        let cache = cache_with_pending("migratingDs_1").await;
        let mut registry = MockRoutingRegistry::new();
        registry
            .expect_update_routing_rule()
            .times(1)
            .returning(|_, _| Ok(RegistryResponse::error(2_101_013, "sharding rule locked")));
        let cutover = RoutingCutover::new(cache.clone(), Arc::new(registry));

        let err = cutover.commit("admin", &assignment()).await.unwrap_err();

        assert_eq!(
            err,
            RoutingError::RoutingCommitFailed {
                status: 2_101_013,
                message: "sharding rule locked".to_string(),
            }
        );
        assert_eq!(
            cache.get(&assignment().key.migrating_cache_key()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn registry_transport_error_propagates() {
        let cache = cache_with_pending("migratingDs_1").await;
        let mut registry = MockRoutingRegistry::new();
        registry
            .expect_update_routing_rule()
            .returning(|_, _| Err(RoutingError::Registry("connection reset".into())));
        let cutover = RoutingCutover::new(cache, Arc::new(registry));

        let err = cutover.commit("admin", &assignment()).await.unwrap_err();
        assert!(matches!(err, RoutingError::Registry(_)));
    }

    #[tokio::test]
    async fn rearm_restores_an_expired_entry() {
        let cache = Arc::new(MokaRoutingCache::with_ttl(100, std::time::Duration::from_millis(50)));
        let registry = Arc::new(InMemoryRoutingRegistry::new());
        let cutover = RoutingCutover::new(cache.clone(), registry.clone());
        let key = assignment().key.migrating_cache_key();
        cache.set_if_absent(&key, "migratingDs_1").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert_eq!(cache.get(&key).await.unwrap(), None);

        assert!(cutover.rearm(&assignment()).await.unwrap());
        assert!(cutover.commit("admin", &assignment()).await.unwrap().is_committed());
        assert_eq!(registry.rule(&assignment().key).unwrap().data_source_name, "ds_1");
    }

    #[tokio::test]
    async fn rearm_keeps_a_live_entry() {
        let cache = cache_with_pending("migratingDs_0").await;
        let cutover = RoutingCutover::new(cache.clone(), Arc::new(InMemoryRoutingRegistry::new()));

        assert!(!cutover.rearm(&assignment()).await.unwrap());
        assert_eq!(
            cache.get(&assignment().key.migrating_cache_key()).await.unwrap().as_deref(),
            Some("migratingDs_0")
        );
    }
}
