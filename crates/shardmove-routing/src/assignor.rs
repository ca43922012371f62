//! Routing assignor
//!
//! Picks the shard a project migrates to and records the choice as a pending
//! routing rule in the shared cache. Choice is uniform over the eligible data
//! sources; it spreads load, it does not optimise placement.

use crate::cache::RoutingCache;
use crate::datasource::DataSourceCatalog;
use crate::error::RoutingError;
use crate::rule::{RoutingKey, RoutingScope};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Default prefix of pending rule values
pub const MIGRATING_DATA_SOURCE_NAME_PREFIX: &str = "migratingDs_";

/// Result of an assignment: the pending rule and the data source it stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingAssignment {
    /// Routing key of the project
    pub key: RoutingKey,
    /// Value stored in the cache (`{prefix}{index}`)
    pub pending_rule: String,
    /// Data source the pending rule maps to
    pub data_source_name: String,
    /// `false` when another trigger had already chosen and this call adopted it
    pub newly_assigned: bool,
}

impl RoutingAssignment {
    /// Data source for a pending rule read back from the cache, if it is ours
    #[inline]
    #[must_use]
    pub fn resolve(&self, pending_rule: &str) -> Option<&str> {
        (pending_rule == self.pending_rule).then_some(self.data_source_name.as_str())
    }

    /// Project being migrated
    #[inline]
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.key.routing_name
    }
}

/// Chooses target shards and writes pending routing rules
pub struct RoutingAssignor {
    catalog: Arc<dyn DataSourceCatalog>,
    cache: Arc<dyn RoutingCache>,
    scope: RoutingScope,
    prefix: String,
    rng: Mutex<StdRng>,
}

impl RoutingAssignor {
    /// Create an assignor seeded from the OS
    #[must_use]
    pub fn new(
        catalog: Arc<dyn DataSourceCatalog>,
        cache: Arc<dyn RoutingCache>,
        scope: RoutingScope,
    ) -> Self {
        Self {
            catalog,
            cache,
            scope,
            prefix: MIGRATING_DATA_SOURCE_NAME_PREFIX.to_string(),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Use a deterministic RNG
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Use a different pending rule prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Routing table this assignor writes to
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &RoutingScope {
        &self.scope
    }

    /// Assign a shard to `project_id`
    ///
    /// The only side effect is one set-if-absent cache write. When another
    /// trigger already holds the key, its choice is adopted so both converge
    /// on the same shard.
    ///
    /// # Errors
    /// - `RoutingError::NoAvailableShard` if no non-full data source matches
    /// - `RoutingError::PendingRouteConflict` if the cached rule cannot be resolved
    #[tracing::instrument(skip(self), fields(cluster = %self.scope.cluster_name, module = %self.scope.module_code))]
    pub async fn assign(
        &self,
        project_id: &str,
        data_tag: Option<&str>,
    ) -> Result<RoutingAssignment, RoutingError> {
        let names: Vec<String> = self
            .catalog
            .list_by_module(&self.scope.cluster_name, &self.scope.module_code, false, data_tag)
            .await?
            .into_iter()
            .map(|source| source.data_source_name)
            .collect();

        if names.is_empty() {
            tracing::warn!(tag = ?data_tag, "no data source available");
            return Err(RoutingError::NoAvailableShard {
                cluster: self.scope.cluster_name.clone(),
                module: self.scope.module_code.clone(),
                tag: data_tag.map(str::to_string),
            });
        }

        let index = self.rng.lock().random_range(0..names.len());
        let pending_rule = format!("{}{index}", self.prefix);
        let key = self.scope.key_for(project_id);
        let cache_key = key.migrating_cache_key();

        if self.cache.set_if_absent(&cache_key, &pending_rule).await? {
            tracing::info!(%pending_rule, data_source = %names[index], "pending routing rule assigned");
            return Ok(RoutingAssignment {
                key,
                pending_rule,
                data_source_name: names[index].clone(),
                newly_assigned: true,
            });
        }

        let existing = self.cache.get(&cache_key).await?;
        match existing.as_deref().and_then(|rule| self.index_of(rule, names.len())) {
            Some(adopted) => {
                tracing::info!(
                    discarded = %pending_rule,
                    adopted = %names[adopted],
                    "pending routing rule already present, adopting it"
                );
                Ok(RoutingAssignment {
                    key,
                    pending_rule: format!("{}{adopted}", self.prefix),
                    data_source_name: names[adopted].clone(),
                    newly_assigned: false,
                })
            }
            None => Err(RoutingError::PendingRouteConflict {
                project_id: project_id.to_string(),
                existing,
            }),
        }
    }

    fn index_of(&self, pending_rule: &str, len: usize) -> Option<usize> {
        pending_rule
            .strip_prefix(&self.prefix)
            .and_then(|index| index.parse::<usize>().ok())
            .filter(|index| *index < len)
    }
}

impl std::fmt::Debug for RoutingAssignor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingAssignor")
            .field("scope", &self.scope)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
