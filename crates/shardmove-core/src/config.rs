//! Migration configuration
//!
//! Loaded from TOML; every key is optional and falls back to the defaults
//! below.

use crate::error::MigrationError;
use serde::{Deserialize, Serialize};
use shardmove_routing::{
    DataSourceCatalog, MokaRoutingCache, RoutingAssignor, RoutingCache, RoutingScope,
    MIGRATING_DATA_SOURCE_NAME_PREFIX,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Migration configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Database cluster holding the shards
    pub cluster_name: String,
    /// Module whose routing table is migrated
    pub module_code: String,
    /// Routing rule type
    pub rule_type: String,
    /// Upper bound on concurrent pipeline tasks
    pub max_pipeline_workers: usize,
    /// Page size of pipeline discovery
    pub pipeline_page_size: usize,
    /// How long to wait for pipeline tasks, in seconds
    pub migration_timeout_secs: u64,
    /// Lifetime of a pending routing entry, in seconds; must outlast the
    /// completion wait, which starts after the entry is re-armed
    pub pending_route_ttl_secs: u64,
    /// Prefix of pending rule values
    pub migrating_data_source_prefix: String,
    /// Maximum entries in the pending routing cache
    pub cache_capacity: u64,
}

impl MigrationConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With max pipeline workers
    #[inline]
    #[must_use]
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_pipeline_workers = max;
        self
    }

    /// With discovery page size
    #[inline]
    #[must_use]
    pub fn with_pipeline_page_size(mut self, page_size: usize) -> Self {
        self.pipeline_page_size = page_size;
        self
    }

    /// With completion wait timeout, rounded up to whole seconds
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.migration_timeout_secs = secs.max(1);
        self
    }

    /// With routing table coordinates
    #[must_use]
    pub fn with_scope(
        mut self,
        cluster_name: impl Into<String>,
        module_code: impl Into<String>,
        rule_type: impl Into<String>,
    ) -> Self {
        self.cluster_name = cluster_name.into();
        self.module_code = module_code.into();
        self.rule_type = rule_type.into();
        self
    }

    /// Routing table this configuration migrates
    #[must_use]
    pub fn scope(&self) -> RoutingScope {
        RoutingScope::new(&self.cluster_name, &self.module_code, &self.rule_type)
    }

    /// Pending routing cache sized and expired per this configuration
    #[must_use]
    pub fn routing_cache(&self) -> MokaRoutingCache {
        MokaRoutingCache::with_ttl(self.cache_capacity, self.pending_route_ttl())
    }

    /// Assignor writing to this configuration's routing table
    #[must_use]
    pub fn assignor(
        &self,
        catalog: Arc<dyn DataSourceCatalog>,
        cache: Arc<dyn RoutingCache>,
    ) -> RoutingAssignor {
        RoutingAssignor::new(catalog, cache, self.scope())
            .with_prefix(&self.migrating_data_source_prefix)
    }

    #[inline]
    #[must_use]
    pub fn migration_timeout(&self) -> Duration {
        Duration::from_secs(self.migration_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn pending_route_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_route_ttl_secs)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `MigrationError::Config` on malformed TOML or invalid values.
    pub fn from_toml_str(raw: &str) -> Result<Self, MigrationError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| MigrationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// `MigrationError::Config` when the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MigrationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MigrationError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// `MigrationError::Config` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, MigrationError> {
        toml::to_string_pretty(self).map_err(|e| MigrationError::Config(e.to_string()))
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `MigrationError::Config` naming the first offending key.
    pub fn validate(&self) -> Result<(), MigrationError> {
        let checks = [
            (self.max_pipeline_workers == 0, "max_pipeline_workers must be at least 1"),
            (self.pipeline_page_size == 0, "pipeline_page_size must be at least 1"),
            (self.migration_timeout_secs == 0, "migration_timeout_secs must be positive"),
            (
                self.pending_route_ttl_secs <= self.migration_timeout_secs,
                "pending_route_ttl_secs must exceed migration_timeout_secs",
            ),
            (self.cluster_name.is_empty(), "cluster_name must not be empty"),
            (self.module_code.is_empty(), "module_code must not be empty"),
            (
                self.migrating_data_source_prefix.is_empty(),
                "migrating_data_source_prefix must not be empty",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(MigrationError::Config((*message).to_string())),
            None => Ok(()),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            cluster_name: "prod".to_string(),
            module_code: "PROCESS".to_string(),
            rule_type: "DB".to_string(),
            max_pipeline_workers: 10,
            pipeline_page_size: 20,
            migration_timeout_secs: 20 * 60 * 60,
            pending_route_ttl_secs: 24 * 60 * 60,
            migrating_data_source_prefix: MIGRATING_DATA_SOURCE_NAME_PREFIX.to_string(),
            cache_capacity: 10_000,
        }
    }
}
