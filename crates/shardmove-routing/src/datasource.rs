//! Shard data sources and their targets

use crate::error::RoutingError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shardmove_copy::{StoreError, TargetStore};
use std::sync::Arc;

/// One shard data source registered for a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub cluster_name: String,
    pub module_code: String,
    pub data_source_name: String,
    /// Shard no longer accepts new projects
    pub full_flag: bool,
    /// Optional placement tag (e.g. a gray-release pool)
    pub tag: Option<String>,
}

impl DataSource {
    #[must_use]
    pub fn new(
        cluster_name: impl Into<String>,
        module_code: impl Into<String>,
        data_source_name: impl Into<String>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            module_code: module_code.into(),
            data_source_name: data_source_name.into(),
            full_flag: false,
            tag: None,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn full(mut self) -> Self {
        self.full_flag = true;
        self
    }
}

/// Catalog of shard data sources
#[async_trait]
pub trait DataSourceCatalog: Send + Sync {
    /// Data sources of a module with the given full flag, filtered by tag
    /// when one is supplied
    async fn list_by_module(
        &self,
        cluster_name: &str,
        module_code: &str,
        full_flag: bool,
        tag: Option<&str>,
    ) -> Result<Vec<DataSource>, RoutingError>;
}

/// Catalog held in memory
#[derive(Debug, Default)]
pub struct InMemoryDataSourceCatalog {
    sources: RwLock<Vec<DataSource>>,
}

impl InMemoryDataSourceCatalog {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: DataSource) {
        self.sources.write().push(source);
    }

    /// Flag a data source as full
    pub fn mark_full(&self, data_source_name: &str) {
        for source in self.sources.write().iter_mut() {
            if source.data_source_name == data_source_name {
                source.full_flag = true;
            }
        }
    }
}

#[async_trait]
impl DataSourceCatalog for InMemoryDataSourceCatalog {
    async fn list_by_module(
        &self,
        cluster_name: &str,
        module_code: &str,
        full_flag: bool,
        tag: Option<&str>,
    ) -> Result<Vec<DataSource>, RoutingError> {
        Ok(self
            .sources
            .read()
            .iter()
            .filter(|s| s.cluster_name == cluster_name && s.module_code == module_code)
            .filter(|s| s.full_flag == full_flag)
            .filter(|s| tag.map_or(true, |t| s.tag.as_deref() == Some(t)))
            .cloned()
            .collect())
    }
}

/// Maps a data source name to the store that receives migrated rows
pub trait ShardResolver: Send + Sync {
    /// Target store for a data source
    ///
    /// # Errors
    /// `StoreError::UnknownDataSource` when nothing is registered under the name.
    fn resolve(&self, data_source_name: &str) -> Result<Arc<dyn TargetStore>, StoreError>;
}

/// Fixed set of shard stores registered at startup
#[derive(Default)]
pub struct StaticShardResolver {
    shards: DashMap<String, Arc<dyn TargetStore>>,
}

impl StaticShardResolver {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, data_source_name: impl Into<String>, store: Arc<dyn TargetStore>) {
        self.shards.insert(data_source_name.into(), store);
    }
}

impl std::fmt::Debug for StaticShardResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.shards.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("StaticShardResolver").field("shards", &names).finish()
    }
}

impl ShardResolver for StaticShardResolver {
    fn resolve(&self, data_source_name: &str) -> Result<Arc<dyn TargetStore>, StoreError> {
        self.shards
            .get(data_source_name)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| StoreError::UnknownDataSource(data_source_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardmove_copy::MemoryTargetStore;

    fn catalog() -> InMemoryDataSourceCatalog {
        let catalog = InMemoryDataSourceCatalog::new();
        catalog.register(DataSource::new("prod", "PROCESS", "ds_0"));
        catalog.register(DataSource::new("prod", "PROCESS", "ds_1").with_tag("gray"));
        catalog.register(DataSource::new("prod", "PROCESS", "ds_2").full());
        catalog.register(DataSource::new("prod", "REPOSITORY", "repo_0"));
        catalog
    }

    #[tokio::test]
    async fn lists_non_full_sources_of_module() {
        let names: Vec<_> = catalog()
            .list_by_module("prod", "PROCESS", false, None)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.data_source_name)
            .collect();
        assert_eq!(names, vec!["ds_0", "ds_1"]);
    }

    #[tokio::test]
    async fn tag_narrows_the_list() {
        let sources = catalog()
            .list_by_module("prod", "PROCESS", false, Some("gray"))
            .await
            .unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].data_source_name, "ds_1");
    }

    #[tokio::test]
    async fn mark_full_removes_from_eligible_set() {
        let catalog = catalog();
        catalog.mark_full("ds_0");
        catalog.mark_full("ds_1");
        let sources = catalog.list_by_module("prod", "PROCESS", false, None).await.unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn resolver_reports_unknown_source() {
        let resolver = StaticShardResolver::new();
        resolver.register("ds_0", Arc::new(MemoryTargetStore::new()));

        assert!(resolver.resolve("ds_0").is_ok());
        assert!(matches!(
            resolver.resolve("ds_9"),
            Err(StoreError::UnknownDataSource(name)) if name == "ds_9"
        ));
    }
}
