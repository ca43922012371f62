//! Testing utilities for the shardmove workspace
//!
//! Shared fixtures and assertions on top of [`InMemoryWorld`].

#![allow(missing_docs)]

use shardmove_copy::{DomainId, Owner};
use shardmove_core::{InMemoryWorld, JobTicket, MigrationConfig, MigrationError, MigrationJob};
use shardmove_routing::DataSource;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const PROJECT: &str = "p1";
pub const OPERATOR: &str = "admin";

/// Install a test log subscriber once; honours `RUST_LOG`
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builder for an in-memory world
#[derive(Debug, Clone)]
pub struct WorldBuilder {
    config: MigrationConfig,
    sources: Vec<DataSource>,
    seed: Option<u64>,
}

impl WorldBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MigrationConfig::default(),
            sources: Vec::new(),
            seed: Some(7),
        }
    }

    #[must_use]
    pub fn config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn max_workers(mut self, max: usize) -> Self {
        self.config.max_pipeline_workers = max;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.migration_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Register a shard accepting new projects
    #[must_use]
    pub fn shard(mut self, name: &str) -> Self {
        let source = DataSource::new(&self.config.cluster_name, &self.config.module_code, name);
        self.sources.push(source);
        self
    }

    /// Register a tagged shard
    #[must_use]
    pub fn tagged_shard(mut self, name: &str, tag: &str) -> Self {
        let source = DataSource::new(&self.config.cluster_name, &self.config.module_code, name)
            .with_tag(tag);
        self.sources.push(source);
        self
    }

    /// Register a shard flagged full
    #[must_use]
    pub fn full_shard(mut self, name: &str) -> Self {
        let source =
            DataSource::new(&self.config.cluster_name, &self.config.module_code, name).full();
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn build(self) -> InMemoryWorld {
        InMemoryWorld::with_sources(self.config, self.sources, self.seed)
    }
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// World with `shards` shards named `ds_0..`
#[must_use]
pub fn world_with_shards(shards: usize) -> InMemoryWorld {
    (0..shards)
        .fold(WorldBuilder::new(), |builder, i| builder.shard(&format!("ds_{i}")))
        .build()
}

/// Add `count` pipelines named `{project}-pipe-{i}` with `rows` rows in `domain`
pub fn add_pipelines(world: &InMemoryWorld, project_id: &str, count: usize, domain: DomainId, rows: usize) {
    for i in 0..count {
        let pipeline = world
            .source
            .insert_pipeline(project_id, &format!("{project_id}-pipe-{i}"));
        world
            .source
            .insert_rows(domain, &Owner::pipeline(project_id, &pipeline.pipeline_id), rows);
    }
}

/// Trigger a migration with a fresh token
///
/// # Errors
/// Whatever the trigger returns synchronously.
pub async fn trigger(world: &InMemoryWorld, project_id: &str) -> Result<JobTicket, MigrationError> {
    world
        .coordinator
        .migrate_project(OPERATOR, project_id, CancellationToken::new(), None)
        .await
}

/// Trigger and wait for the final job snapshot
///
/// # Panics
/// If the trigger or the background run fails to produce a job.
pub async fn migrate(world: &InMemoryWorld, project_id: &str) -> MigrationJob {
    trigger(world, project_id)
        .await
        .expect("migration trigger rejected")
        .wait()
        .await
        .expect("migration job aborted")
}

/// Assert the project is routed to `data_source_name`
///
/// # Panics
/// When the committed rule is missing or points elsewhere.
pub fn assert_committed_to(world: &InMemoryWorld, project_id: &str, data_source_name: &str) {
    let rule = world
        .committed_rule(project_id)
        .unwrap_or_else(|| panic!("no committed rule for {project_id}"));
    assert_eq!(rule.data_source_name, data_source_name);
    assert_eq!(rule.routing_name, project_id);
}

/// Assert the project has no committed rule
///
/// # Panics
/// When a committed rule exists.
pub fn assert_not_committed(world: &InMemoryWorld, project_id: &str) {
    assert!(
        world.committed_rule(project_id).is_none(),
        "unexpected committed rule for {project_id}"
    );
}
