//! In-memory migration world
//!
//! Wires the coordinator to in-memory stores, cache and registry. Used by the
//! `simulate` command and as the base of the test fixtures.

use crate::config::MigrationConfig;
use crate::coordinator::MigrationCoordinator;
use crate::error::MigrationError;
use crate::job::MigrationJob;
use serde::Serialize;
use shardmove_copy::{
    DomainId, MemorySourceStore, MemoryTargetStore, Owner, PIPELINE_DOMAINS, PROJECT_DOMAINS,
};
use shardmove_routing::{
    DataSource, InMemoryDataSourceCatalog, InMemoryRoutingRegistry, MokaRoutingCache,
    RoutingCache, RoutingCutover, ShardingRoutingRule, StaticShardResolver,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Legacy store, shards and routing services held in memory
pub struct InMemoryWorld {
    pub config: MigrationConfig,
    pub source: Arc<MemorySourceStore>,
    pub shards: BTreeMap<String, Arc<MemoryTargetStore>>,
    pub catalog: Arc<InMemoryDataSourceCatalog>,
    pub cache: Arc<MokaRoutingCache>,
    pub registry: Arc<InMemoryRoutingRegistry>,
    pub coordinator: MigrationCoordinator,
}

impl InMemoryWorld {
    /// World with one empty shard per name, all registered for the
    /// configured module
    #[must_use]
    pub fn new(config: MigrationConfig, shard_names: &[&str], seed: Option<u64>) -> Self {
        let sources: Vec<_> = shard_names
            .iter()
            .map(|name| DataSource::new(&config.cluster_name, &config.module_code, *name))
            .collect();
        Self::with_sources(config, sources, seed)
    }

    /// World over explicit data sources (tags and full flags included)
    #[must_use]
    pub fn with_sources(config: MigrationConfig, sources: Vec<DataSource>, seed: Option<u64>) -> Self {
        let source = Arc::new(MemorySourceStore::new());
        let resolver = Arc::new(StaticShardResolver::new());
        let catalog = Arc::new(InMemoryDataSourceCatalog::new());
        let mut shards = BTreeMap::new();

        for data_source in sources {
            let store = Arc::new(MemoryTargetStore::new());
            resolver.register(data_source.data_source_name.clone(), store.clone());
            shards.insert(data_source.data_source_name.clone(), store);
            catalog.register(data_source);
        }

        let cache = Arc::new(config.routing_cache());
        let registry = Arc::new(InMemoryRoutingRegistry::new());
        let mut assignor = config.assignor(catalog.clone(), cache.clone());
        if let Some(seed) = seed {
            assignor = assignor.with_seed(seed);
        }
        let cutover = RoutingCutover::new(cache.clone(), registry.clone());
        let coordinator =
            MigrationCoordinator::new(config.clone(), source.clone(), resolver, assignor, cutover);

        Self {
            config,
            source,
            shards,
            catalog,
            cache,
            registry,
            coordinator,
        }
    }

    /// Target store of a shard
    #[must_use]
    pub fn shard(&self, data_source_name: &str) -> Option<&Arc<MemoryTargetStore>> {
        self.shards.get(data_source_name)
    }

    /// Committed routing rule of a project
    #[must_use]
    pub fn committed_rule(&self, project_id: &str) -> Option<ShardingRoutingRule> {
        self.registry.rule(&self.config.scope().key_for(project_id))
    }

    /// Pending routing rule of a project, if one is cached
    pub async fn pending_rule(&self, project_id: &str) -> Option<String> {
        let key = self.config.scope().key_for(project_id).migrating_cache_key();
        self.cache.get(&key).await.ok().flatten()
    }

    /// Fill the legacy store with `pipelines` pipelines and `rows_per_domain`
    /// rows in every domain; returns the number of rows inserted
    pub fn seed_project(&self, project_id: &str, pipelines: usize, rows_per_domain: usize) -> usize {
        let project = Owner::project(project_id);
        for domain in PROJECT_DOMAINS {
            self.source.insert_rows(domain.id, &project, rows_per_domain);
        }
        for i in 0..pipelines {
            let pipeline = self.source.insert_pipeline(project_id, &format!("{project_id}-pipeline-{i}"));
            let owner = Owner::pipeline(project_id, &pipeline.pipeline_id);
            for domain in PIPELINE_DOMAINS {
                self.source.insert_rows(domain.id, &owner, rows_per_domain);
            }
        }
        (PROJECT_DOMAINS.len() + pipelines * PIPELINE_DOMAINS.len()) * rows_per_domain
    }
}

impl std::fmt::Debug for InMemoryWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryWorld")
            .field("shards", &self.shards.keys().collect::<Vec<_>>())
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

/// Parameters of a simulated migration
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub project_id: String,
    pub pipelines: usize,
    pub shards: usize,
    pub rows_per_domain: usize,
    pub seed: Option<u64>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            project_id: "demo-project".to_string(),
            pipelines: 12,
            shards: 3,
            rows_per_domain: 7,
            seed: None,
        }
    }
}

/// Outcome of a simulated migration
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub job: MigrationJob,
    pub rows_seeded: usize,
    pub rows_on_target: usize,
    pub committed_data_source: Option<String>,
    /// Rows per domain on the target shard
    pub domains: BTreeMap<DomainId, usize>,
}

impl SimulationReport {
    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("job:            {}\n", self.job.id));
        out.push_str(&format!("project:        {}\n", self.job.project_id));
        out.push_str(&format!("status:         {}\n", self.job.status));
        out.push_str(&format!("target shard:   {}\n", self.job.data_source_name));
        out.push_str(&format!(
            "committed:      {}\n",
            self.committed_data_source.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!(
            "pipelines:      {} migrated, {} failed\n",
            self.job.progress.pipelines_migrated, self.job.progress.pipelines_failed
        ));
        out.push_str(&format!("rows:           {}/{}\n", self.rows_on_target, self.rows_seeded));
        if let Some(error) = &self.job.error {
            out.push_str(&format!("error:          {error}\n"));
        }
        out
    }
}

/// Build a world, seed one project and migrate it to completion
///
/// # Errors
/// Any synchronous trigger error, or an aborted background run.
pub async fn run_simulation(
    config: MigrationConfig,
    options: &SimulationOptions,
) -> Result<SimulationReport, MigrationError> {
    let names: Vec<String> = (0..options.shards).map(|i| format!("ds_{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let world = InMemoryWorld::new(config, &name_refs, options.seed);
    let rows_seeded = world.seed_project(&options.project_id, options.pipelines, options.rows_per_domain);

    let job = world
        .coordinator
        .migrate_project("simulator", &options.project_id, CancellationToken::new(), None)
        .await?
        .wait()
        .await?;

    let domains = world
        .shard(&job.data_source_name)
        .map(|shard| {
            PROJECT_DOMAINS
                .iter()
                .chain(PIPELINE_DOMAINS)
                .map(|domain| (domain.id, shard.row_count(domain.id)))
                .collect()
        })
        .unwrap_or_default();

    Ok(SimulationReport {
        rows_on_target: world.shard(&job.data_source_name).map_or(0, |s| s.total_rows()),
        committed_data_source: world
            .committed_rule(&options.project_id)
            .map(|rule| rule.data_source_name),
        rows_seeded,
        domains,
        job,
    })
}
