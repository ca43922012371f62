//! In-memory stores
//!
//! Used by the simulator and the test suites. The source store records every
//! page request and can inject latency, failures and stalls per pipeline or
//! per domain, so the orchestration around it can be exercised without a
//! database.

use crate::copier::PageRequest;
use crate::domain::DomainId;
use crate::error::StoreError;
use crate::record::{Owner, PipelineRef, Record};
use crate::store::{SourceStore, TargetStore};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Legacy store held in memory
#[derive(Debug, Default)]
pub struct MemorySourceStore {
    pipelines: RwLock<BTreeMap<String, Vec<PipelineRef>>>,
    rows: RwLock<HashMap<DomainId, Vec<Record>>>,
    next_pipeline_id: AtomicU64,
    next_row_id: AtomicU64,
    fetches: DashMap<DomainId, usize>,
    pipeline_pages: AtomicUsize,
    late_pipelines: Mutex<Vec<(String, String)>>,
    failing_pipelines: DashSet<String>,
    stalled_pipelines: DashSet<String>,
    failing_domains: DashSet<DomainId>,
    fetch_delay: Mutex<Option<Duration>>,
}

impl MemorySourceStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline and return its reference
    pub fn insert_pipeline(&self, project_id: &str, pipeline_id: &str) -> PipelineRef {
        let surrogate_id = self.next_pipeline_id.fetch_add(1, Ordering::SeqCst) + 1;
        let pipeline = PipelineRef::new(pipeline_id, surrogate_id);
        self.pipelines
            .write()
            .entry(project_id.to_string())
            .or_default()
            .push(pipeline.clone());
        pipeline
    }

    /// Remove a pipeline (rows stay, like a soft delete in the legacy store)
    pub fn delete_pipeline(&self, project_id: &str, pipeline_id: &str) {
        if let Some(list) = self.pipelines.write().get_mut(project_id) {
            list.retain(|p| p.pipeline_id != pipeline_id);
        }
    }

    /// Append `count` generated rows of `domain` for `owner`
    pub fn insert_rows(&self, domain: DomainId, owner: &Owner, count: usize) {
        let mut rows = self.rows.write();
        let table = rows.entry(domain).or_default();
        for seq in 0..count {
            let id = self.next_row_id.fetch_add(1, Ordering::SeqCst) + 1;
            let mut record = Record::new(
                id,
                owner.project_id.clone(),
                serde_json::json!({ "domain": domain.as_str(), "seq": seq }),
            );
            record.pipeline_id.clone_from(&owner.pipeline_id);
            table.push(record);
        }
    }

    /// Create a pipeline the first time discovery reads a page, simulating a
    /// pipeline created while a migration is running
    pub fn insert_pipeline_during_discovery(&self, project_id: &str, pipeline_id: &str) {
        self.late_pipelines
            .lock()
            .push((project_id.to_string(), pipeline_id.to_string()));
    }

    /// Make every row fetch for a pipeline fail
    pub fn fail_pipeline(&self, pipeline_id: &str) {
        self.failing_pipelines.insert(pipeline_id.to_string());
    }

    /// Make every row fetch for a pipeline hang forever
    pub fn stall_pipeline(&self, pipeline_id: &str) {
        self.stalled_pipelines.insert(pipeline_id.to_string());
    }

    /// Make every fetch of a domain fail
    pub fn fail_domain(&self, domain: DomainId) {
        self.failing_domains.insert(domain);
    }

    /// Sleep before answering each row fetch
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = Some(delay);
    }

    /// Row fetches issued against a domain, across all owners
    #[must_use]
    pub fn fetch_count(&self, domain: DomainId) -> usize {
        self.fetches.get(&domain).map_or(0, |n| *n)
    }

    /// Pipeline discovery pages served
    #[must_use]
    pub fn pipeline_page_count(&self) -> usize {
        self.pipeline_pages.load(Ordering::SeqCst)
    }

    /// Rows of a domain owned by `owner`
    #[must_use]
    pub fn row_count(&self, domain: DomainId, owner: &Owner) -> usize {
        self.rows
            .read()
            .get(&domain)
            .map_or(0, |rows| rows.iter().filter(|r| r.is_owned_by(owner)).count())
    }

    fn apply_late_pipelines(&self) {
        let late: Vec<_> = self.late_pipelines.lock().drain(..).collect();
        for (project_id, pipeline_id) in late {
            self.insert_pipeline(&project_id, &pipeline_id);
        }
    }
}

#[async_trait]
impl SourceStore for MemorySourceStore {
    async fn count_pipelines(&self, project_id: &str) -> Result<usize, StoreError> {
        Ok(self.pipelines.read().get(project_id).map_or(0, Vec::len))
    }

    async fn list_pipelines(
        &self,
        project_id: &str,
        request: PageRequest,
    ) -> Result<Vec<PipelineRef>, StoreError> {
        let page = {
            let pipelines = self.pipelines.read();
            pipelines
                .get(project_id)
                .map(|list| request.slice(list).cloned().collect())
                .unwrap_or_default()
        };
        self.pipeline_pages.fetch_add(1, Ordering::SeqCst);
        self.apply_late_pipelines();
        Ok(page)
    }

    async fn fetch_rows(
        &self,
        domain: DomainId,
        owner: &Owner,
        request: PageRequest,
    ) -> Result<Vec<Record>, StoreError> {
        *self.fetches.entry(domain).or_insert(0) += 1;

        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(pipeline_id) = &owner.pipeline_id {
            if self.stalled_pipelines.contains(pipeline_id) {
                futures::future::pending::<()>().await;
            }
            if self.failing_pipelines.contains(pipeline_id) {
                return Err(StoreError::Rejected {
                    domain,
                    reason: format!("injected failure for pipeline {pipeline_id}"),
                });
            }
        }
        if self.failing_domains.contains(&domain) {
            return Err(StoreError::Unavailable(format!("{domain} offline")));
        }

        let rows = self.rows.read();
        let owned: Vec<Record> = rows
            .get(&domain)
            .map(|table| table.iter().filter(|r| r.is_owned_by(owner)).cloned().collect())
            .unwrap_or_default();
        Ok(request.slice(&owned).cloned().collect())
    }
}

/// One shard held in memory
#[derive(Debug, Default)]
pub struct MemoryTargetStore {
    rows: DashMap<DomainId, Vec<Record>>,
    batches: AtomicUsize,
    rejecting: DashSet<DomainId>,
}

impl MemoryTargetStore {
    /// Empty shard
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes to a domain
    pub fn reject_domain(&self, domain: DomainId) {
        self.rejecting.insert(domain);
    }

    /// Rows written to a domain
    #[must_use]
    pub fn rows(&self, domain: DomainId) -> Vec<Record> {
        self.rows.get(&domain).map(|r| r.clone()).unwrap_or_default()
    }

    /// Count of rows written to a domain
    #[must_use]
    pub fn row_count(&self, domain: DomainId) -> usize {
        self.rows.get(&domain).map_or(0, |r| r.len())
    }

    /// Count of rows written across every domain
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.rows.iter().map(|entry| entry.value().len()).sum()
    }

    /// Batches accepted
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn write_rows(&self, domain: DomainId, rows: Vec<Record>) -> Result<(), StoreError> {
        if self.rejecting.contains(&domain) {
            return Err(StoreError::Rejected {
                domain,
                reason: "write rejected by shard".to_string(),
            });
        }
        self.rows.entry(domain).or_default().extend(rows);
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
