//! Persistence seams for the legacy source and the target shards

use crate::copier::PageRequest;
use crate::domain::DomainId;
use crate::error::StoreError;
use crate::record::{Owner, PipelineRef, Record};
use async_trait::async_trait;

/// Read side: the legacy, non-sharded store
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Number of pipelines owned by a project right now
    async fn count_pipelines(&self, project_id: &str) -> Result<usize, StoreError>;

    /// Page of pipelines ordered by surrogate id
    ///
    /// With a [`Cursor::FromKey`](crate::Cursor::FromKey) cursor only pipelines
    /// whose surrogate id is at least the key are returned.
    async fn list_pipelines(
        &self,
        project_id: &str,
        request: PageRequest,
    ) -> Result<Vec<PipelineRef>, StoreError>;

    /// Page of rows of one domain owned by `owner`, ordered by surrogate id
    async fn fetch_rows(
        &self,
        domain: DomainId,
        owner: &Owner,
        request: PageRequest,
    ) -> Result<Vec<Record>, StoreError>;
}

/// Write side: one shard of the sharded cluster
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Insert a whole page in one atomic batch
    async fn write_rows(&self, domain: DomainId, rows: Vec<Record>) -> Result<(), StoreError>;
}
