//! Per-pipeline migration and pipeline discovery

use crate::job::ProgressTracker;
use shardmove_copy::{
    copy_domain, BatchCopier, CopyError, CopyStats, Owner, PipelineRef, SourceStore, TargetStore,
    PIPELINE_DOMAINS,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a pipeline task of one run shares
pub struct PipelineContext {
    pub project_id: String,
    pub source: Arc<dyn SourceStore>,
    pub target: Arc<dyn TargetStore>,
    /// Run-wide cancellation, checked between domains
    pub cancel: CancellationToken,
    pub progress: Arc<ProgressTracker>,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("project_id", &self.project_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Copy every pipeline-scoped domain of one pipeline
///
/// # Errors
/// - `CopyError::Cancelled` when the run is cancelled before a domain starts
/// - the first fetch or write failure; earlier domains stay copied
#[tracing::instrument(skip(ctx, pipeline), fields(project_id = %ctx.project_id, pipeline_id = %pipeline.pipeline_id))]
pub async fn migrate_pipeline(
    ctx: &PipelineContext,
    pipeline: &PipelineRef,
) -> Result<CopyStats, CopyError> {
    let owner = Owner::pipeline(&ctx.project_id, &pipeline.pipeline_id);
    let mut total = CopyStats::default();

    for domain in PIPELINE_DOMAINS {
        if ctx.cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        let stats = copy_domain(ctx.source.as_ref(), ctx.target.as_ref(), domain, &owner).await?;
        ctx.progress.rows_copied(stats.rows);
        total.merge(stats);
    }

    Ok(total)
}

/// Page through a project's pipelines by surrogate id, handing each page to
/// `submit` as it arrives
///
/// Pipelines created during the scan are picked up as long as their
/// surrogate id is past the cursor. `CopyStats::rows` is the number of
/// pipelines submitted.
///
/// # Errors
/// A failed page read, or the first error returned by `submit`.
pub async fn discover_pipelines<S>(
    source: &dyn SourceStore,
    project_id: &str,
    page_size: usize,
    mut submit: S,
) -> Result<CopyStats, CopyError>
where
    S: FnMut(PipelineRef) -> Result<(), CopyError>,
{
    BatchCopier::keyset(page_size)
        .run(
            move |request| async move {
                source
                    .list_pipelines(project_id, request)
                    .await
                    .map_err(CopyError::fetch)
            },
            |page: Vec<PipelineRef>| {
                let submitted = page.into_iter().try_for_each(&mut submit);
                async move { submitted }
            },
        )
        .await
}
