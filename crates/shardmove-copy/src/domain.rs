//! Data domain catalog
//!
//! Every category of rows owned by a project is a [`DataDomain`]: a table
//! identity, a scope and a paging mode. Domain migrators are nothing more
//! than a [`BatchCopier`](crate::BatchCopier) configured from this catalog.
//!
//! Page sizes follow row width and volume:
//! - wide rows (templates, build details) use 5
//! - callbacks, settings and build history use 100
//! - narrow high-volume rows use 1000

use serde::{Deserialize, Serialize};
use std::fmt;

/// Page size for wide rows
pub const SHORT_PAGE_SIZE: usize = 5;
/// Page size for medium rows
pub const MEDIUM_PAGE_SIZE: usize = 100;
/// Page size for narrow, high-volume rows
pub const LONG_PAGE_SIZE: usize = 1000;

/// Identity of a data domain (one table in the legacy store)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainId {
    // Project-scoped
    AuditResource,
    PipelineGroup,
    PipelineJobMutexGroup,
    PipelineLabel,
    PipelineTransferHistory,
    PipelineView,
    PipelineViewUserLastView,
    PipelineViewUserSettings,
    ProjectPipelineCallback,
    ProjectPipelineCallbackHistory,
    Template,
    TemplatePipeline,
    TemplateTransferHistory,
    PipelineViewGroup,
    PipelineViewTop,
    PipelineRecentUse,

    // Pipeline-scoped
    PipelineInfo,
    PipelineResource,
    PipelineResourceVersion,
    PipelineSetting,
    PipelineSettingVersion,
    PipelineLabelPipeline,
    PipelineFavor,
    PipelineWebhook,
    PipelineBuildSummary,
    PipelineBuildHistory,
    PipelineBuildDetail,
    PipelineBuildTask,
    PipelineBuildVar,
}

impl DomainId {
    /// Table-style name, stable across releases
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuditResource => "audit_resource",
            Self::PipelineGroup => "pipeline_group",
            Self::PipelineJobMutexGroup => "pipeline_job_mutex_group",
            Self::PipelineLabel => "pipeline_label",
            Self::PipelineTransferHistory => "pipeline_transfer_history",
            Self::PipelineView => "pipeline_view",
            Self::PipelineViewUserLastView => "pipeline_view_user_last_view",
            Self::PipelineViewUserSettings => "pipeline_view_user_settings",
            Self::ProjectPipelineCallback => "project_pipeline_callback",
            Self::ProjectPipelineCallbackHistory => "project_pipeline_callback_history",
            Self::Template => "template",
            Self::TemplatePipeline => "template_pipeline",
            Self::TemplateTransferHistory => "template_transfer_history",
            Self::PipelineViewGroup => "pipeline_view_group",
            Self::PipelineViewTop => "pipeline_view_top",
            Self::PipelineRecentUse => "pipeline_recent_use",
            Self::PipelineInfo => "pipeline_info",
            Self::PipelineResource => "pipeline_resource",
            Self::PipelineResourceVersion => "pipeline_resource_version",
            Self::PipelineSetting => "pipeline_setting",
            Self::PipelineSettingVersion => "pipeline_setting_version",
            Self::PipelineLabelPipeline => "pipeline_label_pipeline",
            Self::PipelineFavor => "pipeline_favor",
            Self::PipelineWebhook => "pipeline_webhook",
            Self::PipelineBuildSummary => "pipeline_build_summary",
            Self::PipelineBuildHistory => "pipeline_build_history",
            Self::PipelineBuildDetail => "pipeline_build_detail",
            Self::PipelineBuildTask => "pipeline_build_task",
            Self::PipelineBuildVar => "pipeline_build_var",
        }
    }

    /// Catalog entry for this domain
    #[must_use]
    pub fn domain(&self) -> DataDomain {
        PROJECT_DOMAINS
            .iter()
            .chain(PIPELINE_DOMAINS.iter())
            .copied()
            .find(|d| d.id == *self)
            .unwrap_or(DataDomain::offset(*self, DomainScope::Project, MEDIUM_PAGE_SIZE))
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a domain is migrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainScope {
    /// Once per project, sequentially, by the coordinator
    Project,
    /// Once per pipeline, inside the bounded pool
    Pipeline,
}

/// How pages of a domain are addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Paging {
    /// `LIMIT page_size OFFSET n`
    Offset {
        /// Rows per page
        page_size: usize,
    },
    /// `WHERE id >= cursor ORDER BY id LIMIT page_size`; stable under inserts
    Keyset {
        /// Rows per page
        page_size: usize,
    },
    /// Single read of every row
    Unpaged,
}

impl Paging {
    /// Requested rows per page, `None` when unpaged
    #[inline]
    #[must_use]
    pub fn page_size(&self) -> Option<usize> {
        match self {
            Self::Offset { page_size } | Self::Keyset { page_size } => Some(*page_size),
            Self::Unpaged => None,
        }
    }
}

/// Catalog entry for one data domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDomain {
    /// Table identity
    pub id: DomainId,
    /// Project or pipeline scope
    pub scope: DomainScope,
    /// Paging mode and page size
    pub paging: Paging,
}

impl DataDomain {
    /// Offset-paged domain
    #[inline]
    #[must_use]
    pub const fn offset(id: DomainId, scope: DomainScope, page_size: usize) -> Self {
        Self {
            id,
            scope,
            paging: Paging::Offset { page_size },
        }
    }

    /// Keyset-paged domain
    #[inline]
    #[must_use]
    pub const fn keyset(id: DomainId, scope: DomainScope, page_size: usize) -> Self {
        Self {
            id,
            scope,
            paging: Paging::Keyset { page_size },
        }
    }

    /// Domain read in a single fetch
    #[inline]
    #[must_use]
    pub const fn unpaged(id: DomainId, scope: DomainScope) -> Self {
        Self {
            id,
            scope,
            paging: Paging::Unpaged,
        }
    }

    /// Copier configured for this domain
    #[inline]
    #[must_use]
    pub fn copier(&self) -> crate::BatchCopier {
        crate::BatchCopier::new(self.paging)
    }
}

use DomainScope::{Pipeline as P, Project as J};

/// Project-scoped domains, in migration order
pub const PROJECT_DOMAINS: &[DataDomain] = &[
    DataDomain::offset(DomainId::AuditResource, J, LONG_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineGroup, J, LONG_PAGE_SIZE),
    DataDomain::unpaged(DomainId::PipelineJobMutexGroup, J),
    DataDomain::offset(DomainId::PipelineLabel, J, LONG_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineTransferHistory, J, LONG_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineView, J, LONG_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineViewUserLastView, J, LONG_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineViewUserSettings, J, LONG_PAGE_SIZE),
    DataDomain::offset(DomainId::ProjectPipelineCallback, J, MEDIUM_PAGE_SIZE),
    DataDomain::offset(DomainId::ProjectPipelineCallbackHistory, J, MEDIUM_PAGE_SIZE),
    DataDomain::offset(DomainId::Template, J, SHORT_PAGE_SIZE),
    DataDomain::offset(DomainId::TemplatePipeline, J, SHORT_PAGE_SIZE),
    DataDomain::offset(DomainId::TemplateTransferHistory, J, LONG_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineViewGroup, J, LONG_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineViewTop, J, LONG_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineRecentUse, J, LONG_PAGE_SIZE),
];

/// Pipeline-scoped domains, copied by each pipeline task
pub const PIPELINE_DOMAINS: &[DataDomain] = &[
    DataDomain::offset(DomainId::PipelineInfo, P, MEDIUM_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineResource, P, MEDIUM_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineResourceVersion, P, SHORT_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineSetting, P, MEDIUM_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineSettingVersion, P, MEDIUM_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineLabelPipeline, P, MEDIUM_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineFavor, P, MEDIUM_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineWebhook, P, MEDIUM_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineBuildSummary, P, MEDIUM_PAGE_SIZE),
    DataDomain::keyset(DomainId::PipelineBuildHistory, P, MEDIUM_PAGE_SIZE),
    DataDomain::keyset(DomainId::PipelineBuildDetail, P, SHORT_PAGE_SIZE),
    DataDomain::keyset(DomainId::PipelineBuildTask, P, LONG_PAGE_SIZE),
    DataDomain::offset(DomainId::PipelineBuildVar, P, LONG_PAGE_SIZE),
];
