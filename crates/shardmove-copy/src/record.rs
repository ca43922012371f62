//! Row and pipeline types moved by the copier

use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything that can drive a surrogate-id cursor
pub trait CursorKey {
    /// Monotonically increasing key of this row
    fn cursor_key(&self) -> u64;
}

/// One row of a data domain
///
/// Rows are opaque to the copier apart from their surrogate id, which keyset
/// pagination uses as its cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Surrogate id in the legacy store
    pub id: u64,
    /// Owning project
    pub project_id: String,
    /// Owning pipeline for pipeline-scoped domains
    pub pipeline_id: Option<String>,
    /// Column values
    pub payload: serde_json::Value,
}

impl Record {
    /// Create a project-level row
    #[inline]
    #[must_use]
    pub fn new(id: u64, project_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id,
            project_id: project_id.into(),
            pipeline_id: None,
            payload,
        }
    }

    /// Attach the row to a pipeline
    #[inline]
    #[must_use]
    pub fn for_pipeline(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }

    /// Check whether the row belongs to `owner`
    #[must_use]
    pub fn is_owned_by(&self, owner: &Owner) -> bool {
        self.project_id == owner.project_id
            && match &owner.pipeline_id {
                Some(pipeline_id) => self.pipeline_id.as_deref() == Some(pipeline_id.as_str()),
                None => true,
            }
    }
}

impl CursorKey for Record {
    #[inline]
    fn cursor_key(&self) -> u64 {
        self.id
    }
}

/// A pipeline as seen by discovery
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRef {
    /// Opaque pipeline id
    pub pipeline_id: String,
    /// Internal auto-increment id used as the discovery cursor
    pub surrogate_id: u64,
}

impl PipelineRef {
    #[inline]
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>, surrogate_id: u64) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            surrogate_id,
        }
    }
}

impl CursorKey for PipelineRef {
    #[inline]
    fn cursor_key(&self) -> u64 {
        self.surrogate_id
    }
}

impl fmt::Display for PipelineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.pipeline_id, self.surrogate_id)
    }
}

/// Scope of a domain read: a whole project, or one pipeline inside it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    /// Project id
    pub project_id: String,
    /// Pipeline id, set for pipeline-scoped reads
    pub pipeline_id: Option<String>,
}

impl Owner {
    /// Project-level scope
    #[inline]
    #[must_use]
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            pipeline_id: None,
        }
    }

    /// Pipeline-level scope
    #[inline]
    #[must_use]
    pub fn pipeline(project_id: impl Into<String>, pipeline_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            pipeline_id: Some(pipeline_id.into()),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pipeline_id {
            Some(pipeline_id) => write!(f, "{}/{}", self.project_id, pipeline_id),
            None => f.write_str(&self.project_id),
        }
    }
}
