//! Error types for shard assignment and cutover

/// Routing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// No data source is eligible for the module (all full, or none tagged)
    #[error("no available shard for {cluster}/{module} (tag: {tag:?})")]
    NoAvailableShard {
        /// Cluster name
        cluster: String,
        /// Module code
        module: String,
        /// Tag filter in effect
        tag: Option<String>,
    },

    /// The cache already holds a pending rule this assignor cannot resolve
    #[error("project {project_id} already has pending routing rule {existing:?}")]
    PendingRouteConflict {
        /// Project being assigned
        project_id: String,
        /// Rule found in the cache
        existing: Option<String>,
    },

    /// The durable registry refused the committed rule
    #[error("routing commit failed ({status}): {message}")]
    RoutingCommitFailed {
        /// Registry status code
        status: i32,
        /// Registry message
        message: String,
    },

    /// Shared cache failure
    #[error("routing cache error: {0}")]
    Cache(String),

    /// Registry transport failure
    #[error("routing registry error: {0}")]
    Registry(String),

    /// Data source catalog failure
    #[error("data source catalog error: {0}")]
    Catalog(String),
}

impl RoutingError {
    /// Check if the error must stop a migration before any copy starts
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoAvailableShard { .. } | Self::PendingRouteConflict { .. }
        )
    }
}
