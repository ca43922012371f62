//! Error types for store access and batch copies

use crate::domain::DomainId;

/// Errors reported by a source or target store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Store refused the read or write for a domain
    #[error("store rejected {domain}: {reason}")]
    Rejected {
        /// Domain being read or written
        domain: DomainId,
        /// Store-provided reason
        reason: String,
    },

    /// No store is registered under the given data source name
    #[error("unknown data source: {0}")]
    UnknownDataSource(String),
}

impl StoreError {
    /// Check if the failure is transient
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors produced while running a batch copy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CopyError {
    /// A page read failed
    #[error("page fetch failed: {0}")]
    Fetch(#[source] StoreError),

    /// A batch write failed
    #[error("batch write failed: {0}")]
    Write(#[source] StoreError),

    /// The consumer of a page could not accept it
    #[error("page sink closed: {0}")]
    SinkClosed(String),

    /// Copy stopped at a cancellation checkpoint
    #[error("copy cancelled")]
    Cancelled,
}

impl CopyError {
    /// Wrap a store error raised while fetching
    #[inline]
    #[must_use]
    pub fn fetch(err: StoreError) -> Self {
        Self::Fetch(err)
    }

    /// Wrap a store error raised while writing
    #[inline]
    #[must_use]
    pub fn write(err: StoreError) -> Self {
        Self::Write(err)
    }

    /// Check if the copy could succeed when re-run
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) | Self::Write(e) => e.is_retryable(),
            Self::SinkClosed(_) | Self::Cancelled => false,
        }
    }
}
