//! shardmove Copy - paginated domain copies
//!
//! The leaf layer of a project migration:
//! - Row and pipeline types ([`Record`], [`PipelineRef`], [`Owner`])
//! - The data domain catalog ([`PROJECT_DOMAINS`], [`PIPELINE_DOMAINS`])
//! - The [`BatchCopier`] loop every domain migrator is configured from
//! - Store seams ([`SourceStore`], [`TargetStore`]) and in-memory stores
//!
//! # Example
//!
//! ```rust,ignore
//! use shardmove_copy::{copy_domain, DomainId, MemorySourceStore, MemoryTargetStore, Owner};
//!
//! # async fn example() -> Result<(), shardmove_copy::CopyError> {
//! let source = MemorySourceStore::new();
//! let target = MemoryTargetStore::new();
//! source.insert_rows(DomainId::Template, &Owner::project("p1"), 12);
//!
//! let stats = copy_domain(&source, &target, &DomainId::Template.domain(), &Owner::project("p1")).await?;
//! assert_eq!(stats.fetches, 3);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod copier;
pub mod domain;
pub mod error;
pub mod memory;
pub mod record;
pub mod store;

pub use copier::{copy_domain, BatchCopier, CopyStats, Cursor, PageRequest};
pub use domain::{
    DataDomain, DomainId, DomainScope, Paging, LONG_PAGE_SIZE, MEDIUM_PAGE_SIZE,
    PIPELINE_DOMAINS, PROJECT_DOMAINS, SHORT_PAGE_SIZE,
};
pub use error::{CopyError, StoreError};
pub use memory::{MemorySourceStore, MemoryTargetStore};
pub use record::{CursorKey, Owner, PipelineRef, Record};
pub use store::{SourceStore, TargetStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
