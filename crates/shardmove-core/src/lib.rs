//! shardmove Core - project migration coordinator
//!
//! Moves all data of one project from the legacy store onto a shard while
//! the system stays live:
//! - Assigns a target shard and records a pending routing rule
//! - Copies pipeline-scoped domains on a bounded pool of pipeline tasks
//! - Copies project-scoped domains sequentially
//! - Waits for every pipeline task, then cuts routing over
//!
//! Each trigger becomes a [`MigrationJob`] tracked by the [`JobRegistry`].
//!
//! # Example
//!
//! ```rust,ignore
//! use shardmove_core::{InMemoryWorld, MigrationConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), shardmove_core::MigrationError> {
//! let world = InMemoryWorld::new(MigrationConfig::new(), &["ds_0", "ds_1"], None);
//! world.seed_project("p1", 3, 10);
//!
//! let ticket = world
//!     .coordinator
//!     .migrate_project("admin", "p1", CancellationToken::new(), None)
//!     .await?;
//! let job = ticket.wait().await?;
//!
//! println!("{} -> {}", job.project_id, job.status);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod completion;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod pipeline_pool;
pub mod registry;
pub mod simulate;

pub use completion::{CompletionGuard, CompletionLatch, LatchState};
pub use config::MigrationConfig;
pub use coordinator::{JobTicket, MigrationCoordinator};
pub use error::{JobError, MigrationError};
pub use job::{JobId, JobProgress, JobStatus, MigrationJob, ProgressTracker, StatusChange};
pub use pipeline::{discover_pipelines, migrate_pipeline, PipelineContext};
pub use pipeline_pool::{PipelinePool, PipelineTask, PoolStats};
pub use registry::{JobEvent, JobRegistry, RegisteredJob};
pub use simulate::{run_simulation, InMemoryWorld, SimulationOptions, SimulationReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with shardmove Core
    pub use crate::{
        JobEvent, JobId, JobRegistry, JobStatus, JobTicket, MigrationConfig,
        MigrationCoordinator, MigrationError, MigrationJob,
    };
    pub use shardmove_routing::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
