//! shardmove Routing - shard assignment and routing cutover
//!
//! Routing is two-phase:
//! - [`RoutingAssignor`] picks a target shard and writes a *pending* rule to
//!   the shared [`RoutingCache`] with set-if-absent
//! - [`RoutingCutover`] evicts the pending rule and commits the final one to
//!   the durable [`RoutingRegistry`]
//!
//! Between the two, readers keep resolving the project through its old
//! committed rule.

pub mod assignor;
pub mod cache;
pub mod cutover;
pub mod datasource;
pub mod error;
pub mod registry;
pub mod rule;

pub use assignor::{RoutingAssignment, RoutingAssignor, MIGRATING_DATA_SOURCE_NAME_PREFIX};
pub use cache::{CacheStats, MokaRoutingCache, RoutingCache};
pub use cutover::{CutoverOutcome, RoutingCutover};
pub use datasource::{
    DataSource, DataSourceCatalog, InMemoryDataSourceCatalog, ShardResolver, StaticShardResolver,
};
pub use error::RoutingError;
pub use registry::{InMemoryRoutingRegistry, RegistryResponse, RoutingRegistry};
pub use rule::{RoutingKey, RoutingScope, ShardingRoutingRule, MIGRATING_ROUTING_KEY_PREFIX};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        CutoverOutcome, RoutingAssignment, RoutingAssignor, RoutingCache, RoutingCutover,
        RoutingError, RoutingKey, RoutingRegistry, RoutingScope, ShardingRoutingRule,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
