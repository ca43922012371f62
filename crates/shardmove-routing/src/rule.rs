//! Routing keys and rules

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of the cache keys that hold pending (migrating) routing rules
pub const MIGRATING_ROUTING_KEY_PREFIX: &str = "MIGRATING_SHARDING_ROUTING_RULE";

/// Which routing table a rule lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingScope {
    /// Database cluster
    pub cluster_name: String,
    /// Owning system module
    pub module_code: String,
    /// Rule type (`DB`, `TABLE`)
    pub rule_type: String,
}

impl RoutingScope {
    #[inline]
    #[must_use]
    pub fn new(
        cluster_name: impl Into<String>,
        module_code: impl Into<String>,
        rule_type: impl Into<String>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            module_code: module_code.into(),
            rule_type: rule_type.into(),
        }
    }

    /// Key for one routing name (project) in this scope
    #[inline]
    #[must_use]
    pub fn key_for(&self, routing_name: impl Into<String>) -> RoutingKey {
        RoutingKey {
            scope: self.clone(),
            routing_name: routing_name.into(),
        }
    }
}

/// `(cluster, module, rule type, routing name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey {
    /// Routing table
    pub scope: RoutingScope,
    /// Project id
    pub routing_name: String,
}

impl RoutingKey {
    /// Shared-cache key of the pending rule for this project
    #[must_use]
    pub fn migrating_cache_key(&self) -> String {
        format!(
            "{MIGRATING_ROUTING_KEY_PREFIX}:{}:{}:{}:{}",
            self.scope.cluster_name, self.scope.module_code, self.scope.rule_type, self.routing_name
        )
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.scope.cluster_name, self.scope.module_code, self.scope.rule_type, self.routing_name
        )
    }
}

/// Committed routing rule as stored by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingRoutingRule {
    pub cluster_name: String,
    pub module_code: String,
    pub data_source_name: String,
    pub rule_type: String,
    pub routing_name: String,
    pub routing_rule: String,
}

impl ShardingRoutingRule {
    /// Rule routing `key` to `data_source_name`
    #[must_use]
    pub fn new(key: &RoutingKey, data_source_name: impl Into<String>) -> Self {
        let data_source_name = data_source_name.into();
        Self {
            cluster_name: key.scope.cluster_name.clone(),
            module_code: key.scope.module_code.clone(),
            routing_rule: data_source_name.clone(),
            data_source_name,
            rule_type: key.scope.rule_type.clone(),
            routing_name: key.routing_name.clone(),
        }
    }

    /// Key this rule is stored under
    #[must_use]
    pub fn key(&self) -> RoutingKey {
        RoutingScope::new(&self.cluster_name, &self.module_code, &self.rule_type)
            .key_for(&self.routing_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_layout() {
        let key = RoutingScope::new("prod", "PROCESS", "DB").key_for("proj-1");
        assert_eq!(
            key.migrating_cache_key(),
            "MIGRATING_SHARDING_ROUTING_RULE:prod:PROCESS:DB:proj-1"
        );
    }

    #[test]
    fn rule_round_trips_its_key() {
        let key = RoutingScope::new("prod", "PROCESS", "DB").key_for("proj-1");
        let rule = ShardingRoutingRule::new(&key, "ds_2");
        assert_eq!(rule.key(), key);
        assert_eq!(rule.routing_rule, "ds_2");
    }
}
