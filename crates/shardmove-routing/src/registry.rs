//! Durable routing registry seam
//!
//! Committed rules are owned by another service. The cutover talks to it
//! through this trait, injected at construction time.

use crate::error::RoutingError;
use crate::rule::{RoutingKey, ShardingRoutingRule};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Status envelope returned by the registry service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryResponse {
    /// `0` on success
    pub status: i32,
    /// Error message, when any
    pub message: Option<String>,
}

impl RegistryResponse {
    /// Successful response
    #[inline]
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: 0,
            message: None,
        }
    }

    /// Failed response
    #[inline]
    #[must_use]
    pub fn error(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// Durable registry of committed routing rules
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoutingRegistry: Send + Sync {
    /// Create or replace the committed rule for `rule.key()`
    ///
    /// A non-ok response is a refusal, not a transport error.
    async fn update_routing_rule(
        &self,
        user_id: &str,
        rule: ShardingRoutingRule,
    ) -> Result<RegistryResponse, RoutingError>;

    /// Committed rule for a key
    async fn get_routing_rule(
        &self,
        key: &RoutingKey,
    ) -> Result<Option<ShardingRoutingRule>, RoutingError>;
}

/// Registry held in memory
#[derive(Debug, Default)]
pub struct InMemoryRoutingRegistry {
    rules: DashMap<RoutingKey, ShardingRoutingRule>,
    updates: AtomicUsize,
    refusal: Mutex<Option<RegistryResponse>>,
}

impl InMemoryRoutingRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a committed rule directly (pre-migration state)
    pub fn seed(&self, rule: ShardingRoutingRule) {
        self.rules.insert(rule.key(), rule);
    }

    /// Answer every following update with `response`
    pub fn refuse_updates(&self, response: RegistryResponse) {
        *self.refusal.lock() = Some(response);
    }

    /// Committed rule for a key, without going through the trait
    #[must_use]
    pub fn rule(&self, key: &RoutingKey) -> Option<ShardingRoutingRule> {
        self.rules.get(key).map(|r| r.clone())
    }

    /// Updates accepted or refused so far
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingRegistry for InMemoryRoutingRegistry {
    async fn update_routing_rule(
        &self,
        user_id: &str,
        rule: ShardingRoutingRule,
    ) -> Result<RegistryResponse, RoutingError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(refusal) = self.refusal.lock().clone() {
            return Ok(refusal);
        }
        tracing::debug!(user_id, key = %rule.key(), data_source = %rule.data_source_name, "routing rule updated");
        self.rules.insert(rule.key(), rule);
        Ok(RegistryResponse::ok())
    }

    async fn get_routing_rule(
        &self,
        key: &RoutingKey,
    ) -> Result<Option<ShardingRoutingRule>, RoutingError> {
        Ok(self.rule(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RoutingScope;

    #[tokio::test]
    async fn update_replaces_rule() {
        let registry = InMemoryRoutingRegistry::new();
        let key = RoutingScope::new("prod", "PROCESS", "DB").key_for("p1");
        registry.seed(ShardingRoutingRule::new(&key, "legacy"));

        let response = registry
            .update_routing_rule("admin", ShardingRoutingRule::new(&key, "ds_1"))
            .await
            .unwrap();

        assert!(response.is_ok());
        let rule = registry.get_routing_rule(&key).await.unwrap().unwrap();
        assert_eq!(rule.data_source_name, "ds_1");
    }

    #[tokio::test]
    async fn refusal_leaves_rule_untouched() {
        let registry = InMemoryRoutingRegistry::new();
        let key = RoutingScope::new("prod", "PROCESS", "DB").key_for("p1");
        registry.seed(ShardingRoutingRule::new(&key, "legacy"));
        registry.refuse_updates(RegistryResponse::error(500, "busy"));

        let response = registry
            .update_routing_rule("admin", ShardingRoutingRule::new(&key, "ds_1"))
            .await
            .unwrap();

        assert!(!response.is_ok());
        assert_eq!(registry.rule(&key).unwrap().data_source_name, "legacy");
        assert_eq!(registry.update_count(), 1);
    }
}
