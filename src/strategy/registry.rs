//! Strategy registry: immutable handles plus mutable configuration records.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::config::{clamp_priority, StrategyConfig};
use super::traits::{ExecutionCapability, Strategy};
use crate::error::{OrchestratorError, Result};

/// Immutable handle to a registered strategy.
#[derive(Clone)]
pub struct StrategyHandle {
    pub name: String,
    pub strategy: Arc<dyn Strategy>,
    pub capability: ExecutionCapability,
}

/// Holds every registered strategy for the lifetime of the orchestrator.
///
/// Handles are fixed after construction; configs are written only by the
/// admin surface.
pub struct StrategyRegistry {
    handles: Vec<StrategyHandle>,
    configs: RwLock<HashMap<String, StrategyConfig>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a strategy. Only valid before the registry is shared.
    pub fn register(
        &mut self,
        config: StrategyConfig,
        strategy: Arc<dyn Strategy>,
        capability: ExecutionCapability,
    ) -> Result<()> {
        let config = config.normalized();
        let name = config.name.clone();

        if name.trim().is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "strategy name must not be empty".to_string(),
            ));
        }

        let configs = self.configs.get_mut();
        if configs.contains_key(&name) {
            return Err(OrchestratorError::DuplicateStrategy { name });
        }

        info!(
            strategy = %name,
            capability = %capability.kind(),
            priority = config.priority,
            "Strategy registered"
        );

        configs.insert(name.clone(), config);
        self.handles.push(StrategyHandle {
            name,
            strategy,
            capability,
        });
        Ok(())
    }

    /// All handles in registration order.
    pub fn handles(&self) -> &[StrategyHandle] {
        &self.handles
    }

    pub fn names(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub async fn config(&self, name: &str) -> Result<StrategyConfig> {
        self.configs
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    /// Configs as registered. Needs exclusive access, so only usable
    /// before the registry is shared.
    pub fn registered_configs(&mut self) -> Vec<StrategyConfig> {
        self.configs.get_mut().values().cloned().collect()
    }

    /// Snapshot of every config.
    pub async fn configs(&self) -> HashMap<String, StrategyConfig> {
        self.configs.read().await.clone()
    }

    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut configs = self.configs.write().await;
        let config = configs.get_mut(name).ok_or_else(|| not_found(name))?;
        config.enabled = enabled;
        info!(strategy = %name, enabled, "Strategy enablement changed");
        Ok(())
    }

    /// Set priority, clamped into `[1, 10]`. Returns the stored value.
    pub async fn set_priority(&self, name: &str, priority: i64) -> Result<u8> {
        let mut configs = self.configs.write().await;
        let config = configs.get_mut(name).ok_or_else(|| not_found(name))?;
        config.priority = clamp_priority(priority);
        info!(strategy = %name, requested = priority, priority = config.priority, "Strategy priority changed");
        Ok(config.priority)
    }

    /// Replace a config wholesale. The record keeps its registered name.
    pub async fn replace_config(&self, name: &str, config: StrategyConfig) -> Result<StrategyConfig> {
        let mut configs = self.configs.write().await;
        let slot = configs.get_mut(name).ok_or_else(|| not_found(name))?;
        let mut config = config.normalized();
        config.name = name.to_string();
        *slot = config.clone();
        info!(strategy = %name, "Strategy config replaced");
        Ok(config)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(name: &str) -> OrchestratorError {
    OrchestratorError::StrategyNotFound {
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::paper::PaperStrategy;
    use crate::strategy::CapabilityKind;

    fn registry_with(names: &[&str]) -> StrategyRegistry {
        let mut registry = StrategyRegistry::new();
        for name in names {
            let paper = Arc::new(PaperStrategy::new(*name));
            registry
                .register(
                    StrategyConfig::new(*name),
                    paper.clone(),
                    paper.capability(CapabilityKind::Scanner),
                )
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry_with(&["alpha"]);
        let paper = Arc::new(PaperStrategy::new("alpha"));

        let result = registry.register(
            StrategyConfig::new("alpha"),
            paper.clone(),
            paper.capability(CapabilityKind::Executor),
        );

        assert_eq!(
            result,
            Err(OrchestratorError::DuplicateStrategy {
                name: "alpha".to_string()
            })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registration_normalizes_config() {
        let mut registry = StrategyRegistry::new();
        let paper = Arc::new(PaperStrategy::new("loud"));
        registry
            .register(
                StrategyConfig {
                    priority: 99,
                    ..StrategyConfig::new("loud")
                },
                paper.clone(),
                paper.capability(CapabilityKind::Scanner),
            )
            .unwrap();

        let configs = registry.configs.get_mut();
        assert_eq!(configs["loud"].priority, 10);
    }

    #[tokio::test]
    async fn test_set_priority_clamps() {
        let registry = registry_with(&["alpha"]);

        assert_eq!(registry.set_priority("alpha", 15).await.unwrap(), 10);
        assert_eq!(registry.set_priority("alpha", -3).await.unwrap(), 1);
        assert_eq!(registry.config("alpha").await.unwrap().priority, 1);
    }

    #[tokio::test]
    async fn test_unknown_strategy_errors() {
        let registry = registry_with(&["alpha"]);

        assert!(matches!(
            registry.set_enabled("beta", false).await,
            Err(OrchestratorError::StrategyNotFound { .. })
        ));
        assert!(registry.config("beta").await.is_err());
    }

    #[tokio::test]
    async fn test_replace_config_keeps_name() {
        let registry = registry_with(&["alpha"]);

        let replaced = registry
            .replace_config(
                "alpha",
                StrategyConfig {
                    priority: 8,
                    enabled: false,
                    ..StrategyConfig::new("renamed")
                },
            )
            .await
            .unwrap();

        assert_eq!(replaced.name, "alpha");
        let stored = registry.config("alpha").await.unwrap();
        assert_eq!(stored.priority, 8);
        assert!(!stored.enabled);
    }
}
