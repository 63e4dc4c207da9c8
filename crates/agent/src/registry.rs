//! Alias-keyed tool registry.
//!
//! Every successful mutation bumps [`ToolRegistry::generation`]; the prompt
//! renderer compares generations to decide whether its cached prompt is
//! stale.

use reagent_core::error::RegistryError;
use reagent_core::tool::{Tool, ToolDescriptor};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Summary row returned by [`ToolRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSummary {
    pub alias: String,
    pub name: String,
    pub description: String,
}

/// The set of tools available to a loop, keyed by alias.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    generation: u64,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of tools.
    ///
    /// If any alias appears twice within `tools`, nothing is registered and
    /// the duplicates are reported. Otherwise each tool is inserted, replacing
    /// any existing tool with the same alias. Returns the descriptors of the
    /// inserted tools, in batch order.
    pub fn register(
        &mut self,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<Vec<ToolDescriptor>, RegistryError> {
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for tool in &tools {
            if !seen.insert(tool.alias().to_string()) {
                duplicates.insert(tool.alias().to_string());
            }
        }
        if !duplicates.is_empty() {
            return Err(RegistryError::DuplicateAliases(
                duplicates.into_iter().collect(),
            ));
        }

        let mut added = Vec::with_capacity(tools.len());
        for tool in tools {
            let alias = tool.alias().to_string();
            if self.tools.contains_key(&alias) {
                warn!(alias = %alias, "Tool already registered, overwriting");
            }
            info!(alias = %alias, name = tool.name(), "Registered tool");
            added.push(tool.descriptor());
            self.tools.insert(alias, tool);
        }

        if !added.is_empty() {
            self.generation += 1;
        }
        Ok(added)
    }

    /// Remove a tool. Unknown aliases are ignored with a warning.
    pub fn unregister(&mut self, alias: &str) -> Option<Arc<dyn Tool>> {
        match self.tools.remove(alias) {
            Some(tool) => {
                info!(alias, "Unregistered tool");
                self.generation += 1;
                Some(tool)
            }
            None => {
                warn!(alias, "Attempted to unregister non-existent tool");
                None
            }
        }
    }

    /// Replace the tool under `alias` with a copy built from `config`.
    pub fn update_config(&mut self, alias: &str, config: Value) -> Result<(), RegistryError> {
        let current = self
            .tools
            .get(alias)
            .ok_or_else(|| RegistryError::UnknownAlias(alias.to_string()))?;

        let replacement = current
            .reconfigure(config)
            .map_err(|source| RegistryError::Reconfigure {
                alias: alias.to_string(),
                source,
            })?;

        if replacement.alias() != alias {
            warn!(
                alias,
                reported = replacement.alias(),
                "Reconfigured tool reports a different alias; keeping registry key"
            );
        }
        self.tools.insert(alias.to_string(), replacement);
        self.generation += 1;
        info!(alias, "Updated configuration for tool");
        Ok(())
    }

    /// Get a tool by alias.
    pub fn get(&self, alias: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(alias).cloned()
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.tools.contains_key(alias)
    }

    /// Current configuration of a tool.
    pub fn config_of(&self, alias: &str) -> Option<Value> {
        self.tools.get(alias).map(|t| t.config())
    }

    /// Registered aliases, sorted.
    pub fn aliases(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Descriptors for every registered tool, sorted by alias.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|(alias, tool)| {
                let mut descriptor = tool.descriptor();
                descriptor.alias = alias.clone();
                descriptor
            })
            .collect()
    }

    /// Alias, declared name, and short description of every tool.
    pub fn list(&self) -> Vec<ToolSummary> {
        self.tools
            .iter()
            .map(|(alias, tool)| ToolSummary {
                alias: alias.clone(),
                name: tool.name().to_string(),
                description: tool.short_description().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Mutation counter used for prompt cache invalidation.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("aliases", &self.aliases())
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{CalcTool, FailingTool};
    use serde_json::json;

    fn calc(alias: &str) -> Arc<dyn Tool> {
        Arc::new(CalcTool::with_alias(alias))
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ToolRegistry::new();
        let added = registry.register(vec![calc("calc"), calc("calc_precise")]).unwrap();
        assert_eq!(added.len(), 2);
        assert!(registry.get("calc").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.aliases(), vec!["calc", "calc_precise"]);
        assert_eq!(registry.generation(), 1);
    }

    #[test]
    fn duplicate_batch_is_rejected_atomically() {
        let mut registry = ToolRegistry::new();
        registry.register(vec![calc("existing")]).unwrap();
        let before = registry.generation();

        let err = registry
            .register(vec![calc("a"), calc("b"), calc("a")])
            .unwrap_err();

        match err {
            RegistryError::DuplicateAliases(dups) => assert_eq!(dups, vec!["a".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.aliases(), vec!["existing"]);
        assert_eq!(registry.generation(), before);
    }

    #[test]
    fn reregistering_an_alias_overwrites() {
        let mut registry = ToolRegistry::new();
        registry.register(vec![calc("tool")]).unwrap();
        registry
            .register(vec![Arc::new(FailingTool::new("tool", "boom"))])
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("tool").unwrap().name(), "failing");
        assert_eq!(registry.generation(), 2);
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let mut registry = ToolRegistry::new();
        registry.register(vec![calc("calc")]).unwrap();
        let before = registry.generation();
        assert!(registry.unregister("ghost").is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.generation(), before);

        assert!(registry.unregister("calc").is_some());
        assert!(registry.is_empty());
        assert_eq!(registry.generation(), before + 1);
    }

    #[test]
    fn update_config_replaces_instance() {
        let mut registry = ToolRegistry::new();
        registry.register(vec![calc("calc")]).unwrap();
        assert_eq!(registry.config_of("calc"), Some(json!({"precision": 2})));

        registry.update_config("calc", json!({"precision": 6})).unwrap();
        assert_eq!(registry.config_of("calc"), Some(json!({"precision": 6})));
        assert_eq!(registry.generation(), 2);
    }

    #[test]
    fn update_config_errors() {
        let mut registry = ToolRegistry::new();
        assert!(matches!(
            registry.update_config("missing", json!({})),
            Err(RegistryError::UnknownAlias(_))
        ));

        registry.register(vec![calc("calc")]).unwrap();
        let err = registry
            .update_config("calc", json!({"precision": "high"}))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Reconfigure { .. }));
        assert_eq!(registry.config_of("calc"), Some(json!({"precision": 2})));

        registry
            .register(vec![Arc::new(FailingTool::new("fragile", "boom"))])
            .unwrap();
        assert!(registry.update_config("fragile", json!({})).is_err());
    }

    #[test]
    fn list_and_descriptors() {
        let mut registry = ToolRegistry::new();
        registry.register(vec![calc("math")]).unwrap();
        let list = registry.list();
        assert_eq!(list[0].alias, "math");
        assert_eq!(list[0].name, "calculator");
        let descriptors = registry.descriptors();
        assert_eq!(descriptors[0].alias, "math");
        assert!(descriptors[0].example_input.contains_key("expression"));
    }
}
