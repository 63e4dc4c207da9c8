//! Caller identity handed to tools.
//!
//! The identity context travels from the host application to every tool call
//! (for permission checks, per-user quotas, audit trails). It is never
//! rendered into a prompt or a conversation message, so the model cannot see
//! or forge it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque key/value identity passed to [`Tool::call`](crate::tool::Tool::call).
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityContext(Map<String, Value>);

impl IdentityContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one attribute.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for IdentityContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// Values may be credentials; only keys are printed.
impl std::fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityContext")
            .field("keys", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_lookup() {
        let identity = IdentityContext::new()
            .with("user_id", "u-42")
            .with("role", "analyst");
        assert_eq!(identity.get("user_id"), Some(&Value::from("u-42")));
        assert!(identity.get("missing").is_none());
        assert!(!identity.is_empty());
    }

    #[test]
    fn debug_output_redacts_values() {
        let identity = IdentityContext::new().with("api_token", "secret-value");
        let printed = format!("{identity:?}");
        assert!(printed.contains("api_token"));
        assert!(!printed.contains("secret-value"));
    }
}
