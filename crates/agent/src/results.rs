//! Result acceptance: schema validation plus canonical deduplication.

use reagent_core::schema;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

/// What happened to an offered result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Duplicate,
    /// Failed schema validation; holds the violation messages.
    Rejected(Vec<String>),
}

/// Accepted results of one run, in acceptance order.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    schema: Option<Value>,
    results: Vec<Value>,
    seen: HashSet<String>,
}

impl ResultStore {
    pub fn new(schema: Option<Value>) -> Self {
        Self {
            schema,
            results: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    /// Replace the schema. Already accepted results are kept.
    pub fn set_schema(&mut self, schema: Option<Value>) {
        self.schema = schema;
    }

    /// Validate `value` and keep it unless it duplicates an accepted result.
    pub fn offer(&mut self, value: Value) -> Offer {
        if let Some(schema) = &self.schema {
            let violations = schema::validate(&value, schema);
            if !violations.is_empty() {
                warn!(
                    violations = %violations.join("; "),
                    "Result failed schema validation, dropping"
                );
                return Offer::Rejected(violations);
            }
        }

        let key = canonical_json(&value);
        if !self.seen.insert(key) {
            debug!("Duplicate result ignored");
            return Offer::Duplicate;
        }

        self.results.push(value);
        Offer::Accepted
    }

    /// Remove results that serialize identically once keys are sorted,
    /// keeping the first occurrence. Returns how many were removed.
    pub fn deduplicate(&mut self) -> usize {
        let before = self.results.len();
        let mut seen = HashSet::with_capacity(before);
        self.results.retain(|v| seen.insert(canonical_json(v)));
        self.seen = seen;
        before - self.results.len()
    }

    pub fn results(&self) -> &[Value] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.seen.clear();
    }

    pub fn into_results(self) -> Vec<Value> {
        self.results
    }
}

/// Serialize with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
