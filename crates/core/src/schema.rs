//! JSON Schema helpers shared by tools, the prompt renderer, and result validation.
//!
//! Two operations:
//! - [`example_input`] walks a schema's declared properties and builds a
//!   representative input object for prompt documentation.
//! - [`validate`] checks a value against the subset of JSON Schema the
//!   engine relies on (`type`, `required`, `properties`,
//!   `additionalProperties`, `items`, `enum`, `const`, numeric and length
//!   bounds, `anyOf` / `oneOf` / `allOf`).

use serde_json::{Map, Value, json};

/// Build an example input object from an object schema.
///
/// Preference per property: explicit `default`, then the first `enum` value,
/// then a representative value for the declared type. Untyped required
/// properties get a `<name>` placeholder; untyped optional ones are skipped.
pub fn example_input(schema: &Value) -> Map<String, Value> {
    let mut example = Map::new();
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return example;
    };
    let required = required_fields(schema);

    for (name, field) in properties {
        if let Some(value) = example_value(name, field) {
            example.insert(name.clone(), value);
        } else if required.iter().any(|r| r == name) {
            example.insert(name.clone(), Value::String(format!("<{name}>")));
        }
    }
    example
}

fn example_value(name: &str, field: &Value) -> Option<Value> {
    if let Some(default) = field.get("default") {
        return Some(default.clone());
    }
    if let Some(first) = field
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|values| values.first())
    {
        return Some(first.clone());
    }

    let value = match primary_type(field)? {
        "string" => match field.get("format").and_then(Value::as_str) {
            Some("uri") | Some("url") => json!("https://example.com"),
            _ => Value::String(format!("example_{name}")),
        },
        "integer" => json!(10),
        "number" => json!(10.0),
        "boolean" => json!(true),
        "array" => {
            let item_type = field
                .get("items")
                .and_then(primary_type)
                .unwrap_or("string");
            if item_type == "string" {
                json!(["item1", "item2"])
            } else {
                json!([])
            }
        }
        "object" => json!({}),
        _ => return None,
    };
    Some(value)
}

/// First non-null declared type (`"type": "x"` or `"type": ["x", "null"]`).
fn primary_type(field: &Value) -> Option<&str> {
    match field.get("type")? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

/// Names listed under `required`.
pub fn required_fields(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Validate `value` against `schema`, returning every violation found.
///
/// An empty vector means the value is valid.
pub fn validate(value: &Value, schema: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    validate_at("$", value, schema, &mut errors);
    errors
}

/// Convenience wrapper over [`validate`].
pub fn is_valid(value: &Value, schema: &Value) -> bool {
    validate(value, schema).is_empty()
}

/// JSON Schema type name of a value. Integral numbers report `integer`.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(n) if n.as_f64().is_some_and(|f| f.fract() == 0.0) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    let actual = json_type_name(value);
    actual == expected || (expected == "number" && actual == "integer")
}

fn validate_at(path: &str, value: &Value, schema: &Value, errors: &mut Vec<String>) {
    // `true` / `{}` accept everything; `false` rejects everything.
    let schema = match schema {
        Value::Bool(true) => return,
        Value::Bool(false) => {
            errors.push(format!("{path}: no value is allowed here"));
            return;
        }
        Value::Object(map) => map,
        _ => return,
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(types) => types.iter().filter_map(Value::as_str).collect(),
            _ => vec![],
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(value, t)) {
            errors.push(format!(
                "{path}: expected {}, got {}",
                allowed.join(" or "),
                json_type_name(value)
            ));
            return;
        }
    }

    if let Some(options) = schema.get("enum").and_then(Value::as_array)
        && !options.contains(value)
    {
        errors.push(format!("{path}: value is not one of the allowed enum values"));
    }

    if let Some(constant) = schema.get("const")
        && constant != value
    {
        errors.push(format!("{path}: value does not equal the required constant"));
    }

    match value {
        Value::Number(n) => validate_number(path, n.as_f64().unwrap_or_default(), schema, errors),
        Value::String(s) => validate_string(path, s, schema, errors),
        Value::Array(items) => validate_array(path, items, schema, errors),
        Value::Object(fields) => validate_object(path, fields, schema, errors),
        _ => {}
    }

    validate_combinators(path, value, schema, errors);
}

fn validate_number(path: &str, n: f64, schema: &Map<String, Value>, errors: &mut Vec<String>) {
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
        && n < min
    {
        errors.push(format!("{path}: {n} is less than the minimum {min}"));
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
        && n > max
    {
        errors.push(format!("{path}: {n} is greater than the maximum {max}"));
    }
}

fn validate_string(path: &str, s: &str, schema: &Map<String, Value>, errors: &mut Vec<String>) {
    let len = s.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64)
        && len < min
    {
        errors.push(format!("{path}: string shorter than {min} characters"));
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64)
        && len > max
    {
        errors.push(format!("{path}: string longer than {max} characters"));
    }
}

fn validate_array(path: &str, items: &[Value], schema: &Map<String, Value>, errors: &mut Vec<String>) {
    let len = items.len() as u64;
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64)
        && len < min
    {
        errors.push(format!("{path}: expected at least {min} items, got {len}"));
    }
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64)
        && len > max
    {
        errors.push(format!("{path}: expected at most {max} items, got {len}"));
    }
    if let Some(item_schema) = schema.get("items") {
        for (idx, item) in items.iter().enumerate() {
            validate_at(&format!("{path}[{idx}]"), item, item_schema, errors);
        }
    }
}

fn validate_object(
    path: &str,
    fields: &Map<String, Value>,
    schema: &Map<String, Value>,
    errors: &mut Vec<String>,
) {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                errors.push(format!("{path}: missing required field '{name}'"));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    if let Some(properties) = properties {
        for (name, prop_schema) in properties {
            if let Some(field) = fields.get(name) {
                validate_at(&format!("{path}.{name}"), field, prop_schema, errors);
            }
        }
    }

    match schema.get("additionalProperties") {
        Some(Value::Bool(false)) => {
            for name in fields.keys() {
                if !properties.is_some_and(|p| p.contains_key(name)) {
                    errors.push(format!("{path}: unexpected field '{name}'"));
                }
            }
        }
        Some(extra @ Value::Object(_)) => {
            for (name, field) in fields {
                if !properties.is_some_and(|p| p.contains_key(name)) {
                    validate_at(&format!("{path}.{name}"), field, extra, errors);
                }
            }
        }
        _ => {}
    }
}

fn validate_combinators(
    path: &str,
    value: &Value,
    schema: &Map<String, Value>,
    errors: &mut Vec<String>,
) {
    if let Some(all) = schema.get("allOf").and_then(Value::as_array) {
        for sub in all {
            validate_at(path, value, sub, errors);
        }
    }
    if let Some(any) = schema.get("anyOf").and_then(Value::as_array)
        && !any.iter().any(|sub| validate(value, sub).is_empty())
    {
        errors.push(format!("{path}: value matches none of the anyOf schemas"));
    }
    if let Some(one) = schema.get("oneOf").and_then(Value::as_array) {
        let matching = one.iter().filter(|sub| validate(value, sub).is_empty()).count();
        if matching != 1 {
            errors.push(format!(
                "{path}: value must match exactly one oneOf schema, matched {matching}"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_prefers_default_then_enum() {
        let schema = json!({
            "type": "object",
            "properties": {
                "precision": { "type": "integer", "default": 4 },
                "mode": { "type": "string", "enum": ["fast", "exact"] },
                "expression": { "type": "string" }
            },
            "required": ["expression"]
        });
        let example = example_input(&schema);
        assert_eq!(example["precision"], json!(4));
        assert_eq!(example["mode"], json!("fast"));
        assert_eq!(example["expression"], json!("example_expression"));
    }

    #[test]
    fn example_covers_every_declared_type() {
        let schema = json!({
            "type": "object",
            "properties": {
                "count": { "type": "integer" },
                "ratio": { "type": "number" },
                "strict": { "type": "boolean" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "scores": { "type": "array", "items": { "type": "number" } },
                "filters": { "type": "object" },
                "url": { "type": "string", "format": "uri" },
                "note": { "type": ["string", "null"] }
            }
        });
        let example = example_input(&schema);
        assert_eq!(example["count"], json!(10));
        assert_eq!(example["ratio"], json!(10.0));
        assert_eq!(example["strict"], json!(true));
        assert_eq!(example["tags"], json!(["item1", "item2"]));
        assert_eq!(example["scores"], json!([]));
        assert_eq!(example["filters"], json!({}));
        assert_eq!(example["url"], json!("https://example.com"));
        assert_eq!(example["note"], json!("example_note"));
    }

    #[test]
    fn untyped_required_field_gets_placeholder() {
        let schema = json!({
            "properties": { "payload": {}, "hint": {} },
            "required": ["payload"]
        });
        let example = example_input(&schema);
        assert_eq!(example["payload"], json!("<payload>"));
        assert!(!example.contains_key("hint"));
    }

    #[test]
    fn schema_without_properties_yields_empty_example() {
        assert!(example_input(&json!({"type": "object"})).is_empty());
    }

    #[test]
    fn number_field_rejects_string() {
        let schema = json!({
            "type": "object",
            "properties": { "answer": { "type": "number" } },
            "required": ["answer"]
        });
        assert!(is_valid(&json!({"answer": 4}), &schema));
        assert!(is_valid(&json!({"answer": 4.5}), &schema));
        let errors = validate(&json!({"answer": "four"}), &schema);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("$.answer"));
    }

    #[test]
    fn integer_accepts_whole_floats_only() {
        let schema = json!({"type": "integer"});
        assert!(is_valid(&json!(3), &schema));
        assert!(is_valid(&json!(3.0), &schema));
        assert!(!is_valid(&json!(3.5), &schema));
    }

    #[test]
    fn missing_required_and_extra_fields_reported() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"],
            "additionalProperties": false
        });
        let errors = validate(&json!({"other": 1}), &schema);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn nested_array_items_validated() {
        let schema = json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": { "price": { "type": "number", "minimum": 0 } },
                        "required": ["price"]
                    }
                }
            }
        });
        assert!(is_valid(&json!({"items": [{"price": 1.5}]}), &schema));
        let errors = validate(&json!({"items": [{"price": -1}, {}]}), &schema);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("$.items[0].price")));
        assert!(errors.iter().any(|e| e.contains("$.items[1]")));
        assert!(!is_valid(&json!({"items": []}), &schema));
    }

    #[test]
    fn enum_const_and_lengths() {
        assert!(!is_valid(&json!("c"), &json!({"enum": ["a", "b"]})));
        assert!(is_valid(&json!("a"), &json!({"const": "a"})));
        assert!(!is_valid(&json!("ab"), &json!({"type": "string", "maxLength": 1})));
        assert!(!is_valid(&json!(""), &json!({"type": "string", "minLength": 1})));
    }

    #[test]
    fn combinators() {
        let any = json!({"anyOf": [{"type": "string"}, {"type": "integer"}]});
        assert!(is_valid(&json!(1), &any));
        assert!(!is_valid(&json!(true), &any));

        let one = json!({"oneOf": [{"type": "number"}, {"type": "integer"}]});
        // an integer satisfies both branches
        assert!(!is_valid(&json!(1), &one));
        assert!(is_valid(&json!(1.5), &one));

        let all = json!({"allOf": [{"type": "number"}, {"minimum": 2}]});
        assert!(!is_valid(&json!(1), &all));
    }

    #[test]
    fn boolean_schemas() {
        assert!(is_valid(&json!({"x": 1}), &json!(true)));
        assert!(!is_valid(&json!({"x": 1}), &json!(false)));
        assert!(is_valid(&json!([1, 2]), &json!({})));
    }
}
