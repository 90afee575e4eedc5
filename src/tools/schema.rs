//! Minimal JSON-Schema argument validation for tool calls.
//!
//! Covers the subset the built-in tool schemas use: `required` lists and
//! scalar/array/object `type` checks on declared properties. Unknown
//! arguments pass through untouched so tools can evolve their schemas
//! without breaking older recordings.

use serde_json::Value;

/// Validate `args` against a tool's parameter schema.
///
/// Returns a human-readable description of the first violation found.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(obj) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                return Err(format!("missing required argument '{name}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, value) in obj {
            let Some(spec) = properties.get(name) else {
                continue;
            };
            let Some(expected) = spec.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!(
                    "argument '{name}' should be of type {expected}"
                ));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "max_lines": { "type": "integer" }
            },
            "required": ["path"]
        })
    }

    #[test]
    fn accepts_valid_args() {
        assert!(validate_args(&schema(), &json!({"path": "/tmp/a", "max_lines": 10})).is_ok());
    }

    #[test]
    fn rejects_missing_required() {
        let err = validate_args(&schema(), &json!({"max_lines": 10})).unwrap_err();
        assert!(err.contains("path"));
    }

    #[test]
    fn rejects_wrong_type() {
        let err = validate_args(&schema(), &json!({"path": 42})).unwrap_err();
        assert!(err.contains("string"));
    }

    #[test]
    fn tolerates_undeclared_args() {
        assert!(validate_args(&schema(), &json!({"path": "/a", "extra": true})).is_ok());
    }

    #[test]
    fn rejects_non_object_args() {
        assert!(validate_args(&schema(), &json!([1, 2])).is_err());
    }
}
