//! Schema checks: once for a tool's declared schema at registration, and per
//! call for the arguments the model supplies.

use serde_json::Value;

/// Check that a tool's parameter schema is a well-formed object schema.
///
/// `properties`, when present, must be an object, and every `required` entry
/// must be a string naming a declared property.
pub fn validate_schema(schema: &Value) -> Result<(), String> {
    match schema.get("type").and_then(Value::as_str) {
        Some("object") => {}
        Some(other) => return Err(format!("parameter schema must be an object, got '{other}'")),
        None => return Err("parameter schema is missing a 'type'".to_string()),
    }

    let properties = match schema.get("properties") {
        None => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => return Err("'properties' must be an object".to_string()),
    };

    if let Some(required) = schema.get("required") {
        let entries = required
            .as_array()
            .ok_or_else(|| "'required' must be an array".to_string())?;
        for entry in entries {
            let name = entry
                .as_str()
                .ok_or_else(|| "'required' entries must be strings".to_string())?;
            if !properties.is_some_and(|p| p.contains_key(name)) {
                return Err(format!("required field '{name}' is not a declared property"));
            }
        }
    }

    Ok(())
}

/// Validate tool arguments against a JSON Schema.
///
/// Top-level only: object shape, required fields, declared property types and
/// string enums. Returns the first violation found.
pub fn validate_arguments(args: &Value, schema: &Value) -> Result<(), String> {
    if schema.get("type").and_then(Value::as_str) == Some("object") && !args.is_object() {
        return Err(format!("expected object arguments, got {}", json_type_name(args)));
    }

    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                return Err(format!("missing required field '{name}'"));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (key, value) in obj {
        let Some(prop_schema) = properties.get(key) else {
            continue;
        };
        if let Some(expected) = prop_schema.get("type").and_then(Value::as_str) {
            if !value_matches_type(value, expected) {
                return Err(format!(
                    "field '{key}' expected type '{expected}', got {}",
                    json_type_name(value)
                ));
            }
        }
        if let Some(allowed) = prop_schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(format!("field '{key}' is not one of the allowed values"));
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "mode": { "type": "string", "enum": ["read", "write"] },
                "count": { "type": "integer" },
            },
            "required": ["path"],
        })
    }

    #[test]
    fn schema_must_be_object_typed() {
        assert!(validate_schema(&path_schema()).is_ok());
        assert!(validate_schema(&json!({ "type": "string" })).is_err());
        assert!(validate_schema(&json!({})).is_err());
    }

    #[test]
    fn schema_required_must_name_declared_properties() {
        let schema = json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["content"],
        });

        let err = validate_schema(&schema).unwrap_err();

        assert!(err.contains("'content'"));
    }

    #[test]
    fn rejects_non_object_args_when_schema_expects_object() {
        let err = validate_arguments(&json!("not an object"), &path_schema()).unwrap_err();
        assert!(err.contains("expected object"));
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = validate_arguments(&json!({}), &path_schema()).unwrap_err();
        assert!(err.contains("missing required field 'path'"));
    }

    #[test]
    fn rejects_field_with_wrong_type() {
        let err = validate_arguments(&json!({ "path": "a", "count": "two" }), &path_schema())
            .unwrap_err();
        assert!(err.contains("field 'count'"));
        assert!(err.contains("expected type 'integer'"));
    }

    #[test]
    fn rejects_value_outside_enum() {
        let err = validate_arguments(&json!({ "path": "a", "mode": "append" }), &path_schema())
            .unwrap_err();
        assert!(err.contains("field 'mode'"));
    }

    #[test]
    fn accepts_valid_args_and_extra_fields() {
        let args = json!({ "path": "a.txt", "mode": "read", "extra": true });
        assert!(validate_arguments(&args, &path_schema()).is_ok());
    }

    #[test]
    fn accepts_anything_when_schema_is_empty() {
        assert!(validate_arguments(&json!({ "anything": 42 }), &json!({})).is_ok());
        assert!(validate_arguments(&Value::Null, &json!({})).is_ok());
    }
}
