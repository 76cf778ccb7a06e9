//! JSON Schema subset validation: checks that required fields are present
//! and that each property's value matches its declared type after argument
//! coercion.
//!
//! Deliberately not a general JSON Schema engine — only `required` and
//! per-property `type` in `{string, integer, number, boolean, array,
//! object}` are understood.

use serde_json::Value;

/// Validate `arguments` against `schema`'s `required`/`properties.*.type`.
/// Returns a human-readable reason on the first mismatch found.
pub fn validate(arguments: &Value, schema: &Value) -> Result<(), String> {
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required {
            let Some(field) = field.as_str() else { continue };
            if arguments.get(field).is_none() {
                return Err(format!("missing required field '{field}'"));
            }
        }
    }

    let Some(properties) = properties else {
        return Ok(());
    };
    let Some(args) = arguments.as_object() else {
        return Ok(());
    };

    for (field, value) in args {
        let Some(prop_schema) = properties.get(field) else {
            continue;
        };
        let Some(expected) = prop_schema.get("type").and_then(Value::as_str) else {
            continue;
        };
        if !type_matches(value, expected) {
            return Err(format!(
                "field '{field}' must be of type '{expected}', got {}",
                type_name(value)
            ));
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
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

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
