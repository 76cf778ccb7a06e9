//! Array-string argument coercion.
//!
//! Some MCP clients encode array-typed arguments as JSON string literals,
//! e.g. `"sources": "[\"news\"]"` instead of `"sources": ["news"]"`. For any
//! property the tool's input schema types as `array`, decode a string value
//! once with `serde_json::from_str` and accept the result if it matches the
//! schema; otherwise leave the value untouched so normal validation reports
//! `InvalidArguments`.

use serde_json::Value;

/// Apply the array-string coercion to `arguments` in place, guided by
/// `input_schema`'s `properties` map. Only top-level properties are
/// inspected; nested schemas are out of scope for this pass.
pub fn coerce_array_strings(arguments: &mut Value, input_schema: &Value) {
    let Some(properties) = input_schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    let Some(args) = arguments.as_object_mut() else {
        return;
    };

    for (field, schema) in properties {
        if !property_is_array(schema) {
            continue;
        }
        let Some(current) = args.get(field) else {
            continue;
        };
        let Some(raw) = current.as_str() else {
            continue;
        };
        if let Ok(decoded @ Value::Array(_)) = serde_json::from_str::<Value>(raw) {
            args.insert(field.clone(), decoded);
        }
    }
}

fn property_is_array(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => t == "array",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("array")),
        _ => false,
    }
}
