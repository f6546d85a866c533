//! Pulling a JSON object out of model output.

use serde_json::Value;

/// Strip Markdown fences and surrounding prose, keeping the outermost `{...}`.
pub fn extract_json(text: &str) -> &str {
    let mut text = text.trim();

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        // Skip the language tag on the fence line, e.g. ```json
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            text = body[..end].trim();
        }
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Parse model output into a JSON object.
pub fn parse_object(text: &str) -> Result<Value, String> {
    let cleaned = extract_json(text);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| format!("JSON parsing error at line {} column {}: {e}", e.line(), e.column()))?;
    if !value.is_object() {
        return Err("parsed JSON is not an object".to_string());
    }
    Ok(value)
}

/// Models sometimes wrap a section as `{"<key>": {...}}`; return the inner object.
pub fn unwrap_section(key: &str, value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}
