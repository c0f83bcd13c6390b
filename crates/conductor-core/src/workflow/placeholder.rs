//! `{{ name }}` placeholder substitution over JSON values.
//!
//! Shared by template instantiation (`{{ feature_name }}`) and by the engine,
//! which resolves `{{ steps.<id>.<field> }}` references against the run
//! context right before a step is dispatched.
//!
//! Rules:
//! - A string that is exactly one placeholder is replaced by the raw value,
//!   whatever its JSON type.
//! - Placeholders embedded in longer strings are replaced by the value's
//!   string form.
//! - Arrays and objects are substituted recursively.
//! - Placeholders with no value are left untouched.

use serde_json::Value;

use conductor_types::workflow::ValueMap;

/// Substitute placeholders in every value of `inputs`.
pub fn substitute_map<F>(inputs: &ValueMap, lookup: &F) -> ValueMap
where
    F: Fn(&str) -> Option<Value>,
{
    inputs
        .iter()
        .map(|(k, v)| (k.clone(), substitute(v, lookup)))
        .collect()
}

/// Substitute placeholders inside a single JSON value.
pub fn substitute<F>(value: &Value, lookup: &F) -> Value
where
    F: Fn(&str) -> Option<Value>,
{
    match value {
        Value::String(s) => substitute_str(s, lookup),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, lookup)).collect()),
        Value::Object(map) => Value::Object(substitute_map(map, lookup)),
        other => other.clone(),
    }
}

fn substitute_str<F>(s: &str, lookup: &F) -> Value
where
    F: Fn(&str) -> Option<Value>,
{
    if let Some(key) = whole_placeholder(s) {
        return lookup(key).unwrap_or_else(|| Value::String(s.to_string()));
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + len + 2;
        let key = rest[start + 2..end - 2].trim();
        out.push_str(&rest[..start]);
        match lookup(key) {
            Some(v) if !key.is_empty() => out.push_str(&value_to_string(&v)),
            _ => out.push_str(&rest[start..end]),
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    Value::String(out)
}

/// `Some(key)` if `s` consists of exactly one placeholder.
fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    let key = inner.trim();
    (!key.is_empty()).then_some(key)
}

/// Convert a JSON value to a display string for embedding.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Resolve `steps.<id>.<field>[.<field>...]` against a run context.
///
/// Numeric path segments index into arrays. Returns `None` for any other
/// prefix or a missing segment.
pub fn lookup_step_reference(context: &ValueMap, key: &str) -> Option<Value> {
    let path = key.strip_prefix("steps.")?;
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup(key: &str) -> Option<Value> {
        match key {
            "feature_name" => Some(json!("login")),
            "retries" => Some(json!(3)),
            "files" => Some(json!(["a.rs", "b.rs"])),
            _ => None,
        }
    }

    #[test]
    fn whole_placeholder_keeps_json_type() {
        assert_eq!(substitute(&json!("{{ retries }}"), &lookup), json!(3));
        assert_eq!(substitute(&json!("{{files}}"), &lookup), json!(["a.rs", "b.rs"]));
    }

    #[test]
    fn embedded_placeholder_uses_string_form() {
        let v = substitute(&json!("Implement {{ feature_name }} with {{ retries }} retries"), &lookup);
        assert_eq!(v, json!("Implement login with 3 retries"));
    }

    #[test]
    fn unknown_placeholders_untouched() {
        assert_eq!(substitute(&json!("{{ missing }}"), &lookup), json!("{{ missing }}"));
        assert_eq!(
            substitute(&json!("a {{ missing }} b {{ feature_name }}"), &lookup),
            json!("a {{ missing }} b login")
        );
        assert_eq!(substitute(&json!("open {{ only"), &lookup), json!("open {{ only"));
    }

    #[test]
    fn nested_values_substituted() {
        let input = json!({
            "list": ["{{ feature_name }}", 1, {"deep": "x {{ retries }}"}],
            "flag": true
        });
        let out = substitute(&input, &lookup);
        assert_eq!(out["list"][0], "login");
        assert_eq!(out["list"][1], 1);
        assert_eq!(out["list"][2]["deep"], "x 3");
        assert_eq!(out["flag"], true);
    }

    #[test]
    fn step_reference_lookup() {
        let context = json!({
            "scan": {"file_count": 2, "files": [{"path": "a.rs"}]}
        })
        .as_object()
        .cloned()
        .unwrap();

        assert_eq!(lookup_step_reference(&context, "steps.scan.file_count"), Some(json!(2)));
        assert_eq!(
            lookup_step_reference(&context, "steps.scan.files.0.path"),
            Some(json!("a.rs"))
        );
        assert_eq!(lookup_step_reference(&context, "steps.scan"), Some(context["scan"].clone()));
        assert!(lookup_step_reference(&context, "steps.other.x").is_none());
        assert!(lookup_step_reference(&context, "feature_name").is_none());
    }
}
