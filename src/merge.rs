//! Deep merge and small helpers over `serde_yaml` values.
//!
//! Two values merge only when both are mappings; any other combination is
//! replaced wholesale by the higher-priority side. Sequences never
//! element-merge. A `null` on the high side counts as absent.

use serde_yaml::{Mapping, Value};

/// Merge `high` over `low`, returning a new value.
pub fn deep_merge(low: &Value, high: &Value) -> Value {
    match (low, high) {
        (_, Value::Null) => low.clone(),
        (Value::Mapping(l), Value::Mapping(h)) => Value::Mapping(merge_mappings(l, h)),
        (_, Value::Mapping(h)) => Value::Mapping(merge_mappings(&Mapping::new(), h)),
        (_, h) => h.clone(),
    }
}

/// Merge `high` over `low`; keys keep first-seen order.
pub fn merge_mappings(low: &Mapping, high: &Mapping) -> Mapping {
    let mut out = low.clone();
    merge_into(&mut out, high);
    out
}

/// In-place variant of [`merge_mappings`].
pub fn merge_into(target: &mut Mapping, high: &Mapping) {
    for (key, value) in high {
        if value.is_null() {
            continue;
        }
        let merged = match target.get(key) {
            Some(existing) => deep_merge(existing, value),
            None => deep_merge(&Value::Null, value),
        };
        target.insert(key.clone(), merged);
    }
}

/// Copy of `mapping` without the listed string keys, order preserved.
pub fn without_keys(mapping: &Mapping, keys: &[&str]) -> Mapping {
    mapping
        .iter()
        .filter(|(k, _)| !k.as_str().is_some_and(|k| keys.contains(&k)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Mapping stored under `key`, if the value there is a mapping.
pub fn get_mapping<'a>(mapping: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    mapping.get(key).and_then(Value::as_mapping)
}

/// Parse an index key: a YAML integer or a string of ASCII digits with an
/// optional leading `+`.
pub fn index_of(key: &Value) -> Option<u64> {
    match key {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let digits = s.strip_prefix('+').unwrap_or(s);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse().ok()
        }
        _ => None,
    }
}

/// String form of a mapping key, for paths and log lines.
pub fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "~".to_string(),
        other => type_name(other).to_string(),
    }
}

/// Human-readable name of a value's type.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
