use serde_json::{Map, Value};

use super::StoreError;

const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']'];

/// Splits a `/`-separated path into validated segments. The root is `""`.
pub fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for seg in &segs {
        if seg.contains(FORBIDDEN) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
    }
    Ok(segs)
}

/// Canonical form of a path: no leading, trailing or doubled slashes.
pub fn normalize(path: &str) -> Result<String, StoreError> {
    Ok(segments(path)?.join("/"))
}

/// Escapes characters that are not allowed in a path segment, so arbitrary
/// strings (e-mail addresses, mostly) can be used as keys.
pub fn encode_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if FORBIDDEN.contains(&c) || c == '/' || c == '%' {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Strips nulls and empty objects, which a tree never stores.
pub fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect();
            if pruned.is_empty() {
                Value::Null
            } else {
                Value::Object(pruned)
            }
        }
        other => other,
    }
}

pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

pub fn lookup<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for seg in segs {
        node = node.as_object()?.get(*seg)?;
    }
    if is_empty(node) {
        None
    } else {
        Some(node)
    }
}

/// Writes `value` at `segs` below `node`. A null value removes the subtree;
/// parents left empty are removed on the way back up.
pub fn put(node: &mut Value, segs: &[&str], value: Value) {
    let Some((head, rest)) = segs.split_first() else {
        *node = prune(value);
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }

    if let Value::Object(map) = node {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        put(child, rest, value);
        if is_empty(child) {
            map.remove(*head);
        }
    }
}

/// Every leaf below `value` as `(path, leaf)`, paths joined onto `base`.
pub fn flatten(base: &str, value: &Value) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    flatten_into(base, value, &mut out);
    out
}

fn flatten_into(base: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (k, v) in map {
                flatten_into(&join(base, k), v, out);
            }
        }
        leaf => out.push((base.to_string(), leaf.clone())),
    }
}

pub fn join(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}/{key}")
    }
}

/// Proper ancestors of a canonical path, nearest last.
pub fn ancestors(path: &str) -> Vec<String> {
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    (1..segs.len()).map(|n| segs[..n].join("/")).collect()
}
