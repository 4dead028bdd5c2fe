use serde_json::{Map, Value};

/// Resolves a dotted path (`user.age`, `items.0.name`) against a value tree.
///
/// Object keys are matched literally, numeric segments index arrays. An empty
/// path resolves to nothing.
pub fn get_path<'a>(values: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.')
        .try_fold(values, |current, segment| step(current, segment))
}

/// Single path step into an object key or array index.
pub fn step<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    }
}

/// Writes `value` at a dotted path, replacing non-object intermediates.
pub fn set_path(target: &mut Value, path: &str, value: Value) {
    let mut current = target;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// True when `path` equals `other` or one is a dotted ancestor of the other.
pub fn paths_overlap(path: &str, other: &str) -> bool {
    fn is_prefix(prefix: &str, full: &str) -> bool {
        full.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    }
    is_prefix(path, other) || is_prefix(other, path)
}
