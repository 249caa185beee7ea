use serde_json::{Map, Value};

/// One changed leaf, addressed by a dotted path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Change {
    pub path: String,
    pub old: Value,
    pub new: Value,
}

/// Recursively collect leaves of `current` that differ from `previous`.
///
/// Keys missing from `current` are not reported; hub replies only ever add
/// or update fields.
pub(crate) fn diff_json(previous: &Value, current: &Value, path_prefix: &str, changes: &mut Vec<Change>) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None if curr_val.is_object() => {
                        diff_json(&Value::Object(Map::new()), curr_val, &path, changes);
                    }
                    None => changes.push(Change {
                        path,
                        old: Value::Null,
                        new: curr_val.clone(),
                    }),
                }
            }
        }
        (prev, curr) if prev != curr => changes.push(Change {
            path: path_prefix.to_string(),
            old: prev.clone(),
            new: curr.clone(),
        }),
        _ => {}
    }
}

/// Top-level field changes between two device records. Values are compared
/// whole, so a changed array shows up as one change of that field.
pub(crate) fn diff_fields(previous: &Map<String, Value>, current: &Map<String, Value>) -> Vec<Change> {
    current
        .iter()
        .filter_map(|(field, new)| {
            let old = previous.get(field).unwrap_or(&Value::Null);
            (old != new).then(|| Change {
                path: field.clone(),
                old: old.clone(),
                new: new.clone(),
            })
        })
        .collect()
}
