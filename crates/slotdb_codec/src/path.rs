//! Flattening of nested attribute maps into column names and back.
//!
//! Map members become `parent.child`, array elements become `parent[i]`.
//! Scalars, byte strings, references and empty containers are leaves.

use crate::value::{Map, Value};

/// One step of a flattened attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Map member.
    Key(String),
    /// Array element.
    Index(usize),
}

/// Flatten a map into `(name, leaf)` pairs in key order.
pub fn flatten(map: &Map) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for (key, value) in map {
        flatten_into(key.clone(), value, &mut out);
    }
    out
}

fn flatten_into(name: String, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Map(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(format!("{name}.{key}"), child, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(format!("{name}[{i}]"), child, out);
            }
        }
        _ => out.push((name, value.clone())),
    }
}

/// Rebuild a nested map from flattened pairs.
///
/// Missing array positions are filled with null. When two names disagree on
/// the shape of a parent, the later one wins.
///
/// A flattened array never has more elements than there are pairs, so a
/// name with an index at or past the pair count is kept as a plain key.
pub fn expand(pairs: impl IntoIterator<Item = (String, Value)>) -> Map {
    let pairs: Vec<(String, Value)> = pairs.into_iter().collect();
    let limit = pairs.len();
    let mut root = Value::Map(Map::new());
    for (name, leaf) in pairs {
        let mut segments = parse(&name);
        if segments
            .iter()
            .any(|segment| matches!(segment, Segment::Index(i) if *i >= limit))
        {
            segments = vec![Segment::Key(name)];
        }
        insert(&mut root, &segments, leaf);
    }
    root.into_map().unwrap_or_default()
}

/// The top-level attribute a flattened name belongs to.
pub fn root(name: &str) -> &str {
    match name.find(['.', '[']) {
        Some(0) | None => name,
        Some(end) => &name[..end],
    }
}

/// Split a flattened name into segments.
///
/// A name that does not parse as a path is taken as a single key.
pub fn parse(name: &str) -> Vec<Segment> {
    try_parse(name).unwrap_or_else(|| vec![Segment::Key(name.to_string())])
}

fn try_parse(name: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let head = root(name);
    if head.is_empty() {
        return None;
    }
    segments.push(Segment::Key(head.to_string()));

    let mut rest = &name[head.len()..];
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            if end == 0 {
                return None;
            }
            segments.push(Segment::Key(after[..end].to_string()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']')?;
            let index = after[..end].parse().ok()?;
            segments.push(Segment::Index(index));
            rest = &after[end + 1..];
        } else {
            return None;
        }
    }
    Some(segments)
}

fn insert(slot: &mut Value, segments: &[Segment], leaf: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *slot = leaf;
        return;
    };
    match head {
        Segment::Key(key) => {
            if !matches!(slot, Value::Map(_)) {
                *slot = Value::Map(Map::new());
            }
            if let Value::Map(map) = slot {
                let child = map.entry(key.clone()).or_insert(Value::Null);
                insert(child, rest, leaf);
            }
        }
        Segment::Index(index) => {
            if !matches!(slot, Value::Array(_)) {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                if items.len() <= *index {
                    let Some(len) = index.checked_add(1) else {
                        return;
                    };
                    items.resize(len, Value::Null);
                }
                insert(&mut items[*index], rest, leaf);
            }
        }
    }
}
