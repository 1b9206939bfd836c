//! JSON interop.
//!
//! Plain JSON maps onto [`Value`] directly. Non-JSON shapes use single-key
//! marker objects: `{"$ref": "Kind#id"}`, `{"$date": millis}`,
//! `{"$id": ".."}`, `{"$entity": "kind#id"}` and `{"$bytes": base64}`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Number, Value as Json};

use crate::value::{Map, Value};

impl Value {
    /// Convert a JSON document into a value.
    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            Json::Object(object) => {
                if object.len() == 1 {
                    if let Some(marked) = from_marker(&object) {
                        return marked;
                    }
                }
                Value::Map(
                    object
                        .into_iter()
                        .map(|(k, v)| (k, Value::from_json(v)))
                        .collect::<Map>(),
                )
            }
        }
    }

    /// Convert this value into a JSON document.
    ///
    /// Non-finite floats become `null`.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(n) => Json::Number((*n).into()),
            Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Text(s) => Json::String(s.clone()),
            Value::Bytes(b) => marker("$bytes", Json::String(STANDARD.encode(b))),
            Value::Date(millis) => marker("$date", Json::Number((*millis).into())),
            Value::Ref(s) => marker("$ref", Json::String(s.clone())),
            Value::Id(s) => marker("$id", Json::String(s.clone())),
            Value::Entity { kind, id } => marker("$entity", Json::String(format!("{kind}#{id}"))),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn marker(key: &str, value: Json) -> Json {
    let mut object = serde_json::Map::new();
    object.insert(key.to_string(), value);
    Json::Object(object)
}

fn from_marker(object: &serde_json::Map<String, Json>) -> Option<Value> {
    let (key, value) = object.iter().next()?;
    match (key.as_str(), value) {
        ("$ref", Json::String(s)) => Some(Value::Ref(s.clone())),
        ("$id", Json::String(s)) => Some(Value::Id(s.clone())),
        ("$date", Json::Number(n)) => n.as_i64().map(Value::Date),
        ("$bytes", Json::String(s)) => STANDARD.decode(s).ok().map(Value::Bytes),
        ("$entity", Json::String(s)) => s.split_once('#').map(|(kind, id)| Value::Entity {
            kind: kind.to_string(),
            id: id.to_string(),
        }),
        _ => None,
    }
}
