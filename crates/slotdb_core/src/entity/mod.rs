//! Entity types and the wide row table model.

mod id;
mod table;

use std::collections::BTreeMap;

use serde_json::Value as Json;
use slotdb_codec::{Map, Value};
use slotdb_storage::EntityRecord;

pub use id::EntityId;
pub use table::{EntityTable, Staged};

/// Meta field carrying the internal row id.
pub const META_NUM: &str = "$$num";
/// Meta field carrying the update time.
pub const META_AT: &str = "$$at";
/// Meta field carrying the kind name.
pub const META_AS: &str = "$$as";

/// A stored row with its overflow records, as cached.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    /// The wide row.
    pub record: EntityRecord,
    /// Overflow values by attribute name; `None` marks a cleared record.
    pub overflow: BTreeMap<String, Option<Vec<u8>>>,
}

impl EntityRow {
    /// External id.
    pub fn cid(&self) -> &str {
        &self.record.cid
    }
}

/// A logical entity: its attributes re-nested, plus row metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// External id.
    pub id: String,
    /// Internal row id.
    pub num: i64,
    /// Last update time, epoch millis.
    pub at: i64,
    /// Kind name.
    pub kind: String,
    /// Attributes, nested.
    pub attributes: Map,
}

impl Entity {
    /// Top-level attribute `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// The attributes with `id`, `$$num`, `$$at` and `$$as` injected.
    pub fn to_value(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert("id".to_string(), Value::Text(self.id.clone()));
        map.insert(META_NUM.to_string(), Value::Integer(self.num));
        map.insert(META_AT.to_string(), Value::Date(self.at));
        map.insert(META_AS.to_string(), Value::Text(self.kind.clone()));
        Value::Map(map)
    }

    /// JSON form of [`Entity::to_value`].
    pub fn to_json(&self) -> Json {
        self.to_value().to_json()
    }
}
