//! Entity identifier.

use std::fmt;

use slotdb_codec::Value;
use uuid::Uuid;

/// External identifier of an entity (`cid`).
///
/// Entity IDs are strings that are:
/// - Unique within a kind
/// - Immutable once assigned
/// - Generated as simple (hyphenless) UUIDs when the caller gives none
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(String);

impl EntityId {
    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// The id carried by an `id` attribute, if it has a usable shape.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) | Value::Id(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Integer(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Returns the id text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id into its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_simple_uuids() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(!a.as_str().contains('-'));
    }

    #[test]
    fn id_from_attribute() {
        assert_eq!(
            EntityId::from_value(&Value::from("u1")).map(EntityId::into_string),
            Some("u1".to_string())
        );
        assert_eq!(
            EntityId::from_value(&Value::Integer(7)).map(|id| id.to_string()),
            Some("7".to_string())
        );
        assert_eq!(EntityId::from_value(&Value::from("")), None);
        assert_eq!(EntityId::from_value(&Value::Bool(true)), None);
    }
}
