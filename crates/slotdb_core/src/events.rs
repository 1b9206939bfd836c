//! Cache invalidation events.
//!
//! Every mutation publishes an event naming the entities whose cached rows
//! went stale. A transport relays events between processes sharing a store,
//! and peers apply them with [`Driver::handle_event`](crate::Driver::handle_event).
//!
//! On the wire an event is
//!
//! ```json
//! {"event": "INVALIDATE", "resource": "User", "data": {"id": "u1"}}
//! {"event": "INVALIDATE_BULK", "resource": "User", "data": {"ids": ["u1", "u2"]}}
//! ```

use serde::{Deserialize, Serialize};

/// An invalidation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireEvent", try_from = "WireEvent")]
pub enum CacheEvent {
    /// One entity changed.
    Invalidate {
        /// Kind name.
        resource: String,
        /// External id.
        id: String,
    },
    /// Several entities changed.
    InvalidateBulk {
        /// Kind name.
        resource: String,
        /// External ids.
        ids: Vec<String>,
    },
}

impl CacheEvent {
    /// An event for one entity.
    pub fn invalidate(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Invalidate {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// An event for several entities.
    pub fn invalidate_bulk(resource: impl Into<String>, ids: Vec<String>) -> Self {
        Self::InvalidateBulk {
            resource: resource.into(),
            ids,
        }
    }

    /// Kind the event is about.
    pub fn resource(&self) -> &str {
        match self {
            Self::Invalidate { resource, .. } | Self::InvalidateBulk { resource, .. } => resource,
        }
    }

    /// External ids the event names.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Invalidate { id, .. } => vec![id.as_str()],
            Self::InvalidateBulk { ids, .. } => ids.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum WireKind {
    Invalidate,
    InvalidateBulk,
}

#[derive(Default, Serialize, Deserialize)]
struct WireData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ids: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct WireEvent {
    event: WireKind,
    resource: String,
    data: WireData,
}

impl From<CacheEvent> for WireEvent {
    fn from(event: CacheEvent) -> Self {
        match event {
            CacheEvent::Invalidate { resource, id } => Self {
                event: WireKind::Invalidate,
                resource,
                data: WireData {
                    id: Some(id),
                    ..WireData::default()
                },
            },
            CacheEvent::InvalidateBulk { resource, ids } => Self {
                event: WireKind::InvalidateBulk,
                resource,
                data: WireData {
                    ids: Some(ids),
                    ..WireData::default()
                },
            },
        }
    }
}

impl TryFrom<WireEvent> for CacheEvent {
    type Error = String;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        match (wire.event, wire.data) {
            (WireKind::Invalidate, WireData { id: Some(id), .. }) => Ok(Self::Invalidate {
                resource: wire.resource,
                id,
            }),
            (WireKind::InvalidateBulk, WireData { ids: Some(ids), .. }) => {
                Ok(Self::InvalidateBulk {
                    resource: wire.resource,
                    ids,
                })
            }
            (WireKind::Invalidate, _) => Err("INVALIDATE event without data.id".to_string()),
            (WireKind::InvalidateBulk, _) => {
                Err("INVALIDATE_BULK event without data.ids".to_string())
            }
        }
    }
}
