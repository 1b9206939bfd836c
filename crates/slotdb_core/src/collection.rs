//! List requests and results.
//!
//! A [`ListCondition`] carries a filter, sort terms and an optional page;
//! [`Collection`] is the page of entities with its paging metadata.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use slotdb_codec::Value;

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};

/// A 1-based page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page number, starting at 1.
    pub number: u64,
    /// Entities per page.
    pub size: u64,
}

impl Page {
    /// Page `number` of `size` entities.
    pub const fn new(number: u64, size: u64) -> Self {
        Self { number, size }
    }

    /// The `(offset, limit)` window of the page.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for page 0 or size 0.
    pub fn window(self) -> CoreResult<(u64, u64)> {
        if self.number == 0 || self.size == 0 {
            return Err(CoreError::invalid_argument(format!(
                "page number and size must be positive, got {}/{}",
                self.number, self.size
            )));
        }
        let offset = (self.number - 1)
            .checked_mul(self.size)
            .ok_or_else(|| CoreError::invalid_argument("page offset overflows"))?;
        Ok((offset, self.size))
    }
}

/// What to list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListCondition {
    /// Filter document; `Null` or an empty map matches everything.
    pub filter: Value,
    /// Sort terms, `-` prefix for descending.
    pub sort: Vec<String>,
    /// Requested page; the first page of the default size when absent.
    pub page: Option<Page>,
}

impl Default for ListCondition {
    fn default() -> Self {
        Self {
            filter: Value::Null,
            sort: Vec::new(),
            page: None,
        }
    }
}

impl ListCondition {
    /// Matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Sets the filter.
    #[must_use]
    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the sort terms.
    #[must_use]
    pub fn sort<S: Into<String>>(mut self, sort: impl IntoIterator<Item = S>) -> Self {
        self.sort = sort.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the page.
    #[must_use]
    pub fn page(mut self, number: u64, size: u64) -> Self {
        self.page = Some(Page::new(number, size));
        self
    }

    /// Reads `{filter, sort, page}` from JSON. `sort` may be one string or
    /// an array of strings.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for a non-object document or
    /// malformed members.
    pub fn from_json(json: Json) -> CoreResult<Self> {
        let Json::Object(mut members) = json else {
            return Err(CoreError::invalid_argument("list condition must be an object"));
        };
        let filter = members
            .remove("filter")
            .map_or(Value::Null, Value::from_json);
        let sort = match members.remove("sort") {
            None | Some(Json::Null) => Vec::new(),
            Some(Json::String(term)) => vec![term],
            Some(Json::Array(terms)) => terms
                .into_iter()
                .map(|term| match term {
                    Json::String(term) => Ok(term),
                    other => Err(CoreError::invalid_argument(format!(
                        "sort term must be a string, got {other}"
                    ))),
                })
                .collect::<CoreResult<_>>()?,
            Some(other) => {
                return Err(CoreError::invalid_argument(format!(
                    "sort must be a string or an array, got {other}"
                )))
            }
        };
        let page = match members.remove("page") {
            None | Some(Json::Null) => None,
            Some(page) => Some(
                serde_json::from_value::<Page>(page)
                    .map_err(|e| CoreError::invalid_argument(format!("bad page: {e}")))?,
            ),
        };
        Ok(Self { filter, sort, page })
    }
}

/// Paging metadata of a [`Collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Index of the first returned entity.
    pub offset: u64,
    /// Page size.
    pub limit: u64,
    /// Entities matching the filter.
    pub total: u64,
    /// Entities returned.
    pub length: u64,
}

/// A page of entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    /// The entities, in sort order.
    pub entities: Vec<Entity>,
    /// Paging metadata.
    pub meta: Meta,
}

impl Collection {
    /// An empty page at `offset`.
    pub fn empty(offset: u64, limit: u64) -> Self {
        Self {
            entities: Vec::new(),
            meta: Meta {
                offset,
                limit,
                total: 0,
                length: 0,
            },
        }
    }

    /// Number of returned entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the page is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// External ids of the returned entities, in order.
    pub fn ids(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.id.as_str()).collect()
    }

    /// `{entities, meta}` as JSON.
    pub fn to_json(&self) -> Json {
        let entities: Vec<Json> = self.entities.iter().map(Entity::to_json).collect();
        json!({ "entities": entities, "meta": self.meta })
    }
}
