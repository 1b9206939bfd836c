//! Attribute registry: flattened attribute names to column numbers.
//!
//! Each kind owns `column_count` column pairs. A name gets the next free
//! column the first time an entity of the kind stores it and keeps it for
//! the life of the kind. Assignment is the only kind-wide exclusive
//! section: one task per process enters it, and across processes it runs
//! under the named lock `<prefix>/attributes`, re-reading the map once the
//! lock is held.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use slotdb_codec::{path, serialize, Map, TypeTag, Value};
use slotdb_storage::{AttributeRecord, KindTables, StorageError, Store};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::lock::LockManager;
use crate::retry::{with_retry, RetryConfig};

/// A snapshot of one kind's name to column map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeIndex {
    by_name: BTreeMap<String, u32>,
    by_col: BTreeMap<u32, String>,
}

impl AttributeIndex {
    /// Builds an index from stored records.
    pub fn from_records(records: impl IntoIterator<Item = AttributeRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index.by_col.insert(record.col, record.name.clone());
            index.by_name.insert(record.name, record.col);
        }
        index
    }

    /// Column of `name`, if assigned.
    pub fn col_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Name stored in column `col`, if any.
    pub fn name_of(&self, col: u32) -> Option<&str> {
        self.by_col.get(&col).map(String::as_str)
    }

    /// `(name, col)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.by_col.iter().map(|(col, name)| (name.as_str(), *col))
    }

    /// Assigned names whose top-level attribute is `root`.
    pub fn names_under<'a>(&'a self, root: &'a str) -> impl Iterator<Item = (&'a str, u32)> + 'a {
        self.iter().filter(move |(name, _)| path::root(name) == root)
    }

    /// First unassigned column.
    pub fn next_col(&self) -> u32 {
        self.by_col.keys().next_back().map_or(0, |max| max + 1)
    }

    /// Number of assigned names.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no name is assigned.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// One flattened attribute of a write, resolved to its column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValue {
    /// Flattened attribute name.
    pub name: String,
    /// Assigned column.
    pub col: u32,
    /// Type tag of the value.
    pub tag: TypeTag,
    /// Full serialized text, `None` for null.
    pub text: Option<String>,
    /// The value itself.
    pub value: Value,
}

/// Whether a flattened name is stored as an attribute. `id` and `$$` names
/// are carried by the row itself.
pub fn is_stored_name(name: &str) -> bool {
    name != "id" && !name.starts_with("$$")
}

/// Assigns and caches columns of one kind.
#[derive(Debug)]
pub struct AttributeRegistry {
    kind: String,
    tables: KindTables,
    store: Arc<dyn Store>,
    retry: RetryConfig,
    locks: Arc<LockManager>,
    ttl: Duration,
    snapshot: Mutex<Option<(Instant, Arc<AttributeIndex>)>>,
    reloading: AsyncMutex<()>,
    assigning: AsyncMutex<()>,
}

impl AttributeRegistry {
    /// Creates the registry of kind `kind`.
    pub fn new(
        kind: &str,
        tables: KindTables,
        store: Arc<dyn Store>,
        retry: RetryConfig,
        locks: Arc<LockManager>,
        ttl: Duration,
    ) -> Self {
        Self {
            kind: kind.to_string(),
            tables,
            store,
            retry,
            locks,
            ttl,
            snapshot: Mutex::new(None),
            reloading: AsyncMutex::new(()),
            assigning: AsyncMutex::new(()),
        }
    }

    /// Column budget of the kind.
    pub fn column_count(&self) -> u32 {
        self.tables.columns()
    }

    fn cached(&self) -> Option<Arc<AttributeIndex>> {
        match &*self.snapshot.lock() {
            Some((loaded, index)) if loaded.elapsed() < self.ttl => Some(Arc::clone(index)),
            _ => None,
        }
    }

    /// The current name to column map.
    ///
    /// Served from a snapshot younger than the cache lifetime; concurrent
    /// reloads in this process share one store read.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn all(&self) -> CoreResult<Arc<AttributeIndex>> {
        if let Some(index) = self.cached() {
            return Ok(index);
        }
        let _reloading = self.reloading.lock().await;
        if let Some(index) = self.cached() {
            return Ok(index);
        }
        let records = with_retry(&self.retry, || self.store.attributes(&self.tables)).await?;
        let index = Arc::new(AttributeIndex::from_records(records));
        *self.snapshot.lock() = Some((Instant::now(), Arc::clone(&index)));
        Ok(index)
    }

    /// Drop the cached snapshot.
    pub fn reset(&self) {
        *self.snapshot.lock() = None;
    }

    /// Flatten `values` and resolve every stored name to its column,
    /// assigning columns to names seen for the first time.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ValueTooLarge`] if a value cannot be
    /// serialized, [`CoreError::TooManyColumns`] if the new names do not
    /// fit the column budget, or [`CoreError::LockTimeout`] if the
    /// assignment lock cannot be taken. Nothing is assigned on error.
    pub async fn cols_for(&self, values: &Map) -> CoreResult<Vec<ColumnValue>> {
        let pairs: Vec<(String, Value)> = path::flatten(values)
            .into_iter()
            .filter(|(name, _)| is_stored_name(name))
            .collect();
        let encoded = pairs
            .iter()
            .map(|(_, value)| serialize(value))
            .collect::<Result<Vec<_>, _>>()?;

        let mut index = self.all().await?;
        let unknown: Vec<String> = pairs
            .iter()
            .filter(|(name, _)| index.col_of(name).is_none())
            .map(|(name, _)| name.clone())
            .collect();
        if !unknown.is_empty() {
            index = self.assign(&unknown).await?;
        }

        pairs
            .into_iter()
            .zip(encoded)
            .map(|((name, value), encoded)| -> CoreResult<ColumnValue> {
                let col = index.col_of(&name).ok_or_else(|| {
                    StorageError::Corrupted(format!("no column assigned to {name}"))
                })?;
                Ok(ColumnValue {
                    name,
                    col,
                    tag: encoded.tag,
                    text: encoded.text,
                    value,
                })
            })
            .collect()
    }

    async fn assign(&self, unknown: &[String]) -> CoreResult<Arc<AttributeIndex>> {
        let _assigning = self.assigning.lock().await;
        let current = self.all().await?;
        if unknown.iter().all(|name| current.col_of(name).is_some()) {
            return Ok(current);
        }

        let lock_name = format!("{}/attributes", self.tables.prefix());
        self.locks
            .lock_while(&lock_name, || async {
                // another process may have assigned some of them
                self.reset();
                let index = self.all().await?;
                let fresh: Vec<&String> = unknown
                    .iter()
                    .filter(|name| index.col_of(name).is_none())
                    .collect();
                if fresh.is_empty() {
                    return Ok(index);
                }

                let next = index.next_col();
                let limit = self.column_count();
                if u64::from(next) + fresh.len() as u64 > u64::from(limit) {
                    return Err(CoreError::too_many_columns(&self.kind, limit));
                }
                let records: Vec<AttributeRecord> = (next..)
                    .zip(fresh)
                    .map(|(col, name)| AttributeRecord {
                        name: name.clone(),
                        col,
                    })
                    .collect();
                with_retry(&self.retry, || {
                    self.store.insert_attributes(&self.tables, &records)
                })
                .await?;
                debug!(
                    "assigned {} columns of {} from {}",
                    records.len(),
                    self.kind,
                    next
                );

                self.reset();
                self.all().await
            })
            .await
    }
}
