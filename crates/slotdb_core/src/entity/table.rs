//! Row storage of one kind.
//!
//! Each attribute column holds the serialized text cut to the base length.
//! When the full text does not fit, the packed value is also written to the
//! overflow table keyed by `(entity, name)`, and projection prefers it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use slotdb_codec::{deserialize, pack, path, truncate, unpack, TypeTag, Value};
use slotdb_storage::{KindTables, OverflowRecord, Query, Slot, SlotWrite, Store};
use tracing::{debug, warn};

use super::{Entity, EntityRow};
use crate::attribute::{AttributeIndex, ColumnValue};
use crate::cache::TtlCache;
use crate::error::{CoreError, CoreResult};
use crate::retry::{with_retry, RetryConfig};

/// Column and overflow writes prepared for one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Staged {
    /// Base column writes.
    pub base: Vec<SlotWrite>,
    /// Overflow records; `value: None` clears a record.
    pub overflow: Vec<OverflowRecord>,
}

impl Staged {
    /// Appends the writes of `other`.
    pub fn merge(&mut self, other: Staged) {
        self.base.extend(other.base);
        self.overflow.extend(other.overflow);
    }
}

/// Entity rows, overflow records and the row cache of one kind.
#[derive(Debug)]
pub struct EntityTable {
    kind: String,
    tables: KindTables,
    store: Arc<dyn Store>,
    retry: RetryConfig,
    base_length: usize,
    cache: TtlCache<String, Arc<EntityRow>>,
}

impl EntityTable {
    /// Creates the table model of kind `kind`.
    pub fn new(
        kind: &str,
        tables: KindTables,
        store: Arc<dyn Store>,
        retry: RetryConfig,
        base_length: usize,
        cache_capacity: usize,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            kind: kind.to_string(),
            tables,
            store,
            retry,
            base_length,
            cache: TtlCache::new(cache_capacity, cache_ttl),
        }
    }

    /// Kind name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Prepares the writes of resolved column values.
    ///
    /// Text longer than the base length is cut at a character boundary and
    /// the full value is packed into an overflow record. Values that fit get
    /// a clearing record, which [`filter_extra`] drops when nothing
    /// overflowed before.
    ///
    /// # Errors
    ///
    /// Returns an error if an overflowing value cannot be packed.
    pub fn values_with_cols(&self, cols: &[ColumnValue]) -> CoreResult<Staged> {
        let mut staged = Staged::default();
        for column in cols {
            let mut overflows = false;
            let text = column.text.as_deref().map(|text| {
                overflows = text.len() > self.base_length;
                truncate(text, self.base_length).to_string()
            });
            staged.base.push(SlotWrite {
                col: column.col,
                slot: Some(Slot::new(column.tag.as_u8(), text)),
            });
            let value = if overflows {
                Some(pack(&column.value)?)
            } else {
                None
            };
            staged.overflow.push(OverflowRecord {
                name: column.name.clone(),
                value,
            });
        }
        Ok(staged)
    }

    /// Writes that clear names stored under the roots of `cols` which the
    /// new values no longer produce.
    pub fn stale_writes(row: &EntityRow, cols: &[ColumnValue], index: &AttributeIndex) -> Staged {
        let written: BTreeSet<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        let roots: BTreeSet<&str> = cols.iter().map(|c| path::root(&c.name)).collect();

        let mut staged = Staged::default();
        for root in roots {
            for (name, col) in index.names_under(root) {
                if written.contains(name) || row.record.slot(col).is_none() {
                    continue;
                }
                staged.base.push(SlotWrite { col, slot: None });
                if matches!(row.overflow.get(name), Some(Some(_))) {
                    staged.overflow.push(OverflowRecord {
                        name: name.to_string(),
                        value: None,
                    });
                }
            }
        }
        staged
    }

    /// One row by external id, cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn for_one(&self, cid: &str) -> CoreResult<Option<Arc<EntityRow>>> {
        let key = cid.to_string();
        if let Some(row) = self.cache.get(&key) {
            return Ok(Some(row));
        }
        let Some(record) =
            with_retry(&self.retry, || self.store.find_entity(&self.tables, cid)).await?
        else {
            return Ok(None);
        };
        let ids = [record.id];
        let overflow = with_retry(&self.retry, || self.store.overflow_of(&self.tables, &ids))
            .await?
            .into_iter()
            .map(|(_, extra)| (extra.name, extra.value))
            .collect();
        let row = Arc::new(EntityRow { record, overflow });
        self.cache.insert(key, Arc::clone(&row));
        Ok(Some(row))
    }

    /// A page of rows and the number of rows matching the predicate.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn for_list(&self, query: &Query) -> CoreResult<(Vec<EntityRow>, u64)> {
        let records =
            with_retry(&self.retry, || self.store.select_entities(&self.tables, query)).await?;
        let total = with_retry(&self.retry, || {
            self.store.count_entities(&self.tables, &query.predicate)
        })
        .await?;
        if records.is_empty() {
            return Ok((Vec::new(), total));
        }

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let mut extras: BTreeMap<i64, BTreeMap<String, Option<Vec<u8>>>> = BTreeMap::new();
        for (id, extra) in
            with_retry(&self.retry, || self.store.overflow_of(&self.tables, &ids)).await?
        {
            extras.entry(id).or_default().insert(extra.name, extra.value);
        }
        let rows = records
            .into_iter()
            .map(|record| {
                let overflow = extras.remove(&record.id).unwrap_or_default();
                EntityRow { record, overflow }
            })
            .collect();
        Ok((rows, total))
    }

    /// Inserts a row and returns its internal id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntityExists`] if `cid` is taken.
    pub async fn create(&self, cid: &str, staged: Staged) -> CoreResult<i64> {
        self.invalidate(cid);
        let now = now_millis();
        let inserted = with_retry(&self.retry, || {
            self.store.insert_entity(&self.tables, cid, now, &staged.base)
        })
        .await;
        let id = match inserted {
            Ok(id) => id,
            Err(CoreError::Storage(e)) if e.is_conflict() => {
                return Err(CoreError::entity_exists(&self.kind, cid));
            }
            Err(e) => return Err(e),
        };
        let extras = filter_extra(None, staged.overflow);
        self.write_extras(id, &extras).await?;
        self.invalidate(cid);
        debug!("created {}#{} as row {}", self.kind, cid, id);
        Ok(id)
    }

    /// Rewrites columns of an existing row.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntityNotFound`] if the row is gone.
    pub async fn update(&self, row: &EntityRow, staged: Staged) -> CoreResult<()> {
        let cid = row.cid();
        self.invalidate(cid);
        let now = now_millis();
        let found = with_retry(&self.retry, || {
            self.store
                .update_entity(&self.tables, row.record.id, now, &staged.base)
        })
        .await?;
        if !found {
            self.invalidate(cid);
            return Err(CoreError::entity_not_found(&self.kind, cid));
        }
        let extras = filter_extra(Some(row), staged.overflow);
        self.write_extras(row.record.id, &extras).await?;
        self.invalidate(cid);
        Ok(())
    }

    async fn write_extras(&self, id: i64, extras: &[OverflowRecord]) -> CoreResult<()> {
        if extras.is_empty() {
            return Ok(());
        }
        with_retry(&self.retry, || {
            self.store.upsert_overflow(&self.tables, id, extras)
        })
        .await
    }

    /// Deletes a row. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn destroy(&self, cid: &str) -> CoreResult<u64> {
        self.invalidate(cid);
        let removed =
            with_retry(&self.retry, || self.store.delete_entity(&self.tables, cid)).await?;
        self.invalidate(cid);
        Ok(removed)
    }

    /// Deletes every row of the kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn destroy_all(&self) -> CoreResult<u64> {
        self.cache.clear();
        let removed =
            with_retry(&self.retry, || self.store.delete_all_entities(&self.tables)).await?;
        self.cache.clear();
        Ok(removed)
    }

    /// Evicts a cached row.
    pub fn invalidate(&self, cid: &str) {
        self.cache.remove(&cid.to_string());
    }

    /// Evicts every cached row.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// Decodes a row into an entity.
    ///
    /// Columns that fail to decode project as null.
    pub fn project(&self, row: &EntityRow, index: &AttributeIndex) -> Entity {
        let mut pairs = Vec::new();
        for (name, col) in index.iter() {
            let Some(slot) = row.record.slot(col) else {
                continue;
            };
            let decoded = match row.overflow.get(name) {
                Some(Some(bytes)) => unpack(bytes).map_err(CoreError::from),
                _ => decode_slot(slot),
            };
            let value = decoded.unwrap_or_else(|e| {
                warn!("{}#{}: {} projected as null: {}", self.kind, row.cid(), name, e);
                Value::Null
            });
            pairs.push((name.to_string(), value));
        }
        Entity {
            id: row.record.cid.clone(),
            num: row.record.id,
            at: row.record.updated_at,
            kind: self.kind.clone(),
            attributes: path::expand(pairs),
        }
    }
}

fn decode_slot(slot: &Slot) -> CoreResult<Value> {
    let tag = TypeTag::try_from(slot.tag)?;
    Ok(deserialize(slot.text.as_deref(), tag)?)
}

/// Drops overflow writes that would not change `row`: clears of names that
/// never overflowed, and records identical to the stored ones.
pub fn filter_extra(row: Option<&EntityRow>, overflow: Vec<OverflowRecord>) -> Vec<OverflowRecord> {
    overflow
        .into_iter()
        .filter(|record| {
            let stored = row.and_then(|row| row.overflow.get(&record.name));
            match (&record.value, stored) {
                (None, None | Some(None)) => false,
                (Some(value), Some(Some(old))) => value != old,
                _ => true,
            }
        })
        .collect()
}

/// Current time in epoch millis.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
