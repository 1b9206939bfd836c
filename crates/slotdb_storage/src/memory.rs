//! In-memory store for testing.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::backend::{
    AttributeColumnMap, EntityRows, LockTable, OverflowRows, ResourceTable, Schema, Store,
    UsageTable,
};
use crate::error::{StorageError, StorageResult};
use crate::model::{
    AttributeRecord, EntityRecord, KindTables, OverflowRecord, ResourceRecord, SlotWrite,
    UsageRecord,
};
use crate::query::{like_matches, Column, Condition, Operand, Predicate, Query, SortKey};

/// An in-memory store.
///
/// This store keeps every table in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// # Thread Safety
///
/// All tables sit behind one lock, so each call is atomic. Sharing one
/// instance between several drivers models several processes attached to
/// the same database.
///
/// # Example
///
/// ```rust
/// use slotdb_storage::{MemoryStore, ResourceTable};
///
/// # tokio_test_block(async {
/// let store = MemoryStore::new();
/// let first = store.find_or_create_resource("User").await.unwrap();
/// let again = store.find_or_create_resource("User").await.unwrap();
/// assert_eq!(first, again);
/// # });
/// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct Tables {
    resources: BTreeMap<i64, String>,
    next_resource_id: i64,
    locks: HashMap<String, bool>,
    usages: BTreeMap<(i64, String, String), i64>,
    kinds: HashMap<String, KindData>,
}

#[derive(Debug, Default)]
struct KindData {
    next_id: i64,
    entities: BTreeMap<i64, EntityRecord>,
    extras: BTreeMap<(i64, String), Option<Vec<u8>>>,
    attributes: Vec<AttributeRecord>,
    indexes: BTreeSet<Column>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns that have a secondary index on the kind.
    ///
    /// Useful for testing index selection.
    #[must_use]
    pub fn indexed_columns(&self, tables: &KindTables) -> Vec<Column> {
        self.tables
            .read()
            .kinds
            .get(tables.prefix())
            .map(|kind| kind.indexes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of non-null overflow records of the kind.
    #[must_use]
    pub fn overflow_count(&self, tables: &KindTables) -> usize {
        self.tables
            .read()
            .kinds
            .get(tables.prefix())
            .map_or(0, |kind| kind.extras.values().filter(|v| v.is_some()).count())
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Tables>> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(self.tables.read())
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tables>> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(self.tables.write())
    }
}

impl Tables {
    fn kind(&self, tables: &KindTables) -> StorageResult<&KindData> {
        self.kinds
            .get(tables.prefix())
            .ok_or_else(|| StorageError::MissingTable(tables.entities()))
    }

    fn kind_mut(&mut self, tables: &KindTables) -> StorageResult<&mut KindData> {
        self.kinds
            .get_mut(tables.prefix())
            .ok_or_else(|| StorageError::MissingTable(tables.entities()))
    }
}

fn apply_writes(record: &mut EntityRecord, slots: &[SlotWrite]) -> StorageResult<()> {
    for write in slots {
        let cell = record.slots.get_mut(write.col as usize).ok_or_else(|| {
            StorageError::Corrupted(format!("column {} out of range", write.col))
        })?;
        *cell = write.slot.clone();
    }
    Ok(())
}

/// A column value as seen by predicates and ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Cell<'a> {
    Int(i64),
    Text(&'a str),
}

fn cell<'a>(record: &'a EntityRecord, column: Column) -> Option<Cell<'a>> {
    match column {
        Column::Slot(col) => record
            .slot(col)
            .and_then(|slot| slot.text.as_deref())
            .map(Cell::Text),
        Column::Cid => Some(Cell::Text(&record.cid)),
        Column::Num => Some(Cell::Int(record.id)),
        Column::UpdatedAt => Some(Cell::Int(record.updated_at)),
    }
}

/// Compare a column value with an operand the way SQLite applies column
/// affinity: text columns compare as text, integer columns as integers
/// when the operand parses, and integers sort before text otherwise.
fn compare(cell: &Cell<'_>, operand: &Operand) -> Ordering {
    match (cell, operand) {
        (Cell::Text(a), Operand::Text(b)) => (*a).cmp(b.as_str()),
        (Cell::Text(a), Operand::Int(b)) => (*a).cmp(b.to_string().as_str()),
        (Cell::Int(a), Operand::Int(b)) => a.cmp(b),
        (Cell::Int(a), Operand::Text(b)) => match b.parse::<i64>() {
            Ok(b) => a.cmp(&b),
            Err(_) => Ordering::Less,
        },
    }
}

fn matches(record: &EntityRecord, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::All => true,
        Predicate::Nothing => false,
        Predicate::And(parts) => parts.iter().all(|p| matches(record, p)),
        Predicate::Or(parts) => parts.iter().any(|p| matches(record, p)),
        Predicate::Cond { column, condition } => {
            let value = cell(record, *column);
            match (condition, value) {
                (Condition::IsNull, value) => value.is_none(),
                (Condition::NotNull, value) => value.is_some(),
                (Condition::In(list), _) if list.is_empty() => false,
                (Condition::NotIn(list), _) if list.is_empty() => true,
                (_, None) => false,
                (condition, Some(value)) => test(&value, condition),
            }
        }
    }
}

fn test(value: &Cell<'_>, condition: &Condition) -> bool {
    match condition {
        Condition::Eq(x) => compare(value, x) == Ordering::Equal,
        Condition::Ne(x) => compare(value, x) != Ordering::Equal,
        Condition::Gt(x) => compare(value, x) == Ordering::Greater,
        Condition::Gte(x) => compare(value, x) != Ordering::Less,
        Condition::Lt(x) => compare(value, x) == Ordering::Less,
        Condition::Lte(x) => compare(value, x) != Ordering::Greater,
        Condition::In(list) => list.iter().any(|x| compare(value, x) == Ordering::Equal),
        Condition::NotIn(list) => list.iter().all(|x| compare(value, x) != Ordering::Equal),
        Condition::Between(lo, hi) => {
            compare(value, lo) != Ordering::Less && compare(value, hi) != Ordering::Greater
        }
        Condition::NotBetween(lo, hi) => {
            compare(value, lo) == Ordering::Less || compare(value, hi) == Ordering::Greater
        }
        Condition::Like(pattern) => like_matches(pattern, &cell_text(value)),
        Condition::NotLike(pattern) => !like_matches(pattern, &cell_text(value)),
        Condition::IsNull => false,
        Condition::NotNull => true,
    }
}

fn cell_text(value: &Cell<'_>) -> String {
    match value {
        Cell::Int(n) => n.to_string(),
        Cell::Text(s) => (*s).to_string(),
    }
}

/// Row order for `sort`: nulls first ascending, last descending.
fn order(a: &EntityRecord, b: &EntityRecord, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ord = cell(a, key.column).cmp(&cell(b, key.column));
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl Schema for MemoryStore {
    async fn ensure_base_schema(&self) -> StorageResult<()> {
        self.read().map(|_| ())
    }

    async fn ensure_kind_schema(&self, tables: &KindTables) -> StorageResult<()> {
        let mut t = self.write()?;
        t.kinds
            .entry(tables.prefix().to_string())
            .or_insert_with(|| KindData {
                next_id: 1,
                ..KindData::default()
            });
        debug!("ensured tables for {}", tables.prefix());
        Ok(())
    }

    async fn ensure_indexes(&self, tables: &KindTables, columns: &[Column]) -> StorageResult<()> {
        let mut t = self.write()?;
        let kind = t.kind_mut(tables)?;
        kind.indexes.extend(columns.iter().copied());
        debug!("ensured {} indexes for {}", columns.len(), tables.prefix());
        Ok(())
    }

    async fn drop_kind_schema(&self, tables: &KindTables) -> StorageResult<()> {
        if self.write()?.kinds.remove(tables.prefix()).is_some() {
            debug!("dropped tables for {}", tables.prefix());
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceTable for MemoryStore {
    async fn find_resource(&self, name: &str) -> StorageResult<Option<ResourceRecord>> {
        let t = self.read()?;
        Ok(t.resources
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, n)| ResourceRecord {
                id: *id,
                name: n.clone(),
            }))
    }

    async fn find_or_create_resource(&self, name: &str) -> StorageResult<ResourceRecord> {
        let mut t = self.write()?;
        if let Some((id, _)) = t.resources.iter().find(|(_, n)| n.as_str() == name) {
            return Ok(ResourceRecord {
                id: *id,
                name: name.to_string(),
            });
        }
        t.next_resource_id += 1;
        let id = t.next_resource_id;
        t.resources.insert(id, name.to_string());
        Ok(ResourceRecord {
            id,
            name: name.to_string(),
        })
    }

    async fn all_resources(&self) -> StorageResult<Vec<ResourceRecord>> {
        let t = self.read()?;
        Ok(t.resources
            .iter()
            .map(|(id, name)| ResourceRecord {
                id: *id,
                name: name.clone(),
            })
            .collect())
    }

    async fn delete_resource(&self, id: i64) -> StorageResult<()> {
        self.write()?.resources.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl AttributeColumnMap for MemoryStore {
    async fn attributes(&self, tables: &KindTables) -> StorageResult<Vec<AttributeRecord>> {
        let t = self.read()?;
        let mut records = t.kind(tables)?.attributes.clone();
        records.sort_by_key(|r| r.col);
        Ok(records)
    }

    async fn insert_attributes(
        &self,
        tables: &KindTables,
        records: &[AttributeRecord],
    ) -> StorageResult<()> {
        let mut t = self.write()?;
        let kind = t.kind_mut(tables)?;
        let mut names: BTreeSet<&str> = kind.attributes.iter().map(|r| r.name.as_str()).collect();
        let mut cols: BTreeSet<u32> = kind.attributes.iter().map(|r| r.col).collect();
        for record in records {
            if !names.insert(record.name.as_str()) || !cols.insert(record.col) {
                return Err(StorageError::Conflict(format!(
                    "attribute {} / column {} already assigned",
                    record.name, record.col
                )));
            }
        }
        kind.attributes.extend(records.iter().cloned());
        Ok(())
    }
}

#[async_trait]
impl EntityRows for MemoryStore {
    async fn insert_entity(
        &self,
        tables: &KindTables,
        cid: &str,
        now: i64,
        slots: &[SlotWrite],
    ) -> StorageResult<i64> {
        let mut t = self.write()?;
        let kind = t.kind_mut(tables)?;
        if kind.entities.values().any(|e| e.cid == cid) {
            return Err(StorageError::Conflict(format!("duplicate cid {cid}")));
        }
        let id = kind.next_id;
        let mut record = EntityRecord {
            id,
            cid: cid.to_string(),
            created_at: now,
            updated_at: now,
            slots: vec![None; tables.columns() as usize],
        };
        apply_writes(&mut record, slots)?;
        kind.next_id += 1;
        kind.entities.insert(id, record);
        Ok(id)
    }

    async fn update_entity(
        &self,
        tables: &KindTables,
        id: i64,
        now: i64,
        slots: &[SlotWrite],
    ) -> StorageResult<bool> {
        let mut t = self.write()?;
        let kind = t.kind_mut(tables)?;
        let Some(record) = kind.entities.get_mut(&id) else {
            return Ok(false);
        };
        let mut updated = record.clone();
        apply_writes(&mut updated, slots)?;
        updated.updated_at = now;
        *record = updated;
        Ok(true)
    }

    async fn find_entity(
        &self,
        tables: &KindTables,
        cid: &str,
    ) -> StorageResult<Option<EntityRecord>> {
        let t = self.read()?;
        Ok(t.kind(tables)?
            .entities
            .values()
            .find(|e| e.cid == cid)
            .cloned())
    }

    async fn select_entities(
        &self,
        tables: &KindTables,
        query: &Query,
    ) -> StorageResult<Vec<EntityRecord>> {
        let t = self.read()?;
        let mut rows: Vec<&EntityRecord> = t
            .kind(tables)?
            .entities
            .values()
            .filter(|e| matches(e, &query.predicate))
            .collect();
        rows.sort_by(|a, b| order(a, b, &query.sort));
        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(rows.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn count_entities(
        &self,
        tables: &KindTables,
        predicate: &Predicate,
    ) -> StorageResult<u64> {
        let t = self.read()?;
        let count = t
            .kind(tables)?
            .entities
            .values()
            .filter(|e| matches(e, predicate))
            .count();
        Ok(count as u64)
    }

    async fn delete_entity(&self, tables: &KindTables, cid: &str) -> StorageResult<u64> {
        let mut t = self.write()?;
        let kind = t.kind_mut(tables)?;
        let Some(id) = kind.entities.values().find(|e| e.cid == cid).map(|e| e.id) else {
            return Ok(0);
        };
        kind.entities.remove(&id);
        kind.extras.retain(|(entity_id, _), _| *entity_id != id);
        Ok(1)
    }

    async fn delete_all_entities(&self, tables: &KindTables) -> StorageResult<u64> {
        let mut t = self.write()?;
        let kind = t.kind_mut(tables)?;
        let count = kind.entities.len() as u64;
        kind.entities.clear();
        kind.extras.clear();
        Ok(count)
    }
}

#[async_trait]
impl OverflowRows for MemoryStore {
    async fn overflow_of(
        &self,
        tables: &KindTables,
        entity_ids: &[i64],
    ) -> StorageResult<Vec<(i64, OverflowRecord)>> {
        let t = self.read()?;
        let kind = t.kind(tables)?;
        let wanted: BTreeSet<i64> = entity_ids.iter().copied().collect();
        Ok(kind
            .extras
            .iter()
            .filter(|((id, _), _)| wanted.contains(id))
            .map(|((id, name), value)| {
                (
                    *id,
                    OverflowRecord {
                        name: name.clone(),
                        value: value.clone(),
                    },
                )
            })
            .collect())
    }

    async fn upsert_overflow(
        &self,
        tables: &KindTables,
        entity_id: i64,
        records: &[OverflowRecord],
    ) -> StorageResult<()> {
        let mut t = self.write()?;
        let kind = t.kind_mut(tables)?;
        for record in records {
            kind.extras
                .insert((entity_id, record.name.clone()), record.value.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl LockTable for MemoryStore {
    async fn try_lock(&self, name: &str) -> StorageResult<bool> {
        let mut t = self.write()?;
        let active = t.locks.entry(name.to_string()).or_insert(false);
        if *active {
            return Ok(false);
        }
        *active = true;
        Ok(true)
    }

    async fn unlock(&self, name: &str) -> StorageResult<()> {
        if let Some(active) = self.write()?.locks.get_mut(name) {
            *active = false;
        }
        Ok(())
    }

    async fn is_locked(&self, name: &str) -> StorageResult<bool> {
        Ok(self.read()?.locks.get(name).copied().unwrap_or(false))
    }

    async fn unlock_all(&self) -> StorageResult<u64> {
        let mut t = self.write()?;
        let mut released = 0;
        for active in t.locks.values_mut().filter(|a| **a) {
            *active = false;
            released += 1;
        }
        if released > 0 {
            debug!("released {released} locks left active");
        }
        Ok(released)
    }
}

#[async_trait]
impl UsageTable for MemoryStore {
    async fn add_usage(&self, resource_id: i64, records: &[UsageRecord]) -> StorageResult<()> {
        let mut t = self.write()?;
        for record in records {
            *t.usages
                .entry((resource_id, record.kind.clone(), record.key.clone()))
                .or_insert(0) += record.count;
        }
        Ok(())
    }

    async fn usage_of(&self, resource_id: i64) -> StorageResult<Vec<UsageRecord>> {
        let t = self.read()?;
        Ok(t.usages
            .iter()
            .filter(|((id, _, _), _)| *id == resource_id)
            .map(|((_, kind, key), count)| UsageRecord {
                kind: kind.clone(),
                key: key.clone(),
                count: *count,
            })
            .collect())
    }

    async fn clear_usage(&self, resource_id: i64) -> StorageResult<()> {
        self.write()?
            .usages
            .retain(|(id, _, _), _| *id != resource_id);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, AtomicOrdering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Slot;

    fn kind() -> KindTables {
        KindTables::new("item", 4)
    }

    fn text(col: u32, s: &str) -> SlotWrite {
        SlotWrite {
            col,
            slot: Some(Slot::new(2, Some(s.to_string()))),
        }
    }

    async fn store_with_rows(rows: &[(&str, &str)]) -> MemoryStore {
        let store = MemoryStore::new();
        store.ensure_kind_schema(&kind()).await.unwrap();
        for (i, (cid, v)) in rows.iter().enumerate() {
            store
                .insert_entity(&kind(), cid, i as i64, &[text(0, v)])
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn resources_are_created_once() {
        let store = MemoryStore::new();
        let a = store.find_or_create_resource("User").await.unwrap();
        let b = store.find_or_create_resource("User").await.unwrap();
        let c = store.find_or_create_resource("Post").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a.id, c.id);
        assert_eq!(store.all_resources().await.unwrap().len(), 2);

        store.delete_resource(a.id).await.unwrap();
        assert_eq!(store.find_resource("User").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_kind_is_reported() {
        let store = MemoryStore::new();
        let err = store.find_entity(&kind(), "x").await.unwrap_err();
        assert!(matches!(err, StorageError::MissingTable(_)));
    }

    #[tokio::test]
    async fn duplicate_cid_conflicts() {
        let store = store_with_rows(&[("a", "x")]).await;
        let err = store.insert_entity(&kind(), "a", 9, &[]).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn select_filters_sorts_and_pages() {
        let store = store_with_rows(&[("a", "pear"), ("b", "apple"), ("c", "fig"), ("d", "apple")])
            .await;
        let query = Query {
            predicate: Predicate::cond(
                Column::Slot(0),
                Condition::In(vec![
                    Operand::Text("apple".into()),
                    Operand::Text("pear".into()),
                ]),
            ),
            sort: vec![SortKey::desc(Column::Slot(0)), SortKey::asc(Column::Num)],
            limit: Some(2),
            offset: 1,
        };
        let rows = store.select_entities(&kind(), &query).await.unwrap();
        let cids: Vec<&str> = rows.iter().map(|r| r.cid.as_str()).collect();
        assert_eq!(cids, vec!["b", "d"]);
        assert_eq!(
            store
                .count_entities(&kind(), &query.predicate)
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn null_columns_fail_negated_conditions() {
        let store = store_with_rows(&[("a", "x")]).await;
        store.insert_entity(&kind(), "b", 5, &[]).await.unwrap();

        let ne = Predicate::cond(Column::Slot(0), Condition::Ne(Operand::Text("y".into())));
        assert_eq!(store.count_entities(&kind(), &ne).await.unwrap(), 1);

        let null = Predicate::cond(Column::Slot(0), Condition::IsNull);
        let rows = store
            .select_entities(
                &kind(),
                &Query {
                    predicate: null,
                    ..Query::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cid, "b");
    }

    #[tokio::test]
    async fn update_clears_and_sets_columns() {
        let store = store_with_rows(&[("a", "x")]).await;
        let row = store.find_entity(&kind(), "a").await.unwrap().unwrap();
        let ok = store
            .update_entity(
                &kind(),
                row.id,
                42,
                &[SlotWrite { col: 0, slot: None }, text(3, "z")],
            )
            .await
            .unwrap();
        assert!(ok);
        let row = store.find_entity(&kind(), "a").await.unwrap().unwrap();
        assert_eq!(row.slot(0), None);
        assert_eq!(row.slot(3).and_then(|s| s.text.as_deref()), Some("z"));
        assert_eq!(row.updated_at, 42);

        assert!(!store.update_entity(&kind(), 999, 1, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn overflow_upsert_is_keyed_by_name() {
        let store = store_with_rows(&[("a", "x")]).await;
        let write = |v: Option<&str>| OverflowRecord {
            name: "long".into(),
            value: v.map(|s| s.as_bytes().to_vec()),
        };
        store
            .upsert_overflow(&kind(), 1, &[write(Some("one"))])
            .await
            .unwrap();
        store
            .upsert_overflow(&kind(), 1, &[write(Some("two"))])
            .await
            .unwrap();
        let extras = store.overflow_of(&kind(), &[1]).await.unwrap();
        assert_eq!(extras, vec![(1, write(Some("two")))]);

        store.upsert_overflow(&kind(), 1, &[write(None)]).await.unwrap();
        assert_eq!(store.overflow_count(&kind()), 0);

        store.delete_entity(&kind(), "a").await.unwrap();
        assert!(store.overflow_of(&kind(), &[1]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attribute_conflicts_insert_nothing() {
        let store = store_with_rows(&[]).await;
        let rec = |name: &str, col| AttributeRecord {
            name: name.into(),
            col,
        };
        store
            .insert_attributes(&kind(), &[rec("a", 0)])
            .await
            .unwrap();
        let err = store
            .insert_attributes(&kind(), &[rec("b", 1), rec("c", 0)])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.attributes(&kind()).await.unwrap(), vec![rec("a", 0)]);
    }

    #[tokio::test]
    async fn lock_is_compare_and_set() {
        let store = MemoryStore::new();
        assert!(store.try_lock("x").await.unwrap());
        assert!(!store.try_lock("x").await.unwrap());
        assert!(store.is_locked("x").await.unwrap());
        store.unlock("x").await.unwrap();
        assert!(store.try_lock("x").await.unwrap());
        assert!(store.try_lock("y").await.unwrap());
        assert_eq!(store.unlock_all().await.unwrap(), 2);
        assert!(!store.is_locked("x").await.unwrap());
    }

    #[tokio::test]
    async fn usage_accumulates() {
        let store = MemoryStore::new();
        let rec = |key: &str, count| UsageRecord {
            kind: "whereCols".into(),
            key: key.into(),
            count,
        };
        store.add_usage(1, &[rec("a", 2), rec("b", 1)]).await.unwrap();
        store.add_usage(1, &[rec("a", 3)]).await.unwrap();
        store.add_usage(2, &[rec("a", 7)]).await.unwrap();
        assert_eq!(
            store.usage_of(1).await.unwrap(),
            vec![rec("a", 5), rec("b", 1)]
        );
        store.clear_usage(1).await.unwrap();
        assert!(store.usage_of(1).await.unwrap().is_empty());
        assert_eq!(store.usage_of(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closed_store_rejects_calls() {
        let store = MemoryStore::new();
        store.close().await.unwrap();
        assert!(matches!(
            store.find_resource("x").await,
            Err(StorageError::Closed)
        ));
    }
}
