//! Store traits.
//!
//! A store is the relational database the entity engine runs on. Each
//! concern is a separate trait so bindings can be reasoned about piecewise;
//! [`Store`] bundles them for use behind an `Arc<dyn Store>`.
//!
//! # Invariants
//!
//! - Every method is safe to call concurrently from several tasks and from
//!   several processes sharing the same database.
//! - `find_or_create_resource` creates at most one row per name.
//! - `try_lock` is an atomic compare-and-set: of all concurrent callers for
//!   one name, exactly one observes `true` until `unlock`.
//! - `insert_attributes` rejects a name or column that already exists with
//!   [`StorageError::Conflict`](crate::StorageError::Conflict) and inserts
//!   nothing in that case.
//! - `upsert_overflow` is keyed by `(entity, name)`; repeating it is
//!   idempotent.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::model::{
    AttributeRecord, EntityRecord, KindTables, OverflowRecord, ResourceRecord, SlotWrite,
    UsageRecord,
};
use crate::query::{Column, Predicate, Query};

/// Table creation.
#[async_trait]
pub trait Schema: Send + Sync {
    /// Create the process-wide tables (resources, locks, usages).
    async fn ensure_base_schema(&self) -> StorageResult<()>;

    /// Create the tables of one kind if they do not exist.
    async fn ensure_kind_schema(&self, tables: &KindTables) -> StorageResult<()>;

    /// Create secondary indexes on `columns` if they do not exist.
    async fn ensure_indexes(&self, tables: &KindTables, columns: &[Column]) -> StorageResult<()>;

    /// Remove the tables of one kind, rows included.
    async fn drop_kind_schema(&self, tables: &KindTables) -> StorageResult<()>;
}

/// The resource name table.
#[async_trait]
pub trait ResourceTable: Send + Sync {
    /// Look up a resource by name.
    async fn find_resource(&self, name: &str) -> StorageResult<Option<ResourceRecord>>;

    /// Look up a resource by name, inserting it when missing.
    async fn find_or_create_resource(&self, name: &str) -> StorageResult<ResourceRecord>;

    /// All resources ordered by id.
    async fn all_resources(&self) -> StorageResult<Vec<ResourceRecord>>;

    /// Remove a resource row.
    async fn delete_resource(&self, id: i64) -> StorageResult<()>;
}

/// The per-kind attribute name to column map.
#[async_trait]
pub trait AttributeColumnMap: Send + Sync {
    /// Every assigned attribute of the kind.
    async fn attributes(&self, tables: &KindTables) -> StorageResult<Vec<AttributeRecord>>;

    /// Insert new assignments in one statement.
    async fn insert_attributes(
        &self,
        tables: &KindTables,
        records: &[AttributeRecord],
    ) -> StorageResult<()>;
}

/// The wide row table.
#[async_trait]
pub trait EntityRows: Send + Sync {
    /// Insert a row and return its internal id.
    ///
    /// A duplicate `cid` fails with a conflict.
    async fn insert_entity(
        &self,
        tables: &KindTables,
        cid: &str,
        now: i64,
        slots: &[SlotWrite],
    ) -> StorageResult<i64>;

    /// Rewrite columns of the row with internal id `id`. Returns false when
    /// no such row exists.
    async fn update_entity(
        &self,
        tables: &KindTables,
        id: i64,
        now: i64,
        slots: &[SlotWrite],
    ) -> StorageResult<bool>;

    /// Look up a row by external id.
    async fn find_entity(&self, tables: &KindTables, cid: &str)
        -> StorageResult<Option<EntityRecord>>;

    /// Rows matching a query.
    async fn select_entities(
        &self,
        tables: &KindTables,
        query: &Query,
    ) -> StorageResult<Vec<EntityRecord>>;

    /// Number of rows matching a predicate, one per row.
    async fn count_entities(&self, tables: &KindTables, predicate: &Predicate)
        -> StorageResult<u64>;

    /// Delete a row and its overflow records. Returns the number of rows
    /// removed.
    async fn delete_entity(&self, tables: &KindTables, cid: &str) -> StorageResult<u64>;

    /// Delete every row and overflow record of the kind.
    async fn delete_all_entities(&self, tables: &KindTables) -> StorageResult<u64>;
}

/// The overflow side table.
#[async_trait]
pub trait OverflowRows: Send + Sync {
    /// Overflow records of the given rows, paired with the owning row id.
    async fn overflow_of(
        &self,
        tables: &KindTables,
        entity_ids: &[i64],
    ) -> StorageResult<Vec<(i64, OverflowRecord)>>;

    /// Insert or replace overflow records of one row.
    async fn upsert_overflow(
        &self,
        tables: &KindTables,
        entity_id: i64,
        records: &[OverflowRecord],
    ) -> StorageResult<()>;
}

/// Named mutex records.
#[async_trait]
pub trait LockTable: Send + Sync {
    /// Try to take the lock. Returns true when this call took it.
    async fn try_lock(&self, name: &str) -> StorageResult<bool>;

    /// Release the lock, whoever holds it.
    async fn unlock(&self, name: &str) -> StorageResult<()>;

    /// Whether the lock is held.
    async fn is_locked(&self, name: &str) -> StorageResult<bool>;

    /// Release every lock. Returns the number released.
    async fn unlock_all(&self) -> StorageResult<u64>;
}

/// Usage histograms.
#[async_trait]
pub trait UsageTable: Send + Sync {
    /// Add counts to the buckets of a resource.
    async fn add_usage(&self, resource_id: i64, records: &[UsageRecord]) -> StorageResult<()>;

    /// Every bucket of a resource.
    async fn usage_of(&self, resource_id: i64) -> StorageResult<Vec<UsageRecord>>;

    /// Remove every bucket of a resource.
    async fn clear_usage(&self, resource_id: i64) -> StorageResult<()>;
}

/// A complete store binding.
#[async_trait]
pub trait Store:
    Schema
    + ResourceTable
    + AttributeColumnMap
    + EntityRows
    + OverflowRows
    + LockTable
    + UsageTable
    + std::fmt::Debug
{
    /// Release connections. Further calls may fail with
    /// [`StorageError::Closed`](crate::StorageError::Closed).
    async fn close(&self) -> StorageResult<()>;
}
