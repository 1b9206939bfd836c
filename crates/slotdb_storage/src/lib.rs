//! # SlotDB Storage
//!
//! Relational store traits and bindings for SlotDB.
//!
//! This crate is the lowest layer of SlotDB. A store holds wide rows of
//! `(type tag, text)` column pairs plus a handful of bookkeeping tables; it
//! does not interpret the text it stores. Value encoding lives in
//! `slotdb_codec` and entity semantics in `slotdb_core`.
//!
//! ## Design Principles
//!
//! - Stores see tags as plain `u8` and text as opaque strings
//! - One trait per table family, bundled by [`Store`]
//! - Must be `Send + Sync` for concurrent access
//! - Busy databases surface as retryable errors, duplicates as conflicts
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral storage
//! - [`SqliteStore`] - SQLite through sqlx (feature `sqlite`, on by default)
//!
//! ## Example
//!
//! ```rust
//! use slotdb_storage::{EntityRows, KindTables, MemoryStore, Schema, Slot, SlotWrite};
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let store = MemoryStore::new();
//!     let tables = KindTables::new("note", 4);
//!     store.ensure_kind_schema(&tables).await.unwrap();
//!
//!     let write = SlotWrite { col: 0, slot: Some(Slot::new(2, Some("hi".into()))) };
//!     store.insert_entity(&tables, "n1", 0, &[write]).await.unwrap();
//!     let row = store.find_entity(&tables, "n1").await.unwrap().unwrap();
//!     assert_eq!(row.slot(0).unwrap().text.as_deref(), Some("hi"));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod model;
mod query;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use backend::{
    AttributeColumnMap, EntityRows, LockTable, OverflowRows, ResourceTable, Schema, Store,
    UsageTable,
};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use model::{
    AttributeRecord, EntityRecord, KindTables, OverflowRecord, ResourceRecord, Slot, SlotWrite,
    UsageRecord,
};
pub use query::{like_matches, Column, Condition, Operand, Predicate, Query, SortKey};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
