//! # SlotDB Core
//!
//! Schemaless entity engine for SlotDB.
//!
//! Entities are free-form attribute maps grouped into kinds. Each kind is
//! stored as one wide table of `(type tag, text)` column pairs: nested
//! attributes are flattened into names such as `bar.n` or `tags[0]`, and
//! every name gets a column the first time it is written.
//!
//! This crate provides:
//! - [`Driver`], the facade for `one`, `list`, `create`, `update`,
//!   `destroy` and `drop`
//! - column assignment per kind ([`attribute`])
//! - filter and sort translation ([`filter`])
//! - named locks shared by every process on a store ([`lock`])
//! - usage counting that picks the columns to index ([`usage`])
//! - invalidation events for peers sharing a store ([`CacheEvent`])
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use slotdb_codec::Value;
//! use slotdb_core::{Config, Driver, ListCondition};
//! use slotdb_storage::MemoryStore;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let driver = Driver::open(Arc::new(MemoryStore::new()), Config::default())
//!     .await
//!     .unwrap();
//!
//! let user = driver
//!     .create("User", &Value::map([("name", Value::from("hoge")), ("age", Value::Integer(3))]))
//!     .await
//!     .unwrap();
//! assert_eq!(user.get("name"), Some(&Value::from("hoge")));
//!
//! let adults = driver
//!     .list(
//!         "User",
//!         &ListCondition::all().filter(Value::map([(
//!             "age",
//!             Value::map([("$gte", Value::Integer(3))]),
//!         )])),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(adults.meta.total, 1);
//! driver.close().await.unwrap();
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod attribute;
pub mod cache;
mod collection;
mod config;
mod driver;
mod entity;
mod error;
mod events;
pub mod filter;
pub mod lock;
mod resource;
mod retry;
pub mod usage;

pub use collection::{Collection, ListCondition, Meta, Page};
pub use config::{Config, LockOptions, UnknownFieldPolicy};
pub use driver::Driver;
pub use entity::{Entity, EntityId, EntityRow, EntityTable, Staged, META_AS, META_AT, META_NUM};
pub use error::{CoreError, CoreResult};
pub use events::CacheEvent;
pub use resource::{ResourceName, ResourceRegistry};
pub use retry::{with_retry, RetryConfig};
pub use usage::{UsageCounts, UsageKind};
