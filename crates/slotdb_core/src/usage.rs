//! Usage tracking for index selection.
//!
//! Every list request pushes the attribute names it filtered and sorted on.
//! Pushes are queued in memory and persisted in batches by [`UsageTracker::flush`];
//! the counts only decide which columns get an index when a kind's tables
//! are created, so losing some is harmless and flush errors are swallowed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use slotdb_storage::{ResourceRecord, Store, UsageRecord};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::CoreResult;
use crate::resource::ResourceRegistry;
use crate::retry::{with_retry, RetryConfig};

/// What a usage key counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UsageKind {
    /// Attribute names in filters.
    WhereCols,
    /// Attribute names in sorts.
    OrderCols,
    /// Top-level filter keys.
    Filter,
}

impl UsageKind {
    /// Stored name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            UsageKind::WhereCols => "whereCols",
            UsageKind::OrderCols => "orderCols",
            UsageKind::Filter => "filter",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "whereCols" => Some(UsageKind::WhereCols),
            "orderCols" => Some(UsageKind::OrderCols),
            "filter" => Some(UsageKind::Filter),
            _ => None,
        }
    }
}

/// Persisted usage histograms of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounts {
    /// Filtered attribute name counts.
    pub where_cols: BTreeMap<String, i64>,
    /// Sorted attribute name counts.
    pub order_cols: BTreeMap<String, i64>,
    /// Top-level filter key counts.
    pub filter: BTreeMap<String, i64>,
}

impl UsageCounts {
    /// Attribute names ranked by filter plus sort use, most used first.
    pub fn top_columns(&self, k: usize) -> Vec<String> {
        let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
        for (name, count) in self.where_cols.iter().chain(&self.order_cols) {
            *totals.entry(name.as_str()).or_default() += count;
        }
        let mut ranked: Vec<(&str, i64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(k)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

type Pending = (String, UsageKind, Vec<String>);

/// Queues usage pushes and persists them in batches.
#[derive(Debug)]
pub struct UsageTracker {
    store: Arc<dyn Store>,
    resources: Arc<ResourceRegistry>,
    retry: RetryConfig,
    queue: Mutex<Vec<Pending>>,
    flushing: AsyncMutex<()>,
}

impl UsageTracker {
    /// Creates a tracker over `store`.
    pub fn new(store: Arc<dyn Store>, resources: Arc<ResourceRegistry>, retry: RetryConfig) -> Self {
        Self {
            store,
            resources,
            retry,
            queue: Mutex::new(Vec::new()),
            flushing: AsyncMutex::new(()),
        }
    }

    /// Count one use of each key. Never blocks on the store.
    pub fn push(&self, resource: &str, kind: UsageKind, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        self.queue.lock().push((resource.to_string(), kind, keys));
    }

    /// Number of queued pushes.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Persist every queued push.
    ///
    /// Concurrent calls run one after another; each drains whatever is
    /// queued when it starts. Store failures are logged and the affected
    /// counts dropped.
    pub async fn flush(&self) {
        let _flushing = self.flushing.lock().await;
        let drained = std::mem::take(&mut *self.queue.lock());
        if drained.is_empty() {
            return;
        }

        let mut batches: BTreeMap<String, BTreeMap<(UsageKind, String), i64>> = BTreeMap::new();
        for (resource, kind, keys) in drained {
            let batch = batches.entry(resource).or_default();
            for key in keys {
                *batch.entry((kind, key)).or_default() += 1;
            }
        }

        for (resource, batch) in batches {
            let records: Vec<UsageRecord> = batch
                .into_iter()
                .map(|((kind, key), count)| UsageRecord {
                    kind: kind.as_str().to_string(),
                    key,
                    count,
                })
                .collect();
            if let Err(err) = self.persist(&resource, &records).await {
                warn!("dropped usage of {}: {}", resource, err);
            }
        }
    }

    async fn persist(&self, resource: &str, records: &[UsageRecord]) -> CoreResult<()> {
        // a resource dropped since the push has nothing left to index
        let Some(record) = self.resources.find(resource).await? else {
            debug!("skipping usage of dropped resource {}", resource);
            return Ok(());
        };
        with_retry(&self.retry, || self.store.add_usage(record.id, records)).await
    }

    /// Persisted counts of `resource`; empty when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn counts_of(&self, resource: &str) -> CoreResult<UsageCounts> {
        let Some(record) = self.resources.find(resource).await? else {
            return Ok(UsageCounts::default());
        };
        let rows = with_retry(&self.retry, || self.store.usage_of(record.id)).await?;
        let mut counts = UsageCounts::default();
        for row in rows {
            let bucket = match UsageKind::parse(&row.kind) {
                Some(UsageKind::WhereCols) => &mut counts.where_cols,
                Some(UsageKind::OrderCols) => &mut counts.order_cols,
                Some(UsageKind::Filter) => &mut counts.filter,
                None => continue,
            };
            *bucket.entry(row.key).or_default() += row.count;
        }
        Ok(counts)
    }

    /// Most used filter and sort attributes of `resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn top_columns(&self, resource: &str, k: usize) -> CoreResult<Vec<String>> {
        Ok(self.counts_of(resource).await?.top_columns(k))
    }

    /// Remove every persisted count of a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear(&self, resource: &ResourceRecord) -> CoreResult<()> {
        self.queue.lock().retain(|(name, _, _)| *name != resource.name);
        with_retry(&self.retry, || self.store.clear_usage(resource.id)).await
    }

    /// Flush every `period` until the returned task is aborted.
    pub fn spawn_flusher(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            // the first tick completes immediately
            ticks.tick().await;
            loop {
                ticks.tick().await;
                tracker.flush().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotdb_storage::MemoryStore;

    fn tracker(store: Arc<MemoryStore>) -> (Arc<ResourceRegistry>, Arc<UsageTracker>) {
        let resources = Arc::new(ResourceRegistry::new(
            Arc::clone(&store) as Arc<dyn Store>,
            RetryConfig::no_retry(),
            16,
            Duration::from_secs(60),
        ));
        let usage = Arc::new(UsageTracker::new(
            store,
            Arc::clone(&resources),
            RetryConfig::no_retry(),
        ));
        (resources, usage)
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn flush_accumulates_counts() {
        let store = Arc::new(MemoryStore::new());
        let (resources, usage) = tracker(store);
        resources.of_name("User").await.unwrap();

        usage.push("User", UsageKind::WhereCols, keys(&["age", "name"]));
        usage.push("User", UsageKind::WhereCols, keys(&["age"]));
        usage.push("User", UsageKind::OrderCols, keys(&["name"]));
        usage.flush().await;
        usage.push("User", UsageKind::WhereCols, keys(&["age"]));
        usage.flush().await;
        assert_eq!(usage.pending(), 0);

        let counts = usage.counts_of("User").await.unwrap();
        assert_eq!(counts.where_cols["age"], 3);
        assert_eq!(counts.where_cols["name"], 1);
        assert_eq!(counts.order_cols["name"], 1);
        assert_eq!(usage.top_columns("User", 1).await.unwrap(), keys(&["age"]));
        assert_eq!(
            usage.top_columns("User", 5).await.unwrap(),
            keys(&["age", "name"])
        );
    }

    #[tokio::test]
    async fn flush_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        let (resources, usage) = tracker(Arc::clone(&store));
        resources.of_name("User").await.unwrap();
        usage.push("User", UsageKind::Filter, keys(&["group"]));
        store.close().await.unwrap();

        usage.flush().await;
        assert_eq!(usage.pending(), 0);
    }

    #[tokio::test]
    async fn unknown_resource_has_no_counts() {
        let store = Arc::new(MemoryStore::new());
        let (_resources, usage) = tracker(store);
        usage.push("Ghost", UsageKind::WhereCols, keys(&["a"]));
        usage.flush().await;
        assert_eq!(usage.counts_of("Ghost").await.unwrap(), UsageCounts::default());
    }

    #[tokio::test]
    async fn concurrent_flushes_count_once() {
        let store = Arc::new(MemoryStore::new());
        let (resources, usage) = tracker(store);
        resources.of_name("User").await.unwrap();
        for _ in 0..10 {
            usage.push("User", UsageKind::WhereCols, keys(&["age"]));
        }
        tokio::join!(usage.flush(), usage.flush(), usage.flush());
        let counts = usage.counts_of("User").await.unwrap();
        assert_eq!(counts.where_cols["age"], 10);
    }

    #[tokio::test(start_paused = true)]
    async fn background_flusher_persists() {
        let store = Arc::new(MemoryStore::new());
        let (resources, usage) = tracker(store);
        resources.of_name("User").await.unwrap();
        let flusher = usage.spawn_flusher(Duration::from_secs(10));

        usage.push("User", UsageKind::OrderCols, keys(&["at"]));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(usage.pending(), 0);
        flusher.abort();

        let counts = usage.counts_of("User").await.unwrap();
        assert_eq!(counts.order_cols["at"], 1);
    }
}
