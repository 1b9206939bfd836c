//! Resource name registry.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use slotdb_storage::{ResourceRecord, Store};
use tracing::debug;

use crate::cache::{KeyedLocks, TtlCache};
use crate::error::CoreResult;
use crate::retry::{with_retry, RetryConfig};

/// Resolves resource names to their stored records.
///
/// Lookups are cached. Concurrent first lookups of one name in this
/// process wait for each other, so only one of them talks to the store.
#[derive(Debug)]
pub struct ResourceRegistry {
    store: Arc<dyn Store>,
    retry: RetryConfig,
    cache: TtlCache<String, ResourceRecord>,
    inflight: KeyedLocks<String>,
}

impl ResourceRegistry {
    /// Creates a registry over `store`.
    pub fn new(store: Arc<dyn Store>, retry: RetryConfig, capacity: usize, ttl: Duration) -> Self {
        Self {
            store,
            retry,
            cache: TtlCache::new(capacity, ttl),
            inflight: KeyedLocks::new(),
        }
    }

    /// The resource named `name`, created on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn of_name(&self, name: &str) -> CoreResult<ResourceRecord> {
        let key = name.to_string();
        if let Some(record) = self.cache.get(&key) {
            return Ok(record);
        }
        let _gate = self.inflight.lock(&key).await;
        if let Some(record) = self.cache.get(&key) {
            return Ok(record);
        }
        let record = with_retry(&self.retry, || self.store.find_or_create_resource(name)).await?;
        debug!("resolved resource {} to {}", name, record.id);
        self.cache.insert(key, record.clone());
        Ok(record)
    }

    /// The resource named `name`, without creating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn find(&self, name: &str) -> CoreResult<Option<ResourceRecord>> {
        let key = name.to_string();
        if let Some(record) = self.cache.get(&key) {
            return Ok(Some(record));
        }
        let found = with_retry(&self.retry, || self.store.find_resource(name)).await?;
        if let Some(record) = &found {
            self.cache.insert(key, record.clone());
        }
        Ok(found)
    }

    /// Every stored resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn all(&self) -> CoreResult<Vec<ResourceRecord>> {
        with_retry(&self.retry, || self.store.all_resources()).await
    }

    /// Remove a resource row and forget it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn delete(&self, record: &ResourceRecord) -> CoreResult<()> {
        with_retry(&self.retry, || self.store.delete_resource(record.id)).await?;
        self.clear_cache_for_name(&record.name);
        Ok(())
    }

    /// Forget the cached record of `name`.
    pub fn clear_cache_for_name(&self, name: &str) {
        self.cache.remove(&name.to_string());
    }
}

/// A resource name split into its name and optional domain
/// (`name@domain`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceName {
    /// Name part.
    pub name: String,
    /// Domain part, if any.
    pub domain: Option<String>,
}

impl ResourceName {
    /// Split `full` at its last `@`.
    pub fn parse(full: &str) -> Self {
        match full.rsplit_once('@') {
            Some((name, domain)) if !name.is_empty() && !domain.is_empty() => Self {
                name: name.to_string(),
                domain: Some(domain.to_string()),
            },
            _ => Self {
                name: full.to_string(),
                domain: None,
            },
        }
    }
}

impl std::fmt::Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{}@{}", self.name, domain),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotdb_storage::{MemoryStore, ResourceTable};

    fn registry(store: Arc<MemoryStore>) -> ResourceRegistry {
        ResourceRegistry::new(store, RetryConfig::no_retry(), 16, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn concurrent_first_lookups_share_one_row() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(registry(Arc::clone(&store)));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move { registry.of_name("User").await }));
        }
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.all_resources().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_does_not_create() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(Arc::clone(&store));
        assert_eq!(registry.find("Ghost").await.unwrap(), None);
        assert!(store.all_resources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_forgets_cached_record() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(Arc::clone(&store));
        let first = registry.of_name("User").await.unwrap();
        registry.delete(&first).await.unwrap();
        assert_eq!(registry.find("User").await.unwrap(), None);
        let second = registry.of_name("User").await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn resource_names_split_at_domain() {
        let parsed = ResourceName::parse("User@example.com");
        assert_eq!(parsed.name, "User");
        assert_eq!(parsed.domain.as_deref(), Some("example.com"));
        assert_eq!(parsed.to_string(), "User@example.com");

        assert_eq!(ResourceName::parse("User").domain, None);
        assert_eq!(ResourceName::parse("@x").name, "@x");
    }
}
