//! Driver configuration.

use std::time::Duration;

use crate::retry::RetryConfig;

/// What a filter does with an attribute name the kind has never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFieldPolicy {
    /// The condition matches no row.
    #[default]
    MatchNothing,
    /// The condition is dropped.
    Ignore,
}

/// Retry budget of a named lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Acquisition attempts before giving up.
    pub try_max: u32,
    /// Wait between attempts.
    pub try_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            try_max: 5,
            try_interval: Duration::from_millis(300),
        }
    }
}

/// Configuration for opening a driver.
#[derive(Debug, Clone)]
pub struct Config {
    /// Column pairs per entity row.
    pub column_count: u32,

    /// Bytes a value may occupy in its column before overflowing.
    pub value_base_length: usize,

    /// Entries kept in each kind's entity cache.
    pub entity_cache_capacity: usize,

    /// Lifetime of an entity cache entry.
    pub entity_cache_ttl: Duration,

    /// Lifetime of a kind's attribute map snapshot.
    pub attribute_cache_ttl: Duration,

    /// Entries kept in the resource cache.
    pub resource_cache_capacity: usize,

    /// Lifetime of a resource cache entry.
    pub resource_cache_ttl: Duration,

    /// Retry budget of named locks.
    pub lock: LockOptions,

    /// Backoff for retryable store errors.
    pub retry: RetryConfig,

    /// Period of the background usage flush (`None` = only on close).
    pub usage_flush_interval: Option<Duration>,

    /// Columns indexed when a kind's tables are created.
    pub index_top_k: usize,

    /// Page size used when a list request names none.
    pub default_page_size: u64,

    /// Handling of unknown filter names.
    pub unknown_fields: UnknownFieldPolicy,

    /// Whether updates to one id are applied one at a time.
    pub serialize_updates: bool,

    /// Buffer of the invalidation event channel.
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            column_count: 64,
            value_base_length: 255,
            entity_cache_capacity: 500,
            entity_cache_ttl: Duration::from_secs(60),
            attribute_cache_ttl: Duration::from_secs(2),
            resource_cache_capacity: 1000,
            resource_cache_ttl: Duration::from_secs(5 * 60),
            lock: LockOptions::default(),
            retry: RetryConfig::default(),
            usage_flush_interval: Some(Duration::from_secs(10)),
            index_top_k: 8,
            default_page_size: 25,
            unknown_fields: UnknownFieldPolicy::MatchNothing,
            serialize_updates: false,
            event_capacity: 256,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of column pairs per row.
    #[must_use]
    pub const fn column_count(mut self, count: u32) -> Self {
        self.column_count = count;
        self
    }

    /// Sets the base length of a column.
    #[must_use]
    pub const fn value_base_length(mut self, length: usize) -> Self {
        self.value_base_length = length;
        self
    }

    /// Sets entity cache capacity and lifetime.
    #[must_use]
    pub const fn entity_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.entity_cache_capacity = capacity;
        self.entity_cache_ttl = ttl;
        self
    }

    /// Sets the attribute map snapshot lifetime.
    #[must_use]
    pub const fn attribute_cache_ttl(mut self, ttl: Duration) -> Self {
        self.attribute_cache_ttl = ttl;
        self
    }

    /// Sets the resource cache lifetime.
    #[must_use]
    pub const fn resource_cache_ttl(mut self, ttl: Duration) -> Self {
        self.resource_cache_ttl = ttl;
        self
    }

    /// Sets the lock retry budget.
    #[must_use]
    pub const fn lock(mut self, options: LockOptions) -> Self {
        self.lock = options;
        self
    }

    /// Sets the store retry configuration.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the background usage flush period.
    #[must_use]
    pub const fn usage_flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.usage_flush_interval = interval;
        self
    }

    /// Sets how many columns get an index at table creation.
    #[must_use]
    pub const fn index_top_k(mut self, k: usize) -> Self {
        self.index_top_k = k;
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn default_page_size(mut self, size: u64) -> Self {
        self.default_page_size = size;
        self
    }

    /// Sets the unknown filter name policy.
    #[must_use]
    pub const fn unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_fields = policy;
        self
    }

    /// Sets whether updates to one id are serialized.
    #[must_use]
    pub const fn serialize_updates(mut self, value: bool) -> Self {
        self.serialize_updates = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.column_count, 64);
        assert_eq!(config.value_base_length, 255);
        assert_eq!(config.entity_cache_capacity, 500);
        assert_eq!(config.lock.try_max, 5);
        assert_eq!(config.unknown_fields, UnknownFieldPolicy::MatchNothing);
        assert!(!config.serialize_updates);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .column_count(4)
            .value_base_length(16)
            .unknown_fields(UnknownFieldPolicy::Ignore)
            .usage_flush_interval(None);

        assert_eq!(config.column_count, 4);
        assert_eq!(config.value_base_length, 16);
        assert_eq!(config.unknown_fields, UnknownFieldPolicy::Ignore);
        assert_eq!(config.usage_flush_interval, None);
    }
}
