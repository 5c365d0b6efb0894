//! Bounded parse cache
//!
//! LRU over `(expression, options)` with wall-clock TTL eviction. Entries
//! hold a shared, immutable AST; callers must not mutate through the Arc.
//! Thread-safe: the cache lives behind a single mutex, which is adequate
//! because parsing is far cheaper than the translation/execution work that
//! follows a miss.

use crate::ast::ExprNode;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Options that affect parse output and therefore participate in the
/// cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParseOptions {
    /// Run structural validation after building.
    pub validate: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    expression: String,
    options: ParseOptions,
}

struct CacheEntry {
    ast: Arc<ExprNode>,
    created: Instant,
}

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded, TTL-evicting parse cache.
pub struct ParseCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    max_age: Duration,
    stats: Mutex<CacheStatistics>,
}

impl ParseCache {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            max_age,
            stats: Mutex::new(CacheStatistics::default()),
        }
    }

    pub fn get(&self, expression: &str, options: ParseOptions) -> Option<Arc<ExprNode>> {
        let key = CacheKey {
            expression: expression.to_string(),
            options,
        };
        let mut entries = self.entries.lock().expect("parse cache poisoned");
        let mut stats = self.stats.lock().expect("parse cache stats poisoned");

        match entries.get(&key) {
            Some(entry) if entry.created.elapsed() <= self.max_age => {
                stats.hits += 1;
                debug!(expression, "parse cache hit");
                Some(Arc::clone(&entry.ast))
            }
            Some(_) => {
                entries.pop(&key);
                stats.expirations += 1;
                stats.misses += 1;
                None
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, expression: &str, options: ParseOptions, ast: Arc<ExprNode>) {
        let key = CacheKey {
            expression: expression.to_string(),
            options,
        };
        let mut entries = self.entries.lock().expect("parse cache poisoned");
        entries.put(
            key,
            CacheEntry {
                ast,
                created: Instant::now(),
            },
        );
    }

    /// Drop entries past their TTL; returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.lock().expect("parse cache poisoned");
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.created.elapsed() > self.max_age)
            .map(|(key, _)| key.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            entries.pop(&key);
        }
        if count > 0 {
            let mut stats = self.stats.lock().expect("parse cache stats poisoned");
            stats.expirations += count as u64;
        }
        count
    }

    pub fn statistics(&self) -> CacheStatistics {
        *self.stats.lock().expect("parse cache stats poisoned")
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("parse cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().expect("parse cache poisoned").clear();
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        // 1000 entries comfortably covers a compliance-suite run;
        // the TTL bounds staleness for long-lived hosts.
        Self::new(1000, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, LiteralValue};
    use crate::token::Span;

    fn ast() -> Arc<ExprNode> {
        Arc::new(ExprNode::new(
            ExprKind::Literal(LiteralValue::Integer(1)),
            Span::default(),
        ))
    }

    #[test]
    fn hit_after_put() {
        let cache = ParseCache::default();
        let options = ParseOptions::default();
        assert!(cache.get("1", options).is_none());
        cache.put("1", options, ast());
        assert!(cache.get("1", options).is_some());
        let stats = cache.statistics();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn options_partition_the_key_space() {
        let cache = ParseCache::default();
        cache.put("1", ParseOptions { validate: true }, ast());
        assert!(cache.get("1", ParseOptions { validate: false }).is_none());
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = ParseCache::new(10, Duration::from_millis(0));
        let options = ParseOptions::default();
        cache.put("1", options, ast());
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get("1", options).is_none());
        assert_eq!(cache.statistics().expirations, 1);
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = ParseCache::new(2, Duration::from_secs(60));
        let options = ParseOptions::default();
        cache.put("1", options, ast());
        cache.put("2", options, ast());
        cache.put("3", options, ast());
        assert_eq!(cache.len(), 2);
        assert!(cache.get("1", options).is_none());
    }

    #[test]
    fn cleanup_reports_removed_count() {
        let cache = ParseCache::new(10, Duration::from_millis(0));
        let options = ParseOptions::default();
        cache.put("1", options, ast());
        cache.put("2", options, ast());
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.cleanup_expired(), 2);
        assert!(cache.is_empty());
    }
}
