//! Fingerprint-keyed store of rendered queries.
//!
//! Entries are immutable and never evicted. Keys are built by
//! [`crate::translate::Translator`] from the serialized trace, metadata,
//! registry and options, so two inputs share an entry only when every one of
//! those serializes identically.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::output::RenderedQuery;

static GLOBAL: Lazy<TranslationCache> = Lazy::new(TranslationCache::new);

/// Thread-safe map from input fingerprint to rendered query.
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: RwLock<HashMap<String, Arc<RenderedQuery>>>,
}

impl TranslationCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance, created on first use.
    pub fn global() -> &'static TranslationCache {
        &GLOBAL
    }

    /// Look up a fingerprint.
    pub fn get(&self, fingerprint: &str) -> Option<Arc<RenderedQuery>> {
        self.entries.read().get(fingerprint).cloned()
    }

    /// Store a result. An existing entry for the same fingerprint is kept,
    /// since equal fingerprints always render identically.
    pub fn insert(&self, fingerprint: String, rendered: RenderedQuery) -> Arc<RenderedQuery> {
        self.entries
            .write()
            .entry(fingerprint)
            .or_insert_with(|| Arc::new(rendered))
            .clone()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(sql: &str) -> RenderedQuery {
        RenderedQuery {
            sql: sql.to_string(),
            parameters: Vec::new(),
        }
    }

    #[test]
    fn first_insert_wins() {
        let cache = TranslationCache::new();
        cache.insert("k".to_string(), rendered("SELECT 1"));
        let kept = cache.insert("k".to_string(), rendered("SELECT 2"));
        assert_eq!(kept.sql, "SELECT 1");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k").map(|r| r.sql.clone()), Some("SELECT 1".into()));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = TranslationCache::new();
        cache.insert("k".to_string(), rendered("SELECT 1"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn shared_across_threads() {
        let cache = Arc::new(TranslationCache::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache.insert(format!("k{i}"), rendered("SELECT 1"));
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("insert thread should not panic");
        }
        assert_eq!(cache.len(), 4);
    }
}
