//! Bounded TTL cache for suggestion lookups, one per consumer.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::models::structs::DatabaseSchema;
use crate::services::schema::{SchemaProvider, ServiceError};

/// MD5 hex digest of the request parts, unit-separator joined.
pub fn cache_key(parts: &[&str]) -> String {
    format!("{:x}", md5::compute(parts.join("\u{1f}")))
}

#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    inserted: Instant,
}

pub struct SuggestionCache<V> {
    inner: Mutex<HashMap<String, CacheEntry<V>>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> SuggestionCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { inner: Mutex::new(HashMap::new()), capacity: capacity.max(1), ttl }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut guard = self.inner.lock().ok()?;
        let fresh = guard.get(key).map(|e| now.saturating_duration_since(e.inserted) < self.ttl)?;
        if fresh {
            log::debug!("suggestion cache hit {}", key);
            guard.get(key).map(|e| e.value.clone())
        } else {
            guard.remove(key);
            log::debug!("suggestion cache expired {}", key);
            None
        }
    }

    pub fn insert(&self, key: String, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: String, value: V, now: Instant) {
        let Ok(mut guard) = self.inner.lock() else { return };
        if !guard.contains_key(&key) && guard.len() >= self.capacity {
            let ttl = self.ttl;
            guard.retain(|_, e| now.saturating_duration_since(e.inserted) < ttl);
            if guard.len() >= self.capacity {
                let oldest = guard.iter().min_by_key(|(_, e)| e.inserted).map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    guard.remove(&k);
                }
            }
        }
        guard.insert(key, CacheEntry { value, inserted: now });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut g) = self.inner.lock() {
            g.clear();
        }
    }
}

/// `SchemaProvider` that remembers successful lookups.
pub struct CachedSchemaProvider<P> {
    inner: P,
    cache: SuggestionCache<DatabaseSchema>,
}

impl<P: SchemaProvider> CachedSchemaProvider<P> {
    pub fn new(inner: P, capacity: usize, ttl: Duration) -> Self {
        Self { inner, cache: SuggestionCache::new(capacity, ttl) }
    }

    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

#[async_trait]
impl<P: SchemaProvider> SchemaProvider for CachedSchemaProvider<P> {
    async fn schema(&self, database_name: &str) -> Result<DatabaseSchema, ServiceError> {
        let key = cache_key(&["schema", database_name]);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        log::debug!("suggestion cache miss for schema {}", database_name);
        let schema = self.inner.schema(database_name).await?;
        self.cache.insert(key, schema.clone());
        Ok(schema)
    }
}
