//! Read-through cache hook.
//!
//! The cache is never authoritative. The coordinator invalidates keys after
//! each commit and treats every cache failure as a miss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CacheError;

/// Key of a user's list of active borrowings.
pub fn user_borrowings_key(user_id: common::UserId) -> String {
    format!("user:{user_id}:borrowed")
}

/// Key of a book's availability counts.
pub fn book_availability_key(book_id: common::BookId) -> String {
    format!("books:{book_id}:availability")
}

/// Pattern covering every key of one user.
pub fn user_pattern(user_id: common::UserId) -> String {
    format!("user:{user_id}:*")
}

/// Pattern covering book listings and per-book entries.
pub const BOOKS_PATTERN: &str = "books:*";

/// A string-valued cache with pattern invalidation.
///
/// A pattern ending in `*` matches every key with that prefix; any other
/// pattern matches one key exactly.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;

    /// Drops all entries matching `pattern`.
    async fn invalidate(&self, pattern: &str) -> Result<(), CacheError>;
}

/// Cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate(&self, _pattern: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// TTL cache held in process memory.
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    ttl: Duration,
    offline: Arc<AtomicBool>,
}

impl InMemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every call fail as if the cache server were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_online(&self) -> Result<(), CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("cache offline".to_string()));
        }
        Ok(())
    }
}

fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_online()?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.check_online()?;
        let expires_at = Instant::now() + self.ttl;
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.expires_at > Instant::now());
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn invalidate(&self, pattern: &str) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries
            .write()
            .await
            .retain(|key, _| !matches_pattern(pattern, key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BookId, UserId};

    #[test]
    fn pattern_matching() {
        assert!(matches_pattern("books:*", "books:42:availability"));
        assert!(matches_pattern("user:1:*", "user:1:borrowed"));
        assert!(!matches_pattern("user:1:*", "user:12:borrowed"));
        assert!(matches_pattern("exact", "exact"));
        assert!(!matches_pattern("exact", "exactly"));
    }

    #[tokio::test]
    async fn set_get_and_invalidate_by_prefix() {
        let cache = InMemoryCache::new(Duration::from_secs(60));
        let user = UserId::new();
        let book = BookId::new();
        cache.set(&user_borrowings_key(user), "[]".into()).await.unwrap();
        cache.set(&book_availability_key(book), "{}".into()).await.unwrap();

        cache.invalidate(&user_pattern(user)).await.unwrap();

        assert!(cache.get(&user_borrowings_key(user)).await.unwrap().is_none());
        assert_eq!(
            cache.get(&book_availability_key(book)).await.unwrap().as_deref(),
            Some("{}")
        );

        cache.invalidate(BOOKS_PATTERN).await.unwrap();
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new(Duration::from_millis(20));
        cache.set("k", "v".into()).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn offline_cache_reports_unavailable() {
        let cache = InMemoryCache::new(Duration::from_secs(60));
        cache.set_offline(true);
        assert!(matches!(
            cache.get("k").await,
            Err(CacheError::Unavailable(_))
        ));
        assert!(cache.invalidate("*").await.is_err());
    }

    #[tokio::test]
    async fn noop_cache_never_hits() {
        let cache = NoopCache;
        cache.set("k", "v".into()).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
