use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

use crate::core::strong_types::UserId;
use crate::models::User;

pub struct Cache<K, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> Cache<K, V> {
    /// A zero capacity is bumped to one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Cache {
            inner: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Profile documents keyed by uid, shared across request tasks
pub struct ProfileCache {
    inner: Mutex<Cache<UserId, User>>,
}

impl ProfileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Cache::new(capacity)),
        }
    }

    pub async fn get(&self, id: UserId) -> Option<User> {
        self.inner.lock().await.get(&id).cloned()
    }

    pub async fn put(&self, user: User) {
        self.inner.lock().await.insert(user.id, user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: i64) -> User {
        User {
            id: UserId(id),
            email: format!("u{}@example.com", id),
            display_name: format!("u{}", id),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = Cache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.get(&1), Some(&"a"));
        cache.insert(3, "c");
        // 2 was least recently used
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_is_usable() {
        let mut cache = Cache::new(0);
        cache.insert("k", 1);
        assert_eq!(cache.get(&"k"), Some(&1));
    }

    #[tokio::test]
    async fn test_profile_cache_roundtrip() {
        let cache = ProfileCache::new(4);
        cache.put(user(1)).await;
        assert_eq!(cache.get(UserId(1)).await.map(|u| u.display_name), Some("u1".to_string()));
        assert!(cache.get(UserId(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_profile_cache_evicts_oldest() {
        let cache = ProfileCache::new(2);
        cache.put(user(1)).await;
        cache.put(user(2)).await;
        cache.put(user(3)).await;
        assert!(cache.get(UserId(1)).await.is_none());
        assert_eq!(cache.get(UserId(3)).await.map(|u| u.id), Some(UserId(3)));
    }
}
