use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::UserProfile;

/// Lock guarding one user's profile.
///
/// `None` until the profile has been read from disk (or created) for the first time.
pub type ProfileSlot = Arc<Mutex<Option<UserProfile>>>;

struct CacheEntry {
    slot: ProfileSlot,
    last_access: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    clock: u64,
}

/// Bounded registry of in-memory profiles keyed by user id
///
/// Each user gets exactly one live slot. The slot's mutex serializes that user's
/// load-mutate-persist cycle while different users proceed independently. When the
/// registry grows past its capacity the least recently used slots are dropped, but
/// only slots nobody is holding: evicting a held slot would let a second lock for the
/// same user appear.
pub struct ProfileCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ProfileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }

    /// Returns the slot for `user_id`, creating an empty one if needed
    pub async fn slot(&self, user_id: &str) -> ProfileSlot {
        let mut inner = self.inner.lock().await;
        inner.clock += 1;
        let now = inner.clock;

        if let Some(entry) = inner.entries.get_mut(user_id) {
            entry.last_access = now;
            return entry.slot.clone();
        }

        let slot: ProfileSlot = Arc::new(Mutex::new(None));
        inner.entries.insert(
            user_id.to_string(),
            CacheEntry {
                slot: slot.clone(),
                last_access: now,
            },
        );
        Self::evict(&mut inner, self.capacity);

        slot
    }

    fn evict(inner: &mut CacheInner, capacity: usize) {
        while inner.entries.len() > capacity {
            let victim = inner
                .entries
                .iter()
                .filter(|(_, entry)| Arc::strong_count(&entry.slot) == 1)
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(user_id, _)| user_id.clone());

            match victim {
                Some(user_id) => {
                    inner.entries.remove(&user_id);
                    tracing::debug!(user_id = %user_id, "Evicted profile from cache");
                }
                None => {
                    tracing::warn!(
                        size = inner.entries.len(),
                        capacity,
                        "Profile cache over capacity, every slot is in use"
                    );
                    break;
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.inner.lock().await.entries.contains_key(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_user_shares_slot() {
        let cache = ProfileCache::new(4);
        let a = cache.slot("alice").await;
        let b = cache.slot("alice").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let cache = ProfileCache::new(2);
        drop(cache.slot("alice").await);
        drop(cache.slot("bob").await);
        drop(cache.slot("alice").await);
        drop(cache.slot("carol").await);

        assert_eq!(cache.len().await, 2);
        assert!(cache.contains("alice").await);
        assert!(!cache.contains("bob").await);
        assert!(cache.contains("carol").await);
    }

    #[tokio::test]
    async fn test_held_slots_are_not_evicted() {
        let cache = ProfileCache::new(1);
        let held = cache.slot("alice").await;
        let _bob = cache.slot("bob").await;

        // Both are in use, so the cache stays over capacity
        assert_eq!(cache.len().await, 2);

        drop(held);
        drop(cache.slot("carol").await);
        assert!(!cache.contains("alice").await);
        assert!(cache.contains("bob").await);
    }
}
