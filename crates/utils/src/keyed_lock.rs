//! Per-key async lock whose entries disappear once nobody holds or waits on them

use std::hash::Hash;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap<K> = Arc<DashMap<K, Weak<Mutex<()>>>>;

/// Guard returned by [`KeyedAsyncLock::lock`].
///
/// Dropping it releases the key. If no other task holds or waits for the same
/// key, the entry is removed from the map right away.
pub struct KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    guard: Option<OwnedMutexGuard<()>>,
    mutex: Arc<Mutex<()>>,
    key: K,
    locks: LockMap<K>,
}

impl<K> Drop for KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        drop(self.guard.take());

        // only `self.mutex` is left once waiters and the owned guard are gone
        if Arc::strong_count(&self.mutex) == 1 {
            self.locks
                .remove_if(&self.key, |_, weak| weak.strong_count() <= 1);
        }
    }
}

/// Serializes work per key while letting different keys proceed in parallel.
///
/// Entries are held as `Weak` references so the map only contains keys that
/// are currently locked or contended.
///
/// ```rust,ignore
/// let locks = KeyedAsyncLock::<String>::new();
/// let _guard = locks.lock(&"default/my-pod".to_string()).await;
/// // ... mutate state owned by that pod ...
/// ```
pub struct KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    locks: LockMap<K>,
}

impl<K> KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Waits until `key` is free and takes it.
    pub async fn lock(&self, key: &K) -> KeyedLockGuard<K> {
        let mutex = self.get_or_create(key);
        let guard = Arc::clone(&mutex).lock_owned().await;

        KeyedLockGuard {
            guard: Some(guard),
            mutex,
            key: key.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    fn get_or_create(&self, key: &K) -> Arc<Mutex<()>> {
        loop {
            match self.locks.entry(key.clone()) {
                Entry::Occupied(occupied) => {
                    if let Some(strong) = occupied.get().upgrade() {
                        return strong;
                    }
                    occupied.remove();
                }
                Entry::Vacant(vacant) => {
                    let strong = Arc::new(Mutex::new(()));
                    vacant.insert(Arc::downgrade(&strong));
                    return strong;
                }
            }
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K> Default for KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use similar_asserts::assert_eq;
    use tokio::time::sleep;

    use super::*;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedAsyncLock::<String>::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&"default/pod-a".to_string()).await;
                let val = counter.load(Ordering::SeqCst);
                sleep(Duration::from_millis(1)).await;
                counter.store(val + 1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = KeyedAsyncLock::<String>::new();

        let _first = locks.lock(&"default/pod-a".to_string()).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock(&"default/pod-b".to_string()),
        )
        .await;

        assert!(second.is_ok(), "second key should be acquired immediately");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn released_keys_are_removed() {
        let locks = KeyedAsyncLock::<u32>::new();

        {
            let _guard = locks.lock(&7).await;
            assert_eq!(locks.len(), 1);
        }

        assert!(locks.is_empty());

        for i in 0..100 {
            let _guard = locks.lock(&i).await;
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn contended_key_survives_first_release() {
        let locks = Arc::new(KeyedAsyncLock::<u32>::new());
        let guard = locks.lock(&1).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(&1).await;
            })
        };

        // let the waiter register on the mutex
        sleep(Duration::from_millis(20)).await;
        drop(guard);
        waiter.await.unwrap();

        assert!(locks.is_empty());
    }
}
