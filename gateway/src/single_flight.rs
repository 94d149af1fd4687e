//! Keyed single-flight cache for resolved tenant routes.
//!
//! The first caller for a key runs the resolver; callers arriving while the
//! resolve is in flight suspend and receive the same outcome. Successful
//! values are held for the life of the process. Errors are never memoized:
//! the entry is dropped so the next request retries with a fresh resolver.

use crate::metrics_defs::{ROUTE_CACHE_HIT, ROUTE_CACHE_MISS};
use parking_lot::Mutex;
use shared::counter;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::watch;

enum Entry<V, E> {
    // Waiters park on the receiver until the owner publishes the outcome.
    Pending(watch::Receiver<Option<Result<V, E>>>),
    Resolved(V),
}

pub struct SingleFlightCache<V, E> {
    entries: Mutex<HashMap<String, Entry<V, E>>>,
}

// Removes an abandoned Pending entry. Dropping the paired sender closes the
// channel, which sends waiters back to re-attempt the resolve.
struct EvictOnDrop<'a, V, E> {
    entries: &'a Mutex<HashMap<String, Entry<V, E>>>,
    key: &'a str,
    armed: bool,
}

impl<V, E> Drop for EvictOnDrop<'_, V, E> {
    fn drop(&mut self) {
        if self.armed {
            self.entries.lock().remove(self.key);
        }
    }
}

impl<V, E> Default for SingleFlightCache<V, E>
where
    V: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> SingleFlightCache<V, E>
where
    V: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        SingleFlightCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key`, or runs `resolve` to produce it.
    ///
    /// At most one resolver per key runs at a time; the resolver runs outside
    /// the map lock. Every caller that joins while it is in flight receives a
    /// clone of the same `Result`.
    pub async fn get<F, Fut>(&self, key: &str, resolve: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let tx = 'install: loop {
            let mut rx = {
                let mut entries = self.entries.lock();
                match entries.get(key) {
                    Some(Entry::Resolved(value)) => {
                        counter!(ROUTE_CACHE_HIT).increment(1);
                        return Ok(value.clone());
                    }
                    Some(Entry::Pending(rx)) => {
                        counter!(ROUTE_CACHE_HIT).increment(1);
                        rx.clone()
                    }
                    None => {
                        counter!(ROUTE_CACHE_MISS).increment(1);
                        let (tx, rx) = watch::channel(None);
                        entries.insert(key.to_owned(), Entry::Pending(rx));
                        break 'install tx;
                    }
                }
            };

            let wait_result = rx.wait_for(|outcome| outcome.is_some()).await;
            match wait_result {
                Ok(outcome) => {
                    if let Some(result) = outcome.as_ref() {
                        return result.clone();
                    }
                }
                // The owning caller was dropped mid-resolve; re-attempt.
                Err(_) => continue 'install,
            }
        };

        // This caller owns the resolve for the installed Pending entry.
        let mut evict = EvictOnDrop {
            entries: &self.entries,
            key,
            armed: true,
        };
        let result = resolve().await;
        {
            let mut entries = self.entries.lock();
            match &result {
                Ok(value) => {
                    entries.insert(key.to_owned(), Entry::Resolved(value.clone()));
                }
                Err(_) => {
                    entries.remove(key);
                }
            }
            evict.armed = false;
        }
        let _ = tx.send(Some(result.clone()));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_returns_cached_value() {
        let cache: SingleFlightCache<String, String> = SingleFlightCache::new();

        let first = cache.get("a", || async { Ok("wee".to_string()) }).await;
        let second = cache.get("a", || async { Ok("wee2".to_string()) }).await;

        assert_eq!(first, Ok("wee".to_string()));
        assert_eq!(second, Ok("wee".to_string()));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache: SingleFlightCache<String, String> = SingleFlightCache::new();

        let a = cache.get("a", || async { Ok("val-a".to_string()) }).await;
        let b = cache.get("b", || async { Ok("val-b".to_string()) }).await;

        assert_eq!(a, Ok("val-a".to_string()));
        assert_eq!(b, Ok("val-b".to_string()));
    }

    #[tokio::test]
    async fn test_error_not_memoized() {
        let cache: SingleFlightCache<String, String> = SingleFlightCache::new();
        let calls = AtomicUsize::new(0);

        let resolver = |fail: bool| {
            let calls = &calls;
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err("test_error".to_string())
                } else {
                    Ok("test_value".to_string())
                }
            }
        };

        assert_eq!(cache.get("k1", resolver(true)).await, Err("test_error".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(cache.get("k1", resolver(true)).await, Err("test_error".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(cache.get("k1", resolver(false)).await, Ok("test_value".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Resolved now; the new resolver must not run.
        assert_eq!(cache.get("k1", resolver(true)).await, Ok("test_value".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_resolve() {
        let cache: Arc<SingleFlightCache<String, String>> = Arc::new(SingleFlightCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get("key1", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("wee".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok("wee".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_error() {
        let cache: Arc<SingleFlightCache<String, String>> = Arc::new(SingleFlightCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get("key1", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err::<String, _>("boom".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err("boom".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The failed entry was evicted, so the next caller resolves afresh.
        let value = cache
            .get("key1", || async { Ok("recovered".to_string()) })
            .await;
        assert_eq!(value, Ok("recovered".to_string()));
    }
}
