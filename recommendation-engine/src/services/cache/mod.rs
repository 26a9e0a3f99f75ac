/// Recommendation Cache
///
/// Per-query memoization with absolute TTL and single-flight computation:
/// at most one in-flight compute per key, with concurrent callers awaiting
/// the published outcome. Computations run on a detached task, so a caller
/// abandoning its request never strands the other waiters.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::models::Recommendation;

/// Identity under which a Recommendation is memoized: consumer identity
/// plus a fingerprint of the candidate set (and requested bounds).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub consumer: String,
    pub fingerprint: u64,
}

/// Outcome published to waiters. The error side is a message rather than
/// the typed error so it can be cloned to every waiter.
type ComputeOutcome = std::result::Result<Recommendation, String>;

#[derive(Clone)]
struct ReadyEntry {
    recommendation: Recommendation,
    expires_at: Instant,
}

struct PendingSlot {
    /// Flight id ties a pending slot to the task that owns it, so a task
    /// whose slot was invalidated mid-flight does not republish.
    id: u64,
    rx: watch::Receiver<Option<ComputeOutcome>>,
}

enum CacheSlot {
    Ready(ReadyEntry),
    Pending(PendingSlot),
}

struct CacheInner {
    entries: DashMap<QueryKey, CacheSlot>,
    flight_counter: AtomicU64,
}

pub struct RecommendationCache {
    inner: Arc<CacheInner>,
}

impl Default for RecommendationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommendationCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                flight_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Return the cached Recommendation for `key`, or run `compute` exactly
    /// once across all concurrent callers and publish its result for `ttl`.
    /// A failed computation reaches every waiter as `CacheComputation` and
    /// leaves the key uncached so a later call can retry.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: QueryKey,
        ttl: Duration,
        compute: F,
    ) -> Result<Recommendation>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<Recommendation>> + Send + 'static,
    {
        let mut compute = Some(compute);

        loop {
            let waiter = match self.inner.entries.get(&key) {
                Some(slot) => match slot.value() {
                    CacheSlot::Ready(entry) if entry.expires_at > Instant::now() => {
                        debug!(consumer = %key.consumer, "Recommendation cache hit");
                        return Ok(entry.recommendation.clone());
                    }
                    // Expired entries are evicted lazily by the takeover below
                    CacheSlot::Ready(_) => None,
                    CacheSlot::Pending(pending) => Some((pending.rx.clone(), pending.id)),
                },
                None => None,
            };

            if let Some((rx, flight)) = waiter {
                match await_outcome(rx).await {
                    Some(outcome) => return outcome,
                    None => {
                        // The producer vanished without publishing (task
                        // panic); clear the dead slot before retrying
                        self.inner.entries.remove_if(&key, |_, slot| {
                            matches!(slot, CacheSlot::Pending(pending) if pending.id == flight)
                        });
                        continue;
                    }
                }
            }

            // Miss: try to become the producer for this key
            let (tx, rx) = watch::channel(None);
            let flight_id = self.inner.flight_counter.fetch_add(1, Ordering::Relaxed);

            let installed = match self.inner.entries.entry(key.clone()) {
                dashmap::mapref::entry::Entry::Occupied(mut occupied) => match occupied.get() {
                    CacheSlot::Ready(entry) if entry.expires_at > Instant::now() => {
                        return Ok(entry.recommendation.clone());
                    }
                    CacheSlot::Pending(_) => false,
                    CacheSlot::Ready(_) => {
                        occupied.insert(CacheSlot::Pending(PendingSlot {
                            id: flight_id,
                            rx: rx.clone(),
                        }));
                        true
                    }
                },
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    vacant.insert(CacheSlot::Pending(PendingSlot {
                        id: flight_id,
                        rx: rx.clone(),
                    }));
                    true
                }
            };

            if !installed {
                // Lost the race; rejoin the loop as a waiter
                continue;
            }

            let Some(compute) = compute.take() else {
                // A producer installs at most once per call
                return Err(EngineError::CacheComputation(
                    "duplicate compute installation".to_string(),
                ));
            };

            debug!(consumer = %key.consumer, "Recommendation cache miss, computing");

            let inner = Arc::clone(&self.inner);
            let task_key = key.clone();
            let fut = compute();
            tokio::spawn(async move {
                let outcome: ComputeOutcome = match fut.await {
                    Ok(recommendation) => Ok(recommendation),
                    Err(e) => Err(e.to_string()),
                };

                match &outcome {
                    Ok(recommendation) => {
                        if let dashmap::mapref::entry::Entry::Occupied(mut occupied) =
                            inner.entries.entry(task_key)
                        {
                            let owns_slot = matches!(
                                occupied.get(),
                                CacheSlot::Pending(pending) if pending.id == flight_id
                            );
                            if owns_slot {
                                occupied.insert(CacheSlot::Ready(ReadyEntry {
                                    recommendation: recommendation.clone(),
                                    expires_at: Instant::now() + ttl,
                                }));
                            }
                        }
                    }
                    Err(message) => {
                        warn!(error = %message, "Recommendation computation failed, key left uncached");
                        inner.entries.remove_if(&task_key, |_, slot| {
                            matches!(slot, CacheSlot::Pending(pending) if pending.id == flight_id)
                        });
                    }
                }

                // Wake waiters only after the map reflects the outcome
                let _ = tx.send(Some(outcome));
            });

            return match await_outcome(rx).await {
                Some(outcome) => outcome,
                None => {
                    self.inner.entries.remove_if(&key, |_, slot| {
                        matches!(slot, CacheSlot::Pending(pending) if pending.id == flight_id)
                    });
                    Err(EngineError::CacheComputation(
                        "computation aborted before publishing".to_string(),
                    ))
                }
            };
        }
    }

    /// Drop the entry for `key`. An in-flight computation keeps serving its
    /// current waiters but will not publish into the invalidated slot.
    pub fn invalidate(&self, key: &QueryKey) {
        self.inner.entries.remove(key);
    }

    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

/// Wait for a pending computation to publish. `None` means the producer
/// vanished without publishing; the caller should retry from the top.
async fn await_outcome(
    mut rx: watch::Receiver<Option<ComputeOutcome>>,
) -> Option<Result<Recommendation>> {
    let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
        Ok(value) => value.clone(),
        Err(_) => return None,
    };

    match outcome {
        Some(Ok(recommendation)) => Some(Ok(recommendation)),
        Some(Err(message)) => Some(Err(EngineError::CacheComputation(message))),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    fn key(consumer: &str) -> QueryKey {
        QueryKey {
            consumer: consumer.to_string(),
            fingerprint: 7,
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = RecommendationCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let compute = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Recommendation::empty())
            }
        };

        let (first, second) = tokio::join!(
            cache.get_or_compute(key("u1"), ttl, compute(Arc::clone(&calls))),
            cache.get_or_compute(key("u1"), ttl, compute(Arc::clone(&calls))),
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entry_served_within_ttl() {
        let cache = RecommendationCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let result = cache
                .get_or_compute(key("u1"), ttl, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Recommendation::empty())
                })
                .await;
            assert!(result.is_ok());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let cache = RecommendationCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_millis(20);

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let result = cache
                .get_or_compute(key("u1"), ttl, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Recommendation::empty())
                })
                .await;
            assert!(result.is_ok());
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_computation_reaches_waiters_and_is_not_cached() {
        let cache = RecommendationCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let failing = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Err(anyhow!("model backend exploded"))
            }
        };

        let (first, second) = tokio::join!(
            cache.get_or_compute(key("u1"), ttl, failing(Arc::clone(&calls))),
            cache.get_or_compute(key("u1"), ttl, failing(Arc::clone(&calls))),
        );

        assert!(matches!(first, Err(EngineError::CacheComputation(_))));
        assert!(matches!(second, Err(EngineError::CacheComputation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());

        // The key is retryable after the failure
        let calls_retry = Arc::clone(&calls);
        let retried = cache
            .get_or_compute(key("u1"), ttl, move || async move {
                calls_retry.fetch_add(1, Ordering::SeqCst);
                Ok(Recommendation::empty())
            })
            .await;
        assert!(retried.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let cache = RecommendationCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let result = cache
                .get_or_compute(key("u1"), ttl, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Recommendation::empty())
                })
                .await;
            assert!(result.is_ok());
            cache.invalidate(&key("u1"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_compute_independently() {
        let cache = RecommendationCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        for consumer in ["u1", "u2"] {
            let calls = Arc::clone(&calls);
            let result = cache
                .get_or_compute(key(consumer), ttl, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Recommendation::empty())
                })
                .await;
            assert!(result.is_ok());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_strand_waiters() {
        let cache = Arc::new(RecommendationCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        // First caller starts the computation, then is dropped via timeout
        let starter = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::time::timeout(
                Duration::from_millis(10),
                async move {
                    cache
                        .get_or_compute(key("u1"), ttl, move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(60)).await;
                            Ok(Recommendation::empty())
                        })
                        .await
                },
            )
        };
        assert!(starter.await.is_err(), "starter should time out");

        // A later caller still receives the published result of that flight
        let calls_late = Arc::clone(&calls);
        let late = cache
            .get_or_compute(key("u1"), ttl, move || async move {
                calls_late.fetch_add(1, Ordering::SeqCst);
                Ok(Recommendation::empty())
            })
            .await;

        assert!(late.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
