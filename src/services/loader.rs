// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-wide resource loader with in-flight de-duplication.
//!
//! Layered the same way for every key:
//! 1. Registry hit: resolve immediately, no I/O
//! 2. Load already in flight for the key: attach to it
//! 3. Otherwise start one load, retried per the loader's [`RetryPolicy`]
//!
//! A successful load is published to the registry before the in-flight
//! marker is removed, so later callers never start a second load.
//!
//! Each fetch attempt runs as its own task. An attempt abandoned by the
//! per-attempt timeout keeps running, and if it succeeds it still publishes
//! to the registry, where the next attempt picks it up instead of fetching.

use crate::services::retry::{retry, LoadError, RetryPolicy, TerminalPolicy};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;

/// Performs one acquisition attempt for a resource key.
#[async_trait]
pub trait ResourceFetcher: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    async fn fetch(&self, key: &str) -> Result<Self::Output, LoadError>;
}

type InFlight<T> = Shared<BoxFuture<'static, Result<T, LoadError>>>;

/// Shared loader. Clones share the registry and in-flight table.
pub struct ResourceLoader<F: ResourceFetcher> {
    fetcher: Arc<F>,
    policy: RetryPolicy,
    loaded: Arc<DashMap<String, F::Output>>,
    in_flight: Arc<DashMap<String, InFlight<F::Output>>>,
}

impl<F: ResourceFetcher> Clone for ResourceLoader<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            policy: self.policy.clone(),
            loaded: self.loaded.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<F: ResourceFetcher> ResourceLoader<F> {
    pub fn new(fetcher: F, policy: RetryPolicy) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            policy,
            loaded: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Acquire the resource for `key`, loading it at most once at a time.
    ///
    /// After a terminal failure nothing is cached, so calling again is the
    /// manual retry.
    pub async fn acquire(&self, key: &str) -> Result<F::Output, LoadError> {
        if let Some(resource) = self.loaded.get(key) {
            tracing::debug!(resource = key, "Already loaded");
            return Ok(resource.clone());
        }

        let load = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!(resource = key, "Load already in flight, attaching");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // A load may have finished between the registry check and here.
                if let Some(resource) = self.loaded.get(key) {
                    return Ok(resource.clone());
                }
                let load = self.start_load(key.to_string()).boxed().shared();
                entry.insert(load.clone());
                load
            }
        };

        load.await
    }

    /// Whether `key` has been loaded successfully.
    pub fn is_loaded(&self, key: &str) -> bool {
        self.loaded.contains_key(key)
    }

    /// Drop a loaded resource so the next `acquire` fetches it again.
    pub fn invalidate(&self, key: &str) {
        self.loaded.remove(key);
    }

    fn start_load(&self, key: String) -> impl std::future::Future<Output = Result<F::Output, LoadError>> + Send + 'static {
        let fetcher = self.fetcher.clone();
        let policy = self.policy.clone();
        let loaded = self.loaded.clone();
        let in_flight = self.in_flight.clone();

        async move {
            tracing::info!(resource = %key, "Loading resource");

            let result = retry(&policy, TerminalPolicy::Fail, &key, |attempt| {
                let fetcher = fetcher.clone();
                let loaded = loaded.clone();
                let key = key.clone();
                async move {
                    // An earlier attempt that timed out may still have landed.
                    if attempt > 0 {
                        if let Some(resource) = loaded.get(&key) {
                            tracing::info!(resource = %key, "Resource became available during retry");
                            return Ok(resource.clone());
                        }
                    }

                    let fetch = tokio::spawn(async move {
                        let result = fetcher.fetch(&key).await;
                        if let Ok(resource) = &result {
                            loaded.entry(key).or_insert_with(|| resource.clone());
                        }
                        result
                    });
                    match fetch.await {
                        Ok(result) => result,
                        Err(e) => Err(LoadError::TransientNetwork(format!(
                            "fetch task failed: {}",
                            e
                        ))),
                    }
                }
            })
            .await;

            match &result {
                Ok(resource) => {
                    loaded.insert(key.clone(), resource.clone());
                    tracing::info!(resource = %key, "Resource loaded");
                }
                Err(e) => {
                    tracing::error!(resource = %key, error = %e, "Resource load failed");
                }
            }
            in_flight.remove(&key);

            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    struct CountingFetcher {
        calls: Arc<AtomicU32>,
        fail_first: u32,
        latency: Duration,
    }

    #[async_trait]
    impl ResourceFetcher for CountingFetcher {
        type Output = Arc<String>;

        async fn fetch(&self, key: &str) -> Result<Self::Output, LoadError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            if call < self.fail_first {
                return Err(LoadError::TransientNetwork(format!("attempt {call} failed")));
            }
            Ok(Arc::new(format!("loaded:{key}")))
        }
    }

    fn loader(fail_first: u32, policy: RetryPolicy) -> (ResourceLoader<CountingFetcher>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = CountingFetcher {
            calls: calls.clone(),
            fail_first,
            latency: Duration::from_millis(100),
        };
        (ResourceLoader::new(fetcher, policy), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_share_one_load() {
        let (loader, calls) = loader(0, RetryPolicy::map_script());

        let mut handles = vec![];
        for _ in 0..5 {
            let loader = loader.clone();
            handles.push(tokio::spawn(async move { loader.acquire("maps").await }));
        }

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value.as_str(), "loaded:maps");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded("maps"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_hit_skips_fetch() {
        let (loader, calls) = loader(0, RetryPolicy::map_script());

        loader.acquire("maps").await.unwrap();
        let start = Instant::now();
        loader.acquire("maps").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let (loader, calls) = loader(2, RetryPolicy::map_script());

        let value = loader.acquire("maps").await.unwrap();

        assert_eq!(value.as_str(), "loaded:maps");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_then_manual_retry() {
        let (loader, calls) = loader(4, RetryPolicy::map_script());

        let err = loader.acquire("maps").await.unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(!loader.is_loaded("maps"));

        // Fetcher now succeeds; a fresh acquire starts a new load.
        let value = loader.acquire("maps").await.unwrap();
        assert_eq!(value.as_str(), "loaded:maps");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    /// First call outlives the attempt timeout, later calls answer at once.
    struct LateFirstFetcher {
        calls: Arc<AtomicU32>,
        first_latency: Duration,
    }

    #[async_trait]
    impl ResourceFetcher for LateFirstFetcher {
        type Output = Arc<String>;

        async fn fetch(&self, _key: &str) -> Result<Self::Output, LoadError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(self.first_latency).await;
                return Ok(Arc::new("late".to_string()));
            }
            Ok(Arc::new("refetched".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_attempt_landing_during_backoff_is_used() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = LateFirstFetcher {
            calls: calls.clone(),
            first_latency: Duration::from_millis(10_500),
        };
        let loader = ResourceLoader::new(fetcher, RetryPolicy::map_script());
        let start = Instant::now();

        // Attempt 0 times out at 10s, lands at 10.5s, attempt 1 starts at 11s
        let value = loader.acquire("maps").await.unwrap();

        assert_eq!(value.as_str(), "late");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(11_000));
        assert!(loader.is_loaded("maps"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_attempt_landing_late_does_not_block_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = LateFirstFetcher {
            calls: calls.clone(),
            first_latency: Duration::from_secs(60),
        };
        let loader = ResourceLoader::new(fetcher, RetryPolicy::map_script());

        let value = loader.acquire("maps").await.unwrap();

        assert_eq!(value.as_str(), "refetched");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_reload() {
        let (loader, calls) = loader(0, RetryPolicy::map_script());

        loader.acquire("maps").await.unwrap();
        loader.invalidate("maps");
        loader.acquire("maps").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
