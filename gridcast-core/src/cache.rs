//! Memoized coordinate → grid identity resolution.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tracing::{debug, info};

use crate::{
    error::ForecastError,
    model::{Coordinate, GridIdentity},
    provider::PointResolver,
    store::GridStore,
};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Resolves coordinates to grid identities, calling the point resolver only on
/// the first request for a rounded coordinate.
///
/// Concurrent first requests for one key are serialized on a per-key lock so
/// the resolver runs once; distinct keys never wait on each other. The store's
/// insert is itself idempotent, so a second process sharing the database
/// cannot produce duplicates either.
#[derive(Debug)]
pub struct GridIdentityCache {
    store: Arc<GridStore>,
    resolver: Arc<dyn PointResolver>,
    in_flight: Mutex<HashMap<String, KeyLock>>,
}

impl GridIdentityCache {
    pub fn new(store: Arc<GridStore>, resolver: Arc<dyn PointResolver>) -> Self {
        Self {
            store,
            resolver,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<GridStore> {
        &self.store
    }

    pub async fn resolve(&self, coordinate: Coordinate) -> Result<GridIdentity, ForecastError> {
        let key = coordinate.key();

        if let Some(hit) = self.lookup(&key).await? {
            debug!(%key, "grid identity cache hit");
            return Ok(hit);
        }

        let slot = InFlight {
            lock: self.key_lock(&key)?,
            key: &key,
            cache: self,
        };
        let _guard = slot.lock.lock().await;
        self.resolve_locked(coordinate, &key).await
    }

    async fn resolve_locked(
        &self,
        coordinate: Coordinate,
        key: &str,
    ) -> Result<GridIdentity, ForecastError> {
        // Another request may have filled the key while we waited.
        if let Some(hit) = self.lookup(key).await? {
            debug!(%key, "grid identity filled while waiting");
            return Ok(hit);
        }

        debug!(%key, "grid identity cache miss, resolving point");
        let point = self.resolver.resolve_point(coordinate).await?;
        let identity = point.into_identity(key.to_string());
        let stored = self
            .with_store(move |store| store.insert_if_absent(&identity))
            .await?;

        info!(
            %key,
            grid_id = %stored.grid_id,
            grid_x = stored.grid_x,
            grid_y = stored.grid_y,
            city = %stored.city,
            "stored new grid identity"
        );
        Ok(stored)
    }

    async fn lookup(&self, key: &str) -> Result<Option<GridIdentity>, ForecastError> {
        let key = key.to_string();
        self.with_store(move |store| store.get(&key)).await
    }

    /// Run a store call on the blocking pool; SQLite I/O stays off the async workers.
    async fn with_store<T, F>(&self, f: F) -> Result<T, ForecastError>
    where
        T: Send + 'static,
        F: FnOnce(&GridStore) -> Result<T, ForecastError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| ForecastError::Storage(format!("store task failed: {e}")))?
    }

    fn key_lock(&self, key: &str) -> Result<KeyLock, ForecastError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| ForecastError::Storage("in-flight map lock poisoned".into()))?;
        Ok(Arc::clone(in_flight.entry(key.to_string()).or_default()))
    }

    /// Forget the per-key lock once nobody else holds or awaits it.
    fn release(&self, key: &str, lock: &KeyLock) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            let ours = in_flight.get(key).is_some_and(|l| Arc::ptr_eq(l, lock));
            // One reference in the map, one held by the caller.
            if ours && Arc::strong_count(lock) <= 2 {
                in_flight.remove(key);
            }
        }
    }
}

/// Claim on a per-key lock, released on drop so a cancelled resolution does
/// not leave its entry behind.
struct InFlight<'a> {
    lock: KeyLock,
    key: &'a str,
    cache: &'a GridIdentityCache,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.cache.release(self.key, &self.lock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PointMetadata;
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[derive(Debug, Default)]
    struct CountingResolver {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PointResolver for CountingResolver {
        async fn resolve_point(
            &self,
            coordinate: Coordinate,
        ) -> Result<PointMetadata, ForecastError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Widen the race window.
            tokio::time::sleep(Duration::from_millis(20)).await;

            if self.fail {
                return Err(ForecastError::UpstreamResolutionFailure("provider down".into()));
            }

            Ok(PointMetadata {
                grid_x: (coordinate.latitude() * 10.0) as i64,
                grid_y: 34,
                grid_id: "OKX".into(),
                city: "New York".into(),
                state: "NY".into(),
                time_zone: "America/New_York".into(),
            })
        }
    }

    fn cache_with(resolver: Arc<CountingResolver>) -> GridIdentityCache {
        let store = Arc::new(GridStore::in_memory().unwrap());
        GridIdentityCache::new(store, resolver)
    }

    #[tokio::test]
    async fn miss_then_hit_calls_resolver_once() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = cache_with(Arc::clone(&resolver));
        let coord = Coordinate::new(40.71, -74.0).unwrap();

        let first = cache.resolve(coord).await.unwrap();
        let second = cache.resolve(coord).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.key, "40.71,-74.00");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn raw_and_rounded_coordinates_share_an_entry() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = cache_with(Arc::clone(&resolver));

        cache.resolve(Coordinate::new(40.7128, -74.0012).unwrap()).await.unwrap();
        cache.resolve(Coordinate::new(40.71, -74.00).unwrap()).await.unwrap();

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.store().count().unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_resolutions_store_one_identity() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = Arc::new(cache_with(Arc::clone(&resolver)));
        let coord = Coordinate::new(40.71, -74.0).unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.resolve(coord).await })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap().unwrap());
        }

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.store().count().unwrap(), 1);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn distinct_coordinates_resolve_independently() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = Arc::new(cache_with(Arc::clone(&resolver)));

        let a = Coordinate::new(40.71, -74.0).unwrap();
        let b = Coordinate::new(41.88, -87.63).unwrap();
        let (ra, rb) = tokio::join!(cache.resolve(a), cache.resolve(b));

        assert_ne!(ra.unwrap().key, rb.unwrap().key);
        assert_eq!(cache.store().count().unwrap(), 2);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_resolutions_leave_no_lock_behind() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = cache_with(Arc::clone(&resolver));

        for i in 0..50 {
            let coord = Coordinate::new(f64::from(i), 10.0).unwrap();
            let res = tokio::time::timeout(Duration::from_millis(1), cache.resolve(coord)).await;
            assert!(res.is_err(), "resolution should have timed out");
        }

        assert!(cache.in_flight.lock().unwrap().is_empty());
        assert_eq!(cache.store().count().unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancelled_waiter_does_not_disturb_the_owner() {
        let resolver = Arc::new(CountingResolver::default());
        let cache = Arc::new(cache_with(Arc::clone(&resolver)));
        let coord = Coordinate::new(40.71, -74.0).unwrap();

        let owner = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve(coord).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let waiter = tokio::time::timeout(Duration::from_millis(1), cache.resolve(coord)).await;
        assert!(waiter.is_err());

        let stored = owner.await.unwrap().unwrap();
        assert_eq!(stored.key, "40.71,-74.00");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_leaves_cache_untouched() {
        let resolver = Arc::new(CountingResolver {
            fail: true,
            ..Default::default()
        });
        let cache = cache_with(Arc::clone(&resolver));

        let err = cache
            .resolve(Coordinate::new(40.71, -74.0).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, ForecastError::UpstreamResolutionFailure(_)));
        assert_eq!(cache.store().count().unwrap(), 0);
    }
}
