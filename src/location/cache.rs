//! TTL cache in front of a `LocationProvider`
//!
//! Entries live in the key-value store under `location.*` with their fetch time.
//! A fresh entry is served without a fetch; on fetch failure any cached entry is
//! served regardless of age. Country fetches are abort-and-replace: starting a new
//! one cancels the one in flight.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::{Country, DataSource, LocationError, LocationProvider, Region};
use crate::api::error::ApiError;
use crate::store::{KeyValueStore, StoreError};

const KEY_PREFIX: &str = "location.";
const COUNTRIES_KEY: &str = "location.countries";

fn states_key(country_code: &str) -> String {
    format!("{KEY_PREFIX}states.{country_code}")
}

#[derive(Debug, Deserialize)]
struct CacheEntry<T> {
    fetched_at: DateTime<Utc>,
    items: Vec<T>,
}

#[derive(Serialize)]
struct CacheEntryRef<'a, T> {
    fetched_at: DateTime<Utc>,
    items: &'a [T],
}

/// Result of a cached lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<T> {
    pub items: Vec<T>,
    pub source: DataSource,
    /// Fetch failure, set when the items came from a fallback or are missing
    pub error: Option<ApiError>,
}

impl<T> Lookup<T> {
    fn new(items: Vec<T>, source: DataSource) -> Self {
        Self {
            items,
            source,
            error: None,
        }
    }

    fn empty() -> Self {
        Self::new(Vec::new(), DataSource::Unavailable)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub struct LocationCache {
    provider: Arc<dyn LocationProvider>,
    store: Arc<dyn KeyValueStore>,
    ttl: chrono::Duration,
    generation: AtomicU64,
    countries_inflight: Mutex<Option<(u64, AbortHandle)>>,
}

impl LocationCache {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        store: Arc<dyn KeyValueStore>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            provider,
            store,
            ttl,
            generation: AtomicU64::new(0),
            countries_inflight: Mutex::new(None),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        match self.store.get_as::<CacheEntry<T>>(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Failed to read location cache");
                None
            }
        }
    }

    fn write_entry<T: Serialize>(&self, key: &str, items: &[T]) {
        let entry = CacheEntryRef {
            fetched_at: Utc::now(),
            items,
        };
        if let Err(e) = self.store.set_as(key, &entry) {
            warn!(key, error = %e, "Failed to save location cache");
        }
    }

    fn is_fresh<T>(&self, entry: &CacheEntry<T>) -> bool {
        Utc::now().signed_duration_since(entry.fetched_at) < self.ttl
    }

    /// Serve whatever the cache holds after a failed fetch
    fn fallback<T: DeserializeOwned>(&self, key: &str, error: ApiError) -> Lookup<T> {
        match self.read_entry::<T>(key) {
            Some(entry) => {
                let source = if self.is_fresh(&entry) {
                    DataSource::Cache
                } else {
                    DataSource::StaleCache
                };
                warn!(key, error = %error, source = source.as_str(), "Fetch failed, serving cached data");
                Lookup {
                    items: entry.items,
                    source,
                    error: Some(error),
                }
            }
            None => {
                warn!(key, error = %error, "Fetch failed and nothing is cached");
                Lookup {
                    error: Some(error),
                    ..Lookup::empty()
                }
            }
        }
    }

    /// Countries sorted by name.
    ///
    /// Returns `LocationError::Superseded` if another call started a newer fetch
    /// before this one finished.
    pub async fn get_countries(&self, force_refresh: bool) -> Result<Lookup<Country>, LocationError> {
        if !force_refresh {
            if let Some(entry) = self.read_entry::<Country>(COUNTRIES_KEY) {
                if self.is_fresh(&entry) {
                    debug!(count = entry.items.len(), "Countries served from cache");
                    return Ok(Lookup::new(entry.items, DataSource::Cache));
                }
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let provider = Arc::clone(&self.provider);
        let handle = tokio::spawn(async move { provider.list_countries().await });

        {
            let mut inflight = self
                .countries_inflight
                .lock()
                .map_err(|_| LocationError::Task("in-flight lock poisoned".to_string()))?;
            if let Some((previous, abort)) = inflight.replace((generation, handle.abort_handle())) {
                debug!(previous, generation, "Aborting in-flight country fetch");
                abort.abort();
            }
        }

        let joined = handle.await;

        if let Ok(mut inflight) = self.countries_inflight.lock() {
            if matches!(*inflight, Some((g, _)) if g == generation) {
                *inflight = None;
            }
        }

        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => return Err(LocationError::Superseded),
            Err(e) => return Err(LocationError::Task(e.to_string())),
        };
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(LocationError::Superseded);
        }

        match result {
            Ok(mut countries) => {
                countries.sort_by(|a, b| a.name.cmp(&b.name));
                self.write_entry(COUNTRIES_KEY, &countries);
                info!(count = countries.len(), provider = self.provider.name(), "Fetched countries");
                Ok(Lookup::new(countries, DataSource::Remote))
            }
            Err(e) => Ok(self.fallback(COUNTRIES_KEY, e)),
        }
    }

    pub async fn refresh_countries(&self) -> Result<Lookup<Country>, LocationError> {
        self.get_countries(true).await
    }

    /// Regions of one country. An empty code yields an empty list without a fetch.
    pub async fn get_states(&self, country_code: &str, force_refresh: bool) -> Lookup<Region> {
        let country_code = country_code.trim();
        if country_code.is_empty() {
            return Lookup::empty();
        }
        let key = states_key(country_code);

        if !force_refresh {
            if let Some(entry) = self.read_entry::<Region>(&key) {
                if self.is_fresh(&entry) {
                    debug!(country = country_code, "Regions served from cache");
                    return Lookup::new(entry.items, DataSource::Cache);
                }
            }
        }

        match self.provider.list_regions(country_code).await {
            Ok(regions) => {
                self.write_entry(&key, &regions);
                info!(country = country_code, count = regions.len(), "Fetched regions");
                Lookup::new(regions, DataSource::Remote)
            }
            Err(e) => self.fallback(&key, e),
        }
    }

    /// Case-insensitive substring match on name or code; empty query returns all
    pub async fn search_countries(&self, query: &str) -> Result<Lookup<Country>, LocationError> {
        let mut lookup = self.get_countries(false).await?;
        let query = query.trim().to_lowercase();
        if !query.is_empty() {
            lookup.items.retain(|c| {
                c.name.to_lowercase().contains(&query) || c.code.to_lowercase().contains(&query)
            });
        }
        Ok(lookup)
    }

    pub async fn find_country(&self, code: &str) -> Result<Option<Country>, LocationError> {
        let lookup = self.get_countries(false).await?;
        Ok(lookup
            .items
            .into_iter()
            .find(|c| c.code.eq_ignore_ascii_case(code)))
    }

    pub async fn is_valid_country_code(&self, code: &str) -> Result<bool, LocationError> {
        Ok(self.find_country(code).await?.is_some())
    }

    /// Remove every cached country and region entry, leaving other keys alone
    pub fn clear_cache(&self) -> Result<usize, StoreError> {
        let removed = self.store.remove_prefix(KEY_PREFIX)?;
        info!(removed, "Cleared location cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::fallback;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Counts calls; the first country call can be made slow
    struct TestProvider {
        country_calls: AtomicUsize,
        region_calls: AtomicUsize,
        fail: bool,
        first_call_delay: Duration,
    }

    impl TestProvider {
        fn new() -> Self {
            Self {
                country_calls: AtomicUsize::new(0),
                region_calls: AtomicUsize::new(0),
                fail: false,
                first_call_delay: Duration::ZERO,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl LocationProvider for TestProvider {
        fn name(&self) -> &str {
            "test"
        }

        async fn list_countries(&self) -> Result<Vec<Country>, ApiError> {
            let n = self.country_calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 && !self.first_call_delay.is_zero() {
                tokio::time::sleep(self.first_call_delay).await;
            }
            if self.fail {
                return Err(ApiError::network("test", "offline"));
            }
            let mut countries = fallback::countries();
            countries.reverse();
            Ok(countries)
        }

        async fn list_regions(&self, country_code: &str) -> Result<Vec<Region>, ApiError> {
            self.region_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ApiError::network("test", "offline"));
            }
            Ok(fallback::regions(country_code))
        }
    }

    fn cache_with(provider: Arc<TestProvider>, store: Arc<MemoryStore>) -> LocationCache {
        LocationCache::new(provider, store, chrono::Duration::hours(24))
    }

    fn seed(store: &MemoryStore, key: &str, age_hours: i64, items: serde_json::Value) {
        let fetched_at = Utc::now() - chrono::Duration::hours(age_hours);
        store
            .set(key, json!({"fetched_at": fetched_at, "items": items}))
            .unwrap();
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_uses_cache() {
        let provider = Arc::new(TestProvider::new());
        let cache = cache_with(provider.clone(), Arc::new(MemoryStore::new()));

        let first = cache.get_countries(false).await.unwrap();
        assert_eq!(first.source, DataSource::Remote);
        let second = cache.get_countries(false).await.unwrap();
        assert_eq!(second.source, DataSource::Cache);
        assert_eq!(first.items, second.items);
        assert_eq!(provider.country_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_always_fetches() {
        let provider = Arc::new(TestProvider::new());
        let cache = cache_with(provider.clone(), Arc::new(MemoryStore::new()));

        cache.get_countries(false).await.unwrap();
        cache.get_countries(true).await.unwrap();
        cache.refresh_countries().await.unwrap();
        assert_eq!(provider.country_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_results_sorted_by_name() {
        let cache = cache_with(Arc::new(TestProvider::new()), Arc::new(MemoryStore::new()));
        let lookup = cache.get_countries(false).await.unwrap();
        assert_eq!(lookup.items.first().map(|c| c.name.as_str()), Some("Australia"));
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let provider = Arc::new(TestProvider::new());
        let store = Arc::new(MemoryStore::new());
        seed(&store, COUNTRIES_KEY, 25, json!([]));
        let cache = cache_with(provider.clone(), store);

        let lookup = cache.get_countries(false).await.unwrap();
        assert_eq!(lookup.source, DataSource::Remote);
        assert_eq!(provider.country_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_serves_stale_cache() {
        let store = Arc::new(MemoryStore::new());
        seed(
            &store,
            COUNTRIES_KEY,
            72,
            json!([{"code": "US", "name": "United States", "tlds": [".us"]}]),
        );
        let cache = cache_with(Arc::new(TestProvider::failing()), store);

        let lookup = cache.get_countries(false).await.unwrap();
        assert_eq!(lookup.source, DataSource::StaleCache);
        assert_eq!(lookup.items.len(), 1);
        assert!(lookup.error.is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_without_cache_is_empty_with_error() {
        let cache = cache_with(Arc::new(TestProvider::failing()), Arc::new(MemoryStore::new()));
        let lookup = cache.get_countries(true).await.unwrap();
        assert!(lookup.is_empty());
        assert_eq!(lookup.source, DataSource::Unavailable);
        assert_eq!(lookup.error, Some(ApiError::network("test", "offline")));
    }

    #[tokio::test]
    async fn test_new_fetch_supersedes_in_flight_one() {
        let provider = Arc::new(TestProvider {
            first_call_delay: Duration::from_millis(200),
            ..TestProvider::new()
        });
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(provider.clone(), store.clone());

        let (first, second) = tokio::join!(cache.get_countries(true), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cache.get_countries(true).await
        });

        assert_eq!(first.unwrap_err(), LocationError::Superseded);
        let second = second.unwrap();
        assert_eq!(second.source, DataSource::Remote);
        assert_eq!(provider.country_calls.load(Ordering::SeqCst), 2);
        assert!(store.get(COUNTRIES_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_states_cached_per_country() {
        let provider = Arc::new(TestProvider::new());
        let cache = cache_with(provider.clone(), Arc::new(MemoryStore::new()));

        assert_eq!(cache.get_states("US", false).await.items.len(), 8);
        assert_eq!(cache.get_states("US", false).await.source, DataSource::Cache);
        assert_eq!(cache.get_states("CA", false).await.source, DataSource::Remote);
        assert_eq!(provider.region_calls.load(Ordering::SeqCst), 2);

        cache.get_states("US", true).await;
        assert_eq!(provider.region_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_country_code_does_not_fetch() {
        let provider = Arc::new(TestProvider::new());
        let cache = cache_with(provider.clone(), Arc::new(MemoryStore::new()));
        let lookup = cache.get_states("", false).await;
        assert!(lookup.is_empty());
        assert!(lookup.error.is_none());
        assert_eq!(provider.region_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_and_lookup() {
        let cache = cache_with(Arc::new(TestProvider::new()), Arc::new(MemoryStore::new()));

        let all = cache.search_countries("").await.unwrap();
        assert_eq!(all.items.len(), 8);

        let by_name = cache.search_countries("uNiTeD").await.unwrap();
        let codes: Vec<_> = by_name.items.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["UK", "US"]);

        let by_code = cache.search_countries("jp").await.unwrap();
        assert_eq!(by_code.items.len(), 1);

        assert!(cache.is_valid_country_code("DE").await.unwrap());
        assert!(!cache.is_valid_country_code("ZZ").await.unwrap());
        assert_eq!(
            cache.find_country("fr").await.unwrap().map(|c| c.name),
            Some("France".to_string())
        );
    }

    #[tokio::test]
    async fn test_clear_cache_only_touches_location_keys() {
        let store = Arc::new(MemoryStore::new());
        store.set("registration.draft", json!({})).unwrap();
        let cache = cache_with(Arc::new(TestProvider::new()), store.clone());

        cache.get_countries(false).await.unwrap();
        cache.get_states("US", false).await;
        assert_eq!(cache.clear_cache().unwrap(), 2);
        assert_eq!(store.keys().unwrap(), vec!["registration.draft".to_string()]);
    }
}
