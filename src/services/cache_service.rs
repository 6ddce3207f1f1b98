// src/services/cache_service.rs
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::{RideError, RideResult};
use crate::models::ride::{PageQuery, Ride};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entries older than this read as stale. `None` keeps them fresh until invalidated.
    pub default_ttl_seconds: Option<u64>,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: Some(300), // 5 minutes
            enabled: true,
        }
    }
}

/// Invalidation families. Every cached query belongs to exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    RideHistory(String),
    DriverRides,
    AdminRides,
    RideDetail(String),
    DriverProfile(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    RideHistory { rider_id: String, query: PageQuery },
    DriverRides { driver_id: String },
    AdminRides { query: PageQuery },
    RideDetail { ride_id: String },
    DriverProfile { user_id: String },
}

impl CacheKey {
    pub fn to_key_string(&self) -> String {
        match self {
            CacheKey::RideHistory { rider_id, query } => {
                format!("rides:history:{}:{}", rider_id, query.fingerprint())
            }
            CacheKey::DriverRides { driver_id } => format!("rides:available:{}", driver_id),
            CacheKey::AdminRides { query } => format!("rides:admin:{}", query.fingerprint()),
            CacheKey::RideDetail { ride_id } => format!("rides:detail:{}", ride_id),
            CacheKey::DriverProfile { user_id } => format!("drivers:profile:{}", user_id),
        }
    }

    pub fn tag(&self) -> Tag {
        match self {
            CacheKey::RideHistory { rider_id, .. } => Tag::RideHistory(rider_id.clone()),
            CacheKey::DriverRides { .. } => Tag::DriverRides,
            CacheKey::AdminRides { .. } => Tag::AdminRides,
            CacheKey::RideDetail { ride_id } => Tag::RideDetail(ride_id.clone()),
            CacheKey::DriverProfile { user_id } => Tag::DriverProfile(user_id.clone()),
        }
    }
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Fresh(T),
    /// Present but invalidated or past its TTL; the next read should refetch.
    Stale(T),
    Miss,
}

impl<T> Lookup<T> {
    /// The cached value regardless of freshness.
    pub fn into_value(self) -> Option<T> {
        match self {
            Lookup::Fresh(value) | Lookup::Stale(value) => Some(value),
            Lookup::Miss => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Lookup::Fresh(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Cache is disabled")]
    CacheDisabled,
}

impl From<CacheError> for RideError {
    fn from(err: CacheError) -> Self {
        RideError::JsonSerialization(err.to_string())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    json: String,
    tag: Tag,
    stored_at: DateTime<Utc>,
    stale: bool,
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, Entry>,
    /// Bumped on every invalidation of a tag, whether or not entries exist yet.
    generations: HashMap<Tag, u64>,
}

impl Store {
    fn generation(&self, tag: &Tag) -> u64 {
        self.generations.get(tag).copied().unwrap_or(0)
    }
}

/// Process-wide query cache shared by every view.
///
/// Values are stored as JSON, so a reader always gets its own copy and
/// can never mutate what another view sees. Only confirmed server
/// responses are written here.
///
/// A response fetched before an invalidation of its tag is stored stale,
/// so a fetch racing a mutation can never bring back the pre-mutation state
/// as fresh.
pub struct QueryCache {
    store: RwLock<Store>,
    config: CacheConfig,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: RwLock::new(Store::default()),
            config,
        }
    }

    fn is_expired(&self, stored_at: DateTime<Utc>) -> bool {
        match self.config.default_ttl_seconds {
            Some(seconds) => Utc::now() > stored_at + Duration::seconds(seconds as i64),
            None => false,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Lookup<T>, CacheError> {
        if !self.config.enabled {
            return Err(CacheError::CacheDisabled);
        }

        let key_str = key.to_key_string();
        let store = self.store.read().await;

        match store.entries.get(&key_str) {
            Some(entry) => {
                let value: T = serde_json::from_str(&entry.json)
                    .map_err(|e| CacheError::SerializationError(e.to_string()))?;
                if entry.stale || self.is_expired(entry.stored_at) {
                    Ok(Lookup::Stale(value))
                } else {
                    Ok(Lookup::Fresh(value))
                }
            }
            None => Ok(Lookup::Miss),
        }
    }

    /// Store `value` as a fresh entry.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<(), CacheError> {
        self.store_entry(key, value, None).await
    }

    /// Current generation of `tag`. Pass it to [`QueryCache::set_as_of`]
    /// when the value is fetched after this call.
    pub async fn generation(&self, tag: &Tag) -> u64 {
        self.store.read().await.generation(tag)
    }

    /// Store `value` fetched at `generation`. If the key's tag was
    /// invalidated since, the entry is stored stale.
    pub async fn set_as_of<T: Serialize>(&self, key: &CacheKey, value: &T, generation: u64) -> Result<(), CacheError> {
        self.store_entry(key, value, Some(generation)).await
    }

    async fn store_entry<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        fetched_at: Option<u64>,
    ) -> Result<(), CacheError> {
        if !self.config.enabled {
            return Err(CacheError::CacheDisabled);
        }

        let json = serde_json::to_string(value).map_err(|e| CacheError::SerializationError(e.to_string()))?;
        let tag = key.tag();

        let mut store = self.store.write().await;
        let stale = fetched_at.is_some_and(|generation| store.generation(&tag) != generation);
        if stale {
            tracing::debug!("{} was invalidated during its fetch, storing it stale", key.to_key_string());
        }
        store.entries.insert(
            key.to_key_string(),
            Entry {
                json,
                tag,
                stored_at: Utc::now(),
                stale,
            },
        );
        Ok(())
    }

    /// Mark every entry carrying one of `tags` as stale. Returns how many were marked.
    pub async fn invalidate_tags(&self, tags: &[Tag]) -> usize {
        let mut store = self.store.write().await;
        for tag in tags {
            *store.generations.entry(tag.clone()).or_insert(0) += 1;
        }
        let mut marked = 0;
        for entry in store.entries.values_mut().filter(|e| tags.contains(&e.tag)) {
            entry.stale = true;
            marked += 1;
        }
        tracing::debug!("Invalidated {} cache entries for {:?}", marked, tags);
        marked
    }

    /// Serve a fresh entry, or run `fetch` and store what it returns.
    /// A failed fetch leaves the cache as it was.
    pub async fn get_or_fetch<'a, T, F>(&self, key: &CacheKey, fetch: F) -> RideResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'a,
        F: FnOnce() -> BoxFuture<'a, RideResult<T>> + Send,
    {
        let generation = self.generation(&key.tag()).await;
        match self.get::<T>(key).await {
            Ok(Lookup::Fresh(value)) => {
                tracing::debug!("Cache hit for key: {}", key.to_key_string());
                return Ok(value);
            }
            Ok(_) => tracing::debug!("Cache miss for key: {}, fetching", key.to_key_string()),
            Err(CacheError::CacheDisabled) => return fetch().await,
            Err(e) => tracing::warn!("Dropping unreadable cache entry {}: {}", key.to_key_string(), e),
        }

        let value = fetch().await?;
        self.set_as_of(key, &value, generation).await?;
        Ok(value)
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }

    /// Tags a confirmed change to `ride` affects.
    pub fn tags_for(ride: &Ride) -> Vec<Tag> {
        vec![
            Tag::RideHistory(ride.rider_id.clone()),
            Tag::DriverRides,
            Tag::AdminRides,
            Tag::RideDetail(ride.id.clone()),
        ]
    }
}
