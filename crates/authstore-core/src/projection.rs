//! Cached projections of JSON-encoded columns.
//!
//! Multi-valued attributes (permission lists, redirect URIs, localized
//! names, property bags, key sets) are persisted as JSON text in a single
//! column. Reading them parses the text once and memoizes the structured
//! value, keyed by the exact raw text, in a process-wide cache with a
//! sliding expiration.
//!
//! Each attribute kind lives in its own cache so that identical JSON text
//! projected into different shapes never collides.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use moka::sync::Cache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ProjectionCacheConfig, StoreConfig};
use crate::error::StoreResult;

/// A list of strings (permissions, redirect URIs, scopes, resources).
pub type StringList = Vec<String>;

/// A map of string settings.
pub type StringMap = BTreeMap<String, String>;

/// A map of culture name to localized text.
pub type LocalizedMap = BTreeMap<String, String>;

/// A bag of opaque JSON properties.
pub type PropertyMap = BTreeMap<String, Value>;

/// A JSON Web Key Set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// The keys of the set, kept as raw JWK objects.
    #[serde(default)]
    pub keys: Vec<Value>,
}

impl JsonWebKeySet {
    /// Returns `true` if the set contains no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Values that can be projected from a JSON column.
pub trait Projected: DeserializeOwned + Serialize + Default + Send + Sync + 'static {
    /// Returns `true` if the value should be persisted as `NULL`.
    fn is_empty_projection(&self) -> bool;
}

impl Projected for StringList {
    fn is_empty_projection(&self) -> bool {
        self.is_empty()
    }
}

impl Projected for BTreeMap<String, String> {
    fn is_empty_projection(&self) -> bool {
        self.is_empty()
    }
}

impl Projected for PropertyMap {
    fn is_empty_projection(&self) -> bool {
        self.is_empty()
    }
}

impl Projected for JsonWebKeySet {
    fn is_empty_projection(&self) -> bool {
        self.is_empty()
    }
}

type ProjectionMap<T> = Cache<Arc<str>, Arc<T>>;

/// Process-wide cache of parsed JSON columns.
pub struct ProjectionCache {
    strings: ProjectionMap<StringList>,
    maps: ProjectionMap<StringMap>,
    localized: ProjectionMap<LocalizedMap>,
    properties: ProjectionMap<PropertyMap>,
    key_sets: ProjectionMap<JsonWebKeySet>,
}

impl ProjectionCache {
    /// Creates a cache with default settings.
    pub fn new() -> Self {
        Self::with_config(&ProjectionCacheConfig::default())
    }

    /// Creates a cache with custom capacity and idle timeout.
    pub fn with_config(config: &ProjectionCacheConfig) -> Self {
        Self {
            strings: build(config.max_capacity, config.idle_timeout),
            maps: build(config.max_capacity, config.idle_timeout),
            localized: build(config.max_capacity, config.idle_timeout),
            properties: build(config.max_capacity, config.idle_timeout),
            key_sets: build(config.max_capacity, config.idle_timeout),
        }
    }

    /// Projects a list-of-strings column.
    pub fn strings(&self, raw: Option<&str>) -> StoreResult<Arc<StringList>> {
        project(&self.strings, raw)
    }

    /// Projects a string map column.
    pub fn map(&self, raw: Option<&str>) -> StoreResult<Arc<StringMap>> {
        project(&self.maps, raw)
    }

    /// Projects a localized text column.
    pub fn localized(&self, raw: Option<&str>) -> StoreResult<Arc<LocalizedMap>> {
        project(&self.localized, raw)
    }

    /// Projects a property bag column.
    pub fn properties(&self, raw: Option<&str>) -> StoreResult<Arc<PropertyMap>> {
        project(&self.properties, raw)
    }

    /// Projects a JSON Web Key Set column.
    pub fn key_set(&self, raw: Option<&str>) -> StoreResult<Arc<JsonWebKeySet>> {
        project(&self.key_sets, raw)
    }

    /// Clears all caches.
    pub fn clear(&self) {
        self.strings.invalidate_all();
        self.maps.invalidate_all();
        self.localized.invalidate_all();
        self.properties.invalidate_all();
        self.key_sets.invalidate_all();
    }

    /// Runs pending maintenance so that `stats` reports settled counts.
    pub fn sync(&self) {
        self.strings.run_pending_tasks();
        self.maps.run_pending_tasks();
        self.localized.run_pending_tasks();
        self.properties.run_pending_tasks();
        self.key_sets.run_pending_tasks();
    }

    /// Get cache statistics.
    pub fn stats(&self) -> ProjectionCacheStats {
        ProjectionCacheStats {
            string_entries: self.strings.entry_count(),
            map_entries: self.maps.entry_count(),
            localized_entries: self.localized.entry_count(),
            property_entries: self.properties.entry_count(),
            key_set_entries: self.key_sets.entry_count(),
        }
    }
}

impl Default for ProjectionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProjectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionCache")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionCacheStats {
    pub string_entries: u64,
    pub map_entries: u64,
    pub localized_entries: u64,
    pub property_entries: u64,
    pub key_set_entries: u64,
}

impl ProjectionCacheStats {
    /// Total number of cached projections.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.string_entries
            + self.map_entries
            + self.localized_entries
            + self.property_entries
            + self.key_set_entries
    }
}

impl From<&StoreConfig> for ProjectionCache {
    fn from(config: &StoreConfig) -> Self {
        Self::with_config(&config.projection_cache)
    }
}

static PROJECTION_CACHE: OnceLock<Arc<ProjectionCache>> = OnceLock::new();

/// Creates the global projection cache from `config`.
///
/// Returns `false` and keeps the existing cache if it was already created,
/// either by an earlier call or by a store resolved before this one.
pub fn init_global(config: &ProjectionCacheConfig) -> bool {
    PROJECTION_CACHE
        .set(Arc::new(ProjectionCache::with_config(config)))
        .is_ok()
}

/// Get a handle to the global projection cache, creating it with default
/// settings on first use.
pub fn global() -> Arc<ProjectionCache> {
    Arc::clone(PROJECTION_CACHE.get_or_init(|| Arc::new(ProjectionCache::new())))
}

/// Serializes a projected value into its column form.
///
/// Empty values clear the column. Output is compact and leaves non-ASCII
/// characters unescaped.
pub fn encode<T: Projected>(value: &T) -> StoreResult<Option<String>> {
    if value.is_empty_projection() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(value)?))
}

fn build<T: Send + Sync + 'static>(capacity: u64, idle: Duration) -> ProjectionMap<T> {
    Cache::builder()
        .max_capacity(capacity)
        .time_to_idle(idle)
        .build()
}

fn project<T: Projected>(cache: &ProjectionMap<T>, raw: Option<&str>) -> StoreResult<Arc<T>> {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(Arc::new(T::default())),
    };

    if let Some(hit) = cache.get(raw) {
        return Ok(hit);
    }

    let parsed: Arc<T> = Arc::new(serde_json::from_str(raw)?);
    cache.insert(Arc::from(raw), Arc::clone(&parsed));
    Ok(parsed)
}
