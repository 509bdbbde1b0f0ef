//! Persistent cache of event bundles keyed by language and [`DateKey`].
//!
//! Entries are serialized as JSON into a [`KeyValueStore`] under
//! `historical_events_{language}_MM-DD`. Reads never fail: unreadable or
//! inconsistent entries are reported as absent and evicted. Writes and purges
//! for the same storage key are serialized by a per-key async guard; different
//! keys never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use yesterday_store::{KeyValueStore, StoreError};

use crate::date_key::{language_key_prefix, DateKey, CACHE_KEY_PREFIX};
use crate::upstream::normalize_language;
use crate::{EventRecord, EventSource, UtcDateTime, ValidationError};

/// Freshness window for cached events.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Age after which stale entries are purged outright.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Whether a fetch may be answered from a fresh cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a fresh entry if present; otherwise fetch and write through. (Default)
    #[default]
    Use,
    /// Skip the freshness short-circuit but still write the live result.
    Refresh,
}

/// One cached event bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub date_key: DateKey,
    /// Wiki language the events were fetched in.
    #[serde(default = "default_language")]
    pub language: String,
    pub events: Vec<EventRecord>,
    pub fetched_at: UtcDateTime,
    pub source: EventSource,
}

impl CacheEntry {
    /// `now - fetched_at < ttl`.
    pub fn is_fresh(&self, now: UtcDateTime, ttl: Duration) -> bool {
        now.saturating_since(self.fetched_at) < ttl
    }

    pub fn age(&self, now: UtcDateTime) -> Duration {
        now.saturating_since(self.fetched_at)
    }

    fn check_consistency(
        &self,
        expected_key: DateKey,
        expected_language: &str,
    ) -> Result<(), String> {
        if self.date_key != expected_key {
            return Err(format!(
                "entry key {} stored under {expected_key}",
                self.date_key
            ));
        }
        if self.language != expected_language {
            return Err(format!(
                "entry language {} stored under {expected_language}",
                self.language
            ));
        }
        if self.source == EventSource::Live && self.events.is_empty() {
            return Err(String::from("live entry has no events"));
        }
        if self.events.windows(2).any(|pair| pair[0].year() > pair[1].year()) {
            return Err(String::from("events are not in chronological order"));
        }
        self.events
            .iter()
            .try_for_each(EventRecord::validate)
            .map_err(|error| error.to_string())
    }
}

fn default_language() -> String {
    String::from("en")
}

/// Cache errors. Only writes surface these; reads recover locally.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    InvalidData(#[from] ValidationError),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Summary of what the cache currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_bytes: usize,
    pub oldest: Option<UtcDateTime>,
    pub newest: Option<UtcDateTime>,
}

type WriteGuards = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Event cache for one language over a shared [`KeyValueStore`].
///
/// Caches for different languages may share a store; each reads and writes
/// only its own keys. Purging, stats and [`PersistentCache::clear`] span
/// every language in the store.
#[derive(Clone)]
pub struct PersistentCache {
    store: Arc<dyn KeyValueStore>,
    language: String,
    write_guards: WriteGuards,
}

impl PersistentCache {
    /// English cache over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            language: default_language(),
            write_guards: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Scopes the cache to `language`, normalized the same way as the
    /// Wikipedia provider.
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = normalize_language(language);
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// `now - entry.fetched_at < ttl`.
    pub fn is_fresh(entry: &CacheEntry, now: UtcDateTime, ttl: Duration) -> bool {
        entry.is_fresh(now, ttl)
    }

    /// Returns the entry for `key`, or `None` when it is missing, unreadable,
    /// or corrupt. Corrupt entries are evicted.
    pub async fn get(&self, key: DateKey) -> Option<CacheEntry> {
        let storage_key = key.storage_key(&self.language);
        let raw = match self.store.read(&storage_key).await {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(%storage_key, %error, "cache read failed; treating as absent");
                return None;
            }
        };

        match decode(&self.language, key, &raw) {
            Ok(entry) => Some(entry),
            Err(reason) => {
                warn!(%storage_key, %reason, "evicting corrupt cache entry");
                self.evict_if_unchanged(&storage_key, &raw).await;
                None
            }
        }
    }

    /// Stores `events` for `key`, sorted by year, stamped `now` (or the
    /// previous stamp if that is later).
    pub async fn put(
        &self,
        key: DateKey,
        mut events: Vec<EventRecord>,
        source: EventSource,
        now: UtcDateTime,
    ) -> Result<CacheEntry, CacheError> {
        if source == EventSource::Live && events.is_empty() {
            return Err(ValidationError::EmptyLivePayload.into());
        }
        events.iter().try_for_each(EventRecord::validate)?;
        events.sort_by_key(|event| event.year());

        let storage_key = key.storage_key(&self.language);
        let guard = self.write_guard(&storage_key);
        let _held = guard.lock().await;

        let previous = self
            .store
            .read(&storage_key)
            .await
            .ok()
            .flatten()
            .and_then(|raw| decode(&self.language, key, &raw).ok());
        let fetched_at = previous
            .map(|entry| entry.fetched_at.max(now))
            .unwrap_or(now);

        let entry = CacheEntry {
            date_key: key,
            language: self.language.clone(),
            events,
            fetched_at,
            source,
        };
        let encoded = serde_json::to_string(&entry)?;
        self.store.write(&storage_key, &encoded).await?;
        debug!(%storage_key, events = entry.events.len(), %source, "cached events");
        Ok(entry)
    }

    /// Removes entries in any language at least `max_age` old, plus corrupt
    /// entries and keys that do not name a language and date.
    /// Storage errors skip the affected key.
    pub async fn purge_expired(&self, now: UtcDateTime, max_age: Duration) -> usize {
        let storage_keys = match self.store.keys(CACHE_KEY_PREFIX).await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(%error, "cache purge could not list keys");
                return 0;
            }
        };

        let mut removed = 0;
        for storage_key in storage_keys {
            let Some((language, key)) = DateKey::from_storage_key(&storage_key) else {
                if self.store.remove(&storage_key).await.is_ok() {
                    removed += 1;
                }
                continue;
            };

            let guard = self.write_guard(&storage_key);
            let _held = guard.lock().await;

            let expired = match self.store.read(&storage_key).await {
                Ok(Some(raw)) => match decode(language, key, &raw) {
                    Ok(entry) => !entry.is_fresh(now, max_age),
                    Err(_) => true,
                },
                Ok(None) => false,
                Err(error) => {
                    warn!(%storage_key, %error, "cache purge could not read entry");
                    false
                }
            };

            if expired {
                match self.store.remove(&storage_key).await {
                    Ok(()) => removed += 1,
                    Err(error) => {
                        warn!(%storage_key, %error, "cache purge could not remove entry");
                    }
                }
            }
        }

        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
        removed
    }

    pub async fn remove(&self, key: DateKey) -> Result<(), CacheError> {
        let storage_key = key.storage_key(&self.language);
        let guard = self.write_guard(&storage_key);
        let _held = guard.lock().await;
        self.store.remove(&storage_key).await?;
        Ok(())
    }

    /// Removes every cached bundle in every language and returns how many
    /// were removed.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        self.remove_prefixed(CACHE_KEY_PREFIX).await
    }

    /// Removes the bundles cached for `language` only.
    pub async fn clear_language(&self, language: &str) -> Result<usize, CacheError> {
        let removed = self
            .remove_prefixed(&language_key_prefix(&normalize_language(language)))
            .await?;
        debug!(language, removed, "cleared cached language");
        Ok(removed)
    }

    /// Date keys with a stored (not necessarily valid) entry in this
    /// cache's language.
    pub async fn keys(&self) -> Result<Vec<DateKey>, CacheError> {
        Ok(self
            .store
            .keys(&language_key_prefix(&self.language))
            .await?
            .iter()
            .filter_map(|storage_key| DateKey::from_storage_key(storage_key))
            .filter(|(language, _)| *language == self.language)
            .map(|(_, key)| key)
            .collect())
    }

    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats {
            total_entries: 0,
            total_bytes: 0,
            oldest: None,
            newest: None,
        };

        for storage_key in self.store.keys(CACHE_KEY_PREFIX).await? {
            let Some((language, key)) = DateKey::from_storage_key(&storage_key) else {
                continue;
            };
            let Some(raw) = self.store.read(&storage_key).await? else {
                continue;
            };
            let Ok(entry) = decode(language, key, &raw) else {
                continue;
            };

            stats.total_entries += 1;
            stats.total_bytes += raw.len();
            stats.oldest = Some(
                stats
                    .oldest
                    .map_or(entry.fetched_at, |oldest| oldest.min(entry.fetched_at)),
            );
            stats.newest = Some(
                stats
                    .newest
                    .map_or(entry.fetched_at, |newest| newest.max(entry.fetched_at)),
            );
        }

        Ok(stats)
    }

    async fn remove_prefixed(&self, prefix: &str) -> Result<usize, CacheError> {
        let storage_keys = self.store.keys(prefix).await?;
        for storage_key in &storage_keys {
            let guard = self.write_guard(storage_key);
            let _held = guard.lock().await;
            self.store.remove(storage_key).await?;
        }
        Ok(storage_keys.len())
    }

    fn write_guard(&self, storage_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guards = self
            .write_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(guards.entry(storage_key.to_owned()).or_default())
    }

    async fn evict_if_unchanged(&self, storage_key: &str, raw: &str) {
        let guard = self.write_guard(storage_key);
        let _held = guard.lock().await;

        let unchanged = matches!(
            self.store.read(storage_key).await,
            Ok(Some(current)) if current == raw
        );
        if unchanged {
            if let Err(error) = self.store.remove(storage_key).await {
                warn!(%storage_key, %error, "could not evict corrupt cache entry");
            }
        }
    }
}

fn decode(language: &str, key: DateKey, raw: &str) -> Result<CacheEntry, String> {
    let entry: CacheEntry = serde_json::from_str(raw).map_err(|error| error.to_string())?;
    entry.check_consistency(key, language)?;
    Ok(entry)
}
