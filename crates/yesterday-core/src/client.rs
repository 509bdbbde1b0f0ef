//! Cache-first, resilient client for historical events.
//!
//! A fetch consults the [`PersistentCache`] for the configured language first.
//! Stale or missing entries go to the upstream provider behind the circuit
//! breaker, then the rate limiter, then the retry policy. Concurrent fetches
//! for the same date key share one upstream call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use yesterday_store::{KeyValueStore, MemoryStore};

use crate::cache::{CacheEntry, CacheError, CacheMode, PersistentCache};
use crate::circuit_breaker::{BreakerState, CircuitBreaker};
use crate::config::{ClientConfig, SupplementSource, UpstreamConfig};
use crate::date_key::today_key;
use crate::retry::RetryOutcome;
use crate::status::{FetchStatus, StatusPublisher};
use crate::throttling::{Acquire, RateLimiter, RateWindow};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::upstream::{
    ApiNinjasProvider, CompositeProvider, EventsProvider, MuffinLabsProvider, WikipediaProvider,
};
use crate::{ClientError, DateKey, EventList, EventRecord, EventSource, UtcDateTime};

pub type FetchResult = Result<EventList, ClientError>;

/// Per-call knobs for [`HistoricalEventsClient::fetch_events_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchOptions {
    /// How long this caller waits. Expiry detaches the caller only; a shared
    /// upstream fetch keeps running for everyone else.
    pub timeout: Option<Duration>,
    pub cache_mode: CacheMode,
}

impl FetchOptions {
    pub fn refresh() -> Self {
        Self {
            cache_mode: CacheMode::Refresh,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

type InFlight = Mutex<HashMap<DateKey, watch::Receiver<Option<FetchResult>>>>;

struct ClientInner {
    config: ClientConfig,
    cache: PersistentCache,
    provider: Arc<dyn EventsProvider>,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    status: StatusPublisher,
    in_flight: InFlight,
}

/// Entry point for the UI layer. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct HistoricalEventsClient {
    inner: Arc<ClientInner>,
}

impl HistoricalEventsClient {
    pub fn builder() -> HistoricalEventsClientBuilder {
        HistoricalEventsClientBuilder::default()
    }

    pub fn new(
        config: ClientConfig,
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn EventsProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                cache: PersistentCache::new(store).with_language(&config.upstream.language),
                provider,
                breaker: CircuitBreaker::new(config.breaker),
                limiter: RateLimiter::new(config.rate_limit),
                status: StatusPublisher::new(),
                in_flight: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Events for the calendar day `now` falls on in the configured timezone.
    pub async fn fetch_today_events(&self, now: UtcDateTime) -> FetchResult {
        self.fetch_events_for(self.today(now), now, FetchOptions::default())
            .await
    }

    /// Like [`fetch_today_events`](Self::fetch_today_events) but ignores a
    /// fresh cache entry. Fallback to stale data still applies.
    pub async fn force_refresh(&self, now: UtcDateTime) -> FetchResult {
        self.fetch_events_for(self.today(now), now, FetchOptions::refresh())
            .await
    }

    pub async fn fetch_events_for(
        &self,
        key: DateKey,
        now: UtcDateTime,
        options: FetchOptions,
    ) -> FetchResult {
        let loading = self.inner.status.begin();

        let work = self.resolve(key, now, options.cache_mode);
        let result = match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, work)
                .await
                .unwrap_or(Err(ClientError::Timeout { timeout })),
            None => work.await,
        };

        loading.finish(&result);
        result
    }

    pub fn today(&self, now: UtcDateTime) -> DateKey {
        today_key(self.inner.config.timezone.to_local(now.into_inner()))
    }

    pub fn status(&self) -> FetchStatus {
        self.inner.status.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchStatus> {
        self.inner.status.subscribe()
    }

    pub fn cache(&self) -> &PersistentCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.inner.breaker.snapshot()
    }

    pub fn rate_window(&self) -> Option<RateWindow> {
        self.inner.limiter.snapshot()
    }

    /// Closes the breaker and restores the full rate-limit quota.
    pub fn reset_resilience(&self) {
        self.inner.breaker.reset();
        self.inner.limiter.reset();
        self.inner.status.reset();
    }

    async fn resolve(&self, key: DateKey, now: UtcDateTime, mode: CacheMode) -> FetchResult {
        let inner = &self.inner;

        inner
            .cache
            .purge_expired(now, inner.config.cache.retention)
            .await;

        let cached = inner.cache.get(key).await;
        if mode == CacheMode::Use {
            if let Some(entry) = cached
                .as_ref()
                .filter(|entry| entry.is_fresh(now, inner.config.cache.ttl))
            {
                debug!(%key, age_secs = entry.age(now).as_secs(), "serving fresh cache entry");
                return Ok(cached_list(entry, entry.source));
            }
        }

        self.shared_remote(key, now, cached).await
    }

    /// Joins the in-flight upstream fetch for `key`, starting one if needed.
    async fn shared_remote(
        &self,
        key: DateKey,
        now: UtcDateTime,
        stale: Option<CacheEntry>,
    ) -> FetchResult {
        let mut receiver = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            // A closed channel means the owning task died without publishing.
            match in_flight
                .get(&key)
                .filter(|receiver| receiver.has_changed().is_ok())
            {
                Some(receiver) => {
                    debug!(%key, "joining in-flight fetch");
                    receiver.clone()
                }
                None => {
                    let (sender, receiver) = watch::channel(None);
                    in_flight.insert(key, receiver.clone());

                    let client = self.clone();
                    tokio::spawn(async move {
                        let result = client.fetch_remote(key, now, stale).await;
                        sender.send_replace(Some(result));
                        client
                            .inner
                            .in_flight
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&key);
                    });
                    receiver
                }
            }
        };

        loop {
            if let Some(result) = receiver.borrow_and_update().clone() {
                return result;
            }
            if receiver.changed().await.is_err() {
                return receiver.borrow().clone().unwrap_or_else(|| {
                    Err(ClientError::UpstreamUnavailable {
                        message: String::from("fetch task ended without a result"),
                    })
                });
            }
        }
    }

    async fn fetch_remote(
        &self,
        key: DateKey,
        now: UtcDateTime,
        stale: Option<CacheEntry>,
    ) -> FetchResult {
        let inner = &self.inner;

        if !inner.breaker.allow(now) {
            return match stale {
                Some(entry) => {
                    warn!(%key, "circuit open; serving stale cache");
                    Ok(cached_list(&entry, EventSource::Fallback))
                }
                None => Err(ClientError::ServiceUnavailable),
            };
        }

        if let Acquire::Denied { retry_after } = inner.limiter.try_acquire(now) {
            inner.breaker.release_trial();
            warn!(
                %key,
                retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                "rate limit exceeded"
            );
            return Err(ClientError::RateLimited { retry_after });
        }

        let provider: &dyn EventsProvider = inner.provider.as_ref();
        let outcome = inner
            .config
            .retry
            .run(move |_| provider.fetch_events(key))
            .await;
        let attempts = outcome.attempts();

        let error = match outcome {
            RetryOutcome::Success { value: events, .. } => {
                match self.store_live(key, events, now).await {
                    Ok(list) => {
                        inner.breaker.record_success();
                        info!(
                            %key,
                            events = list.len(),
                            attempts,
                            provider = provider.name(),
                            "fetched live events"
                        );
                        return Ok(list);
                    }
                    Err(invalid) => {
                        inner.breaker.record_failure(now);
                        return match stale {
                            Some(entry) => {
                                warn!(
                                    %key,
                                    error = %invalid,
                                    "provider returned unusable data; serving stale cache"
                                );
                                Ok(cached_list(&entry, EventSource::Fallback))
                            }
                            None => Err(invalid),
                        };
                    }
                }
            }
            RetryOutcome::TransientFailure { error, .. }
            | RetryOutcome::PermanentFailure { error, .. } => error,
        };

        inner.breaker.record_failure(now);
        match stale {
            Some(entry) => {
                warn!(%key, attempts, error = %error, "upstream failed; serving stale cache");
                Ok(cached_list(&entry, EventSource::Fallback))
            }
            None => {
                warn!(%key, attempts, error = %error, "upstream failed with no cached fallback");
                Err(ClientError::UpstreamUnavailable {
                    message: error.to_string(),
                })
            }
        }
    }

    /// Writes a live result through the cache. A storage failure still hands
    /// the events to the caller.
    async fn store_live(
        &self,
        key: DateKey,
        events: Vec<EventRecord>,
        now: UtcDateTime,
    ) -> FetchResult {
        match self
            .inner
            .cache
            .put(key, events.clone(), EventSource::Live, now)
            .await
        {
            Ok(entry) => Ok(EventList {
                date_key: key,
                events: entry.events,
                source: EventSource::Live,
                fetched_at: entry.fetched_at,
                from_cache: false,
            }),
            Err(CacheError::InvalidData(error)) => Err(ClientError::InvalidData(error)),
            Err(error) => {
                warn!(%key, %error, "could not persist live events");
                let mut events = events;
                events.sort_by_key(|event| event.year());
                Ok(EventList {
                    date_key: key,
                    events,
                    source: EventSource::Live,
                    fetched_at: now,
                    from_cache: false,
                })
            }
        }
    }
}

fn cached_list(entry: &CacheEntry, source: EventSource) -> EventList {
    EventList {
        date_key: entry.date_key,
        events: entry.events.clone(),
        source,
        fetched_at: entry.fetched_at,
        from_cache: true,
    }
}

/// Assembles a [`HistoricalEventsClient`]. Unset parts default to an
/// in-memory store and a [`CompositeProvider`] built from the upstream config.
#[derive(Default)]
pub struct HistoricalEventsClientBuilder {
    config: Option<ClientConfig>,
    store: Option<Arc<dyn KeyValueStore>>,
    provider: Option<Arc<dyn EventsProvider>>,
}

impl HistoricalEventsClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn EventsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn build(self) -> HistoricalEventsClient {
        let config = self.config.unwrap_or_default();
        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let provider: Arc<dyn EventsProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(default_provider(&config.upstream)),
        };

        HistoricalEventsClient::new(config, store, provider)
    }
}

/// Localized Wikipedia feed, the English feed as fallback for other
/// languages, then the configured supplements, all over one HTTP client.
fn default_provider(upstream: &UpstreamConfig) -> CompositeProvider {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::default());
    let wikipedia = WikipediaProvider::new(Arc::clone(&http))
        .with_base_url(upstream.base_url.as_str())
        .with_timeout_ms(upstream.timeout_ms)
        .with_max_events(upstream.max_events);
    let primary = wikipedia.clone().with_language(&upstream.language);
    let localized = primary.language() != "en";

    let mut provider = CompositeProvider::new(Arc::new(primary))
        .with_max_events(upstream.max_events);
    if upstream.english_fallback && localized {
        provider = provider.with_fallback(Arc::new(wikipedia.with_language("en")));
    }

    for source in &upstream.supplements {
        let supplement: Arc<dyn EventsProvider> = match source {
            SupplementSource::MuffinLabs => Arc::new(
                MuffinLabsProvider::new(Arc::clone(&http))
                    .with_timeout_ms(upstream.timeout_ms)
                    .with_max_events(upstream.max_events),
            ),
            SupplementSource::ApiNinjas => Arc::new(
                ApiNinjasProvider::new(Arc::clone(&http))
                    .with_api_key(upstream.api_ninjas_key.clone())
                    .with_timeout_ms(upstream.timeout_ms),
            ),
        };
        provider = provider.with_supplement(supplement);
    }

    provider
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::retry::RetryPolicy;
    use crate::upstream::{ProviderFuture, UpstreamError};
    use crate::EventCategory;

    struct FlakyProvider {
        calls: AtomicU32,
        fail_first: u32,
    }

    impl EventsProvider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn fetch_events<'a>(&'a self, _key: DateKey) -> ProviderFuture<'a> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = call < self.fail_first;
            Box::pin(async move {
                if fail {
                    Err(UpstreamError::from_status(503))
                } else {
                    Ok(vec![
                        EventRecord::new(1969, "Moon", "Apollo 11 lands.", EventCategory::Event)
                            .expect("valid"),
                    ])
                }
            })
        }
    }

    fn t0() -> UtcDateTime {
        UtcDateTime::parse("2025-07-20T12:00:00Z").expect("timestamp")
    }

    fn client(provider: Arc<FlakyProvider>) -> HistoricalEventsClient {
        HistoricalEventsClient::builder()
            .config(ClientConfig {
                retry: RetryPolicy::fixed(Duration::ZERO, 3),
                ..ClientConfig::default()
            })
            .provider(provider)
            .build()
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_one_fetch() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let client = client(Arc::clone(&provider));

        let list = client.fetch_today_events(t0()).await.expect("events");

        assert_eq!(list.source, EventSource::Live);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.breaker_state().consecutive_failures, 0);
        assert_eq!(client.rate_window().map(|window| window.count), Some(1));
    }

    #[tokio::test]
    async fn today_key_follows_configured_timezone() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            fail_first: 0,
        });
        let client = HistoricalEventsClient::builder()
            .config(ClientConfig {
                timezone: time::UtcOffset::from_hms(14, 0, 0).expect("offset").into(),
                ..ClientConfig::default()
            })
            .provider(provider)
            .build();

        assert_eq!(client.today(t0()).to_string(), "07-21");
    }

    #[tokio::test]
    async fn status_tracks_outcome() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        let client = client(provider);

        let error = client.fetch_today_events(t0()).await.expect_err("no data");
        assert!(matches!(error, ClientError::UpstreamUnavailable { .. }));

        let status = client.status();
        assert!(!status.is_loading);
        assert_eq!(status.last_error_code, Some("client.upstream_unavailable"));
    }
}
