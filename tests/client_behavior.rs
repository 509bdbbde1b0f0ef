//! Behavior-driven tests for the historical events client
//!
//! These tests verify HOW the client combines the cache, the circuit breaker,
//! the rate limiter, and the upstream provider when the UI asks for events.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use yesterday_core::{
    CircuitBreakerConfig, CircuitState, ClientConfig, ClientError, CompositeProvider, DateKey,
    EventCategory, EventRecord, EventSource, EventsProvider, FetchOptions, FetchPhase,
    HistoricalEventsClient, ProviderFuture, RateLimitConfig, RetryPolicy,
    UpstreamConfig, UpstreamError, UtcDateTime,
};
use yesterday_store::{KeyValueStore, MemoryStore};

// =============================================================================
// Fixtures
// =============================================================================

struct ScriptedProvider {
    calls: AtomicU32,
    delay: Duration,
    script: Mutex<VecDeque<Result<Vec<EventRecord>, UpstreamError>>>,
    otherwise: Result<Vec<EventRecord>, UpstreamError>,
}

impl ScriptedProvider {
    fn succeeding(events: Vec<EventRecord>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            otherwise: Ok(events),
        }
    }

    fn failing(error: UpstreamError) -> Self {
        Self {
            otherwise: Err(error),
            ..Self::succeeding(Vec::new())
        }
    }

    fn then(self, response: Result<Vec<EventRecord>, UpstreamError>) -> Self {
        self.script
            .lock()
            .expect("script lock should not be poisoned")
            .push_back(response);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EventsProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn fetch_events<'a>(&'a self, _key: DateKey) -> ProviderFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .script
            .lock()
            .expect("script lock should not be poisoned")
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone());
        let delay = self.delay;

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            response
        })
    }
}

fn ten_events() -> Vec<EventRecord> {
    [1969, 1066, 1776, -44, 1914, 1492, 2001, 1815, 1588, 1945]
        .into_iter()
        .map(|year| {
            let description = format!("Something memorable happened in {year}.");
            EventRecord::new(
                year,
                format!("Year {year}"),
                description.as_str(),
                EventCategory::classify(&description),
            )
            .expect("valid event")
        })
        .collect()
}

fn t0() -> UtcDateTime {
    UtcDateTime::parse("2025-07-20T12:00:00Z").expect("timestamp")
}

fn hours(count: u64) -> Duration {
    Duration::from_secs(count * 60 * 60)
}

fn config() -> ClientConfig {
    ClientConfig {
        retry: RetryPolicy::fixed(Duration::ZERO, 3),
        ..ClientConfig::default()
    }
}

fn client_with(config: ClientConfig, provider: Arc<ScriptedProvider>) -> HistoricalEventsClient {
    HistoricalEventsClient::builder()
        .config(config)
        .store(Arc::new(MemoryStore::new()))
        .provider(provider)
        .build()
}

fn july_20() -> DateKey {
    DateKey::parse("07-20").expect("valid key")
}

// =============================================================================
// Live fetch and cache write-through
// =============================================================================

#[tokio::test]
async fn when_cache_is_empty_live_fetch_fills_cache_sorted_by_year() {
    // Given: An empty cache, a closed breaker, and quota to spare
    let provider = Arc::new(ScriptedProvider::succeeding(ten_events()));
    let client = client_with(config(), Arc::clone(&provider));

    // When: The UI asks for today's events
    let list = client.fetch_today_events(t0()).await.expect("live fetch");

    // Then: Ten live events come back and the cache holds them in year order
    assert_eq!(list.source, EventSource::Live);
    assert!(!list.from_cache);
    assert_eq!(list.len(), 10);
    assert_eq!(provider.calls(), 1);

    let entry = client.cache().get(july_20()).await.expect("entry written");
    assert_eq!(entry.events.len(), 10);
    assert_eq!(entry.source, EventSource::Live);
    assert_eq!(entry.fetched_at, t0());
    let years: Vec<i32> = entry.events.iter().map(|event| event.year()).collect();
    let mut sorted = years.clone();
    sorted.sort_unstable();
    assert_eq!(years, sorted);
}

#[tokio::test]
async fn when_cache_is_fresh_no_network_call_is_made() {
    // Given: A cache written one hour ago
    let provider = Arc::new(ScriptedProvider::succeeding(ten_events()));
    let client = client_with(config(), Arc::clone(&provider));
    client.fetch_today_events(t0()).await.expect("warm cache");

    // When: The UI asks again an hour later
    let list = client
        .fetch_today_events(t0().plus(hours(1)))
        .await
        .expect("cached");

    // Then: The cached events are served and the provider is not called again
    assert!(list.from_cache);
    assert_eq!(list.source, EventSource::Live);
    assert_eq!(provider.calls(), 1);
    assert_eq!(client.status().phase, FetchPhase::Success);
    assert!(client.status().from_cache);
}

#[tokio::test]
async fn when_force_refresh_on_fresh_cache_a_live_attempt_is_made() {
    // Given: A fresh cache entry
    let provider = Arc::new(ScriptedProvider::succeeding(ten_events()));
    let client = client_with(config(), Arc::clone(&provider));
    client.fetch_today_events(t0()).await.expect("warm cache");

    // When: The user pulls to refresh ten minutes later
    let refreshed_at = t0().plus(Duration::from_secs(600));
    let list = client.force_refresh(refreshed_at).await.expect("refresh");

    // Then: The provider is called again and the cache is re-stamped
    assert_eq!(provider.calls(), 2);
    assert!(!list.from_cache);
    assert_eq!(list.fetched_at, refreshed_at);
}

#[tokio::test]
async fn when_cache_is_stale_live_data_replaces_it() {
    // Given: An entry written 25 hours ago
    let provider = Arc::new(ScriptedProvider::succeeding(ten_events()));
    let client = client_with(config(), Arc::clone(&provider));
    client
        .cache()
        .put(july_20(), ten_events()[..3].to_vec(), EventSource::Live, t0().minus(hours(25)))
        .await
        .expect("seed stale entry");

    // When: Today's events are requested
    let list = client.fetch_today_events(t0()).await.expect("live");

    // Then: The stale bundle is replaced by the live one
    assert_eq!(list.len(), 10);
    assert_eq!(provider.calls(), 1);
}

// =============================================================================
// Fallback and typed errors
// =============================================================================

#[tokio::test]
async fn when_breaker_is_open_stale_cache_is_served_without_network() {
    // Given: A 25h-old entry with ten events and a breaker that trips on one failure
    let provider = Arc::new(ScriptedProvider::failing(UpstreamError::from_status(503)));
    let client = client_with(
        ClientConfig {
            breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(60),
            },
            ..config()
        },
        Arc::clone(&provider),
    );
    client
        .cache()
        .put(july_20(), ten_events(), EventSource::Live, t0().minus(hours(25)))
        .await
        .expect("seed stale entry");

    let first = client.fetch_today_events(t0()).await.expect("fallback");
    assert_eq!(first.source, EventSource::Fallback);
    assert_eq!(client.breaker_state().status, CircuitState::Open);
    let calls_before = provider.calls();

    // When: The UI asks again while the breaker is still open
    let list = client
        .fetch_today_events(t0().plus(Duration::from_secs(5)))
        .await
        .expect("fallback");

    // Then: The ten cached events are returned as fallback with no upstream call
    assert_eq!(list.len(), 10);
    assert_eq!(list.source, EventSource::Fallback);
    assert!(list.from_cache);
    assert_eq!(provider.calls(), calls_before);
}

#[tokio::test]
async fn when_breaker_is_open_and_cache_is_empty_service_unavailable_is_raised() {
    // Given: A breaker already opened by repeated failures and no cached data
    let provider = Arc::new(ScriptedProvider::failing(UpstreamError::transient(
        "connection reset",
    )));
    let client = client_with(
        ClientConfig {
            breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(60),
            },
            ..config()
        },
        Arc::clone(&provider),
    );
    let first = client.fetch_today_events(t0()).await.expect_err("no data");
    assert!(matches!(first, ClientError::UpstreamUnavailable { .. }));

    // When: Another fetch happens inside the cooldown
    let error = client
        .fetch_today_events(t0().plus(Duration::from_secs(30)))
        .await
        .expect_err("breaker open");

    // Then: The UI gets the circuit-breaker message
    assert_eq!(error, ClientError::ServiceUnavailable);
    assert!(error.user_message().starts_with("Circuit breaker activated"));
    assert_eq!(client.status().phase, FetchPhase::Error);
}

#[tokio::test]
async fn when_upstream_fails_after_retries_stale_cache_is_served() {
    // Given: A stale entry and a provider that keeps returning 502
    let provider = Arc::new(ScriptedProvider::failing(UpstreamError::from_status(502)));
    let client = client_with(config(), Arc::clone(&provider));
    client
        .cache()
        .put(july_20(), ten_events(), EventSource::Live, t0().minus(hours(30)))
        .await
        .expect("seed stale entry");

    // When: Today's events are requested
    let list = client.fetch_today_events(t0()).await.expect("fallback");

    // Then: All retry attempts were spent, and the stale events come back as fallback
    assert_eq!(provider.calls(), 3);
    assert_eq!(list.source, EventSource::Fallback);
    assert_eq!(client.breaker_state().consecutive_failures, 1);
    assert_eq!(client.status().data_source, Some(EventSource::Fallback));
}

#[tokio::test]
async fn when_upstream_returns_not_found_it_is_not_retried() {
    // Given: A provider answering 404
    let provider = Arc::new(ScriptedProvider::failing(UpstreamError::from_status(404)));
    let client = client_with(config(), Arc::clone(&provider));

    // When: Today's events are requested
    let error = client.fetch_today_events(t0()).await.expect_err("no data");

    // Then: One attempt only, surfaced as an outage
    assert_eq!(provider.calls(), 1);
    assert_eq!(error.code(), "client.upstream_unavailable");
}

#[tokio::test]
async fn when_quota_is_spent_rate_limit_error_is_raised() {
    // Given: One call per minute, already used
    let provider = Arc::new(ScriptedProvider::succeeding(ten_events()));
    let client = client_with(
        ClientConfig {
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(60),
                limit: 1,
                ..RateLimitConfig::default()
            },
            ..config()
        },
        Arc::clone(&provider),
    );
    client.fetch_today_events(t0()).await.expect("first call");

    // When: The user forces a refresh 20 seconds later
    let error = client
        .force_refresh(t0().plus(Duration::from_secs(20)))
        .await
        .expect_err("rate limited");

    // Then: A rate-limit error says how long to wait; the cache is untouched
    assert_eq!(
        error,
        ClientError::RateLimited {
            retry_after: Duration::from_secs(40)
        }
    );
    assert!(error.user_message().contains("40s"));
    assert_eq!(provider.calls(), 1);
    assert_eq!(client.breaker_state().status, CircuitState::Closed);
    assert!(client.cache().get(july_20()).await.is_some());
}

#[tokio::test]
async fn when_provider_returns_no_events_invalid_data_is_raised() {
    // Given: A provider that answers with an empty list
    let provider = Arc::new(ScriptedProvider::succeeding(Vec::new()));
    let client = client_with(config(), Arc::clone(&provider));

    // When: Today's events are requested
    let error = client.fetch_today_events(t0()).await.expect_err("empty");

    // Then: The empty payload is rejected and nothing is cached
    assert!(matches!(error, ClientError::InvalidData(_)));
    assert!(!error.retryable());
    assert!(client.cache().get(july_20()).await.is_none());
}

#[tokio::test]
async fn when_storage_is_offline_live_events_are_still_returned() {
    // Given: A store that rejects every operation
    let store = MemoryStore::new();
    store.set_offline(true);
    let provider = Arc::new(ScriptedProvider::succeeding(ten_events()));
    let client = HistoricalEventsClient::builder()
        .config(config())
        .store(Arc::new(store))
        .provider(provider)
        .build();

    // When: Today's events are requested
    let list = client.fetch_today_events(t0()).await.expect("live");

    // Then: The live result reaches the caller, sorted
    assert_eq!(list.len(), 10);
    assert_eq!(list.events.first().map(|event| event.year()), Some(-44));
}

#[tokio::test]
async fn when_transient_failure_recovers_on_retry_caller_sees_live_data() {
    // Given: A provider that fails once with 429 then succeeds
    let provider = Arc::new(
        ScriptedProvider::succeeding(ten_events()).then(Err(UpstreamError::from_status(429))),
    );
    let client = client_with(config(), Arc::clone(&provider));

    // When: Today's events are requested
    let list = client.fetch_today_events(t0()).await.expect("live");

    // Then: The retry succeeded within the same fetch
    assert_eq!(provider.calls(), 2);
    assert_eq!(list.source, EventSource::Live);
    assert_eq!(client.breaker_state().consecutive_failures, 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_two_fetches_race_only_one_upstream_call_is_made() {
    // Given: A slow provider
    let provider = Arc::new(
        ScriptedProvider::succeeding(ten_events()).with_delay(Duration::from_millis(200)),
    );
    let client = client_with(config(), Arc::clone(&provider));

    // When: Two fetches for the same day run concurrently
    let (first, second) = tokio::join!(
        client.fetch_today_events(t0()),
        client.fetch_today_events(t0())
    );

    // Then: Both callers get the same live result from a single request
    let first = first.expect("first caller");
    let second = second.expect("second caller");
    assert_eq!(provider.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(client.rate_window().map(|window| window.count), Some(1));
}

#[tokio::test(start_paused = true)]
async fn when_one_caller_times_out_the_shared_fetch_completes_for_others() {
    // Given: A provider slower than one caller's patience
    let provider = Arc::new(
        ScriptedProvider::succeeding(ten_events()).with_delay(Duration::from_secs(3)),
    );
    let client = client_with(config(), Arc::clone(&provider));
    let key = july_20();

    // When: An impatient and a patient caller ask at the same time
    let (impatient, patient) = tokio::join!(
        client.fetch_events_for(
            key,
            t0(),
            FetchOptions::default().with_timeout(Duration::from_secs(1))
        ),
        client.fetch_events_for(key, t0(), FetchOptions::default())
    );

    // Then: Only the impatient caller times out; the fetch still lands in the cache
    assert_eq!(
        impatient,
        Err(ClientError::Timeout {
            timeout: Duration::from_secs(1)
        })
    );
    assert_eq!(patient.expect("patient caller").source, EventSource::Live);
    assert_eq!(provider.calls(), 1);
    assert!(client.cache().get(key).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn when_timed_out_caller_retries_it_joins_the_running_fetch() {
    // Given: A timed-out caller whose fetch is still running
    let provider = Arc::new(
        ScriptedProvider::succeeding(ten_events()).with_delay(Duration::from_secs(3)),
    );
    let client = client_with(config(), Arc::clone(&provider));
    let key = july_20();
    let timed_out = client
        .fetch_events_for(
            key,
            t0(),
            FetchOptions::default().with_timeout(Duration::from_millis(500)),
        )
        .await;
    assert!(matches!(timed_out, Err(ClientError::Timeout { .. })));

    // When: The same caller asks again without a deadline
    let list = client
        .fetch_events_for(key, t0(), FetchOptions::default())
        .await
        .expect("joined fetch");

    // Then: No second upstream request was issued
    assert_eq!(list.source, EventSource::Live);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn when_caller_is_cancelled_status_does_not_stay_loading() {
    // Given: A provider slower than the caller's own deadline
    let provider = Arc::new(
        ScriptedProvider::succeeding(ten_events()).with_delay(Duration::from_millis(200)),
    );
    let client = client_with(config(), Arc::clone(&provider));

    // When: The caller drops the fetch future mid-flight
    let cancelled =
        tokio::time::timeout(Duration::from_millis(20), client.fetch_today_events(t0())).await;
    assert!(cancelled.is_err());

    // Then: No fetch is counted as outstanding and the phase is settled
    let status = client.status();
    assert!(!status.is_loading);
    assert_eq!(status.active_fetches, 0);
    assert_eq!(status.phase, FetchPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn when_fetches_overlap_loading_lasts_until_the_last_one_ends() {
    // Given: A warm cache for today and a slow provider
    let provider = Arc::new(
        ScriptedProvider::succeeding(ten_events()).with_delay(Duration::from_millis(200)),
    );
    let client = client_with(config(), Arc::clone(&provider));
    client.fetch_today_events(t0()).await.expect("warm cache");

    // When: A slow fetch for another day runs while today's cache hit returns
    let background = client.clone();
    let slow = tokio::spawn(async move {
        background
            .fetch_events_for(
                DateKey::parse("01-01").expect("key"),
                t0(),
                FetchOptions::default(),
            )
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let cached = client.fetch_today_events(t0()).await.expect("cache hit");
    assert!(cached.from_cache);

    // Then: The status keeps loading until the slow fetch finishes
    let during = client.status();
    assert!(during.is_loading);
    assert_eq!(during.active_fetches, 1);
    assert_eq!(during.phase, FetchPhase::Loading);

    slow.await.expect("join").expect("slow fetch");
    let after = client.status();
    assert!(!after.is_loading);
    assert_eq!(after.phase, FetchPhase::Success);
}

// =============================================================================
// Languages and sources
// =============================================================================

fn localized_client(
    language: &str,
    store: &MemoryStore,
    provider: Arc<dyn EventsProvider>,
) -> HistoricalEventsClient {
    HistoricalEventsClient::builder()
        .config(ClientConfig {
            upstream: UpstreamConfig {
                language: language.to_owned(),
                ..UpstreamConfig::default()
            },
            ..config()
        })
        .store(Arc::new(store.clone()))
        .provider(provider)
        .build()
}

fn titled(year: i32, title: &str) -> EventRecord {
    EventRecord::new(year, title, format!("{title}."), EventCategory::Event).expect("event")
}

#[tokio::test]
async fn when_two_languages_share_a_store_each_gets_its_own_events() {
    // Given: An English client that has already cached today's events
    let store = MemoryStore::new();
    let english_provider = Arc::new(ScriptedProvider::succeeding(vec![titled(
        1969,
        "Moon landing",
    )]));
    let english = localized_client("en", &store, english_provider.clone());
    english.fetch_today_events(t0()).await.expect("english");

    // When: A German client on the same store asks for the same day
    let german_provider =
        Arc::new(ScriptedProvider::succeeding(vec![titled(1969, "Mondlandung")]));
    let german = localized_client("de-DE", &store, german_provider.clone());
    let list = german.fetch_today_events(t0()).await.expect("german");

    // Then: The German client fetches its own bundle instead of reusing English
    assert_eq!(german_provider.calls(), 1);
    assert!(!list.from_cache);
    assert_eq!(list.events[0].title(), "Mondlandung");
    assert!(store
        .read("historical_events_de_07-20")
        .await
        .expect("read")
        .is_some());

    // And: Clearing English leaves the German bundle in place
    assert_eq!(english.cache().clear_language("en").await.expect("clear"), 1);
    assert!(english.cache().get(july_20()).await.is_none());
    let again = german.fetch_today_events(t0()).await.expect("german cache");
    assert!(again.from_cache);
    assert_eq!(english_provider.calls(), 1);
}

#[tokio::test]
async fn when_localized_feed_is_empty_english_events_are_served() {
    // Given: A German feed with nothing for today and an English fallback
    let store = MemoryStore::new();
    let german_feed = Arc::new(ScriptedProvider::failing(UpstreamError::permanent(
        "no historical events found for this date",
    )));
    let english_feed = Arc::new(ScriptedProvider::succeeding(vec![
        titled(1969, "Apollo 11 lands on the Moon"),
        titled(1969, "Apollo 11 lands on the Moon!"),
        titled(4000, "Misdated entry"),
    ]));
    let provider = CompositeProvider::new(german_feed.clone())
        .with_fallback(english_feed.clone())
        .with_current_year(2025);
    let client = localized_client("de", &store, Arc::new(provider));

    // When: Today's events are requested
    let list = client.fetch_today_events(t0()).await.expect("fallback");

    // Then: The English events arrive deduplicated and filtered, cached under German
    assert_eq!(german_feed.calls(), 1);
    assert_eq!(english_feed.calls(), 1);
    assert_eq!(list.len(), 1);
    assert_eq!(list.events[0].title(), "Apollo 11 lands on the Moon");
    assert_eq!(client.cache().keys().await.expect("keys"), vec![july_20()]);
}

// =============================================================================
// Status signal
// =============================================================================

#[tokio::test]
async fn status_moves_from_idle_through_loading_to_success() {
    // Given: A fresh client and a status subscriber
    let provider = Arc::new(ScriptedProvider::succeeding(ten_events()));
    let client = client_with(config(), provider);
    let mut receiver = client.subscribe();
    assert_eq!(receiver.borrow().phase, FetchPhase::Idle);

    // When: A fetch completes
    client.fetch_today_events(t0()).await.expect("live");

    // Then: The subscriber observes the final success state
    assert!(receiver.has_changed().expect("sender alive"));
    let status = receiver.borrow_and_update().clone();
    assert_eq!(status.phase, FetchPhase::Success);
    assert!(!status.is_loading);
    assert_eq!(status.data_source, Some(EventSource::Live));
    assert_eq!(status.last_error, None);
}

#[tokio::test]
async fn reset_resilience_closes_breaker_and_restores_quota() {
    // Given: An open breaker
    let provider = Arc::new(ScriptedProvider::failing(UpstreamError::from_status(500)));
    let client = client_with(
        ClientConfig {
            breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(600),
            },
            ..config()
        },
        provider,
    );
    client.fetch_today_events(t0()).await.expect_err("outage");
    assert_eq!(client.breaker_state().status, CircuitState::Open);

    // When: The test hook resets resilience state
    client.reset_resilience();

    // Then: The breaker is closed and the quota window is empty
    assert_eq!(client.breaker_state().status, CircuitState::Closed);
    assert_eq!(client.rate_window().map(|window| window.count), Some(0));
    assert_eq!(client.status().phase, FetchPhase::Idle);
}
