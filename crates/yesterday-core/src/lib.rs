//! # Yesterday Core
//!
//! Data-access core for "on this day" historical events.
//!
//! ## Overview
//!
//! - **Date keys** identifying a calendar day independent of the year
//! - **Timezones** as fixed offsets or IANA names with daylight saving
//! - **Persistent cache** scoped per language, with a 24-hour freshness window
//!   and 30-day retention
//! - **Upstream sources** merged from Wikipedia, an English fallback and
//!   optional secondary feeds
//! - **Rate limiter** bounding outbound calls per window
//! - **Circuit breaker** isolating a failing upstream
//! - **Retry policy** with exponential backoff and jitter
//! - **Historical events client** composing all of the above, with request
//!   coalescing, stale-cache fallback, and typed user-facing errors
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Persistent event cache over a key-value store |
//! | [`circuit_breaker`] | Closed / Open / HalfOpen state machine |
//! | [`client`] | [`HistoricalEventsClient`] orchestrator |
//! | [`config`] | Client configuration and environment overrides |
//! | [`date_key`] | Date keys, locale formatting, timezone conversion |
//! | [`domain`] | Event records and timestamps |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`retry`] | Bounded retry with backoff |
//! | [`status`] | Observable fetch status |
//! | [`throttling`] | Rate limiting |
//! | [`upstream`] | Event providers and multi-source merging |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / UI       │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Events Client   │────▶│ Persistent Cache │──▶ KeyValueStore
//! └────────┬────────┘     └──────────────────┘
//!          │ stale / missing
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Circuit Breaker │────▶│ Rate Limiter     │
//! └─────────────────┘     └────────┬─────────┘
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │ Retry → Provider │
//!                         └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use yesterday_core::{HistoricalEventsClient, UtcDateTime};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = HistoricalEventsClient::builder().build();
//!     match client.fetch_today_events(UtcDateTime::now()).await {
//!         Ok(list) => println!("{} events ({})", list.len(), list.source),
//!         Err(error) => eprintln!("{}", error.user_message()),
//!     }
//! }
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod date_key;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod retry;
pub mod status;
pub mod throttling;
pub mod upstream;

pub use cache::{CacheEntry, CacheError, CacheMode, CacheStats, PersistentCache};
pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{FetchOptions, FetchResult, HistoricalEventsClient, HistoricalEventsClientBuilder};
pub use config::{CacheConfig, ClientConfig, SupplementSource, UpstreamConfig};
pub use date_key::{
    cache_storage_key, convert_timezone, format, format_year, language_key_prefix, parse_zone,
    today_key, DateKey, FormattedDate, Locale, Zone,
};
pub use domain::{EventCategory, EventLink, EventList, EventRecord, EventSource, UtcDateTime};
pub use error::{ClientError, DateError, ValidationError};
pub use http_client::{
    HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use retry::{Backoff, RetryOutcome, RetryPolicy};
pub use status::{FetchPhase, FetchStatus};
pub use throttling::{Acquire, RateLimitConfig, RateLimitStrategy, RateLimiter, RateWindow};
pub use upstream::{
    combine_events, is_similar_title, normalize_language, ApiNinjasProvider, CompositeProvider,
    EventsProvider, MuffinLabsProvider, ProviderFuture, UpstreamError, UpstreamErrorKind,
    WikipediaProvider,
};
