//! Client configuration with `YESTERDAY_*` environment overrides.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::{DEFAULT_RETENTION, DEFAULT_TTL};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::date_key::Zone;
use crate::retry::RetryPolicy;
use crate::throttling::{RateLimitConfig, RateLimitStrategy};
use crate::upstream::DEFAULT_BASE_URL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Entries younger than this are served without a live call.
    pub ttl: Duration,
    /// Entries older than this are purged; younger stale ones remain for fallback.
    pub retention: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// Secondary event feed merged after the Wikipedia sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplementSource {
    MuffinLabs,
    ApiNinjas,
}

impl FromStr for SupplementSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "muffinlabs" | "muffin-labs" => Ok(Self::MuffinLabs),
            "api-ninjas" | "api_ninjas" | "apininjas" => Ok(Self::ApiNinjas),
            other => Err(format!("unknown supplement source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub language: String,
    pub timeout_ms: u64,
    pub max_events: usize,
    /// Try English Wikipedia when the localized feed has nothing.
    pub english_fallback: bool,
    pub supplements: Vec<SupplementSource>,
    pub api_ninjas_key: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            language: String::from("en"),
            timeout_ms: 10_000,
            max_events: 20,
            english_fallback: true,
            supplements: Vec::new(),
            api_ninjas_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub cache: CacheConfig,
    pub breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub upstream: UpstreamConfig,
    /// Zone used to decide which calendar day "today" is.
    pub timezone: Zone,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            upstream: UpstreamConfig::default(),
            timezone: Zone::UTC,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `YESTERDAY_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable variable source.
    /// Unparseable values keep the default and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        if let Some(secs) = parse_var::<u64>(&read, "YESTERDAY_CACHE_TTL_SECS") {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(days) = parse_var::<u64>(&read, "YESTERDAY_CACHE_RETENTION_DAYS") {
            config.cache.retention = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
        }

        if let Some(threshold) = parse_var::<u32>(&read, "YESTERDAY_BREAKER_THRESHOLD") {
            config.breaker.failure_threshold = threshold.max(1);
        }
        if let Some(secs) = parse_var::<u64>(&read, "YESTERDAY_BREAKER_COOLDOWN_SECS") {
            config.breaker.cooldown = Duration::from_secs(secs);
        }

        if let Some(limit) = parse_var::<u32>(&read, "YESTERDAY_RATE_LIMIT") {
            config.rate_limit.limit = limit.max(1);
        }
        if let Some(secs) = parse_var::<u64>(&read, "YESTERDAY_RATE_WINDOW_SECS") {
            config.rate_limit.window = Duration::from_secs(secs.max(1));
        }
        if let Some(strategy) = read("YESTERDAY_RATE_STRATEGY") {
            match strategy.to_ascii_lowercase().as_str() {
                "fixed" | "fixed_window" | "fixed-window" => {
                    config.rate_limit.strategy = RateLimitStrategy::FixedWindow;
                }
                "token" | "token_bucket" | "token-bucket" => {
                    config.rate_limit.strategy = RateLimitStrategy::TokenBucket;
                }
                _ => invalid("YESTERDAY_RATE_STRATEGY", &strategy),
            }
        }

        if let Some(attempts) = parse_var::<u32>(&read, "YESTERDAY_RETRY_ATTEMPTS") {
            config.retry.max_attempts = attempts.max(1);
        }

        if let Some(base_url) = read("YESTERDAY_UPSTREAM_URL") {
            config.upstream.base_url = base_url;
        }
        if let Some(language) = read("YESTERDAY_LANGUAGE") {
            config.upstream.language = language;
        }
        if let Some(timeout_ms) = parse_var::<u64>(&read, "YESTERDAY_TIMEOUT_MS") {
            config.upstream.timeout_ms = timeout_ms;
            config.retry.attempt_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(max_events) = parse_var::<usize>(&read, "YESTERDAY_MAX_EVENTS") {
            config.upstream.max_events = max_events.max(1);
        }
        if let Some(enabled) = parse_var::<bool>(&read, "YESTERDAY_ENGLISH_FALLBACK") {
            config.upstream.english_fallback = enabled;
        }
        if let Some(sources) = read("YESTERDAY_SUPPLEMENTS") {
            let parsed: Result<Vec<SupplementSource>, String> = sources
                .split(',')
                .filter(|name| !name.trim().is_empty())
                .map(str::parse)
                .collect();
            match parsed {
                Ok(mut parsed) => {
                    parsed.dedup();
                    config.upstream.supplements = parsed;
                }
                Err(_) => invalid("YESTERDAY_SUPPLEMENTS", &sources),
            }
        }
        if let Some(api_key) = read("YESTERDAY_API_NINJAS_KEY") {
            config.upstream.api_ninjas_key = Some(api_key);
        }

        if let Some(zone) = read("YESTERDAY_TIMEZONE") {
            match Zone::parse(&zone) {
                Ok(parsed) => config.timezone = parsed,
                Err(_) => invalid("YESTERDAY_TIMEZONE", &zone),
            }
        }

        config
    }
}

fn parse_var<T: FromStr>(read: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = read(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            invalid(name, &raw);
            None
        }
    }
}

fn invalid(name: &str, value: &str) {
    warn!(variable = name, value, "ignoring invalid configuration value");
}
