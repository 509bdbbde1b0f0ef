use std::time::Duration;

use thiserror::Error;

/// Validation and contract errors exposed by `yesterday-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("unix timestamp {seconds} is out of range")]
    TimestampOutOfRange { seconds: i64 },

    #[error("events with source=live must not be empty")]
    EmptyLivePayload,
}

/// Errors from the date utilities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("unsupported locale '{value}', expected en-US, en-GB, de-DE, fr-FR, es-ES or it-IT")]
    InvalidLocale { value: String },

    #[error("unknown timezone '{value}', expected UTC, an offset like +05:30 or an IANA name")]
    InvalidTimezone { value: String },

    #[error("invalid date key '{value}', expected MM-DD")]
    InvalidDateKey { value: String },
}

/// Typed failures surfaced to the UI by the historical-events client.
///
/// Each variant maps to a distinct message so the UI can tell a rate-limit
/// from an open breaker from an outage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("rate limit exceeded; retry after {}ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    #[error("circuit breaker is open and no cached events are available")]
    ServiceUnavailable,

    #[error("upstream unavailable after retries: {message}")]
    UpstreamUnavailable { message: String },

    #[error("invalid data: {0}")]
    InvalidData(#[from] ValidationError),

    #[error("request timed out after {}ms", timeout.as_millis())]
    Timeout { timeout: Duration },
}

impl ClientError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "client.rate_limited",
            Self::ServiceUnavailable => "client.service_unavailable",
            Self::UpstreamUnavailable { .. } => "client.upstream_unavailable",
            Self::InvalidData(_) => "client.invalid_data",
            Self::Timeout { .. } => "client.timeout",
        }
    }

    /// Whether the UI should offer a retry affordance.
    pub const fn retryable(&self) -> bool {
        !matches!(self, Self::InvalidData(_))
    }

    /// Message suitable for an error banner.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited { retry_after } => format!(
                "Rate limit exceeded. Please wait {}s and try again.",
                retry_after.as_millis().div_ceil(1000).max(1)
            ),
            Self::ServiceUnavailable => String::from(concat!(
                "Circuit breaker activated. ",
                "Service temporarily unavailable, please try again later."
            )),
            Self::UpstreamUnavailable { .. } => String::from(
                "Service temporarily unavailable. Please try again later.",
            ),
            Self::InvalidData(_) => {
                String::from("Unable to load historical events. Please try again.")
            }
            Self::Timeout { .. } => String::from("Request timed out. Please try again."),
        }
    }
}
