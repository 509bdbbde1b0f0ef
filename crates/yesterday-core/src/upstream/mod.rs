//! Upstream event providers.

mod api_ninjas;
mod composite;
mod curate;
mod muffinlabs;
mod wikipedia;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::{DateKey, EventRecord};

pub use api_ninjas::{ApiNinjasProvider, API_NINJAS_BASE_URL};
pub use composite::CompositeProvider;
pub use curate::{combine_events, is_plausible_year, is_similar_title, EARLIEST_YEAR};
pub use muffinlabs::{MuffinLabsProvider, MUFFINLABS_BASE_URL};
pub use wikipedia::{WikipediaProvider, DEFAULT_BASE_URL};

/// Wiki languages with an "on this day" feed.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "en", "tr", "es", "fr", "de", "it", "pt", "ru", "ar", "zh", "ja",
];

/// Primary subtag of `language`, lowercased. Unsupported languages map to `en`.
pub fn normalize_language(language: &str) -> String {
    let primary = language
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if SUPPORTED_LANGUAGES.contains(&primary.as_str()) {
        primary
    } else {
        String::from("en")
    }
}

/// Whether a failed upstream call is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Transport failure, timeout, 408/429 or 5xx.
    Transient,
    /// Other 4xx or a payload that cannot be used.
    Permanent,
}

/// Failure reported by an [`EventsProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    kind: UpstreamErrorKind,
    message: String,
    status: Option<u16>,
}

impl UpstreamError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Transient,
            message: message.into(),
            status: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Permanent,
            message: message.into(),
            status: None,
        }
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        let kind = if is_transient_status(status) {
            UpstreamErrorKind::Transient
        } else {
            UpstreamErrorKind::Permanent
        };

        Self {
            kind,
            message: format!("HTTP error! status: {status}"),
            status: Some(status),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::transient(format!("attempt timed out after {}ms", after.as_millis()))
    }

    pub const fn kind(&self) -> UpstreamErrorKind {
        self.kind
    }

    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, UpstreamErrorKind::Transient)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }
}

impl Display for UpstreamError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for UpstreamError {}

const fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429) || status >= 500
}

pub type ProviderFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<EventRecord>, UpstreamError>> + Send + 'a>>;

/// Source of historical events for one calendar day.
pub trait EventsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch_events<'a>(&'a self, key: DateKey) -> ProviderFuture<'a>;
}
