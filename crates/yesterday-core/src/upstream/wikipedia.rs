use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{normalize_language, EventsProvider, ProviderFuture, UpstreamError};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::{DateKey, EventCategory, EventLink, EventRecord};

/// Wikipedia "on this day" feed. `{lang}` is replaced with the wiki language.
pub const DEFAULT_BASE_URL: &str = "https://{lang}.wikipedia.org/api/rest_v1/feed/onthisday/events";

const TITLE_SPLIT_THRESHOLD: usize = 100;
const TITLE_MAX_CHARS: usize = 120;
const TITLE_TRUNCATED_CHARS: usize = 117;

/// Events provider backed by the Wikipedia REST API.
#[derive(Clone)]
pub struct WikipediaProvider {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    language: String,
    timeout_ms: u64,
    max_events: usize,
}

impl Default for WikipediaProvider {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::default()))
    }
}

impl WikipediaProvider {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(DEFAULT_BASE_URL),
            language: String::from("en"),
            timeout_ms: 10_000,
            max_events: 20,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Unsupported wiki languages fall back to English.
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = normalize_language(language);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn endpoint(&self, key: DateKey) -> String {
        format!(
            "{}/{:02}/{:02}",
            self.base_url.replace("{lang}", &self.language),
            key.month(),
            key.day()
        )
    }

    async fn fetch(&self, key: DateKey) -> Result<Vec<EventRecord>, UpstreamError> {
        let url = self.endpoint(key);
        let request = HttpRequest::json(url.as_str(), Duration::from_millis(self.timeout_ms));
        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            return Err(UpstreamError::from_status(response.status));
        }

        let events = self.parse_events(&response.body)?;
        debug!(url = %url, events = events.len(), "wikipedia returned events");
        Ok(events)
    }

    fn parse_events(&self, body: &str) -> Result<Vec<EventRecord>, UpstreamError> {
        let feed: OnThisDayResponse = serde_json::from_str(body).map_err(|e| {
            UpstreamError::permanent(format!("invalid wikipedia response format: {e}"))
        })?;
        let raw_events = feed.events.ok_or_else(|| {
            UpstreamError::permanent("invalid wikipedia response format: missing events")
        })?;

        let mut events: Vec<EventRecord> = raw_events
            .into_iter()
            .filter_map(|raw| self.transform(raw))
            .take(self.max_events)
            .collect();

        if events.is_empty() {
            return Err(UpstreamError::permanent("no historical events found for this date"));
        }

        events.sort_by_key(|event| event.year());
        Ok(events)
    }

    fn transform(&self, raw: OnThisDayEvent) -> Option<EventRecord> {
        let year = raw.year.as_ref().and_then(parse_year)?;
        let text = raw.text.filter(|text| !text.trim().is_empty())?;

        let links = raw
            .pages
            .into_iter()
            .filter_map(|page| page.title)
            .map(|title| EventLink {
                url: format!(
                    "https://{}.wikipedia.org/wiki/{}",
                    self.language,
                    urlencoding::encode(&title)
                ),
                title,
            })
            .collect();

        let category = EventCategory::classify(&text);
        EventRecord::new(year, extract_title(&text), text, category)
            .ok()
            .map(|record| record.with_links(links))
    }
}

impl EventsProvider for WikipediaProvider {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    fn fetch_events<'a>(&'a self, key: DateKey) -> ProviderFuture<'a> {
        Box::pin(self.fetch(key))
    }
}

/// First sentence of `text`, shortened for a card headline.
pub(crate) fn extract_title(text: &str) -> String {
    let mut title = text.split('.').next().unwrap_or(text);
    if title.is_empty() {
        title = text;
    }

    if title.chars().count() > TITLE_SPLIT_THRESHOLD {
        if let Some(head) = title.split(" – ").next().filter(|head| !head.is_empty()) {
            title = head;
        }
    }

    if title.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = title.chars().take(TITLE_TRUNCATED_CHARS).collect();
        format!("{truncated}...")
    } else {
        title.to_owned()
    }
}

pub(crate) fn parse_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(number) => number.as_i64().and_then(|year| i32::try_from(year).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct OnThisDayResponse {
    events: Option<Vec<OnThisDayEvent>>,
}

#[derive(Debug, Deserialize)]
struct OnThisDayEvent {
    year: Option<Value>,
    text: Option<String>,
    #[serde(default)]
    pages: Vec<OnThisDayPage>,
}

#[derive(Debug, Deserialize)]
struct OnThisDayPage {
    title: Option<String>,
}
