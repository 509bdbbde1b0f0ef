use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::wikipedia::{extract_title, parse_year};
use super::{EventsProvider, ProviderFuture, UpstreamError};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::{DateKey, EventCategory, EventLink, EventRecord};

pub const MUFFINLABS_BASE_URL: &str = "https://history.muffinlabs.com/date";

/// "Today in History" feed from history.muffinlabs.com. English only.
#[derive(Clone)]
pub struct MuffinLabsProvider {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout_ms: u64,
    max_events: usize,
}

impl Default for MuffinLabsProvider {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::default()))
    }
}

impl MuffinLabsProvider {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(MUFFINLABS_BASE_URL),
            timeout_ms: 10_000,
            max_events: 60,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
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

    pub fn endpoint(&self, key: DateKey) -> String {
        format!("{}/{}/{}", self.base_url, key.month(), key.day())
    }

    async fn fetch(&self, key: DateKey) -> Result<Vec<EventRecord>, UpstreamError> {
        let url = self.endpoint(key);
        let request = HttpRequest::json(url.as_str(), Duration::from_millis(self.timeout_ms));
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(UpstreamError::from_status(response.status));
        }

        let payload: MuffinLabsResponse = serde_json::from_str(&response.body).map_err(|e| {
            UpstreamError::permanent(format!("invalid muffinlabs response format: {e}"))
        })?;
        let events: Vec<EventRecord> = payload
            .data
            .events
            .into_iter()
            .filter_map(transform)
            .take(self.max_events)
            .collect();

        debug!(url = %url, events = events.len(), "muffinlabs returned events");
        Ok(events)
    }
}

impl EventsProvider for MuffinLabsProvider {
    fn name(&self) -> &'static str {
        "muffinlabs"
    }

    fn fetch_events<'a>(&'a self, key: DateKey) -> ProviderFuture<'a> {
        Box::pin(self.fetch(key))
    }
}

fn transform(raw: MuffinLabsEvent) -> Option<EventRecord> {
    let year = raw.year.as_ref().and_then(parse_year)?;
    let text = raw.text.filter(|text| !text.trim().is_empty())?;
    let links = raw
        .links
        .into_iter()
        .filter_map(|link| {
            Some(EventLink {
                title: link.title?,
                url: link.link?,
            })
        })
        .collect();

    let category = EventCategory::classify(&text);
    EventRecord::new(year, extract_title(&text), text, category)
        .ok()
        .map(|record| record.with_links(links))
}

#[derive(Debug, Deserialize)]
struct MuffinLabsResponse {
    data: MuffinLabsData,
}

#[derive(Debug, Deserialize)]
struct MuffinLabsData {
    #[serde(rename = "Events", default)]
    events: Vec<MuffinLabsEvent>,
}

#[derive(Debug, Deserialize)]
struct MuffinLabsEvent {
    year: Option<Value>,
    text: Option<String>,
    #[serde(default)]
    links: Vec<MuffinLabsLink>,
}

#[derive(Debug, Deserialize)]
struct MuffinLabsLink {
    title: Option<String>,
    link: Option<String>,
}
