use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::wikipedia::{extract_title, parse_year};
use super::{EventsProvider, ProviderFuture, UpstreamError};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::{DateKey, EventCategory, EventRecord};

pub const API_NINJAS_BASE_URL: &str = "https://api.api-ninjas.com/v1/historicalevents";

/// API Ninjas historical events endpoint. The key is sent as `X-Api-Key`
/// when configured; a keyless base URL is expected to be a proxy.
#[derive(Clone)]
pub struct ApiNinjasProvider {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
    max_events: usize,
}

impl Default for ApiNinjasProvider {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::default()))
    }
}

impl ApiNinjasProvider {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(API_NINJAS_BASE_URL),
            api_key: None,
            timeout_ms: 10_000,
            max_events: 60,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn endpoint(&self, key: DateKey) -> String {
        format!("{}?month={}&day={}", self.base_url, key.month(), key.day())
    }

    async fn fetch(&self, key: DateKey) -> Result<Vec<EventRecord>, UpstreamError> {
        let url = self.endpoint(key);
        let mut request = HttpRequest::json(url.as_str(), Duration::from_millis(self.timeout_ms));
        if let Some(api_key) = &self.api_key {
            request = request.with_header("X-Api-Key", api_key.as_str());
        }

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(UpstreamError::from_status(response.status));
        }

        let raw: Vec<ApiNinjasEvent> = serde_json::from_str(&response.body).map_err(|e| {
            UpstreamError::permanent(format!("invalid api-ninjas response format: {e}"))
        })?;
        let events: Vec<EventRecord> = raw
            .into_iter()
            .filter_map(|raw| {
                let year = raw.year.as_ref().and_then(parse_year)?;
                let text = raw.event.filter(|text| !text.trim().is_empty())?;
                let category = EventCategory::classify(&text);
                EventRecord::new(year, extract_title(&text), text, category).ok()
            })
            .take(self.max_events)
            .collect();

        debug!(url = %url, events = events.len(), "api-ninjas returned events");
        Ok(events)
    }
}

impl EventsProvider for ApiNinjasProvider {
    fn name(&self) -> &'static str {
        "api-ninjas"
    }

    fn fetch_events<'a>(&'a self, key: DateKey) -> ProviderFuture<'a> {
        Box::pin(self.fetch(key))
    }
}

#[derive(Debug, Deserialize)]
struct ApiNinjasEvent {
    year: Option<Value>,
    event: Option<String>,
}
