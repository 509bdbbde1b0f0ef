use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, warn};

use super::curate::combine_events;
use super::{EventsProvider, ProviderFuture, UpstreamError};
use crate::{DateKey, EventRecord};

/// Primary feed with an optional English fallback and secondary sources,
/// merged into one deduplicated list.
///
/// The fallback runs only when the primary fails or comes back empty.
/// Supplements are always consulted; their failures are logged and skipped.
#[derive(Clone)]
pub struct CompositeProvider {
    primary: Arc<dyn EventsProvider>,
    fallback: Option<Arc<dyn EventsProvider>>,
    supplements: Vec<Arc<dyn EventsProvider>>,
    max_events: usize,
    current_year: Option<i32>,
}

impl CompositeProvider {
    pub fn new(primary: Arc<dyn EventsProvider>) -> Self {
        Self {
            primary,
            fallback: None,
            supplements: Vec::new(),
            max_events: 20,
            current_year: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn EventsProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_supplement(mut self, supplement: Arc<dyn EventsProvider>) -> Self {
        self.supplements.push(supplement);
        self
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self
    }

    /// Pins the upper bound of the plausible-year filter. Defaults to the
    /// current UTC year at fetch time.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = Some(year);
        self
    }

    async fn fetch(&self, key: DateKey) -> Result<Vec<EventRecord>, UpstreamError> {
        let mut sources: Vec<Vec<EventRecord>> = Vec::new();
        let mut errors: Vec<UpstreamError> = Vec::new();

        let primary = run_source(self.primary.as_ref(), key, &mut sources, &mut errors).await;
        if !primary {
            if let Some(fallback) = &self.fallback {
                warn!(
                    date = %key,
                    primary = self.primary.name(),
                    fallback = fallback.name(),
                    "primary source had no events; trying fallback"
                );
                run_source(fallback.as_ref(), key, &mut sources, &mut errors).await;
            }
        }

        for supplement in &self.supplements {
            run_source(supplement.as_ref(), key, &mut sources, &mut errors).await;
        }

        let current_year = self
            .current_year
            .unwrap_or_else(|| OffsetDateTime::now_utc().year());
        let combined = combine_events(sources, current_year, self.max_events);
        if !combined.is_empty() {
            debug!(date = %key, events = combined.len(), "merged upstream sources");
            return Ok(combined);
        }

        let error = errors
            .iter()
            .find(|error| error.is_transient())
            .or_else(|| errors.first())
            .cloned()
            .unwrap_or_else(|| {
                UpstreamError::permanent("no historical events found for this date")
            });
        Err(error)
    }
}

/// Runs one source and files its outcome. True when it produced events.
async fn run_source(
    provider: &dyn EventsProvider,
    key: DateKey,
    sources: &mut Vec<Vec<EventRecord>>,
    errors: &mut Vec<UpstreamError>,
) -> bool {
    match provider.fetch_events(key).await {
        Ok(events) if events.is_empty() => false,
        Ok(events) => {
            sources.push(events);
            true
        }
        Err(error) => {
            warn!(provider = provider.name(), error = %error, "upstream source failed");
            errors.push(error);
            false
        }
    }
}

impl EventsProvider for CompositeProvider {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    fn fetch_events<'a>(&'a self, key: DateKey) -> ProviderFuture<'a> {
        Box::pin(self.fetch(key))
    }
}
