use serde::Serialize;
use tokio::sync::watch;

use crate::{ClientError, EventList, EventSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPhase {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Observable fetch state for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FetchStatus {
    pub phase: FetchPhase,
    /// True while at least one fetch is outstanding.
    pub is_loading: bool,
    pub active_fetches: usize,
    /// User-facing message of the most recent failure, cleared on success.
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_code: Option<&'static str>,
    pub data_source: Option<EventSource>,
    pub from_cache: bool,
}

impl FetchStatus {
    /// Phase implied by the last completed fetch.
    fn settled_phase(&self) -> FetchPhase {
        if self.last_error.is_some() {
            FetchPhase::Error
        } else if self.data_source.is_some() {
            FetchPhase::Success
        } else {
            FetchPhase::Idle
        }
    }

    fn record(&mut self, result: &Result<EventList, ClientError>) {
        match result {
            Ok(list) => {
                self.last_error = None;
                self.last_error_code = None;
                self.data_source = Some(list.source);
                self.from_cache = list.from_cache;
            }
            Err(error) => {
                self.last_error = Some(error.user_message());
                self.last_error_code = Some(error.code());
            }
        }
    }

    fn settle(&mut self) {
        self.is_loading = self.active_fetches > 0;
        self.phase = if self.is_loading {
            FetchPhase::Loading
        } else {
            self.settled_phase()
        };
    }
}

/// Publishes [`FetchStatus`] transitions to any number of subscribers.
#[derive(Debug)]
pub(crate) struct StatusPublisher {
    sender: watch::Sender<FetchStatus>,
}

impl StatusPublisher {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(FetchStatus::default());
        Self { sender }
    }

    pub(crate) fn current(&self) -> FetchStatus {
        self.sender.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<FetchStatus> {
        self.sender.subscribe()
    }

    /// Marks one more fetch as outstanding until the returned guard is
    /// finished or dropped.
    pub(crate) fn begin(&self) -> StatusGuard<'_> {
        self.sender.send_modify(|status| {
            status.active_fetches += 1;
            status.settle();
        });
        StatusGuard {
            publisher: self,
            open: true,
        }
    }

    /// Clears outcome fields. Outstanding fetches stay counted.
    pub(crate) fn reset(&self) {
        self.sender.send_modify(|status| {
            *status = FetchStatus {
                active_fetches: status.active_fetches,
                ..FetchStatus::default()
            };
            status.settle();
        });
    }

    fn end(&self, result: Option<&Result<EventList, ClientError>>) {
        self.sender.send_modify(|status| {
            if let Some(result) = result {
                status.record(result);
            }
            status.active_fetches = status.active_fetches.saturating_sub(1);
            status.settle();
        });
    }
}

/// One outstanding fetch. Dropping it unfinished (a cancelled caller) only
/// releases the loading count.
#[must_use]
pub(crate) struct StatusGuard<'a> {
    publisher: &'a StatusPublisher,
    open: bool,
}

impl StatusGuard<'_> {
    pub(crate) fn finish(mut self, result: &Result<EventList, ClientError>) {
        self.open = false;
        self.publisher.end(Some(result));
    }
}

impl Drop for StatusGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            self.publisher.end(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DateKey, UtcDateTime};

    fn list(source: EventSource, from_cache: bool) -> Result<EventList, ClientError> {
        Ok(EventList {
            date_key: DateKey::new(7, 20).expect("key"),
            events: Vec::new(),
            source,
            fetched_at: UtcDateTime::parse("2025-07-20T12:00:00Z").expect("timestamp"),
            from_cache,
        })
    }

    #[test]
    fn transitions_keep_last_source_across_errors() {
        let publisher = StatusPublisher::new();
        let receiver = publisher.subscribe();

        let guard = publisher.begin();
        assert!(receiver.borrow().is_loading);
        assert_eq!(receiver.borrow().phase, FetchPhase::Loading);
        guard.finish(&list(EventSource::Live, false));

        publisher
            .begin()
            .finish(&Err(ClientError::ServiceUnavailable));

        let status = publisher.current();
        assert_eq!(status.phase, FetchPhase::Error);
        assert!(!status.is_loading);
        assert_eq!(status.data_source, Some(EventSource::Live));
        assert_eq!(status.last_error_code, Some("client.service_unavailable"));
        assert!(status
            .last_error
            .as_deref()
            .is_some_and(|message| message.starts_with("Circuit breaker activated")));
    }

    #[test]
    fn success_clears_previous_error() {
        let publisher = StatusPublisher::new();
        publisher
            .begin()
            .finish(&Err(ClientError::ServiceUnavailable));
        publisher.begin().finish(&list(EventSource::Fallback, true));

        let status = publisher.current();
        assert_eq!(status.last_error, None);
        assert_eq!(status.data_source, Some(EventSource::Fallback));
        assert!(status.from_cache);
    }

    #[test]
    fn stays_loading_until_the_last_overlapping_fetch_ends() {
        let publisher = StatusPublisher::new();
        let slow = publisher.begin();
        let fast = publisher.begin();
        assert_eq!(publisher.current().active_fetches, 2);

        fast.finish(&list(EventSource::Live, true));
        let status = publisher.current();
        assert!(status.is_loading);
        assert_eq!(status.phase, FetchPhase::Loading);
        assert_eq!(status.data_source, Some(EventSource::Live));

        slow.finish(&list(EventSource::Live, false));
        let status = publisher.current();
        assert!(!status.is_loading);
        assert_eq!(status.phase, FetchPhase::Success);
        assert_eq!(status.active_fetches, 0);
    }

    #[test]
    fn dropped_guard_returns_to_the_settled_phase() {
        let publisher = StatusPublisher::new();
        drop(publisher.begin());
        assert_eq!(publisher.current(), FetchStatus::default());

        publisher
            .begin()
            .finish(&Err(ClientError::ServiceUnavailable));
        drop(publisher.begin());
        let status = publisher.current();
        assert!(!status.is_loading);
        assert_eq!(status.phase, FetchPhase::Error);
    }

    #[test]
    fn reset_keeps_outstanding_fetches_counted() {
        let publisher = StatusPublisher::new();
        let guard = publisher.begin();
        publisher.reset();
        assert!(publisher.current().is_loading);

        drop(guard);
        assert_eq!(publisher.current(), FetchStatus::default());
    }
}
