mod cache;
mod date;
mod refresh;
mod today;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;
use yesterday_core::{
    ClientConfig, DateKey, EventList, EventSource, HistoricalEventsClient, Zone,
};
use yesterday_store::{DuckDbStore, KeyValueStore, MemoryStore, StoreConfig};

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::output::Output;

#[derive(Debug)]
pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Wraps an event list, flagging stale fallback data.
    pub fn events(list: EventList) -> Result<Self, CliError> {
        let fallback = list.source == EventSource::Fallback;
        let result = Self::ok(serde_json::to_value(&list)?);
        Ok(if fallback {
            result.with_warning(format!(
                "upstream unavailable; serving cached events fetched at {}",
                list.fetched_at
            ))
        } else {
            result
        })
    }
}

pub async fn run(cli: &Cli) -> Result<Output, CliError> {
    let started = Instant::now();
    let config = client_config(cli)?;

    let (name, result) = match &cli.command {
        Command::Today(args) => ("today", today::run(args, &build_client(cli, config)?).await?),
        Command::Refresh(args) => (
            "refresh",
            refresh::run(args, &build_client(cli, config)?).await?,
        ),
        Command::Cache(args) => ("cache", cache::run(args, &build_client(cli, config)?).await?),
        Command::Date(args) => ("date", date::run(args, &config)?),
    };

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(Output::new(name, result.data, result.warnings, latency_ms))
}

/// Environment configuration with command-line overrides applied.
fn client_config(cli: &Cli) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env();

    if let Some(timeout_ms) = cli.timeout_ms {
        config.upstream.timeout_ms = timeout_ms;
        config.retry.attempt_timeout = Duration::from_millis(timeout_ms);
    }
    if let Some(language) = &cli.language {
        config.upstream.language = language.clone();
    }
    if let Some(zone) = &cli.timezone {
        config.timezone = Zone::parse(zone)?;
    }

    Ok(config)
}

fn build_client(cli: &Cli, config: ClientConfig) -> Result<HistoricalEventsClient, CliError> {
    let store: Arc<dyn KeyValueStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        let store_config = match &cli.home {
            Some(home) => StoreConfig::with_home(home),
            None => StoreConfig::default(),
        };
        debug!(path = %store_config.db_path.display(), "opening event cache");
        Arc::new(DuckDbStore::open(store_config)?)
    };

    Ok(HistoricalEventsClient::builder()
        .config(config)
        .store(store)
        .build())
}

fn parse_key(date: Option<&str>) -> Result<Option<DateKey>, CliError> {
    date.map(DateKey::parse).transpose().map_err(CliError::from)
}
