use serde_json::json;
use yesterday_core::{normalize_language, HistoricalEventsClient, UtcDateTime};

use crate::cli::{CacheArgs, CacheCommand};
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &CacheArgs,
    client: &HistoricalEventsClient,
) -> Result<CommandResult, CliError> {
    let cache = client.cache();
    let now = UtcDateTime::now();
    let ttl = client.config().cache.ttl;

    match &args.command {
        CacheCommand::Stats => {
            let stats = cache.stats().await?;
            Ok(CommandResult::ok(serde_json::to_value(stats)?))
        }
        CacheCommand::List => {
            let mut entries = Vec::new();
            for key in cache.keys().await? {
                let Some(entry) = cache.get(key).await else {
                    continue;
                };
                entries.push(json!({
                    "date_key": key,
                    "language": cache.language(),
                    "events": entry.events.len(),
                    "source": entry.source,
                    "fetched_at": entry.fetched_at,
                    "age_secs": entry.age(now).as_secs(),
                    "fresh": entry.is_fresh(now, ttl),
                }));
            }
            Ok(CommandResult::ok(json!({ "entries": entries })))
        }
        CacheCommand::Purge => {
            let removed = cache
                .purge_expired(now, client.config().cache.retention)
                .await;
            Ok(CommandResult::ok(json!({ "removed": removed })))
        }
        CacheCommand::Clear { language: None } => {
            let removed = cache.clear().await?;
            Ok(CommandResult::ok(json!({ "removed": removed })))
        }
        CacheCommand::Clear {
            language: Some(language),
        } => {
            let removed = cache.clear_language(language).await?;
            Ok(CommandResult::ok(json!({
                "language": normalize_language(language),
                "removed": removed,
            })))
        }
    }
}
