use yesterday_core::{FetchOptions, HistoricalEventsClient, UtcDateTime};

use crate::cli::RefreshArgs;
use crate::error::CliError;

use super::{parse_key, CommandResult};

pub async fn run(
    args: &RefreshArgs,
    client: &HistoricalEventsClient,
) -> Result<CommandResult, CliError> {
    let now = UtcDateTime::now();
    let list = match parse_key(args.date.as_deref())? {
        Some(key) => {
            client
                .fetch_events_for(key, now, FetchOptions::refresh())
                .await?
        }
        None => client.force_refresh(now).await?,
    };
    CommandResult::events(list)
}
