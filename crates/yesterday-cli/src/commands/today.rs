use std::time::Duration;

use yesterday_core::{FetchOptions, HistoricalEventsClient, UtcDateTime};

use crate::cli::TodayArgs;
use crate::error::CliError;

use super::{parse_key, CommandResult};

pub async fn run(
    args: &TodayArgs,
    client: &HistoricalEventsClient,
) -> Result<CommandResult, CliError> {
    let now = UtcDateTime::now();
    let key = parse_key(args.date.as_deref())?.unwrap_or_else(|| client.today(now));

    let mut options = if args.refresh {
        FetchOptions::refresh()
    } else {
        FetchOptions::default()
    };
    if let Some(wait_ms) = args.wait_ms {
        options = options.with_timeout(Duration::from_millis(wait_ms));
    }

    let list = client.fetch_events_for(key, now, options).await?;
    CommandResult::events(list)
}
