use serde_json::json;
use yesterday_core::{normalize_language, today_key, ClientConfig, Locale, UtcDateTime};

use crate::cli::DateArgs;
use crate::error::CliError;

use super::{parse_key, CommandResult};

pub fn run(args: &DateArgs, config: &ClientConfig) -> Result<CommandResult, CliError> {
    let locale = Locale::parse(&args.locale)?;
    let local_now = config.timezone.to_local(UtcDateTime::now().into_inner());

    let key = parse_key(args.date.as_deref())?.unwrap_or_else(|| today_key(local_now));
    let date = key.date_in_year(local_now.year())?;
    let mut result = CommandResult::ok(json!({
        "date_key": key,
        "storage_key": key.storage_key(&normalize_language(&config.upstream.language)),
        "timezone": config.timezone.to_string(),
        "formatted": locale.format(date),
    }));

    if key.is_leap_day() && date.day() == 28 {
        result = result.with_warning(format!(
            "{} is not a leap year; 02-29 is shown as February 28",
            local_now.year()
        ));
    }
    Ok(result)
}
