use serde::Serialize;
use serde_json::Value;
use yesterday_core::UtcDateTime;

use crate::error::CliError;

/// JSON document written to stdout for every successful command.
#[derive(Debug, Serialize)]
pub struct Output {
    pub meta: Meta,
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub command: &'static str,
    pub generated_at: String,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Output {
    pub fn new(command: &'static str, data: Value, warnings: Vec<String>, latency_ms: u64) -> Self {
        Self {
            meta: Meta {
                command,
                generated_at: UtcDateTime::now().format_rfc3339(),
                latency_ms,
                warnings,
            },
            data,
        }
    }
}

pub fn render(output: &Output, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(output)?
    } else {
        serde_json::to_string(output)?
    };
    println!("{payload}");
    Ok(())
}
