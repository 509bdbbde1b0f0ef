//! CLI argument definitions for yesterday.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `today` | Events for today (or `--date MM-DD`), cache first |
//! | `refresh` | Live fetch for today, bypassing a fresh cache entry |
//! | `cache` | Inspect and maintain the local event cache |
//! | `date` | Date key and localized rendering of today |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--timeout-ms` | `10000` | Per-attempt upstream timeout |
//! | `--language` | `en` | Wikipedia language edition |
//! | `--timezone` | `UTC` | Offset deciding which day "today" is |
//! | `--home` | `$YESTERDAY_HOME` | Root directory of the on-disk cache |
//! | `--ephemeral` | `false` | Keep the cache in memory only |
//!
//! # Examples
//!
//! ```bash
//! yesterday today --pretty
//! yesterday today --date 07-20 --language de
//! yesterday refresh --timezone +09:00
//! yesterday cache stats
//! yesterday date --locale de-DE
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Yesterday's News: what happened on this day in history
#[derive(Debug, Parser)]
#[command(
    name = "yesterday",
    author,
    version,
    about = "Historical events for today's date, cached and rate limited",
    long_about = "Fetches \"on this day\" historical events from Wikipedia with a local \
24-hour cache, a circuit breaker, and a rate limiter. Output is JSON on stdout; \
logs go to stderr (set RUST_LOG to adjust)."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Per-attempt upstream timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Wikipedia language edition (en, de, fr, ...).
    #[arg(long, global = true)]
    pub language: Option<String>,

    /// Zone used to decide the current day (UTC, +05:30, GMT-8, Europe/Berlin).
    #[arg(long, global = true)]
    pub timezone: Option<String>,

    /// Root directory of the on-disk cache (defaults to $YESTERDAY_HOME, then ~/.yesterday).
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Keep the cache in memory for this invocation only.
    #[arg(long, global = true, default_value_t = false)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 📰 Events that happened on this day.
    ///
    /// # Examples
    ///
    ///   yesterday today
    ///   yesterday today --date 02-29 --pretty
    Today(TodayArgs),

    /// 🔄 Re-fetch today's events from the upstream provider.
    Refresh(RefreshArgs),

    /// 📦 Cache management commands.
    Cache(CacheArgs),

    /// 📅 Show today's date key and its localized rendering.
    Date(DateArgs),
}

#[derive(Debug, Args)]
pub struct TodayArgs {
    /// Calendar day to fetch instead of today (MM-DD).
    #[arg(long)]
    pub date: Option<String>,

    /// Ignore a fresh cache entry and fetch live.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// How long to wait for the result, in milliseconds.
    #[arg(long)]
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    /// Calendar day to refresh instead of today (MM-DD).
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CacheCommand {
    /// Entry count, size and age range.
    Stats,
    /// Cached date keys with freshness.
    List,
    /// Remove entries past the retention period and damaged ones.
    Purge,
    /// Remove every cached entry, or only those of one language.
    Clear {
        /// Wikipedia language whose entries are removed (en, de, ...).
        #[arg(long)]
        language: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct DateArgs {
    /// Display locale (en-US, en-GB, de-DE, fr-FR, es-ES, it-IT).
    #[arg(long, default_value = "en-US")]
    pub locale: String,

    /// Calendar day to render instead of today (MM-DD).
    #[arg(long)]
    pub date: Option<String>,
}
