use anyhow::{Context, bail};
use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::date_range::{DateRange, DateRangePreset, DateRangeSelection, parse_date, resolve_now};
use crate::error::FilterError;
use crate::log::Metadata;
use crate::viewer::{FilterMode, MessageFilter, MetadataFilter};

/// lsv - replay and tail log records through the log streaming pipeline
#[derive(Parser, Debug)]
#[command(name = "lsv")]
#[command(version)]
#[command(about = "Replay and tail JSON log records")]
#[command(long_about = "lsv reads newline-delimited JSON log records and streams them through
the same pipeline a log viewer uses: date range selection, batching, overflow
protection and filtering.

Each line of FILE is an object such as:
  {\"date\": \"2024-10-17T12:00:00.000Z\", \"message\": \"started\", \"instance\": \"web-1\"}

Examples:
  lsv app.jsonl --preset lastHour
  lsv app.jsonl --live --filter error
  lsv app.jsonl --since 2024-10-17T00:00:00Z --until 2024-10-17T12:00:00Z --meta instance=web-1")]
pub struct Cli {
    /// Newline-delimited JSON file to replay
    pub file: Option<PathBuf>,

    /// Path to config file (defaults to .lsv.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Write a default config file and exit
    #[arg(long)]
    pub init: bool,

    /// Follow the file as new records are appended (last 10 minutes onwards)
    #[arg(long, conflicts_with_all = ["preset", "since"])]
    pub live: bool,

    /// Named range: lastHour, last4Hours, last7Days, today, yesterday
    #[arg(long, conflicts_with = "since")]
    pub preset: Option<String>,

    /// Start of a custom range (ISO-8601)
    #[arg(long)]
    pub since: Option<String>,

    /// End of a custom range (ISO-8601), open-ended when omitted
    #[arg(long, requires = "since")]
    pub until: Option<String>,

    /// Only show records whose message matches
    #[arg(long)]
    pub filter: Option<String>,

    /// Match --filter as a case-sensitive whole term
    #[arg(long, requires = "filter")]
    pub strict: bool,

    /// Only show records with this metadata (name=value, repeatable)
    #[arg(long = "meta", value_parser = parse_metadata)]
    pub meta: Vec<Metadata>,

    /// Keep streaming past the overflow watermark instead of stopping there
    #[arg(long)]
    pub accept_overflow: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_metadata(raw: &str) -> Result<Metadata, String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok(Metadata::new(name, value)),
        _ => Err(format!("expected name=value, got '{}'", raw)),
    }
}

impl Cli {
    /// Which range the user asked for. Defaults to the last hour.
    pub fn date_range_selection(&self) -> anyhow::Result<DateRangeSelection> {
        if self.live {
            return Ok(DateRangeSelection::Live);
        }
        if let Some(since) = &self.since {
            let since = parse_date(since)?;
            let until = self.until.as_deref().map(parse_date).transpose()?;
            // Validates ordering
            DateRange::new(since, until)?;
            return Ok(DateRangeSelection::Custom { since, until });
        }
        let preset = match &self.preset {
            Some(name) => name.parse::<DateRangePreset>()?,
            None => DateRangePreset::LastHour,
        };
        Ok(DateRangeSelection::Preset { preset })
    }

    pub fn date_range(&self) -> anyhow::Result<DateRange> {
        Ok(resolve_now(&self.date_range_selection()?)?)
    }

    pub fn message_filter(&self) -> Result<Option<MessageFilter>, FilterError> {
        let Some(value) = &self.filter else {
            return Ok(None);
        };
        let mode = if self.strict { FilterMode::Strict } else { FilterMode::Loose };
        MessageFilter::new(value.as_str(), mode).map(Some)
    }

    pub fn metadata_filter(&self) -> MetadataFilter {
        MetadataFilter::new(self.meta.clone())
    }

    /// Default log directive from -v/-q
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

/// Write a default config file unless one already exists
pub fn init_config(config_path: &str) -> anyhow::Result<()> {
    if Path::new(config_path).exists() {
        println!("Config file '{}' already exists.", config_path);
        return Ok(());
    }

    let config = Config::default();
    config
        .save(config_path)
        .with_context(|| format!("Failed to write config to '{}'", config_path))?;

    println!("Created {} with default settings:", config_path);
    println!("  - batch window: {} ms", config.stream.batch_window_ms);
    println!("  - overflow watermark: {} records", config.stream.overflow_watermark);
    println!("  - viewer limit: {} records", config.viewer.limit);
    Ok(())
}

/// Load the config file, falling back to defaults when the default path is missing
pub fn load_config(config_path: &str) -> anyhow::Result<Config> {
    let config = if Path::new(config_path).exists() {
        Config::from_file(config_path)?
    } else if config_path == DEFAULT_CONFIG_PATH {
        Config::default()
    } else {
        bail!("Config file '{}' not found", config_path);
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
