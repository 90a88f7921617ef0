//! Command-line interface parsing for the cache manager
//!
//! Operators drive the same actions the dashboard exposes: inspect status,
//! refresh or clear everything, one group or one operation, adjust TTLs and
//! watch status as it is polled.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::status::CacheStatusReport;
use crate::store::FileStore;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// TTL hours must be a finite, non-negative number
    #[error("Invalid TTL: '{0}' hours. Expected a non-negative number")]
    InvalidHours(f64),

    /// No store directory was given and none could be derived
    #[error("Could not determine a store directory; pass --store-dir")]
    NoStoreDir,
}

/// Operation-level TTL cache manager for the admin dashboard
#[derive(Parser, Debug)]
#[command(name = "dashcache")]
#[command(about = "Inspect and manage the admin dashboard's operation cache")]
#[command(version)]
pub struct Cli {
    /// Directory holding the durable cache store
    #[arg(long, value_name = "DIR", global = true)]
    pub store_dir: Option<PathBuf>,

    /// Query endpoint used for refreshes
    #[arg(long, value_name = "URL", global = true, default_value = "http://localhost:4000/graphql")]
    pub endpoint: String,

    /// Settle delay after a full refresh, in milliseconds
    #[arg(long, value_name = "MS", global = true, default_value_t = 1000)]
    pub settle_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show one row per known operation
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Clear everything and refetch every group
    RefreshAll,
    /// Clear everything without refetching
    ClearAll,
    /// Refetch a single operation
    Refresh { operation: String },
    /// Clear a single operation
    Clear { operation: String },
    /// Clear and refetch every operation of a service group
    RefreshGroup { group: String },
    /// Clear every operation of a service group
    ClearGroup { group: String },
    /// Show the next scheduled refresh
    Schedule,
    /// Set an operation's TTL in hours (0 disables caching for it)
    SetTtl { operation: String, hours: f64 },
    /// Print the user list and totals
    Users,
    /// Poll and print status until interrupted
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },
}

/// Process settings derived from CLI arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub store_dir: PathBuf,
    pub endpoint: String,
    pub settle_delay: Duration,
}

impl Settings {
    /// Resolves settings, falling back to the XDG data directory for storage
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if let Command::SetTtl { hours, .. } = cli.command {
            validate_hours(hours)?;
        }

        let store_dir = match &cli.store_dir {
            Some(dir) => dir.clone(),
            None => FileStore::new()
                .map(|store| store.dir().to_path_buf())
                .ok_or(CliError::NoStoreDir)?,
        };

        Ok(Settings {
            store_dir,
            endpoint: cli.endpoint.clone(),
            settle_delay: Duration::from_millis(cli.settle_ms),
        })
    }
}

/// Checks a TTL given in hours
///
/// # Errors
/// `InvalidHours` for negative or non-finite values.
pub fn validate_hours(hours: f64) -> Result<f64, CliError> {
    if hours.is_finite() && hours >= 0.0 {
        Ok(hours)
    } else {
        Err(CliError::InvalidHours(hours))
    }
}

/// Compact human duration, e.g. `1h 5m` or `42s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, _) => format!("{}m {}s", minutes, seconds),
        _ => format!("{}h {}m", hours, minutes),
    }
}

/// Renders a status report as a plain-text table
pub fn format_status(report: &CacheStatusReport) -> String {
    let mut out = String::new();
    let state = if report.enabled { "enabled" } else { "disabled" };
    let _ = writeln!(
        out,
        "Caching {} ({} of {} operations cached)",
        state,
        report.cached_count(),
        report.data.len()
    );
    let _ = writeln!(out, "{:<24} {:<8} {:>10} {:>10}", "OPERATION", "STATE", "AGE", "TTL");
    for row in &report.data {
        let row_state = if row.is_cached {
            "cached"
        } else if row.is_stale {
            "stale"
        } else {
            "empty"
        };
        let _ = writeln!(
            out,
            "{:<24} {:<8} {:>10} {:>10}",
            row.operation_name,
            row_state,
            format_duration(row.age),
            format_duration(row.ttl)
        );
    }
    out
}
