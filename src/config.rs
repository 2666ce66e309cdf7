use crate::error::{AppError, Result};
use crate::validator::DEFAULT_TOLERANCE;
use std::path::PathBuf;

pub const DEFAULT_SYMBOL: &str = "BTCUSDT";
pub const DEFAULT_INTERVAL: &str = "1h";
pub const DEFAULT_DATASET_SLUG: &str = "binance_btcusdt_perp_1h";

/// Supported kline intervals
pub const SUPPORTED_INTERVALS: [&str; 11] = [
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h",
];

/// Configuration for one feed cycle.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub symbol: String,
    pub interval: String,
    /// Number of most recent bars to pull per cycle
    pub n_recent: u32,
    /// SQLite database path
    pub db_path: PathBuf,
    /// Directory root for raw pull artifacts
    pub snapshot_dir: PathBuf,
    /// Dataset slug directory for artifacts
    pub dataset_slug: String,
    /// Absolute tolerance for overlap validation
    pub tolerance: f64,
    /// Compute and report the append without writing to the store
    pub dry_run: bool,
    /// Append all missing closed bars in the window, not just the target
    pub catch_up: bool,
    pub debug: bool,
}

impl FeedConfig {
    pub fn new(
        symbol: String,
        interval: String,
        n_recent: u32,
        db_path: PathBuf,
        snapshot_dir: PathBuf,
        dataset_slug: String,
        tolerance: Option<f64>,
        dry_run: bool,
        catch_up: bool,
        debug: bool,
    ) -> Result<Self> {
        if !SUPPORTED_INTERVALS.contains(&interval.as_str()) {
            return Err(AppError::ConfigError(format!(
                "unsupported interval '{}', expected one of {}",
                interval,
                SUPPORTED_INTERVALS.join(", ")
            )));
        }

        if n_recent < 2 {
            return Err(AppError::ConfigError(format!(
                "n_recent must be at least 2 to leave an overlap to validate, got {}",
                n_recent
            )));
        }

        Ok(Self {
            symbol: symbol.to_uppercase(),
            interval,
            n_recent,
            db_path,
            snapshot_dir,
            dataset_slug,
            tolerance: tolerance.unwrap_or(DEFAULT_TOLERANCE),
            dry_run,
            catch_up,
            debug,
        })
    }
}
