use crate::error::Result;
use crate::models::Candle;
use csv::Writer;
use log::debug;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Where raw pull artifacts land on disk.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub root_dir: PathBuf,
    pub dataset_slug: String,
}

impl SnapshotConfig {
    pub fn new<P: AsRef<Path>>(root_dir: P, dataset_slug: &str) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            dataset_slug: dataset_slug.to_string(),
        }
    }

    /// Directory for this dataset's artifacts, created on demand.
    pub fn dataset_dir(&self) -> Result<PathBuf> {
        let dir = self.root_dir.join(&self.dataset_slug);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Format a run id like 20240105_130001Z from a supplied UTC instant.
pub fn run_id(now_ms: i64) -> String {
    match chrono::DateTime::<chrono::Utc>::from_timestamp_millis(now_ms) {
        Some(dt) => dt.format("%Y%m%d_%H%M%SZ").to_string(),
        None => format!("{}", now_ms),
    }
}

/// Write the raw fetched window as a CSV audit artifact.
///
/// Write-only: nothing in the feed ever reads a snapshot back. The file
/// carries the unfiltered window, open bar included, so a post-mortem sees
/// exactly what the exchange returned.
pub fn write_raw_snapshot(cfg: &SnapshotConfig, run_id: &str, candles: &[Candle]) -> Result<PathBuf> {
    let out_path = cfg.dataset_dir()?.join(format!("{}_api_pull.csv", run_id));

    let file = File::create(&out_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(&Candle::snapshot_headers())?;
    for candle in candles {
        writer.write_record(&candle.to_snapshot_record())?;
    }
    writer.flush()?;

    debug!("wrote raw snapshot with {} rows to {}", candles.len(), out_path.display());
    Ok(out_path)
}
