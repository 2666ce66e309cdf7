use crate::db::Database;
use crate::engine::{AppendEngine, AppendMode, AppendReport, GapPolicy};
use crate::error::{AppError, Result};
use crate::models::Candle;
use crate::utils::{format_ms, interval_to_milliseconds};
use csv::ReaderBuilder;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for a bulk CSV backfill.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Path to the merged Binance Vision CSV
    pub csv_path: PathBuf,
    pub db_path: PathBuf,
    pub symbol: String,
    pub interval: String,
    /// Inclusive range filter (UTC ms)
    pub start: Option<i64>,
    pub end: Option<i64>,
    /// Treat any period gap as fatal instead of continuing
    pub stop_on_gap: bool,
    /// Inspect and validate only, do not write to the store
    pub dry_run: bool,
}

/// Counters from the clean/transform pre-step.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanStats {
    pub dropped_unparseable: usize,
    pub dropped_duplicates: usize,
    pub dropped_out_of_range: usize,
    pub gaps: usize,
}

/// Read a merged kline CSV, with or without the standard Binance header.
///
/// Rows that cannot be parsed are dropped and counted, never coerced into
/// zeros. A missing close_time column is synthesized as one period minus a
/// millisecond after open_time.
pub fn read_merged_csv<P: AsRef<Path>>(path: P, interval_ms: i64) -> Result<(Vec<Candle>, usize)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path.as_ref())?;

    let mut candles = Vec::new();
    let mut dropped = 0usize;

    for (index, record) in reader.records().enumerate() {
        let record = record?;

        // Header detection: the merged dumps sometimes carry the standard
        // Binance header row and sometimes start straight with data.
        if index == 0 {
            let first = record.get(0).unwrap_or_default().trim().to_lowercase();
            if first == "open_time" {
                continue;
            }
        }

        match parse_record(&record, interval_ms) {
            Some(candle) => candles.push(candle),
            None => dropped += 1,
        }
    }

    Ok((candles, dropped))
}

fn parse_record(record: &csv::StringRecord, interval_ms: i64) -> Option<Candle> {
    let open_time: i64 = record.get(0)?.trim().parse().ok()?;
    let open: f64 = record.get(1)?.trim().parse().ok()?;
    let high: f64 = record.get(2)?.trim().parse().ok()?;
    let low: f64 = record.get(3)?.trim().parse().ok()?;
    let close: f64 = record.get(4)?.trim().parse().ok()?;
    let volume: f64 = record.get(5)?.trim().parse().ok()?;

    let close_time = record
        .get(6)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(open_time + interval_ms - 1);

    let candle = Candle {
        open_time,
        open,
        high,
        low,
        close,
        volume,
        close_time,
    };
    if !candle.open.is_finite()
        || !candle.high.is_finite()
        || !candle.low.is_finite()
        || !candle.close.is_finite()
        || !candle.volume.is_finite()
    {
        return None;
    }
    Some(candle)
}

/// Sort, dedupe and range-filter the raw input before it reaches the
/// append engine. Keeps the first row for a duplicated open_time.
pub fn clean_transform(
    mut rows: Vec<Candle>,
    start: Option<i64>,
    end: Option<i64>,
    interval_ms: i64,
) -> (Vec<Candle>, CleanStats) {
    let mut stats = CleanStats::default();

    rows.sort_by_key(|c| c.open_time);

    let before = rows.len();
    rows.dedup_by_key(|c| c.open_time);
    stats.dropped_duplicates = before - rows.len();

    let before = rows.len();
    rows.retain(|c| {
        start.map_or(true, |s| c.open_time >= s) && end.map_or(true, |e| c.open_time <= e)
    });
    stats.dropped_out_of_range = before - rows.len();

    stats.gaps = rows
        .windows(2)
        .filter(|pair| pair[1].open_time - pair[0].open_time != interval_ms)
        .count();

    (rows, stats)
}

/// Bulk backfill of a large ordered historical sequence into the store.
///
/// Historical dumps are entirely in the past, so every row is closed by
/// construction and no closure filtering happens here.
pub struct BulkBackfiller {
    config: BackfillConfig,
    db: Arc<Database>,
    interval_ms: i64,
}

impl BulkBackfiller {
    pub fn new(config: BackfillConfig) -> Result<Self> {
        let interval_ms = interval_to_milliseconds(&config.interval);
        let db = Arc::new(Database::new(&config.db_path)?);
        Ok(Self {
            config,
            db,
            interval_ms,
        })
    }

    /// Inspect, clean and append the CSV contents.
    pub fn run(&self) -> Result<AppendReport> {
        let (raw_rows, dropped_unparseable) =
            read_merged_csv(&self.config.csv_path, self.interval_ms)?;
        self.inspect(&raw_rows, dropped_unparseable);

        let (rows, stats) = clean_transform(
            raw_rows,
            self.config.start,
            self.config.end,
            self.interval_ms,
        );
        if rows.is_empty() {
            return Err(AppError::DataError(
                "no rows left to backfill after cleaning".to_string(),
            ));
        }
        info!(
            "cleaned input: rows={} range={}..{} duplicates_dropped={} out_of_range_dropped={} gaps={}",
            rows.len(),
            format_ms(rows[0].open_time),
            format_ms(rows[rows.len() - 1].open_time),
            stats.dropped_duplicates,
            stats.dropped_out_of_range,
            stats.gaps
        );

        let gap_policy = if self.config.stop_on_gap {
            GapPolicy::Fail
        } else {
            GapPolicy::Continue
        };

        let engine = AppendEngine::new(
            self.db.clone(),
            &self.config.symbol,
            &self.config.interval,
            self.interval_ms,
        );
        let report = engine.append_missing(
            &rows,
            AppendMode::CatchUp,
            gap_policy,
            self.config.dry_run,
        )?;

        if self.config.dry_run {
            info!(
                "[dry-run] would insert {} rows ({} already present, {} gaps)",
                report.inserted, report.skipped_existing, report.gaps
            );
        } else {
            info!(
                "backfill complete: inserted={} skipped_existing={} gaps={}",
                report.inserted, report.skipped_existing, report.gaps
            );
        }
        Ok(report)
    }

    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    fn inspect(&self, rows: &[Candle], dropped_unparseable: usize) {
        info!("input rows: {} ({} unparseable dropped)", rows.len(), dropped_unparseable);
        if rows.is_empty() {
            return;
        }

        info!(
            "input range: {} .. {}",
            format_ms(rows[0].open_time),
            format_ms(rows[rows.len() - 1].open_time)
        );

        let mut sorted: Vec<i64> = rows.iter().map(|c| c.open_time).collect();
        sorted.sort_unstable();
        let duplicates = sorted.windows(2).filter(|p| p[0] == p[1]).count();
        let gaps = sorted
            .windows(2)
            .filter(|p| p[1] - p[0] != self.interval_ms && p[1] != p[0])
            .count();
        if duplicates > 0 {
            warn!("input has {} duplicate open_times", duplicates);
        }
        info!("input continuity: gaps={}", gaps);

        // close_time should sit just under one period after open_time
        let close_anomalies = rows
            .iter()
            .filter(|c| {
                let delta = c.close_time - c.open_time;
                delta < self.interval_ms - 1000 || delta > self.interval_ms
            })
            .count();
        if close_anomalies > 0 {
            warn!("rows with unexpected close_time delta: {}", close_anomalies);
        }
    }
}
