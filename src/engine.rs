use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::Candle;
use crate::utils::format_ms;
use log::{debug, info, warn};
use std::sync::Arc;

/// How the engine selects rows from the candidate window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppendMode {
    /// Insert only the candidate at this open_time (the bar one period
    /// before the current boundary). Other candidates are ignored.
    Single { target_open_time: i64 },
    /// Insert every candidate strictly after the store's current maximum
    /// open_time, ascending.
    CatchUp,
}

/// What to do when a candidate breaks period contiguity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GapPolicy {
    /// Fatal before the offending row or anything after it is committed.
    Fail,
    /// Log the gap, count it, and keep inserting from the next segment.
    Continue,
}

/// Result of one append pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AppendReport {
    pub inserted: usize,
    pub skipped_existing: usize,
    pub gaps: usize,
}

/// Computes the delta between a candidate window and the store, and writes
/// it through the store's insert-if-absent primitive.
///
/// Candidates must already be closed; the engine never checks closure.
pub struct AppendEngine {
    db: Arc<Database>,
    symbol: String,
    interval: String,
    interval_ms: i64,
}

impl AppendEngine {
    pub fn new(db: Arc<Database>, symbol: &str, interval: &str, interval_ms: i64) -> Self {
        Self {
            db,
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            interval_ms,
        }
    }

    /// Append candidates not yet persisted, honoring mode and gap policy.
    ///
    /// Each row's presence check and write is one guarded store operation,
    /// so the batch is resumable: a rerun after a partial failure converges
    /// on the same end state. With `dry_run` the report is computed without
    /// writing.
    pub fn append_missing(
        &self,
        candidates: &[Candle],
        mode: AppendMode,
        gap_policy: GapPolicy,
        dry_run: bool,
    ) -> Result<AppendReport> {
        self.db.ensure_symbol_table(&self.symbol, &self.interval)?;

        match mode {
            AppendMode::Single { target_open_time } => {
                self.append_single(candidates, target_open_time, dry_run)
            }
            AppendMode::CatchUp => self.append_catch_up(candidates, gap_policy, dry_run),
        }
    }

    fn append_single(
        &self,
        candidates: &[Candle],
        target_open_time: i64,
        dry_run: bool,
    ) -> Result<AppendReport> {
        let target = candidates
            .iter()
            .find(|c| c.open_time == target_open_time)
            .ok_or_else(|| {
                AppError::DataError(format!(
                    "target bar {} missing from candidate window",
                    format_ms(target_open_time)
                ))
            })?;

        let mut report = AppendReport::default();
        if dry_run {
            let exists = self
                .db
                .get_candle_by_time(&self.symbol, &self.interval, target.open_time)?
                .is_some();
            if exists {
                report.skipped_existing = 1;
            } else {
                report.inserted = 1;
                debug!("[dry-run] would append bar {}", format_ms(target.open_time));
            }
        } else if self.db.insert_candle_if_absent(&self.symbol, &self.interval, target)? {
            report.inserted = 1;
        } else {
            report.skipped_existing = 1;
        }

        Ok(report)
    }

    fn append_catch_up(
        &self,
        candidates: &[Candle],
        gap_policy: GapPolicy,
        dry_run: bool,
    ) -> Result<AppendReport> {
        let max_open_time = self.db.get_latest_open_time(&self.symbol, &self.interval)?;

        let mut report = AppendReport::default();
        // Contiguity is checked against the last stored bar when there is
        // one; on an empty store the first candidate anchors the chain.
        let mut prev_open_time = max_open_time;

        for candle in candidates {
            if let Some(max) = max_open_time {
                if candle.open_time <= max {
                    continue;
                }
            }

            if let Some(prev) = prev_open_time {
                let expected = prev + self.interval_ms;
                if candle.open_time != expected {
                    match gap_policy {
                        GapPolicy::Fail => {
                            return Err(AppError::GapDetected {
                                expected,
                                found: candle.open_time,
                            });
                        }
                        GapPolicy::Continue => {
                            warn!(
                                "gap detected: expected {} found {}, continuing with next segment",
                                format_ms(expected),
                                format_ms(candle.open_time)
                            );
                            report.gaps += 1;
                        }
                    }
                }
            }

            if dry_run {
                report.inserted += 1;
                debug!("[dry-run] would append bar {}", format_ms(candle.open_time));
            } else if self.db.insert_candle_if_absent(&self.symbol, &self.interval, candle)? {
                report.inserted += 1;
            } else {
                report.skipped_existing += 1;
            }

            prev_open_time = Some(candle.open_time);
        }

        if report.inserted == 0 && report.skipped_existing == 0 {
            info!(
                "{}/{}: store is up to date, nothing to append",
                self.symbol, self.interval
            );
        }
        Ok(report)
    }
}
