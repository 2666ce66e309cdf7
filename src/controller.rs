use crate::api::KlineSource;
use crate::config::FeedConfig;
use crate::db::Database;
use crate::engine::{AppendEngine, AppendMode, AppendReport, GapPolicy};
use crate::error::{AppError, Result};
use crate::models::Candle;
use crate::snapshot::{self, SnapshotConfig};
use crate::utils::{align_to_interval, format_ms, interval_to_milliseconds};
use crate::validator::validate_window;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Where a feed cycle currently stands, or where it stopped.
///
/// Failed carries the originating error and is terminal for the cycle; the
/// external scheduler retries by starting a fresh cycle next period.
#[derive(Debug)]
pub enum CycleState {
    Idle,
    Fetching,
    Filtering,
    Validating,
    Appending,
    Done,
    Failed(AppError),
}

/// Outcome of one feed cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub state: CycleState,
    /// Rows returned by the exchange, open bar included
    pub pulled: usize,
    /// Shared rows compared against the store
    pub validated_rows: usize,
    pub append: AppendReport,
    /// Open time of the bar this cycle is responsible for
    pub target_open_time: i64,
    pub snapshot_path: Option<PathBuf>,
}

impl CycleReport {
    fn new(target_open_time: i64) -> Self {
        Self {
            state: CycleState::Idle,
            pulled: 0,
            validated_rows: 0,
            append: AppendReport::default(),
            target_open_time,
            snapshot_path: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state, CycleState::Done)
    }
}

/// Orchestrates one feed cycle: fetch, filter closed, validate overlap,
/// append. One instance runs at a time; the store's uniqueness guard is the
/// only backstop if that assumption is ever violated.
pub struct FeedController<S: KlineSource> {
    source: S,
    db: Arc<Database>,
    config: FeedConfig,
    snapshot_config: SnapshotConfig,
    engine: AppendEngine,
    interval_ms: i64,
}

impl<S: KlineSource> FeedController<S> {
    pub fn new(source: S, db: Arc<Database>, config: FeedConfig) -> Self {
        let interval_ms = interval_to_milliseconds(&config.interval);
        let snapshot_config = SnapshotConfig::new(&config.snapshot_dir, &config.dataset_slug);
        let engine = AppendEngine::new(db.clone(), &config.symbol, &config.interval, interval_ms);
        Self {
            source,
            db,
            config,
            snapshot_config,
            engine,
            interval_ms,
        }
    }

    /// Run one full cycle against the supplied wall clock.
    ///
    /// The raw fetched window is written as a snapshot on every path that
    /// gets past the fetch, failures included.
    pub async fn run_cycle(&self, now_ms: i64) -> CycleReport {
        let now_floor = align_to_interval(now_ms, self.interval_ms);
        let target_open_time = now_floor - self.interval_ms;
        let mut report = CycleReport::new(target_open_time);

        if let Err(e) = self.db.ensure_symbol_table(&self.config.symbol, &self.config.interval) {
            report.state = CycleState::Failed(e);
            return report;
        }

        report.state = CycleState::Fetching;
        let fetched = match self
            .source
            .fetch_recent(&self.config.symbol, &self.config.interval, self.config.n_recent)
            .await
        {
            Ok(window) => window,
            Err(e) => {
                error!("fetch failed for {}/{}: {}", self.config.symbol, self.config.interval, e);
                report.state = CycleState::Failed(e);
                return report;
            }
        };
        report.pulled = fetched.len();

        let run_id = snapshot::run_id(now_ms);
        let mut snapshot_err = None;
        match snapshot::write_raw_snapshot(&self.snapshot_config, &run_id, &fetched) {
            Ok(path) => report.snapshot_path = Some(path),
            Err(e) => {
                error!("failed to write raw snapshot: {}", e);
                snapshot_err = Some(e);
            }
        }

        report.state = CycleState::Filtering;
        let closed = match self.filter_closed(&fetched, now_ms) {
            Ok(closed) => closed,
            Err(e) => {
                report.state = CycleState::Failed(e);
                return report;
            }
        };

        let result = if self.config.catch_up {
            self.run_catch_up(&mut report, &closed)
        } else {
            self.run_single(&mut report, &closed, target_open_time)
        };

        if let Err(e) = result {
            warn!("cycle failed: {}", e);
            report.state = CycleState::Failed(e);
            return report;
        }

        // A clean cycle with a lost audit trail still counts as failed.
        if let Some(e) = snapshot_err {
            report.state = CycleState::Failed(e);
            return report;
        }

        report.state = CycleState::Done;
        info!(
            "pulled={} validated={} inserted={} skipped={} gaps={} target={} raw={}",
            report.pulled,
            report.validated_rows,
            report.append.inserted,
            report.append.skipped_existing,
            report.append.gaps,
            format_ms(report.target_open_time),
            report
                .snapshot_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
        report
    }

    /// Keep only finalized bars; anything still open never reaches
    /// validation or the store.
    fn filter_closed(&self, fetched: &[Candle], now_ms: i64) -> Result<Vec<Candle>> {
        let closed: Vec<Candle> = fetched
            .iter()
            .filter(|c| c.is_closed(now_ms, self.interval_ms))
            .copied()
            .collect();

        if closed.is_empty() {
            return Err(AppError::DataError(
                "no closed candles in api response window".to_string(),
            ));
        }

        for candle in &closed {
            candle.validate_shape()?;
        }

        Ok(closed)
    }

    /// Hourly feed path: validate the window tail, append the target bar.
    fn run_single(
        &self,
        report: &mut CycleReport,
        closed: &[Candle],
        target_open_time: i64,
    ) -> Result<()> {
        let last = closed[closed.len() - 1];
        if last.open_time != target_open_time {
            return Err(AppError::DataError(format!(
                "last closed bar {} does not equal target bar {}",
                format_ms(last.open_time),
                format_ms(target_open_time)
            )));
        }

        report.state = CycleState::Validating;
        let store_window = self.db.get_candles_before(
            &self.config.symbol,
            &self.config.interval,
            (self.config.n_recent - 1) as usize,
            target_open_time,
        )?;

        match validate_window(
            closed,
            &store_window,
            target_open_time,
            self.interval_ms,
            self.config.tolerance,
        ) {
            Ok(outcome) => report.validated_rows = outcome.validated_rows,
            Err(e) if store_window.is_empty() => {
                // Bootstrap: nothing persisted yet, append the target bar
                // without a history to validate against.
                info!("bootstrap: no store history ({}), appending target bar", e);
            }
            Err(e) => return Err(e),
        }

        report.state = CycleState::Appending;
        report.append = self.engine.append_missing(
            closed,
            AppendMode::Single { target_open_time },
            GapPolicy::Continue,
            self.config.dry_run,
        )?;
        Ok(())
    }

    /// Catch-up path: validate the overlap with the store tail, then append
    /// every missing closed bar after the store maximum.
    fn run_catch_up(&self, report: &mut CycleReport, closed: &[Candle]) -> Result<()> {
        report.state = CycleState::Validating;

        match self.db.coverage(&self.config.symbol, &self.config.interval)? {
            Some((_, store_max, _)) => {
                let overlap: Vec<Candle> = closed
                    .iter()
                    .filter(|c| c.open_time <= store_max)
                    .copied()
                    .collect();
                if overlap.is_empty() {
                    return Err(AppError::DataError(
                        "no overlap between api closed window and store; \
                         increase --n-recent or backfill first"
                            .to_string(),
                    ));
                }

                // Anchor validation at the newest shared bar.
                let overlap_anchor = overlap[overlap.len() - 1].open_time;
                let window = std::cmp::min(
                    overlap.len(),
                    std::cmp::max(self.config.n_recent as usize - 1, 1),
                );
                let api_tail = &overlap[overlap.len() - window..];
                let store_hist = self.db.get_candles_before(
                    &self.config.symbol,
                    &self.config.interval,
                    api_tail.len() - 1,
                    overlap_anchor,
                )?;

                let outcome = validate_window(
                    api_tail,
                    &store_hist,
                    overlap_anchor,
                    self.interval_ms,
                    self.config.tolerance,
                )?;
                report.validated_rows = outcome.validated_rows;
            }
            None => {
                info!("bootstrap: store is empty, appending entire closed window");
            }
        }

        report.state = CycleState::Appending;
        report.append = self.engine.append_missing(
            closed,
            AppendMode::CatchUp,
            GapPolicy::Continue,
            self.config.dry_run,
        )?;
        Ok(())
    }
}
