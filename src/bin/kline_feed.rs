// Periodic closed-candle feed cycle, meant to run from an hourly scheduler.
use clap::Parser;
use kline_feed::api::BinanceApi;
use kline_feed::config::{FeedConfig, DEFAULT_DATASET_SLUG, DEFAULT_INTERVAL, DEFAULT_SYMBOL};
use kline_feed::controller::{CycleState, FeedController};
use kline_feed::db::Database;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Binance perp closed-candle feed into an append-only SQLite store", long_about = None)]
struct Args {
    /// Trading symbol to feed.
    #[arg(long, default_value = DEFAULT_SYMBOL)]
    symbol: String,

    /// Kline interval to feed.
    #[arg(long, default_value = DEFAULT_INTERVAL)]
    interval: String,

    /// Number of most recent bars to pull for the overlap window.
    #[arg(long, default_value_t = 6)]
    n_recent: u32,

    /// Path to the SQLite database file.
    #[arg(long)]
    db_path: PathBuf,

    /// Directory root for raw pull artifacts.
    #[arg(long)]
    snapshot_dir: PathBuf,

    /// Dataset slug directory for artifacts.
    #[arg(long, default_value = DEFAULT_DATASET_SLUG)]
    dataset: String,

    /// Absolute tolerance for overlap validation.
    #[arg(long)]
    tolerance: Option<f64>,

    /// Compute and report the append without writing to the store.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Append all missing closed bars in the window after validating overlap.
    #[arg(long, default_value_t = false)]
    catch_up: bool,

    /// Verbose logging.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = FeedConfig::new(
        args.symbol,
        args.interval,
        args.n_recent,
        args.db_path,
        args.snapshot_dir,
        args.dataset,
        args.tolerance,
        args.dry_run,
        args.catch_up,
        args.debug,
    )?;

    info!(
        "starting feed cycle for {}/{} (n_recent={}, catch_up={}, dry_run={})",
        config.symbol, config.interval, config.n_recent, config.catch_up, config.dry_run
    );

    let db = Arc::new(Database::new(&config.db_path)?);
    let api = BinanceApi::new()?;
    let controller = FeedController::new(api, db, config);

    let now_ms = chrono::Utc::now().timestamp_millis();
    let report = controller.run_cycle(now_ms).await;

    match report.state {
        CycleState::Done => Ok(()),
        CycleState::Failed(e) => {
            error!("feed cycle failed: {}", e);
            std::process::exit(1);
        }
        other => {
            error!("feed cycle ended in unexpected state: {:?}", other);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let env = env_logger::Env::default()
        .filter_or("LOG_LEVEL", if verbose { "debug" } else { "info" });

    env_logger::init_from_env(env);
}
