// Bulk backfill of merged Binance Vision kline CSVs into the store.
use clap::Parser;
use kline_feed::backfill::{BackfillConfig, BulkBackfiller};
use kline_feed::config::{DEFAULT_INTERVAL, DEFAULT_SYMBOL};
use kline_feed::utils::parse_datetime_arg;
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Backfill historical klines from a merged CSV into the append-only store", long_about = None)]
struct Args {
    /// Path to the merged CSV file.
    #[arg(long)]
    csv: PathBuf,

    /// Path to the SQLite database file to backfill into.
    #[arg(long)]
    db_path: PathBuf,

    /// Trading symbol the CSV belongs to.
    #[arg(long, default_value = DEFAULT_SYMBOL)]
    symbol: String,

    /// Kline interval the CSV belongs to.
    #[arg(long, default_value = DEFAULT_INTERVAL)]
    interval: String,

    /// Start timestamp (inclusive), e.g. 2020-01-01 or "2020-01-01 00:00:00".
    #[arg(long)]
    start: Option<String>,

    /// End timestamp (inclusive).
    #[arg(long)]
    end: Option<String>,

    /// Abort on the first period gap instead of continuing.
    #[arg(long, default_value_t = false)]
    stop_on_gap: bool,

    /// Inspect and validate only, do not write to the store.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Verbose logging.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let start = args.start.as_deref().map(parse_datetime_arg).transpose()?;
    let end = args.end.as_deref().map(parse_datetime_arg).transpose()?;

    let config = BackfillConfig {
        csv_path: args.csv,
        db_path: args.db_path,
        symbol: args.symbol.to_uppercase(),
        interval: args.interval,
        start,
        end,
        stop_on_gap: args.stop_on_gap,
        dry_run: args.dry_run,
    };

    info!(
        "starting bulk backfill for {}/{} from {}",
        config.symbol,
        config.interval,
        config.csv_path.display()
    );

    let backfiller = BulkBackfiller::new(config)?;
    match backfiller.run() {
        Ok(report) => {
            info!(
                "done: inserted={} skipped_existing={} gaps={}",
                report.inserted, report.skipped_existing, report.gaps
            );
            Ok(())
        }
        Err(e) => {
            error!("backfill failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let env = env_logger::Env::default()
        .filter_or("LOG_LEVEL", if verbose { "debug" } else { "info" });

    env_logger::init_from_env(env);
}
