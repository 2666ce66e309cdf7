#[cfg(test)]
mod tests {
    use kline_feed::backfill::{clean_transform, read_merged_csv, BackfillConfig, BulkBackfiller};
    use kline_feed::error::AppError;
    use kline_feed::models::Candle;
    use std::fs;
    use std::path::PathBuf;

    const HOUR: i64 = 3_600_000;
    const BASE: i64 = 500_000 * HOUR;
    const SYMBOL: &str = "BTCUSDT";
    const INTERVAL: &str = "1h";

    const BINANCE_HEADER: &str = "open_time,open,high,low,close,volume,close_time,quote_asset_volume,number_of_trades,taker_buy_base_asset_volume,taker_buy_quote_asset_volume,ignore";

    fn kline_line(open_time: i64, close: f64) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},0",
            open_time,
            close - 1.0,
            close + 2.0,
            close - 2.0,
            close,
            10.0,
            open_time + HOUR - 1,
            close * 10.0,
            100,
            5.0,
            close * 5.0,
        )
    }

    fn write_csv(name: &str, header: bool, open_times: &[i64]) -> PathBuf {
        let path = PathBuf::from(format!("./target/{}.csv", name));
        let mut lines = Vec::new();
        if header {
            lines.push(BINANCE_HEADER.to_string());
        }
        for (i, t) in open_times.iter().enumerate() {
            lines.push(kline_line(*t, 100.0 + i as f64));
        }
        fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    fn backfill_config(name: &str, csv_path: PathBuf, stop_on_gap: bool, dry_run: bool) -> BackfillConfig {
        let db_path = PathBuf::from(format!("./target/{}.db", name));
        if db_path.exists() {
            fs::remove_file(&db_path).unwrap();
        }
        BackfillConfig {
            csv_path,
            db_path,
            symbol: SYMBOL.to_string(),
            interval: INTERVAL.to_string(),
            start: None,
            end: None,
            stop_on_gap,
            dry_run,
        }
    }

    fn candle(open_time: i64, close: f64) -> Candle {
        Candle {
            open_time,
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 10.0,
            close_time: open_time + HOUR - 1,
        }
    }

    #[test]
    fn test_backfill_inserts_contiguous_csv() {
        let name = "test_backfill_contiguous";
        let times: Vec<i64> = (0..6).map(|i| BASE + i * HOUR).collect();
        let csv_path = write_csv(name, true, &times);

        let backfiller = BulkBackfiller::new(backfill_config(name, csv_path, true, false)).unwrap();
        let report = backfiller.run().unwrap();

        assert_eq!(report.inserted, 6);
        assert_eq!(report.gaps, 0);

        let (min, max, count) = backfiller.db().coverage(SYMBOL, INTERVAL).unwrap().unwrap();
        assert_eq!(min, BASE);
        assert_eq!(max, BASE + 5 * HOUR);
        assert_eq!(count, 6);
    }

    #[test]
    fn test_backfill_detects_headerless_csv() {
        let name = "test_backfill_headerless";
        let times: Vec<i64> = (0..3).map(|i| BASE + i * HOUR).collect();
        let csv_path = write_csv(name, false, &times);

        let backfiller = BulkBackfiller::new(backfill_config(name, csv_path, true, false)).unwrap();
        let report = backfiller.run().unwrap();

        assert_eq!(report.inserted, 3, "headerless input must parse every row");
    }

    #[test]
    fn test_backfill_is_idempotent() {
        let name = "test_backfill_idempotent";
        let times: Vec<i64> = (0..4).map(|i| BASE + i * HOUR).collect();
        let csv_path = write_csv(name, true, &times);

        let config = backfill_config(name, csv_path, true, false);
        let backfiller = BulkBackfiller::new(config.clone()).unwrap();
        assert_eq!(backfiller.run().unwrap().inserted, 4);

        // Second run against the same store
        let rerun = BulkBackfiller::new(config).unwrap();
        let report = rerun.run().unwrap();
        assert_eq!(report.inserted, 0, "rerunning the same CSV must insert nothing");
    }

    #[test]
    fn test_stop_on_gap_aborts_before_the_gap_commits() {
        let name = "test_backfill_stop_on_gap";
        // Period BASE+2h missing
        let times = vec![BASE, BASE + HOUR, BASE + 3 * HOUR, BASE + 4 * HOUR];
        let csv_path = write_csv(name, true, &times);

        let backfiller = BulkBackfiller::new(backfill_config(name, csv_path, true, false)).unwrap();
        let err = backfiller.run().expect_err("gap must be fatal with stop_on_gap");
        assert!(matches!(err, AppError::GapDetected { .. }));

        let (_, max, count) = backfiller.db().coverage(SYMBOL, INTERVAL).unwrap().unwrap();
        assert_eq!(count, 2, "only rows before the gap may be committed");
        assert!(max < BASE + 2 * HOUR);
    }

    #[test]
    fn test_soft_gap_policy_continues_past_the_gap() {
        let name = "test_backfill_soft_gap";
        let times = vec![BASE, BASE + HOUR, BASE + 3 * HOUR, BASE + 4 * HOUR];
        let csv_path = write_csv(name, true, &times);

        let backfiller = BulkBackfiller::new(backfill_config(name, csv_path, false, false)).unwrap();
        let report = backfiller.run().unwrap();

        assert_eq!(report.inserted, 4, "soft policy must insert both segments");
        assert_eq!(report.gaps, 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let name = "test_backfill_dry_run";
        let times: Vec<i64> = (0..5).map(|i| BASE + i * HOUR).collect();
        let csv_path = write_csv(name, true, &times);

        let backfiller = BulkBackfiller::new(backfill_config(name, csv_path, false, true)).unwrap();
        let report = backfiller.run().unwrap();

        assert_eq!(report.inserted, 5, "dry run must report the would-be inserts");
        assert!(
            backfiller.db().coverage(SYMBOL, INTERVAL).unwrap().is_none(),
            "dry run must leave the store empty"
        );
    }

    #[test]
    fn test_clean_transform_sorts_and_dedupes() {
        // Out of order, with BASE+1h duplicated
        let rows = vec![
            candle(BASE + 2 * HOUR, 102.0),
            candle(BASE, 100.0),
            candle(BASE + HOUR, 101.0),
            candle(BASE + HOUR, 999.0),
        ];

        let (cleaned, stats) = clean_transform(rows, None, None, HOUR);

        let times: Vec<i64> = cleaned.iter().map(|c| c.open_time).collect();
        assert_eq!(times, vec![BASE, BASE + HOUR, BASE + 2 * HOUR]);
        assert_eq!(stats.dropped_duplicates, 1);
        assert_eq!(stats.gaps, 0);
        assert_eq!(
            cleaned[1].close, 101.0,
            "the first row for a duplicated open_time must win"
        );
    }

    #[test]
    fn test_clean_transform_range_filter() {
        let rows: Vec<Candle> = (0..6).map(|i| candle(BASE + i * HOUR, 100.0)).collect();

        let (cleaned, stats) =
            clean_transform(rows, Some(BASE + HOUR), Some(BASE + 3 * HOUR), HOUR);

        let times: Vec<i64> = cleaned.iter().map(|c| c.open_time).collect();
        assert_eq!(times, vec![BASE + HOUR, BASE + 2 * HOUR, BASE + 3 * HOUR]);
        assert_eq!(stats.dropped_out_of_range, 3);
    }

    #[test]
    fn test_unparseable_rows_are_dropped_and_counted() {
        let name = "test_backfill_unparseable";
        let path = PathBuf::from(format!("./target/{}.csv", name));
        let lines = vec![
            BINANCE_HEADER.to_string(),
            kline_line(BASE, 100.0),
            "garbage,not,a,kline,row,at,all,x,y,z,w,v".to_string(),
            kline_line(BASE + HOUR, 101.0),
        ];
        fs::write(&path, lines.join("\n")).unwrap();

        let (candles, dropped) = read_merged_csv(&path, HOUR).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(dropped, 1, "the garbage row must be counted, not coerced");
    }
}
