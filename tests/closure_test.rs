#[cfg(test)]
mod tests {
    use kline_feed::error::AppError;
    use kline_feed::models::{Candle, Kline};
    use kline_feed::utils::{align_to_interval, format_ms, interval_to_milliseconds, parse_datetime_arg};
    use serde_json::json;

    const HOUR: i64 = 3_600_000;
    // Arbitrary hour-aligned period start
    const BASE: i64 = 500_000 * HOUR;

    fn candle(open_time: i64) -> Candle {
        Candle {
            open_time,
            open: 100.0,
            high: 102.0,
            low: 98.0,
            close: 101.0,
            volume: 10.0,
            close_time: open_time + HOUR - 1,
        }
    }

    #[test]
    fn test_is_closed_at_exact_boundary() {
        let c = candle(BASE);
        // The bar closes at BASE + 1h - 1ms; it counts as closed the moment
        // the next period starts.
        assert!(c.is_closed(BASE + HOUR, HOUR), "bar must be closed exactly at the boundary");
    }

    #[test]
    fn test_is_closed_one_ms_before_boundary() {
        let c = candle(BASE);
        assert!(!c.is_closed(BASE + HOUR - 1, HOUR), "bar must still be open 1ms before the boundary");
    }

    #[test]
    fn test_is_closed_one_ms_after_boundary() {
        let c = candle(BASE);
        assert!(c.is_closed(BASE + HOUR + 1, HOUR), "bar must be closed 1ms after the boundary");
    }

    #[test]
    fn test_is_closed_mid_period() {
        let current = candle(BASE + HOUR);
        let previous = candle(BASE);
        let now = BASE + HOUR + 30 * 60 * 1000;

        assert!(!current.is_closed(now, HOUR), "in-progress bar must not be closed");
        assert!(previous.is_closed(now, HOUR), "previous bar must be closed mid-period");
    }

    #[test]
    fn test_validate_shape_accepts_well_formed() {
        assert!(candle(BASE).validate_shape().is_ok());
    }

    #[test]
    fn test_validate_shape_rejects_high_below_close() {
        let mut c = candle(BASE);
        c.high = c.close - 1.0;
        assert!(matches!(c.validate_shape(), Err(AppError::DataError(_))));
    }

    #[test]
    fn test_validate_shape_rejects_non_finite() {
        let mut c = candle(BASE);
        c.volume = f64::NAN;
        assert!(matches!(c.validate_shape(), Err(AppError::DataError(_))));
    }

    #[test]
    fn test_validate_shape_rejects_inverted_times() {
        let mut c = candle(BASE);
        c.close_time = c.open_time;
        assert!(matches!(c.validate_shape(), Err(AppError::DataError(_))));
    }

    #[test]
    fn test_from_raw_kline_maps_standard_row() {
        let raw = vec![
            json!(BASE),
            json!("42000.10"),
            json!("42100.00"),
            json!("41900.50"),
            json!("42050.25"),
            json!("123.456"),
            json!(BASE + HOUR - 1),
            json!("5184000.0"),
            json!(4242),
            json!("60.0"),
            json!("2520000.0"),
            json!("0"),
        ];

        let kline = Kline::from_raw_kline(&raw).expect("standard row must map");
        assert_eq!(kline.open_time, BASE);
        assert_eq!(kline.close_time, BASE + HOUR - 1);
        assert_eq!(kline.open, "42000.10");

        let candle = Candle::from_kline(&kline).expect("numeric fields must parse");
        assert_eq!(candle.close, 42050.25);
        assert_eq!(candle.volume, 123.456);
    }

    #[test]
    fn test_from_raw_kline_rejects_short_row() {
        let raw = vec![json!(BASE), json!("1.0"), json!("2.0")];
        assert!(Kline::from_raw_kline(&raw).is_none(), "short row must not map");
    }

    #[test]
    fn test_from_kline_reports_unparseable_price() {
        let kline = Kline {
            open_time: BASE,
            open: "not-a-number".to_string(),
            high: "2.0".to_string(),
            low: "1.0".to_string(),
            close: "1.5".to_string(),
            volume: "3.0".to_string(),
            close_time: BASE + HOUR - 1,
        };
        assert!(matches!(
            Candle::from_kline(&kline),
            Err(AppError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_interval_to_milliseconds() {
        assert_eq!(interval_to_milliseconds("1m"), 60_000);
        assert_eq!(interval_to_milliseconds("5m"), 300_000);
        assert_eq!(interval_to_milliseconds("1h"), HOUR);
        assert_eq!(interval_to_milliseconds("4h"), 4 * HOUR);
        assert_eq!(interval_to_milliseconds("1d"), 24 * HOUR);
    }

    #[test]
    fn test_align_to_interval() {
        assert_eq!(align_to_interval(BASE, HOUR), BASE);
        assert_eq!(align_to_interval(BASE + 1, HOUR), BASE);
        assert_eq!(align_to_interval(BASE + HOUR - 1, HOUR), BASE);
        assert_eq!(align_to_interval(BASE + HOUR, HOUR), BASE + HOUR);
    }

    #[test]
    fn test_parse_datetime_arg() {
        let midnight = parse_datetime_arg("2024-01-05").unwrap();
        let explicit = parse_datetime_arg("2024-01-05 00:00:00").unwrap();
        assert_eq!(midnight, explicit);

        let one_am = parse_datetime_arg("2024-01-05 01:00:00").unwrap();
        assert_eq!(one_am - midnight, HOUR);

        assert!(parse_datetime_arg("05/01/2024").is_err(), "unknown format must be rejected");
    }

    #[test]
    fn test_format_ms_renders_utc() {
        // 2024-01-05 13:00:00 UTC
        assert_eq!(format_ms(1_704_459_600_000), "2024-01-05 13:00:00");
    }
}
