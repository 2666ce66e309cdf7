use crate::error::{AppError, Result};
use crate::utils::align_to_interval;
use serde::{Deserialize, Serialize};

/// Raw kline row as returned by the Binance klines endpoint.
///
/// Price and volume fields stay in string form until conversion so that a
/// bad payload is reported with the original text instead of a coerced zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    /// Kline open time (ms)
    pub open_time: i64,
    /// Open price
    pub open: String,
    /// High price
    pub high: String,
    /// Low price
    pub low: String,
    /// Close price
    pub close: String,
    /// Volume
    pub volume: String,
    /// Kline close time (ms)
    pub close_time: i64,
}

impl Kline {
    /// Convert a raw kline array from the Binance API to a Kline struct.
    ///
    /// Rows carry twelve entries; only the first seven matter here, the
    /// trailing quote-volume and trade-count fields are ignored.
    pub fn from_raw_kline(raw: &[serde_json::Value]) -> Option<Self> {
        if raw.len() < 7 {
            return None;
        }

        // Helper function to convert Value to String
        let to_string = |v: &serde_json::Value| -> Option<String> {
            if v.is_string() {
                Some(v.as_str()?.to_string())
            } else if v.is_number() {
                Some(v.to_string())
            } else {
                None
            }
        };

        Some(Kline {
            open_time: raw[0].as_i64()?,
            open: to_string(&raw[1])?,
            high: to_string(&raw[2])?,
            low: to_string(&raw[3])?,
            close: to_string(&raw[4])?,
            volume: to_string(&raw[5])?,
            close_time: raw[6].as_i64()?,
        })
    }
}

/// A typed, immutable OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Period start (UTC ms)
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Period end instant (UTC ms)
    pub close_time: i64,
}

impl Candle {
    /// Convert a raw kline into a typed candle.
    pub fn from_kline(kline: &Kline) -> Result<Self> {
        let parse = |name: &str, value: &str| -> Result<f64> {
            value.parse::<f64>().map_err(|_| {
                AppError::MalformedResponse(format!(
                    "unparseable {} value '{}' at open_time {}",
                    name, value, kline.open_time
                ))
            })
        };

        Ok(Candle {
            open_time: kline.open_time,
            open: parse("open", &kline.open)?,
            high: parse("high", &kline.high)?,
            low: parse("low", &kline.low)?,
            close: parse("close", &kline.close)?,
            volume: parse("volume", &kline.volume)?,
            close_time: kline.close_time,
        })
    }

    /// Whether this bar is finalized relative to the supplied wall clock.
    ///
    /// A bar is closed once its close_time sits at least one millisecond
    /// before the top of the current period. `now_ms` is supplied by the
    /// caller, never read from the system clock.
    pub fn is_closed(&self, now_ms: i64, interval_ms: i64) -> bool {
        self.close_time <= align_to_interval(now_ms, interval_ms) - 1
    }

    /// Check well-formedness of the bar.
    ///
    /// Violations are reported, never coerced; a candle that fails here must
    /// not reach the store.
    pub fn validate_shape(&self) -> Result<()> {
        if self.close_time <= self.open_time {
            return Err(AppError::DataError(format!(
                "close_time {} not after open_time {}",
                self.close_time, self.open_time
            )));
        }

        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(AppError::DataError(format!(
                    "non-finite {} at open_time {}",
                    name, self.open_time
                )));
            }
        }

        if self.low > self.open.min(self.close) || self.high < self.open.max(self.close) {
            return Err(AppError::DataError(format!(
                "OHLC ordering violated at open_time {}: o={} h={} l={} c={}",
                self.open_time, self.open, self.high, self.low, self.close
            )));
        }

        Ok(())
    }

    /// Column order of the raw snapshot artifact.
    pub fn snapshot_headers() -> Vec<String> {
        vec![
            "timestamp".to_string(),
            "open".to_string(),
            "high".to_string(),
            "low".to_string(),
            "close".to_string(),
            "volume".to_string(),
        ]
    }

    /// Convert to a snapshot CSV record with a UTC-naive timestamp.
    pub fn to_snapshot_record(&self) -> Vec<String> {
        vec![
            crate::utils::format_ms(self.open_time),
            self.open.to_string(),
            self.high.to_string(),
            self.low.to_string(),
            self.close.to_string(),
            self.volume.to_string(),
        ]
    }
}
