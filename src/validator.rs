use crate::error::{AppError, Result};
use crate::models::Candle;
use crate::utils::format_ms;
use log::debug;

/// Default absolute tolerance for field comparison.
///
/// Upstream float serialization can drift by a few ULPs between pulls;
/// strict equality would reject otherwise identical history.
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Outcome of a successful overlap validation.
#[derive(Debug, Clone, Copy)]
pub struct ValidationOutcome {
    /// Number of shared rows that were compared field by field.
    pub validated_rows: usize,
}

/// Cross-check a freshly fetched window against already persisted history.
///
/// `api_window` must end at `target_open_time` and be spaced exactly one
/// interval apart. Every row before the target is compared against the tail
/// of `store_window`: open_time sequences must match exactly and all five
/// numeric fields must agree within `tolerance`. The first disagreement is
/// returned as an `OverlapMismatch` naming the open_time and field.
///
/// This runs before every append; a failure must block the append.
pub fn validate_window(
    api_window: &[Candle],
    store_window: &[Candle],
    target_open_time: i64,
    interval_ms: i64,
    tolerance: f64,
) -> Result<ValidationOutcome> {
    let last = api_window
        .last()
        .ok_or_else(|| AppError::ValidationError("api window is empty".to_string()))?;

    if last.open_time != target_open_time {
        return Err(AppError::ValidationError(format!(
            "last api row {} is not the target bar {}",
            format_ms(last.open_time),
            format_ms(target_open_time)
        )));
    }

    for pair in api_window.windows(2) {
        if pair[1].open_time - pair[0].open_time != interval_ms {
            return Err(AppError::ValidationError(format!(
                "api window not contiguous between {} and {}",
                format_ms(pair[0].open_time),
                format_ms(pair[1].open_time)
            )));
        }
    }

    // The target bar itself is the row being appended; everything before it
    // forms the validation set.
    let api_hist = &api_window[..api_window.len() - 1];
    if api_hist.is_empty() {
        debug!("no historical window to validate before {}", format_ms(target_open_time));
        return Ok(ValidationOutcome { validated_rows: 0 });
    }

    if store_window.len() < api_hist.len() {
        return Err(AppError::ValidationError(format!(
            "store has {} rows, fewer than the {} in the validation window",
            store_window.len(),
            api_hist.len()
        )));
    }

    let store_tail = &store_window[store_window.len() - api_hist.len()..];

    for (stored, fetched) in store_tail.iter().zip(api_hist.iter()) {
        if stored.open_time != fetched.open_time {
            return Err(AppError::OverlapMismatch {
                open_time: fetched.open_time,
                field: "open_time",
                store_value: stored.open_time.to_string(),
                api_value: fetched.open_time.to_string(),
            });
        }

        let fields: [(&'static str, f64, f64); 5] = [
            ("open", stored.open, fetched.open),
            ("high", stored.high, fetched.high),
            ("low", stored.low, fetched.low),
            ("close", stored.close, fetched.close),
            ("volume", stored.volume, fetched.volume),
        ];

        for (field, store_value, api_value) in fields {
            if !store_value.is_finite() || !api_value.is_finite() {
                return Err(AppError::ValidationError(format!(
                    "non-finite {} at open_time {}",
                    field, fetched.open_time
                )));
            }
            if (store_value - api_value).abs() > tolerance {
                return Err(AppError::OverlapMismatch {
                    open_time: fetched.open_time,
                    field,
                    store_value: store_value.to_string(),
                    api_value: api_value.to_string(),
                });
            }
        }
    }

    debug!(
        "overlap validated: {} rows before {}",
        api_hist.len(),
        format_ms(target_open_time)
    );
    Ok(ValidationOutcome {
        validated_rows: api_hist.len(),
    })
}
