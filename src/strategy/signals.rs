use crate::error::{BotError, Result};
use crate::models::Bar;

/// Fail with `InsufficientData` when the window is shorter than the lookback
pub fn ensure_lookback(bars: &[Bar], required: usize) -> Result<()> {
    if bars.len() < required {
        return Err(BotError::InsufficientData {
            have: bars.len(),
            need: required,
        });
    }
    Ok(())
}

/// Extract closes from bars
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// `a` moved from at-or-below `b` to strictly above it
pub fn crossed_above(prev_a: f64, prev_b: f64, a: f64, b: f64) -> bool {
    a > b && prev_a <= prev_b
}

/// `a` moved from at-or-above `b` to strictly below it
pub fn crossed_below(prev_a: f64, prev_b: f64, a: f64, b: f64) -> bool {
    a < b && prev_a >= prev_b
}

/// Check that bars are ordered and spaced by the expected interval
///
/// # Tolerance
/// Allows up to 1.5x the expected interval between consecutive bars.
pub fn validate_bar_cadence(bars: &[Bar], expected_interval_secs: u64) -> anyhow::Result<()> {
    if bars.len() < 2 {
        return Ok(());
    }

    let max_gap_secs = expected_interval_secs + (expected_interval_secs / 2);

    for window in bars.windows(2) {
        let time_diff = (window[1].open_time - window[0].open_time).num_seconds();

        if time_diff <= 0 {
            anyhow::bail!(
                "Bars are not strictly ordered: {} followed by {}",
                window[0].open_time,
                window[1].open_time
            );
        }

        if time_diff as u64 > max_gap_secs {
            anyhow::bail!(
                "Data gap detected: {}s between bars (expected ~{}s). Gap from {} to {}",
                time_diff,
                expected_interval_secs,
                window[0].open_time.format("%H:%M:%S"),
                window[1].open_time.format("%H:%M:%S")
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_at(offsets_secs: &[i64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        offsets_secs
            .iter()
            .map(|&s| Bar {
                open_time: start + Duration::seconds(s),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_ensure_lookback() {
        let bars = bars_at(&[0, 60, 120]);
        assert!(ensure_lookback(&bars, 3).is_ok());

        let err = ensure_lookback(&bars, 4).unwrap_err();
        assert!(matches!(err, BotError::InsufficientData { have: 3, need: 4 }));
    }

    #[test]
    fn test_crossings_are_edge_triggered() {
        assert!(crossed_above(1.0, 1.5, 2.0, 1.5));
        assert!(crossed_above(1.5, 1.5, 2.0, 1.5));
        // already above: level, not edge
        assert!(!crossed_above(2.0, 1.5, 2.5, 1.5));

        assert!(crossed_below(2.0, 1.5, 1.0, 1.5));
        assert!(!crossed_below(1.0, 1.5, 0.5, 1.5));
    }

    #[test]
    fn test_crossings_with_nan_are_false() {
        assert!(!crossed_above(f64::NAN, 1.0, 2.0, 1.0));
        assert!(!crossed_below(2.0, 1.0, f64::NAN, 1.0));
    }

    #[test]
    fn test_cadence_ok() {
        let bars = bars_at(&[0, 60, 120, 180]);
        assert!(validate_bar_cadence(&bars, 60).is_ok());
    }

    #[test]
    fn test_cadence_gap_detected() {
        let bars = bars_at(&[0, 60, 300]);
        let err = validate_bar_cadence(&bars, 60).unwrap_err();
        assert!(err.to_string().contains("Data gap"));
    }

    #[test]
    fn test_cadence_duplicate_timestamp_rejected() {
        let bars = bars_at(&[0, 60, 60]);
        assert!(validate_bar_cadence(&bars, 60).is_err());
    }
}
