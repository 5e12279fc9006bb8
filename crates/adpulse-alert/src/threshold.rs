//! Threshold and severity rules. Pure functions, no state.

use adpulse_common::types::{Sensitivity, Severity};

/// Signed deviation of `current` from `expected`, in percent.
///
/// Returns `0.0` when `expected` is zero: without a baseline there is no
/// measurable deviation.
///
/// # Examples
///
/// ```
/// use adpulse_alert::threshold::deviation;
///
/// assert_eq!(deviation(42.0, 30.0), 40.0);
/// assert_eq!(deviation(1.25, 2.5), -50.0);
/// assert_eq!(deviation(10.0, 0.0), 0.0);
/// ```
pub fn deviation(current: f64, expected: f64) -> f64 {
    if expected == 0.0 {
        return 0.0;
    }
    (current - expected) / expected * 100.0
}

/// Fractional tolerance of a sensitivity setting.
pub fn tolerance_for(sensitivity: Sensitivity) -> f64 {
    sensitivity.tolerance()
}

/// True when the absolute deviation strictly exceeds the tolerance.
pub fn is_breaching(current: f64, expected: f64, sensitivity: Sensitivity) -> bool {
    deviation(current, expected).abs() / 100.0 > tolerance_for(sensitivity)
}

/// Absolute deviation normalized by the tolerance. Scores above `1.0` breach.
pub fn anomaly_score(deviation_percent: f64, sensitivity: Sensitivity) -> f64 {
    deviation_percent.abs() / 100.0 / tolerance_for(sensitivity)
}

/// Severity band of a deviation. Lower bounds are inclusive.
///
/// | abs(deviation) | severity |
/// |----------------|----------|
/// | >= 60          | Critical |
/// | >= 40          | High     |
/// | >= 25          | Medium   |
/// | otherwise      | Low      |
pub fn severity_for(deviation_percent: f64) -> Severity {
    let magnitude = deviation_percent.abs();
    if magnitude >= 60.0 {
        Severity::Critical
    } else if magnitude >= 40.0 {
        Severity::High
    } else if magnitude >= 25.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
