//! Estimated financial impact of an alarm.
//!
//! These numbers are a heuristic to rank alarms by how much budget they may
//! put at risk. They are not accounting figures and must never be used for
//! financial reconciliation.

use adpulse_common::types::ImpactRule;

const EFFICIENCY_WEIGHT: f64 = 0.5;
const VOLUME_WEIGHT: f64 = 0.3;
const UNCLASSIFIED_WEIGHT: f64 = 0.2;

/// Estimates the USD impact of a deviation against a daily budget.
///
/// Returns `None` when the budget or the deviation is not usable (non-finite,
/// or a negative budget). A zero budget puts nothing at risk and yields
/// `Some(0.0)`. Any returned value is `>= 0`.
///
/// # Examples
///
/// ```
/// use adpulse_alert::impact::estimate_impact;
/// use adpulse_common::types::ImpactRule;
///
/// assert_eq!(estimate_impact(ImpactRule::CostRising, 1000.0, 40.0), Some(400.0));
/// assert_eq!(estimate_impact(ImpactRule::EfficiencyFalling, 1000.0, -50.0), Some(250.0));
/// assert_eq!(estimate_impact(ImpactRule::EfficiencyFalling, 1000.0, 50.0), Some(0.0));
/// assert_eq!(estimate_impact(ImpactRule::Spend, 0.0, 30.0), Some(0.0));
/// ```
pub fn estimate_impact(rule: ImpactRule, daily_budget: f64, deviation_percent: f64) -> Option<f64> {
    if !daily_budget.is_finite() || daily_budget < 0.0 || !deviation_percent.is_finite() {
        return None;
    }

    let magnitude = deviation_percent.abs();
    let rising = deviation_percent > 0.0;
    let falling = deviation_percent < 0.0;

    let impact = match rule {
        ImpactRule::CostRising | ImpactRule::InvalidTrafficRising if rising => {
            daily_budget * magnitude / 100.0
        }
        ImpactRule::CostRising | ImpactRule::InvalidTrafficRising => 0.0,
        ImpactRule::EfficiencyFalling if falling => {
            daily_budget * magnitude * EFFICIENCY_WEIGHT / 100.0
        }
        ImpactRule::EfficiencyFalling => 0.0,
        ImpactRule::VolumeFalling if falling => daily_budget * magnitude * VOLUME_WEIGHT / 100.0,
        ImpactRule::VolumeFalling => 0.0,
        ImpactRule::Spend => daily_budget * magnitude / 100.0,
        ImpactRule::Unclassified => daily_budget * magnitude * UNCLASSIFIED_WEIGHT / 100.0,
    };

    Some(impact.max(0.0))
}
