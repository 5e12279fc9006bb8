//! Monitor evaluation and alarm lifecycle for campaign metrics.
//!
//! A [`engine::MonitorEngine`] pulls current, expected and historical values
//! from a [`MetricSource`], evaluates each monitor through
//! [`evaluator::MonitorEvaluator`], persists the resulting states and drives
//! the alarm lifecycle (open, auto-resolve, resolve, dismiss) through
//! [`lifecycle::AlarmLifecycle`]. New alarms can optionally be enriched with
//! insights in the background.

pub mod catalog;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod evaluator;
pub mod impact;
pub mod lifecycle;
pub mod locks;
pub mod threshold;
pub mod window;

#[cfg(test)]
mod tests;

use adpulse_common::types::Campaign;
use anyhow::Result;

/// Latest observation of one value of a dimension (e.g. `device = mobile`).
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionObservation {
    pub value_label: String,
    pub current: f64,
    pub expected: f64,
}

/// Values of one metric read together for a single evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub current: f64,
    pub expected: f64,
    /// Samples preceding `current`, oldest first.
    pub history: Vec<f64>,
}

/// Supplies metric values to the engine.
///
/// Values are per campaign and metric id. Every read may fail; the engine
/// treats a failure as "this monitor cannot be evaluated now" and keeps the
/// monitor's previous state.
pub trait MetricSource: Send + Sync {
    /// Most recent observed value.
    fn current_value(&self, campaign: &Campaign, metric_id: &str) -> Result<f64>;

    /// Baseline the current value is compared against.
    fn expected_value(&self, campaign: &Campaign, metric_id: &str) -> Result<f64>;

    /// Up to `count` samples preceding the current one, oldest first.
    fn historical_samples(
        &self,
        campaign: &Campaign,
        metric_id: &str,
        count: usize,
    ) -> Result<Vec<f64>>;

    /// Current value, baseline and up to `history_len` preceding samples,
    /// taken from one consistent view of the metric.
    ///
    /// The default composes the individual reads. Sources whose data can
    /// change between those reads should override it with a single read.
    fn snapshot(
        &self,
        campaign: &Campaign,
        metric_id: &str,
        history_len: usize,
    ) -> Result<MetricSnapshot> {
        let current = self.current_value(campaign, metric_id)?;
        let expected = self.expected_value(campaign, metric_id)?;
        let history = if history_len == 0 {
            Vec::new()
        } else {
            self.historical_samples(campaign, metric_id, history_len)?
        };
        Ok(MetricSnapshot {
            current,
            expected,
            history,
        })
    }

    /// Per-value observations of `dimension`. Sources without dimensional
    /// data return an empty list.
    fn dimension_breakdown(
        &self,
        _campaign: &Campaign,
        _metric_id: &str,
        _dimension: &str,
    ) -> Result<Vec<DimensionObservation>> {
        Ok(Vec::new())
    }
}
