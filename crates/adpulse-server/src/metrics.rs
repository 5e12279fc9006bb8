use adpulse_alert::{DimensionObservation, MetricSnapshot, MetricSource};
use adpulse_common::types::{Campaign, MetricSample};
use adpulse_storage::engine::SqliteRecordStore;
use anyhow::Result;
use std::sync::Arc;

/// [`MetricSource`] over the samples ingested into `metric_samples`.
///
/// The newest aggregate sample of a metric is its current observation and
/// carries the expected value; older aggregate samples form the history.
pub struct StoredMetricSource {
    store: Arc<SqliteRecordStore>,
}

impl StoredMetricSource {
    pub fn new(store: Arc<SqliteRecordStore>) -> Self {
        Self { store }
    }

    fn latest(&self, campaign: &Campaign, metric_id: &str) -> Result<MetricSample> {
        self.store
            .recent_samples(&campaign.id, metric_id, 1)?
            .pop()
            .ok_or_else(|| {
                anyhow::anyhow!("no samples for metric {metric_id} of campaign {}", campaign.id)
            })
    }
}

impl MetricSource for StoredMetricSource {
    fn current_value(&self, campaign: &Campaign, metric_id: &str) -> Result<f64> {
        Ok(self.latest(campaign, metric_id)?.value)
    }

    fn expected_value(&self, campaign: &Campaign, metric_id: &str) -> Result<f64> {
        Ok(self.latest(campaign, metric_id)?.expected)
    }

    fn historical_samples(
        &self,
        campaign: &Campaign,
        metric_id: &str,
        count: usize,
    ) -> Result<Vec<f64>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut samples = self.store.recent_samples(&campaign.id, metric_id, count + 1)?;
        // newest sample is the current value
        samples.pop();
        Ok(samples.into_iter().map(|s| s.value).collect())
    }

    fn snapshot(
        &self,
        campaign: &Campaign,
        metric_id: &str,
        history_len: usize,
    ) -> Result<MetricSnapshot> {
        // one query so an ingest cannot land between the current sample and
        // its history
        let mut samples = self
            .store
            .recent_samples(&campaign.id, metric_id, history_len + 1)?;
        let latest = samples.pop().ok_or_else(|| {
            anyhow::anyhow!("no samples for metric {metric_id} of campaign {}", campaign.id)
        })?;
        Ok(MetricSnapshot {
            current: latest.value,
            expected: latest.expected,
            history: samples.into_iter().map(|s| s.value).collect(),
        })
    }

    fn dimension_breakdown(
        &self,
        campaign: &Campaign,
        metric_id: &str,
        dimension: &str,
    ) -> Result<Vec<DimensionObservation>> {
        let samples = self
            .store
            .latest_dimension_samples(&campaign.id, metric_id, dimension)?;
        Ok(samples
            .into_iter()
            .map(|s| DimensionObservation {
                value_label: s.dimension_value.unwrap_or_default(),
                current: s.value,
                expected: s.expected,
            })
            .collect())
    }
}
