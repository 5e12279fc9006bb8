use crate::error::{EvaluationError, Result};
use crate::threshold::{anomaly_score, deviation, is_breaching};
use crate::window::SampleWindow;
use crate::MetricSource;
use adpulse_common::types::{
    Campaign, DimensionResult, Monitor, MonitorKind, MonitorState, MonitorStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a monitor's status moved relative to its previous state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Status unchanged (or a first evaluation that lands in OK).
    Steady,
    /// OK to InAlarm, or a first evaluation that lands in InAlarm.
    Triggered,
    /// InAlarm to OK.
    Recovered,
}

impl Transition {
    pub fn is_triggered(&self) -> bool {
        matches!(self, Transition::Triggered)
    }
}

/// Outcome of evaluating one monitor. Nothing is persisted yet.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub state: MonitorState,
    pub transition: Transition,
}

/// Evaluates monitors against values read from a [`MetricSource`].
pub struct MonitorEvaluator<'a> {
    source: &'a dyn MetricSource,
}

impl<'a> MonitorEvaluator<'a> {
    pub fn new(source: &'a dyn MetricSource) -> Self {
        Self { source }
    }

    /// Computes the next state of `monitor`.
    ///
    /// `prior` is the monitor's stored state, if any. `entered_state_at` is
    /// carried over from it while the status is unchanged.
    pub fn evaluate(
        &self,
        monitor: &Monitor,
        campaign: &Campaign,
        prior: Option<&MonitorState>,
        now: DateTime<Utc>,
    ) -> Result<Evaluation> {
        validate_kind(monitor)?;

        let metric_id = monitor.metric.id.as_str();
        let sensitivity = monitor.sensitivity;
        let history_len = match &monitor.kind {
            MonitorKind::Composite { window, .. } => (*window as usize).saturating_sub(1),
            _ => 0,
        };
        let snapshot = self
            .source
            .snapshot(campaign, metric_id, history_len)
            .map_err(|e| source_error(monitor, e))?;
        let (current, expected) = (snapshot.current, snapshot.expected);

        let deviation_percent = deviation(current, expected);
        let breaching = is_breaching(current, expected, sensitivity);

        let (in_alarm, breach_count, dimensions) = match &monitor.kind {
            MonitorKind::Simple => (breaching, None, Vec::new()),
            MonitorKind::Composite {
                required_breaches,
                window,
            } => {
                let samples =
                    SampleWindow::from_history(&snapshot.history, current, *window as usize);
                let count = samples.breach_count(expected, sensitivity);
                (count >= *required_breaches, Some(count), Vec::new())
            }
            MonitorKind::Granular { dimensions } => (
                breaching,
                None,
                self.evaluate_dimensions(monitor, campaign, dimensions),
            ),
        };

        let status = if in_alarm {
            MonitorStatus::InAlarm
        } else {
            MonitorStatus::Ok
        };

        let entered_state_at = match prior {
            Some(p) if p.status == status => p.entered_state_at,
            _ => now,
        };

        let transition = match (prior.map(|p| p.status), status) {
            (Some(MonitorStatus::InAlarm), MonitorStatus::Ok) => Transition::Recovered,
            (Some(MonitorStatus::Ok) | None, MonitorStatus::InAlarm) => Transition::Triggered,
            _ => Transition::Steady,
        };

        Ok(Evaluation {
            state: MonitorState {
                monitor_id: monitor.id.clone(),
                campaign_id: monitor.campaign_id.clone(),
                status,
                current_value: current,
                expected_value: expected,
                deviation_percent,
                anomaly_score: anomaly_score(deviation_percent, sensitivity),
                entered_state_at,
                evaluated_at: now,
                breach_count,
                dimensions,
            },
            transition,
        })
    }

    /// Per-value sub-results, dimensions in configured order. A dimension
    /// whose breakdown cannot be read is skipped; the aggregate verdict does
    /// not depend on it.
    fn evaluate_dimensions(
        &self,
        monitor: &Monitor,
        campaign: &Campaign,
        dimensions: &[String],
    ) -> Vec<DimensionResult> {
        let mut results = Vec::new();
        for dimension in dimensions {
            let breakdown = self
                .source
                .dimension_breakdown(campaign, &monitor.metric.id, dimension);
            let observations = match breakdown {
                Ok(obs) => obs,
                Err(e) => {
                    tracing::warn!(
                        monitor_id = %monitor.id,
                        dimension = %dimension,
                        error = %e,
                        "Dimension breakdown unavailable, skipping"
                    );
                    continue;
                }
            };

            results.extend(observations.into_iter().map(|obs| DimensionResult {
                dimension: dimension.clone(),
                value_label: obs.value_label,
                current_value: obs.current,
                expected_value: obs.expected,
                deviation_percent: deviation(obs.current, obs.expected),
                breached: is_breaching(obs.current, obs.expected, monitor.sensitivity),
            }));
        }
        results
    }
}

fn source_error(monitor: &Monitor, source: anyhow::Error) -> EvaluationError {
    EvaluationError::MetricSource {
        monitor_id: monitor.id.clone(),
        metric_id: monitor.metric.id.clone(),
        source,
    }
}

/// Rejects kinds whose parameters cannot produce a verdict.
pub fn validate_kind(monitor: &Monitor) -> Result<()> {
    let reason = match &monitor.kind {
        MonitorKind::Simple => None,
        MonitorKind::Composite { window: 0, .. } => {
            Some("composite window must be at least 1".to_string())
        }
        MonitorKind::Composite {
            required_breaches: 0,
            ..
        } => Some("composite required_breaches must be at least 1".to_string()),
        MonitorKind::Composite {
            required_breaches,
            window,
        } if required_breaches > window => Some(format!(
            "composite required_breaches ({required_breaches}) exceeds window ({window})"
        )),
        MonitorKind::Composite { .. } => None,
        MonitorKind::Granular { dimensions } if dimensions.is_empty() => {
            Some("granular monitor has no dimensions".to_string())
        }
        MonitorKind::Granular { .. } => None,
    };

    match reason {
        Some(reason) => Err(EvaluationError::InvalidConfig {
            monitor_id: monitor.id.clone(),
            reason,
        }),
        None => Ok(()),
    }
}
