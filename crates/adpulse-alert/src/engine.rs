use crate::enrichment::InsightDispatcher;
use crate::error::{EvaluationError, Result};
use crate::evaluator::{MonitorEvaluator, Transition};
use crate::lifecycle::{alarm_summary, AlarmLifecycle, AlarmUpdate};
use crate::locks::MonitorLocks;
use crate::MetricSource;
use adpulse_ai::InsightGenerator;
use adpulse_common::types::{
    Alarm, AlarmState, AlarmSummary, Campaign, Monitor, MonitorState, ResolutionMethod,
};
use adpulse_storage::{AlarmFilter, RecordStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Result of evaluating one monitor.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct MonitorOutcome {
    pub state: MonitorState,
    pub transition: Transition,
    /// Alarm opened by this evaluation.
    pub alarm: Option<Alarm>,
    /// Alarms auto-resolved by this evaluation.
    pub resolved: Vec<Alarm>,
}

/// A monitor that could not be evaluated. Its previous state is unchanged.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct MonitorFailure {
    pub monitor_id: String,
    pub metric_id: String,
    pub kind: String,
    pub error: String,
}

/// Result of evaluating every enabled monitor of a campaign.
#[derive(Debug, Clone, Default, Serialize, utoipa::ToSchema)]
pub struct CampaignEvaluation {
    pub campaign_id: String,
    pub states: Vec<MonitorState>,
    pub new_alarms: Vec<Alarm>,
    pub resolved_alarms: Vec<Alarm>,
    pub failures: Vec<MonitorFailure>,
    /// Monitors evaluated successfully.
    pub evaluated: usize,
    pub skipped_disabled: usize,
}

impl CampaignEvaluation {
    /// True when at least one enabled monitor failed.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Evaluates monitors and drives their alarms.
///
/// Work for one monitor (read prior state, evaluate, open or resolve alarms,
/// write the new state) runs under that monitor's lock, so at most one
/// evaluation per monitor is in flight.
pub struct MonitorEngine {
    store: Arc<dyn RecordStore>,
    source: Arc<dyn MetricSource>,
    lifecycle: AlarmLifecycle,
    locks: Arc<MonitorLocks>,
    insights: Option<InsightDispatcher>,
}

impl MonitorEngine {
    pub fn new(store: Arc<dyn RecordStore>, source: Arc<dyn MetricSource>) -> Self {
        Self {
            lifecycle: AlarmLifecycle::new(store.clone()),
            store,
            source,
            locks: Arc::new(MonitorLocks::new()),
            insights: None,
        }
    }

    /// Enables background insight generation for new alarms.
    pub fn with_insights(
        mut self,
        generator: Arc<dyn InsightGenerator>,
        timeout: Duration,
        locale: &str,
    ) -> Self {
        tracing::info!(
            provider = generator.provider(),
            model = generator.model_name(),
            timeout_secs = timeout.as_secs(),
            "Insight generation enabled"
        );
        self.insights = Some(
            InsightDispatcher::new(generator, self.store.clone(), self.locks.clone(), timeout)
                .with_locale(locale),
        );
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn evaluate_monitor(
        &self,
        monitor: &Monitor,
        campaign: &Campaign,
    ) -> Result<MonitorOutcome> {
        self.evaluate_monitor_at(monitor, campaign, Utc::now())
    }

    /// Evaluates one monitor as of `now`, persisting its state and alarm
    /// changes.
    ///
    /// Disabled monitors are evaluated too; filtering is the caller's job.
    /// On error nothing is written for this monitor.
    pub fn evaluate_monitor_at(
        &self,
        monitor: &Monitor,
        campaign: &Campaign,
        now: DateTime<Utc>,
    ) -> Result<MonitorOutcome> {
        let lock = self.locks.handle(&monitor.id);
        let guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let prior = self
            .store
            .get_monitor_state(&monitor.id)
            .map_err(EvaluationError::Storage)?;
        let evaluation = MonitorEvaluator::new(self.source.as_ref()).evaluate(
            monitor,
            campaign,
            prior.as_ref(),
            now,
        )?;

        // Alarm writes precede the state write. A failed state write replays
        // the same transition next time; `open` then finds the Active alarm.
        let mut alarm = None;
        let mut resolved = Vec::new();
        match evaluation.transition {
            Transition::Triggered => {
                alarm = self.lifecycle.open(monitor, campaign, &evaluation.state, now)?;
            }
            Transition::Recovered => {
                resolved = self.lifecycle.auto_resolve(&monitor.id, now)?;
            }
            Transition::Steady => {}
        }

        let state_write = self
            .store
            .put_monitor_state(&evaluation.state)
            .map_err(EvaluationError::Storage);
        drop(guard);

        // A stored alarm is enriched even when the state write failed; the
        // replayed transition will not reopen it.
        if let (Some(alarm), Some(dispatcher)) = (&alarm, &self.insights) {
            dispatcher.dispatch(alarm, campaign, monitor);
        }
        state_write?;

        if evaluation.transition == Transition::Steady {
            tracing::debug!(
                monitor_id = %monitor.id,
                metric = %monitor.metric.id,
                status = %evaluation.state.status,
                deviation = evaluation.state.deviation_percent,
                "Monitor evaluated"
            );
        } else {
            tracing::info!(
                monitor_id = %monitor.id,
                campaign_id = %campaign.id,
                metric = %monitor.metric.id,
                status = %evaluation.state.status,
                deviation = evaluation.state.deviation_percent,
                transition = ?evaluation.transition,
                "Monitor state changed"
            );
        }

        Ok(MonitorOutcome {
            state: evaluation.state,
            transition: evaluation.transition,
            alarm,
            resolved,
        })
    }

    pub fn evaluate_all(&self, campaign: &Campaign, monitors: &[Monitor]) -> CampaignEvaluation {
        self.evaluate_all_at(campaign, monitors, Utc::now())
    }

    /// Evaluates every enabled monitor of `campaign`.
    ///
    /// A monitor that fails is reported in `failures` and the loop moves on.
    pub fn evaluate_all_at(
        &self,
        campaign: &Campaign,
        monitors: &[Monitor],
        now: DateTime<Utc>,
    ) -> CampaignEvaluation {
        let mut result = CampaignEvaluation {
            campaign_id: campaign.id.clone(),
            ..Default::default()
        };

        for monitor in monitors {
            if !monitor.enabled {
                result.skipped_disabled += 1;
                continue;
            }

            match self.evaluate_monitor_at(monitor, campaign, now) {
                Ok(outcome) => {
                    result.evaluated += 1;
                    result.states.push(outcome.state);
                    result.new_alarms.extend(outcome.alarm);
                    result.resolved_alarms.extend(outcome.resolved);
                }
                Err(e) => {
                    tracing::warn!(
                        campaign_id = %campaign.id,
                        monitor_id = %monitor.id,
                        metric = %monitor.metric.id,
                        error = %e,
                        "Monitor evaluation failed, skipping"
                    );
                    result.failures.push(MonitorFailure {
                        monitor_id: monitor.id.clone(),
                        metric_id: monitor.metric.id.clone(),
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            campaign_id = %campaign.id,
            evaluated = result.evaluated,
            failed = result.failures.len(),
            skipped_disabled = result.skipped_disabled,
            new_alarms = result.new_alarms.len(),
            resolved_alarms = result.resolved_alarms.len(),
            "Campaign evaluation completed"
        );
        result
    }

    pub fn resolve_alarm(&self, alarm_id: &str, method: ResolutionMethod) -> Result<AlarmUpdate> {
        self.with_alarm_lock(alarm_id, |lifecycle| {
            lifecycle.resolve(alarm_id, method, Utc::now())
        })
    }

    pub fn dismiss_alarm(&self, alarm_id: &str) -> Result<AlarmUpdate> {
        self.with_alarm_lock(alarm_id, |lifecycle| lifecycle.dismiss(alarm_id, Utc::now()))
    }

    /// Active-alarm counts for a campaign with `monitor_count` monitors.
    pub fn campaign_summary(
        &self,
        campaign_id: &str,
        monitor_count: usize,
    ) -> Result<AlarmSummary> {
        let filter = AlarmFilter {
            state: Some(AlarmState::Active),
            ..AlarmFilter::for_campaign(campaign_id)
        };
        let alarms = self
            .store
            .list_alarms(&filter)
            .map_err(EvaluationError::Storage)?;
        Ok(alarm_summary(&alarms, monitor_count))
    }

    fn with_alarm_lock<T>(
        &self,
        alarm_id: &str,
        f: impl FnOnce(&AlarmLifecycle) -> Result<T>,
    ) -> Result<T> {
        let monitor_id = self
            .store
            .get_alarm(alarm_id)
            .map_err(EvaluationError::Storage)?
            .ok_or_else(|| EvaluationError::AlarmNotFound(alarm_id.to_string()))?
            .monitor_id;

        let lock = self.locks.handle(&monitor_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&self.lifecycle)
    }
}
