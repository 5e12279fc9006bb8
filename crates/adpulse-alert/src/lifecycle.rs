use crate::error::{EvaluationError, Result};
use crate::impact::estimate_impact;
use crate::threshold::severity_for;
use adpulse_common::id;
use adpulse_common::types::{
    Alarm, AlarmState, AlarmSummary, Campaign, Monitor, MonitorState, ResolutionMethod, Severity,
};
use adpulse_storage::{AlarmFilter, RecordStore};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// Result of a user resolve or dismiss.
#[derive(Debug, Clone)]
pub enum AlarmUpdate {
    /// The alarm was Active and is now terminal.
    Applied(Alarm),
    /// The alarm was already terminal; it is returned as stored.
    Unchanged(Alarm),
}

impl AlarmUpdate {
    pub fn alarm(&self) -> &Alarm {
        match self {
            AlarmUpdate::Applied(a) | AlarmUpdate::Unchanged(a) => a,
        }
    }

    pub fn into_alarm(self) -> Alarm {
        match self {
            AlarmUpdate::Applied(a) | AlarmUpdate::Unchanged(a) => a,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, AlarmUpdate::Applied(_))
    }
}

/// Creates, auto-resolves, resolves and dismisses alarms.
///
/// Callers hold the monitor's lock (see [`crate::locks::MonitorLocks`])
/// around every call so the Active-alarm check and the write are atomic per
/// monitor.
pub struct AlarmLifecycle {
    store: Arc<dyn RecordStore>,
}

impl AlarmLifecycle {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Opens an alarm for a monitor that just entered InAlarm.
    ///
    /// Returns `None` when the monitor already has an Active alarm.
    pub fn open(
        &self,
        monitor: &Monitor,
        campaign: &Campaign,
        state: &MonitorState,
        now: DateTime<Utc>,
    ) -> Result<Option<Alarm>> {
        let existing = self
            .store
            .list_alarms(&AlarmFilter::active_for_monitor(&monitor.id))
            .map_err(EvaluationError::Storage)?;
        if let Some(active) = existing.first() {
            tracing::debug!(
                monitor_id = %monitor.id,
                alarm_id = %active.id,
                "Monitor already has an active alarm, not opening another"
            );
            return Ok(None);
        }

        let alarm = Alarm {
            id: id::next_id(),
            monitor_id: monitor.id.clone(),
            campaign_id: campaign.id.clone(),
            campaign_name: campaign.name.clone(),
            metric_id: monitor.metric.id.clone(),
            metric_name: monitor.metric.name.clone(),
            severity: severity_for(state.deviation_percent),
            state: AlarmState::Active,
            triggered_at: state.entered_state_at,
            resolved_at: None,
            resolution_method: None,
            current_value: state.current_value,
            expected_value: state.expected_value,
            deviation_percent: state.deviation_percent,
            estimated_impact_usd: estimate_impact(
                monitor.impact_rule,
                campaign.daily_budget,
                state.deviation_percent,
            ),
            insights: None,
            created_at: now,
            updated_at: now,
        };
        self.store.put_alarm(&alarm).map_err(EvaluationError::Storage)?;

        tracing::info!(
            alarm_id = %alarm.id,
            monitor_id = %monitor.id,
            campaign_id = %campaign.id,
            metric = %monitor.metric.id,
            severity = %alarm.severity,
            deviation = alarm.deviation_percent,
            "Alarm opened"
        );
        Ok(Some(alarm))
    }

    /// Resolves every Active alarm of a monitor that returned to OK.
    pub fn auto_resolve(&self, monitor_id: &str, now: DateTime<Utc>) -> Result<Vec<Alarm>> {
        let active = self
            .store
            .list_alarms(&AlarmFilter::active_for_monitor(monitor_id))
            .map_err(EvaluationError::Storage)?;

        let mut resolved = Vec::with_capacity(active.len());
        for mut alarm in active {
            close(&mut alarm, AlarmState::Resolved, ResolutionMethod::AutoResolved, now);
            self.store.put_alarm(&alarm).map_err(EvaluationError::Storage)?;
            tracing::info!(alarm_id = %alarm.id, monitor_id, "Alarm auto-resolved");
            resolved.push(alarm);
        }
        Ok(resolved)
    }

    /// Closes an Active alarm on user request.
    ///
    /// `Dismissed` as method behaves like [`Self::dismiss`]. A terminal alarm
    /// is left untouched.
    pub fn resolve(
        &self,
        alarm_id: &str,
        method: ResolutionMethod,
        now: DateTime<Utc>,
    ) -> Result<AlarmUpdate> {
        let target = match method {
            ResolutionMethod::Dismissed => AlarmState::Dismissed,
            ResolutionMethod::UserAction | ResolutionMethod::AutoResolved => AlarmState::Resolved,
        };
        self.transition(alarm_id, target, method, now)
    }

    pub fn dismiss(&self, alarm_id: &str, now: DateTime<Utc>) -> Result<AlarmUpdate> {
        self.transition(
            alarm_id,
            AlarmState::Dismissed,
            ResolutionMethod::Dismissed,
            now,
        )
    }

    fn transition(
        &self,
        alarm_id: &str,
        target: AlarmState,
        method: ResolutionMethod,
        now: DateTime<Utc>,
    ) -> Result<AlarmUpdate> {
        let mut alarm = self
            .store
            .get_alarm(alarm_id)
            .map_err(EvaluationError::Storage)?
            .ok_or_else(|| EvaluationError::AlarmNotFound(alarm_id.to_string()))?;

        if !alarm.is_active() {
            tracing::debug!(alarm_id, state = %alarm.state, "Alarm already closed, ignoring");
            return Ok(AlarmUpdate::Unchanged(alarm));
        }

        close(&mut alarm, target, method, now);
        self.store.put_alarm(&alarm).map_err(EvaluationError::Storage)?;
        tracing::info!(alarm_id, state = %alarm.state, "Alarm closed by user");
        Ok(AlarmUpdate::Applied(alarm))
    }
}

fn close(alarm: &mut Alarm, state: AlarmState, method: ResolutionMethod, now: DateTime<Utc>) {
    alarm.state = state;
    alarm.resolved_at = Some(now);
    alarm.resolution_method = Some(method);
    alarm.updated_at = now;
}

/// Counts Active alarms by severity.
///
/// `healthy` is the number of monitors without an Active alarm, out of
/// `monitor_count`.
///
/// # Examples
///
/// ```
/// use adpulse_alert::lifecycle::alarm_summary;
///
/// let summary = alarm_summary(&[], 8);
/// assert_eq!(summary.total_active, 0);
/// assert_eq!(summary.healthy, 8);
/// ```
pub fn alarm_summary(alarms: &[Alarm], monitor_count: usize) -> AlarmSummary {
    let mut summary = AlarmSummary::default();
    let mut alarming: HashSet<&str> = HashSet::new();

    for alarm in alarms.iter().filter(|a| a.is_active()) {
        match alarm.severity {
            Severity::Critical => summary.critical += 1,
            Severity::High => summary.high += 1,
            Severity::Medium => summary.medium += 1,
            Severity::Low => summary.low += 1,
        }
        summary.total_active += 1;
        alarming.insert(alarm.monitor_id.as_str());
    }

    summary.healthy = (monitor_count as u64).saturating_sub(alarming.len() as u64);
    summary
}
