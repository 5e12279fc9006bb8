use crate::locks::MonitorLocks;
use adpulse_ai::{InsightGenerator, InsightRequest};
use adpulse_common::types::{Alarm, Campaign, Insights, Monitor};
use adpulse_storage::RecordStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Runs insight generation for new alarms as detached tasks and patches the
/// stored alarm when a result arrives.
///
/// The alarm is already persisted when [`InsightDispatcher::dispatch`] is
/// called. Failures and timeouts are logged and leave `insights` unset.
pub struct InsightDispatcher {
    generator: Arc<dyn InsightGenerator>,
    store: Arc<dyn RecordStore>,
    locks: Arc<MonitorLocks>,
    timeout: Duration,
    locale: String,
}

impl InsightDispatcher {
    pub fn new(
        generator: Arc<dyn InsightGenerator>,
        store: Arc<dyn RecordStore>,
        locks: Arc<MonitorLocks>,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            store,
            locks,
            timeout,
            locale: "en".to_string(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Spawns enrichment for `alarm` on the current tokio runtime.
    ///
    /// Returns `None` (and skips enrichment) when called outside a runtime.
    pub fn dispatch(
        &self,
        alarm: &Alarm,
        campaign: &Campaign,
        monitor: &Monitor,
    ) -> Option<JoinHandle<()>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    alarm_id = %alarm.id,
                    "No async runtime available, skipping insight generation"
                );
                return None;
            }
        };

        let request = InsightRequest::new(alarm.clone(), campaign.clone(), monitor.clone())
            .with_locale(self.locale.clone());
        let generator = self.generator.clone();
        let store = self.store.clone();
        let locks = self.locks.clone();
        let timeout = self.timeout;

        Some(runtime.spawn(async move {
            let alarm_id = request.alarm.id.clone();
            let started = std::time::Instant::now();

            match tokio::time::timeout(timeout, generator.generate(&request)).await {
                Ok(Ok(insights)) => {
                    match attach(store.as_ref(), &locks, &request.alarm, insights) {
                        Ok(true) => tracing::info!(
                            alarm_id = %alarm_id,
                            provider = generator.provider(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Insights attached to alarm"
                        ),
                        Ok(false) => tracing::warn!(
                            alarm_id = %alarm_id,
                            "Alarm disappeared before insights could be attached"
                        ),
                        Err(e) => tracing::warn!(
                            alarm_id = %alarm_id,
                            error = %e,
                            "Failed to store insights"
                        ),
                    }
                }
                Ok(Err(e)) => tracing::warn!(
                    alarm_id = %alarm_id,
                    provider = generator.provider(),
                    error = %e,
                    "Insight generation failed"
                ),
                Err(_) => tracing::warn!(
                    alarm_id = %alarm_id,
                    provider = generator.provider(),
                    timeout_secs = timeout.as_secs(),
                    "Insight generation timed out"
                ),
            }
        }))
    }
}

/// Re-reads the alarm under its monitor's lock and sets `insights`, so a
/// concurrent resolve or dismiss is never overwritten with a stale copy.
fn attach(
    store: &dyn RecordStore,
    locks: &MonitorLocks,
    snapshot: &Alarm,
    insights: Insights,
) -> anyhow::Result<bool> {
    let lock = locks.handle(&snapshot.monitor_id);
    let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let Some(mut alarm) = store.get_alarm(&snapshot.id)? else {
        return Ok(false);
    };
    alarm.insights = Some(insights);
    alarm.updated_at = Utc::now();
    store.put_alarm(&alarm)?;
    Ok(true)
}
