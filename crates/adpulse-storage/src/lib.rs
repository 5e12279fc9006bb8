//! Record store for monitor states and alarms.
//!
//! The evaluation engine only needs the keyed read/write contract of
//! [`RecordStore`]. Two implementations ship here: [`memory::MemoryRecordStore`]
//! for embedding and tests, and [`engine::SqliteRecordStore`], a single-file
//! SQLite database that additionally holds campaigns, monitors and the raw
//! metric samples the server ingests.

pub mod engine;
pub mod error;
pub mod memory;


use adpulse_common::types::{Alarm, AlarmState, MonitorState, Severity};
use anyhow::Result;

/// Selects alarms by owner, state and severity. Unset fields match anything.
///
/// # Examples
///
/// ```
/// use adpulse_common::types::AlarmState;
/// use adpulse_storage::AlarmFilter;
///
/// let filter = AlarmFilter::active_for_monitor("m-1");
/// assert_eq!(filter.state, Some(AlarmState::Active));
/// assert_eq!(filter.monitor_id.as_deref(), Some("m-1"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct AlarmFilter {
    pub monitor_id: Option<String>,
    pub campaign_id: Option<String>,
    pub state: Option<AlarmState>,
    pub severity: Option<Severity>,
}

impl AlarmFilter {
    pub fn active_for_monitor(monitor_id: &str) -> Self {
        Self {
            monitor_id: Some(monitor_id.to_string()),
            state: Some(AlarmState::Active),
            ..Default::default()
        }
    }

    pub fn for_campaign(campaign_id: &str) -> Self {
        Self {
            campaign_id: Some(campaign_id.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, alarm: &Alarm) -> bool {
        self.monitor_id
            .as_deref()
            .map_or(true, |id| alarm.monitor_id == id)
            && self
                .campaign_id
                .as_deref()
                .map_or(true, |id| alarm.campaign_id == id)
            && self.state.map_or(true, |s| alarm.state == s)
            && self.severity.map_or(true, |s| alarm.severity == s)
    }
}

/// Persistence for the engine's mutable records.
///
/// Implementations must be `Send + Sync`: the engine is shared between HTTP
/// handlers and background enrichment tasks. Writes are upserts; callers
/// serialize writes per monitor.
pub trait RecordStore: Send + Sync {
    /// Latest state of a monitor, if it was ever evaluated.
    fn get_monitor_state(&self, monitor_id: &str) -> Result<Option<MonitorState>>;

    /// Replaces the state record of `state.monitor_id`.
    fn put_monitor_state(&self, state: &MonitorState) -> Result<()>;

    /// States of every evaluated monitor of a campaign.
    fn list_monitor_states(&self, campaign_id: &str) -> Result<Vec<MonitorState>>;

    /// Alarms matching `filter`, most recently triggered first.
    fn list_alarms(&self, filter: &AlarmFilter) -> Result<Vec<Alarm>>;

    fn get_alarm(&self, alarm_id: &str) -> Result<Option<Alarm>>;

    /// Inserts or replaces an alarm by id.
    fn put_alarm(&self, alarm: &Alarm) -> Result<()>;
}

pub(crate) fn sort_alarms(alarms: &mut [Alarm]) {
    alarms.sort_by(|a, b| {
        b.triggered_at
            .cmp(&a.triggered_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
