use crate::{sort_alarms, AlarmFilter, RecordStore};
use adpulse_common::types::{Alarm, MonitorState};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Process-local [`RecordStore`] backed by hash maps.
#[derive(Default)]
pub struct MemoryRecordStore {
    states: RwLock<HashMap<String, MonitorState>>,
    alarms: RwLock<HashMap<String, Alarm>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_states(&self) -> RwLockReadGuard<'_, HashMap<String, MonitorState>> {
        self.states
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_states(&self) -> RwLockWriteGuard<'_, HashMap<String, MonitorState>> {
        self.states
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_alarms(&self) -> RwLockReadGuard<'_, HashMap<String, Alarm>> {
        self.alarms
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_alarms(&self) -> RwLockWriteGuard<'_, HashMap<String, Alarm>> {
        self.alarms
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordStore for MemoryRecordStore {
    fn get_monitor_state(&self, monitor_id: &str) -> Result<Option<MonitorState>> {
        Ok(self.read_states().get(monitor_id).cloned())
    }

    fn put_monitor_state(&self, state: &MonitorState) -> Result<()> {
        self.write_states()
            .insert(state.monitor_id.clone(), state.clone());
        Ok(())
    }

    fn list_monitor_states(&self, campaign_id: &str) -> Result<Vec<MonitorState>> {
        let mut states: Vec<MonitorState> = self
            .read_states()
            .values()
            .filter(|s| s.campaign_id == campaign_id)
            .cloned()
            .collect();
        states.sort_by(|a, b| a.monitor_id.cmp(&b.monitor_id));
        Ok(states)
    }

    fn list_alarms(&self, filter: &AlarmFilter) -> Result<Vec<Alarm>> {
        let mut alarms: Vec<Alarm> = self
            .read_alarms()
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        sort_alarms(&mut alarms);
        Ok(alarms)
    }

    fn get_alarm(&self, alarm_id: &str) -> Result<Option<Alarm>> {
        Ok(self.read_alarms().get(alarm_id).cloned())
    }

    fn put_alarm(&self, alarm: &Alarm) -> Result<()> {
        self.write_alarms().insert(alarm.id.clone(), alarm.clone());
        Ok(())
    }
}
