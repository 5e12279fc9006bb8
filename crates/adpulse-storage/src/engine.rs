use crate::error::{Result, StorageError};
use crate::{sort_alarms, AlarmFilter, RecordStore};
use adpulse_common::types::{Alarm, Campaign, MetricSample, Monitor, MonitorState};
use chrono::DateTime;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const DB_FILE: &str = "adpulse.db";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS campaigns (
    id TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS monitors (
    id TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL,
    metric_id TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_monitors_campaign ON monitors(campaign_id);

CREATE TABLE IF NOT EXISTS monitor_states (
    monitor_id TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL,
    status TEXT NOT NULL,
    evaluated_at INTEGER NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_states_campaign ON monitor_states(campaign_id);

CREATE TABLE IF NOT EXISTS alarms (
    id TEXT PRIMARY KEY,
    monitor_id TEXT NOT NULL,
    campaign_id TEXT NOT NULL,
    state TEXT NOT NULL,
    severity TEXT NOT NULL,
    triggered_at INTEGER NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alarms_monitor_state ON alarms(monitor_id, state);
CREATE INDEX IF NOT EXISTS idx_alarms_campaign ON alarms(campaign_id);

CREATE TABLE IF NOT EXISTS metric_samples (
    campaign_id TEXT NOT NULL,
    metric_id TEXT NOT NULL,
    dimension TEXT NOT NULL DEFAULT '',
    dimension_value TEXT NOT NULL DEFAULT '',
    timestamp INTEGER NOT NULL,
    value REAL NOT NULL,
    expected REAL NOT NULL,
    PRIMARY KEY (campaign_id, metric_id, dimension, dimension_value, timestamp)
);
";

const SAMPLE_COLUMNS: &str =
    "campaign_id, metric_id, dimension, dimension_value, timestamp, value, expected";

/// SQLite-backed [`RecordStore`] that also persists campaigns, monitors and
/// ingested metric samples.
///
/// Domain records are stored as JSON payloads next to the handful of columns
/// used for filtering.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Opens (or creates) `adpulse.db` under `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join(DB_FILE))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- campaigns ----

    pub fn upsert_campaign(&self, campaign: &Campaign) -> Result<()> {
        let payload = serde_json::to_string(campaign)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO campaigns (id, payload) VALUES (?1, ?2)",
            rusqlite::params![&campaign.id, payload],
        )?;
        Ok(())
    }

    pub fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM campaigns WHERE id = ?1",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| decode(&p)).transpose()
    }

    pub fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let payloads = self.query_payloads("SELECT payload FROM campaigns ORDER BY id", &[])?;
        payloads.iter().map(|p| decode(p)).collect()
    }

    // ---- monitors ----

    pub fn upsert_monitor(&self, monitor: &Monitor) -> Result<()> {
        let payload = serde_json::to_string(monitor)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO monitors (id, campaign_id, metric_id, payload) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![&monitor.id, &monitor.campaign_id, &monitor.metric.id, payload],
        )?;
        Ok(())
    }

    pub fn get_monitor(&self, id: &str) -> Result<Option<Monitor>> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM monitors WHERE id = ?1",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| decode(&p)).transpose()
    }

    pub fn list_monitors(&self, campaign_id: &str) -> Result<Vec<Monitor>> {
        let payloads = self.query_payloads(
            "SELECT payload FROM monitors WHERE campaign_id = ?1 ORDER BY metric_id, id",
            rusqlite::params![campaign_id],
        )?;
        payloads.iter().map(|p| decode(p)).collect()
    }

    /// Applies `f` to a stored monitor and writes it back.
    pub fn update_monitor<F>(&self, id: &str, f: F) -> Result<Monitor>
    where
        F: FnOnce(&mut Monitor),
    {
        let mut monitor = self.get_monitor(id)?.ok_or_else(|| StorageError::NotFound {
            entity: "monitor",
            id: id.to_string(),
        })?;
        f(&mut monitor);
        self.upsert_monitor(&monitor)?;
        Ok(monitor)
    }

    // ---- metric samples ----

    /// Writes samples in one transaction. A sample with the same key and
    /// timestamp replaces the earlier one.
    pub fn write_samples(&self, samples: &[MetricSample]) -> Result<usize> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO metric_samples (campaign_id, metric_id, dimension, dimension_value, timestamp, value, expected)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for s in samples {
                stmt.execute(rusqlite::params![
                    &s.campaign_id,
                    &s.metric_id,
                    s.dimension.as_deref().unwrap_or(""),
                    s.dimension_value.as_deref().unwrap_or(""),
                    s.timestamp.timestamp_millis(),
                    s.value,
                    s.expected,
                ])?;
            }
        }
        tx.commit()?;
        Ok(samples.len())
    }

    /// Newest aggregate samples, returned oldest first.
    pub fn recent_samples(
        &self,
        campaign_id: &str,
        metric_id: &str,
        limit: usize,
    ) -> Result<Vec<MetricSample>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM metric_samples
             WHERE campaign_id = ?1 AND metric_id = ?2 AND dimension = ''
             ORDER BY timestamp DESC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![campaign_id, metric_id, limit as i64],
            sample_from_row,
        )?;
        let mut samples = rows
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(SampleRow::into_sample)
            .collect::<Result<Vec<_>>>()?;
        samples.reverse();
        Ok(samples)
    }

    /// Newest sample of every value of `dimension`, ordered by value label.
    pub fn latest_dimension_samples(
        &self,
        campaign_id: &str,
        metric_id: &str,
        dimension: &str,
    ) -> Result<Vec<MetricSample>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM metric_samples s
             WHERE campaign_id = ?1 AND metric_id = ?2 AND dimension = ?3
               AND timestamp = (
                 SELECT MAX(t.timestamp) FROM metric_samples t
                 WHERE t.campaign_id = s.campaign_id AND t.metric_id = s.metric_id
                   AND t.dimension = s.dimension AND t.dimension_value = s.dimension_value)
             ORDER BY dimension_value"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![campaign_id, metric_id, dimension],
            sample_from_row,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(SampleRow::into_sample)
            .collect()
    }

    fn query_payloads(&self, sql: &str, params: &[&dyn rusqlite::types::ToSql]) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn put_state(&self, state: &MonitorState) -> Result<()> {
        let payload = serde_json::to_string(state)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO monitor_states (monitor_id, campaign_id, status, evaluated_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                &state.monitor_id,
                &state.campaign_id,
                state.status.as_str(),
                state.evaluated_at.timestamp_millis(),
                payload,
            ],
        )?;
        Ok(())
    }

    fn get_state(&self, monitor_id: &str) -> Result<Option<MonitorState>> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM monitor_states WHERE monitor_id = ?1",
                rusqlite::params![monitor_id],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| decode(&p)).transpose()
    }

    fn states_for_campaign(&self, campaign_id: &str) -> Result<Vec<MonitorState>> {
        let payloads = self.query_payloads(
            "SELECT payload FROM monitor_states WHERE campaign_id = ?1 ORDER BY monitor_id",
            rusqlite::params![campaign_id],
        )?;
        payloads.iter().map(|p| decode(p)).collect()
    }

    fn write_alarm(&self, alarm: &Alarm) -> Result<()> {
        let payload = serde_json::to_string(alarm)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO alarms (id, monitor_id, campaign_id, state, severity, triggered_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                &alarm.id,
                &alarm.monitor_id,
                &alarm.campaign_id,
                alarm.state.as_str(),
                alarm.severity.as_str(),
                alarm.triggered_at.timestamp_millis(),
                payload,
            ],
        )?;
        Ok(())
    }

    fn read_alarm(&self, alarm_id: &str) -> Result<Option<Alarm>> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM alarms WHERE id = ?1",
                rusqlite::params![alarm_id],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| decode(&p)).transpose()
    }

    fn query_alarms(&self, filter: &AlarmFilter) -> Result<Vec<Alarm>> {
        let mut sql = String::from("SELECT payload FROM alarms WHERE 1 = 1");
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(monitor_id) = &filter.monitor_id {
            params.push(Box::new(monitor_id.clone()));
            sql.push_str(&format!(" AND monitor_id = ?{}", params.len()));
        }
        if let Some(campaign_id) = &filter.campaign_id {
            params.push(Box::new(campaign_id.clone()));
            sql.push_str(&format!(" AND campaign_id = ?{}", params.len()));
        }
        if let Some(state) = filter.state {
            params.push(Box::new(state.as_str()));
            sql.push_str(&format!(" AND state = ?{}", params.len()));
        }
        if let Some(severity) = filter.severity {
            params.push(Box::new(severity.as_str()));
            sql.push_str(&format!(" AND severity = ?{}", params.len()));
        }

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let payloads = self.query_payloads(&sql, &param_refs)?;
        let mut alarms = payloads
            .iter()
            .map(|p| decode::<Alarm>(p))
            .collect::<Result<Vec<_>>>()?;
        sort_alarms(&mut alarms);
        Ok(alarms)
    }
}

impl RecordStore for SqliteRecordStore {
    fn get_monitor_state(&self, monitor_id: &str) -> anyhow::Result<Option<MonitorState>> {
        Ok(self.get_state(monitor_id)?)
    }

    fn put_monitor_state(&self, state: &MonitorState) -> anyhow::Result<()> {
        Ok(self.put_state(state)?)
    }

    fn list_monitor_states(&self, campaign_id: &str) -> anyhow::Result<Vec<MonitorState>> {
        Ok(self.states_for_campaign(campaign_id)?)
    }

    fn list_alarms(&self, filter: &AlarmFilter) -> anyhow::Result<Vec<Alarm>> {
        Ok(self.query_alarms(filter)?)
    }

    fn get_alarm(&self, alarm_id: &str) -> anyhow::Result<Option<Alarm>> {
        Ok(self.read_alarm(alarm_id)?)
    }

    fn put_alarm(&self, alarm: &Alarm) -> anyhow::Result<()> {
        Ok(self.write_alarm(alarm)?)
    }
}

fn decode<T: DeserializeOwned>(payload: &str) -> Result<T> {
    Ok(serde_json::from_str(payload)?)
}

/// A `metric_samples` row before its timestamp is decoded.
struct SampleRow {
    campaign_id: String,
    metric_id: String,
    dimension: String,
    dimension_value: String,
    timestamp_ms: i64,
    value: f64,
    expected: f64,
}

impl SampleRow {
    fn into_sample(self) -> Result<MetricSample> {
        let timestamp = DateTime::from_timestamp_millis(self.timestamp_ms).ok_or_else(|| {
            StorageError::InvalidValue {
                column: "timestamp",
                value: self.timestamp_ms.to_string(),
            }
        })?;
        Ok(MetricSample {
            campaign_id: self.campaign_id,
            metric_id: self.metric_id,
            timestamp,
            value: self.value,
            expected: self.expected,
            dimension: (!self.dimension.is_empty()).then_some(self.dimension),
            dimension_value: (!self.dimension_value.is_empty()).then_some(self.dimension_value),
        })
    }
}

fn sample_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SampleRow> {
    Ok(SampleRow {
        campaign_id: row.get(0)?,
        metric_id: row.get(1)?,
        dimension: row.get(2)?,
        dimension_value: row.get(3)?,
        timestamp_ms: row.get(4)?,
        value: row.get(5)?,
        expected: row.get(6)?,
    })
}
