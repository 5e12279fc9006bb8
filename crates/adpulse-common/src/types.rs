use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alarm urgency, ordered from lowest to highest.
///
/// Severity is banded on the absolute deviation alone and is independent of
/// the monitor's sensitivity: sensitivity decides *whether* to alarm,
/// severity decides *how urgent* the alarm is.
///
/// # Examples
///
/// ```
/// use adpulse_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Low);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Tolerance band a monitor applies before a deviation counts as a breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Strict,
    Balanced,
    Loose,
}

impl Default for Sensitivity {
    fn default() -> Self {
        Sensitivity::Balanced
    }
}

impl Sensitivity {
    /// Fractional deviation tolerated before breaching.
    pub fn tolerance(&self) -> f64 {
        match self {
            Sensitivity::Strict => 0.15,
            Sensitivity::Balanced => 0.25,
            Sensitivity::Loose => 0.40,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Strict => "strict",
            Sensitivity::Balanced => "balanced",
            Sensitivity::Loose => "loose",
        }
    }
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Sensitivity::Strict),
            "balanced" => Ok(Sensitivity::Balanced),
            "loose" => Ok(Sensitivity::Loose),
            _ => Err(format!("unknown sensitivity: {s}")),
        }
    }
}

/// Campaign attributes the engine reads. Campaign management lives elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    /// Daily budget in USD.
    pub daily_budget: f64,
    #[serde(default)]
    pub sensitivity: Sensitivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Spend,
    Cost,
    Efficiency,
    Volume,
    Quality,
    Custom,
}

/// Economic interpretation of a metric's deviation, resolved once when the
/// monitor is created so evaluation never dispatches on metric-name strings.
///
/// The estimate derived from a rule is a heuristic, not an accounting figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImpactRule {
    /// Cost-type metrics (CPA, CPC, CPM): rising costs waste budget.
    CostRising,
    /// Efficiency metrics (CTR, conversion rate): falling efficiency wastes budget.
    EfficiencyFalling,
    /// Volume metrics (impressions, clicks): falling volume loses delivery.
    VolumeFalling,
    /// Spend itself, either direction.
    Spend,
    /// Invalid-traffic share: rising means paying for junk traffic.
    InvalidTrafficRising,
    Unclassified,
}

impl ImpactRule {
    /// Resolves the rule for a metric id.
    ///
    /// # Examples
    ///
    /// ```
    /// use adpulse_common::types::ImpactRule;
    ///
    /// assert_eq!(ImpactRule::for_metric("cpa"), ImpactRule::CostRising);
    /// assert_eq!(ImpactRule::for_metric("roas_custom"), ImpactRule::Unclassified);
    /// ```
    pub fn for_metric(metric_id: &str) -> Self {
        match metric_id.to_lowercase().as_str() {
            "cpa" | "cpc" | "cpm" | "cost_per_acquisition" | "cost_per_click" => {
                ImpactRule::CostRising
            }
            "ctr" | "conversion_rate" | "cvr" | "click_through_rate" => {
                ImpactRule::EfficiencyFalling
            }
            "impressions" | "clicks" | "conversions" => ImpactRule::VolumeFalling,
            "spend" => ImpactRule::Spend,
            "invalid_traffic_rate" | "ivt_rate" | "invalid_traffic" => {
                ImpactRule::InvalidTrafficRising
            }
            _ => ImpactRule::Unclassified,
        }
    }
}

/// The metric a monitor watches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MetricRef {
    pub id: String,
    pub name: String,
    pub category: MetricCategory,
}

/// Evaluation rule of a monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorKind {
    /// In alarm whenever the current sample breaches.
    Simple,
    /// In alarm when at least `required_breaches` of the last `window`
    /// samples breach.
    Composite { required_breaches: u32, window: u32 },
    /// Simple rule on the aggregate plus per-dimension diagnostics.
    Granular { dimensions: Vec<String> },
}

impl MonitorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::Simple => "simple",
            MonitorKind::Composite { .. } => "composite",
            MonitorKind::Granular { .. } => "granular",
        }
    }
}

/// A standing rule watching one metric of one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Monitor {
    pub id: String,
    pub campaign_id: String,
    pub metric: MetricRef,
    pub kind: MonitorKind,
    pub sensitivity: Sensitivity,
    pub enabled: bool,
    pub impact_rule: ImpactRule,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    pub fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) {
        self.enabled = enabled;
        self.updated_at = now;
    }

    pub fn set_sensitivity(&mut self, sensitivity: Sensitivity, now: DateTime<Utc>) {
        self.sensitivity = sensitivity;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Ok,
    InAlarm,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Ok => "ok",
            MonitorStatus::InAlarm => "in_alarm",
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic result for one value of one dimension (e.g. `device=mobile`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DimensionResult {
    pub dimension: String,
    pub value_label: String,
    pub current_value: f64,
    pub expected_value: f64,
    pub deviation_percent: f64,
    pub breached: bool,
}

/// Latest evaluation result of a monitor. One record per monitor, replaced on
/// every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MonitorState {
    pub monitor_id: String,
    pub campaign_id: String,
    pub status: MonitorStatus,
    pub current_value: f64,
    pub expected_value: f64,
    pub deviation_percent: f64,
    /// Absolute deviation divided by the sensitivity tolerance; above 1.0 means breaching.
    pub anomaly_score: f64,
    /// When the current `status` began. Only moves on a status change.
    pub entered_state_at: DateTime<Utc>,
    pub evaluated_at: DateTime<Utc>,
    /// Composite monitors only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breach_count: Option<u32>,
    /// Granular monitors only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<DimensionResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Active,
    Resolved,
    Dismissed,
}

impl AlarmState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AlarmState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Active => "active",
            AlarmState::Resolved => "resolved",
            AlarmState::Dismissed => "dismissed",
        }
    }
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlarmState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AlarmState::Active),
            "resolved" => Ok(AlarmState::Resolved),
            "dismissed" => Ok(AlarmState::Dismissed),
            _ => Err(format!("unknown alarm state: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    UserAction,
    AutoResolved,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RootCause {
    pub cause: String,
    /// 0.0 ..= 1.0
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Recommendation {
    pub action: String,
    pub reasoning: String,
    pub expected_impact: String,
    pub confidence: Confidence,
}

/// Best-effort enrichment attached to an alarm after it was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Insights {
    pub summary: String,
    #[serde(default)]
    pub root_causes: Vec<RootCause>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

/// One anomalous episode of a monitor.
///
/// Values and severity are a snapshot taken when the alarm was triggered and
/// are never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Alarm {
    pub id: String,
    pub monitor_id: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub metric_id: String,
    pub metric_name: String,
    pub severity: Severity,
    pub state: AlarmState,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_method: Option<ResolutionMethod>,
    pub current_value: f64,
    pub expected_value: f64,
    pub deviation_percent: f64,
    /// Heuristic USD estimate; never use for financial reconciliation.
    pub estimated_impact_usd: Option<f64>,
    pub insights: Option<Insights>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alarm {
    pub fn is_active(&self) -> bool {
        self.state == AlarmState::Active
    }
}

/// Counts of active alarms by severity plus the number of healthy monitors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AlarmSummary {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub total_active: u64,
    pub healthy: u64,
}

/// A raw metric observation as ingested from the metric feed.
///
/// Aggregate samples carry no dimension; breakdown samples carry both
/// `dimension` and `dimension_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MetricSample {
    pub campaign_id: String,
    pub metric_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub expected: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_value: Option<String>,
}
