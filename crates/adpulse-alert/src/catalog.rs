use adpulse_common::id;
use adpulse_common::types::{Campaign, ImpactRule, MetricCategory, MetricRef, Monitor, MonitorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-defined metric computed from other metrics (e.g. `spend / conversions`).
/// The formula is informational; values come from the metric source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaMetric {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub formula: String,
}

struct DefaultMonitor {
    metric_id: &'static str,
    name: &'static str,
    category: MetricCategory,
    kind: fn() -> MonitorKind,
}

fn composite_two_of_three() -> MonitorKind {
    MonitorKind::Composite {
        required_breaches: 2,
        window: 3,
    }
}

const DEFAULT_MONITORS: &[DefaultMonitor] = &[
    DefaultMonitor {
        metric_id: "spend",
        name: "Spend",
        category: MetricCategory::Spend,
        kind: || MonitorKind::Simple,
    },
    DefaultMonitor {
        metric_id: "cpa",
        name: "Cost per Acquisition",
        category: MetricCategory::Cost,
        kind: composite_two_of_three,
    },
    DefaultMonitor {
        metric_id: "cpc",
        name: "Cost per Click",
        category: MetricCategory::Cost,
        kind: || MonitorKind::Simple,
    },
    DefaultMonitor {
        metric_id: "ctr",
        name: "Click-through Rate",
        category: MetricCategory::Efficiency,
        kind: || MonitorKind::Granular {
            dimensions: vec!["device".to_string(), "geography".to_string()],
        },
    },
    DefaultMonitor {
        metric_id: "conversion_rate",
        name: "Conversion Rate",
        category: MetricCategory::Efficiency,
        kind: composite_two_of_three,
    },
    DefaultMonitor {
        metric_id: "impressions",
        name: "Impressions",
        category: MetricCategory::Volume,
        kind: || MonitorKind::Simple,
    },
    DefaultMonitor {
        metric_id: "clicks",
        name: "Clicks",
        category: MetricCategory::Volume,
        kind: || MonitorKind::Granular {
            dimensions: vec!["device".to_string()],
        },
    },
    DefaultMonitor {
        metric_id: "invalid_traffic_rate",
        name: "Invalid Traffic Rate",
        category: MetricCategory::Quality,
        kind: || MonitorKind::Simple,
    },
];

/// Builds the monitors created when monitoring is enabled for `campaign`:
/// the fixed default set followed by one Simple monitor per formula metric.
///
/// Impact rules are resolved here once; monitors take the campaign's
/// sensitivity and start enabled.
pub fn default_monitors(
    campaign: &Campaign,
    formulas: &[FormulaMetric],
    now: DateTime<Utc>,
) -> Vec<Monitor> {
    let defaults = DEFAULT_MONITORS.iter().map(|d| {
        let metric = MetricRef {
            id: d.metric_id.to_string(),
            name: d.name.to_string(),
            category: d.category,
        };
        (metric, (d.kind)())
    });
    let custom = formulas.iter().map(|f| {
        let metric = MetricRef {
            id: f.id.clone(),
            name: f.name.clone(),
            category: MetricCategory::Custom,
        };
        (metric, MonitorKind::Simple)
    });

    defaults
        .chain(custom)
        .map(|(metric, kind)| Monitor {
            id: id::next_id(),
            campaign_id: campaign.id.clone(),
            impact_rule: ImpactRule::for_metric(&metric.id),
            metric,
            kind,
            sensitivity: campaign.sensitivity,
            enabled: true,
            created_at: now,
            updated_at: now,
        })
        .collect()
}
