use crate::generator::{InsightGenerator, InsightRequest};
use adpulse_common::types::{Confidence, ImpactRule, Insights, Recommendation, RootCause};
use anyhow::Result;
use async_trait::async_trait;

/// Offline generator that explains alarms from canned knowledge per metric
/// family. Output is deterministic for a given alarm.
#[derive(Debug, Clone, Default)]
pub struct HeuristicInsightGenerator;

impl HeuristicInsightGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InsightGenerator for HeuristicInsightGenerator {
    fn provider(&self) -> &str {
        "heuristic"
    }

    fn model_name(&self) -> &str {
        "rules-v1"
    }

    async fn generate(&self, request: &InsightRequest) -> Result<Insights> {
        Ok(build_insights(request))
    }
}

fn build_insights(request: &InsightRequest) -> Insights {
    let alarm = &request.alarm;
    let direction = if request.is_rising() { "rose" } else { "fell" };
    let mut summary = format!(
        "{} for {} {} {:.1}% against its baseline ({:.2} vs {:.2} expected).",
        alarm.metric_name,
        alarm.campaign_name,
        direction,
        alarm.deviation_percent.abs(),
        alarm.current_value,
        alarm.expected_value,
    );
    if let Some(impact) = alarm.estimated_impact_usd.filter(|v| *v > 0.0) {
        summary.push_str(&format!(" Estimated daily exposure is about ${impact:.0}."));
    }

    let (causes, recommendations) = match (request.monitor.impact_rule, request.is_rising()) {
        (ImpactRule::CostRising, true) => (
            vec![
                ("Increased auction competition is pushing bids up", 0.6),
                ("Conversion tracking gap is deflating attributed conversions", 0.3),
            ],
            vec![rec(
                "Review bid caps on the most expensive ad groups",
                "Cost per result is above baseline while volume is stable",
                "Brings cost back toward the baseline within a few days",
                Confidence::Medium,
            )],
        ),
        (ImpactRule::EfficiencyFalling, false) => (
            vec![
                ("Creative fatigue after prolonged exposure to the same audience", 0.55),
                ("Targeting expansion into lower-intent audiences", 0.35),
            ],
            vec![
                rec(
                    "Rotate in fresh creatives",
                    "Engagement drops typically follow frequency build-up",
                    "Restores engagement rate over the next week",
                    Confidence::Medium,
                ),
                rec(
                    "Narrow recently broadened audience segments",
                    "New segments often convert below the established core",
                    "Improves efficiency at the cost of some reach",
                    Confidence::Low,
                ),
            ],
        ),
        (ImpactRule::VolumeFalling, false) => (
            vec![
                ("Budget or bid limits are throttling delivery", 0.5),
                ("Ads disapproved or paused by the platform", 0.3),
            ],
            vec![rec(
                "Check delivery status and policy notices for the campaign",
                "Sudden volume loss often comes from disapprovals or caps",
                "Recovers lost impressions once delivery resumes",
                Confidence::High,
            )],
        ),
        (ImpactRule::Spend, true) => (
            vec![("Pacing accelerated after a budget or bid change", 0.6)],
            vec![rec(
                "Verify recent budget edits and pacing settings",
                "Spend above plan exhausts the daily budget early",
                "Prevents overspend for the rest of the day",
                Confidence::High,
            )],
        ),
        (ImpactRule::Spend, false) => (
            vec![("Delivery is constrained by bids, targeting or approvals", 0.5)],
            vec![rec(
                "Inspect delivery diagnostics for limited ad sets",
                "Underspend usually signals restricted delivery",
                "Returns spend to plan",
                Confidence::Medium,
            )],
        ),
        (ImpactRule::InvalidTrafficRising, true) => (
            vec![("Low-quality placements or bot traffic on partner inventory", 0.65)],
            vec![rec(
                "Exclude placements with abnormal click patterns",
                "Invalid traffic is paid for but never converts",
                "Cuts wasted spend on junk traffic",
                Confidence::High,
            )],
        ),
        _ => (
            vec![("Metric moved outside its usual range without a known driver", 0.3)],
            vec![rec(
                "Compare against recent campaign changes and seasonality",
                "No metric-specific heuristic applies",
                "Narrows down the cause for manual follow-up",
                Confidence::Low,
            )],
        ),
    };

    Insights {
        summary,
        root_causes: causes
            .into_iter()
            .map(|(cause, confidence)| RootCause {
                cause: cause.to_string(),
                confidence,
            })
            .collect(),
        recommendations,
    }
}

fn rec(action: &str, reasoning: &str, expected_impact: &str, confidence: Confidence) -> Recommendation {
    Recommendation {
        action: action.to_string(),
        reasoning: reasoning.to_string(),
        expected_impact: expected_impact.to_string(),
        confidence,
    }
}
