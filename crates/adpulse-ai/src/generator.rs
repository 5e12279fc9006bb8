use adpulse_common::types::{Alarm, Campaign, Insights, Monitor};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Everything a generator may look at when explaining an alarm.
#[derive(Debug, Clone, Serialize)]
pub struct InsightRequest {
    pub alarm: Alarm,
    pub campaign: Campaign,
    pub monitor: Monitor,
    /// `en` or `zh-CN`
    pub locale: String,
}

impl InsightRequest {
    pub fn new(alarm: Alarm, campaign: Campaign, monitor: Monitor) -> Self {
        Self {
            alarm,
            campaign,
            monitor,
            locale: "en".to_string(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// True when the metric moved above its baseline.
    pub fn is_rising(&self) -> bool {
        self.alarm.deviation_percent > 0.0
    }
}

/// Produces [`Insights`] for an alarm (pluggable per model provider).
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    /// Provider name (e.g. `"heuristic"`, `"openai"`).
    fn provider(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn generate(&self, request: &InsightRequest) -> Result<Insights>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
