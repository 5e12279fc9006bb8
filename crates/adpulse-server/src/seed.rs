use crate::config::{CampaignSeedFile, SeedCampaign};
use adpulse_alert::catalog::{default_monitors, FormulaMetric};
use adpulse_common::types::Campaign;
use adpulse_storage::engine::SqliteRecordStore;
use anyhow::Result;
use chrono::Utc;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub campaigns_upserted: usize,
    pub campaigns_skipped: usize,
    pub monitors_created: usize,
}

/// Upserts `campaign` and creates its default monitors when it has none.
///
/// Returns the number of monitors created. Running it again for a campaign
/// that already has monitors only refreshes the campaign record.
pub fn enable_monitoring(
    store: &SqliteRecordStore,
    campaign: &Campaign,
    formulas: &[FormulaMetric],
) -> Result<usize> {
    store.upsert_campaign(campaign)?;

    if !store.list_monitors(&campaign.id)?.is_empty() {
        tracing::info!(
            campaign_id = %campaign.id,
            "Campaign already has monitors, skipping default monitor creation"
        );
        return Ok(0);
    }

    let monitors = default_monitors(campaign, formulas, Utc::now());
    for monitor in &monitors {
        store.upsert_monitor(monitor)?;
    }
    tracing::info!(
        campaign_id = %campaign.id,
        count = monitors.len(),
        "Created default monitors"
    );
    Ok(monitors.len())
}

/// Enables monitoring for every campaign of a seed file. Invalid entries are
/// logged and skipped.
pub fn init_campaigns(store: &SqliteRecordStore, seed: &CampaignSeedFile) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for entry in &seed.campaigns {
        if let Err(reason) = validate(entry) {
            tracing::warn!(campaign_id = %entry.id, reason, "Skipping invalid seed campaign");
            report.campaigns_skipped += 1;
            continue;
        }

        let campaign = Campaign {
            id: entry.id.clone(),
            name: entry.name.clone(),
            daily_budget: entry.daily_budget,
            sensitivity: entry.sensitivity,
        };
        report.monitors_created += enable_monitoring(store, &campaign, &entry.formula_metrics)?;
        report.campaigns_upserted += 1;
    }

    Ok(report)
}

pub fn load_seed_file(path: &str) -> Result<CampaignSeedFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", path, e))
}

fn validate(entry: &SeedCampaign) -> std::result::Result<(), &'static str> {
    if entry.id.trim().is_empty() {
        return Err("empty id");
    }
    if !entry.daily_budget.is_finite() || entry.daily_budget < 0.0 {
        return Err("daily_budget must be a non-negative number");
    }
    if entry
        .formula_metrics
        .iter()
        .any(|f| f.id.trim().is_empty())
    {
        return Err("formula metric with empty id");
    }
    Ok(())
}
