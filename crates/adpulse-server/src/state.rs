use crate::config::{InsightsConfig, ServerConfig};
use crate::metrics::StoredMetricSource;
use adpulse_ai::{HeuristicInsightGenerator, InsightGenerator, OpenAiCompatProvider};
use adpulse_alert::engine::MonitorEngine;
use adpulse_storage::engine::SqliteRecordStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteRecordStore>,
    pub engine: Arc<MonitorEngine>,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Opens the database under `config.data_dir` and wires the engine.
    pub fn open(config: ServerConfig) -> Result<Self> {
        let store = Arc::new(SqliteRecordStore::new(Path::new(&config.data_dir))?);
        Self::with_store(config, store)
    }

    pub fn with_store(config: ServerConfig, store: Arc<SqliteRecordStore>) -> Result<Self> {
        let source = Arc::new(StoredMetricSource::new(store.clone()));
        let mut engine = MonitorEngine::new(store.clone(), source);
        if let Some(generator) = build_insight_generator(&config.insights)? {
            engine = engine.with_insights(
                generator,
                Duration::from_secs(config.engine.insight_timeout_secs),
                &config.engine.locale,
            );
        }

        Ok(Self {
            store,
            engine: Arc::new(engine),
            start_time: Utc::now(),
            config: Arc::new(config),
        })
    }
}

/// Builds the configured insight generator. `none` disables enrichment.
pub fn build_insight_generator(
    config: &InsightsConfig,
) -> Result<Option<Arc<dyn InsightGenerator>>> {
    match config.provider.as_str() {
        "none" => Ok(None),
        "heuristic" => Ok(Some(Arc::new(HeuristicInsightGenerator::new()))),
        "openai" => {
            let api_key = config
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!("[insights].api_key is required for provider openai")
                })?;
            let provider = OpenAiCompatProvider::new(
                api_key,
                config.model.clone(),
                config.base_url.clone(),
                config.timeout_secs,
                config.max_tokens,
                config.temperature,
            )?;
            Ok(Some(Arc::new(provider)))
        }
        other => {
            anyhow::bail!("unknown insights provider '{other}' (expected heuristic, openai or none)")
        }
    }
}
