use adpulse_alert::catalog::FormulaMetric;
use adpulse_common::types::Sensitivity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Allowed CORS origins. Empty allows any origin (development mode).
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub insights: InsightsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            cors_allowed_origins: Vec::new(),
            engine: EngineConfig::default(),
            insights: InsightsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for one insight generation before it is abandoned.
    #[serde(default = "default_insight_timeout_secs")]
    pub insight_timeout_secs: u64,
    /// Language of generated insights (`en` or `zh-CN`).
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            insight_timeout_secs: default_insight_timeout_secs(),
            locale: default_locale(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsConfig {
    /// `heuristic`, `openai` or `none`.
    #[serde(default = "default_insights_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            provider: default_insights_provider(),
            api_key: None,
            model: None,
            base_url: None,
            timeout_secs: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_insight_timeout_secs() -> u64 {
    30
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_insights_provider() -> String {
    "heuristic".to_string()
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

// ---- Seed file types (used by `init-campaigns` CLI subcommand) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSeedFile {
    #[serde(default)]
    pub campaigns: Vec<SeedCampaign>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCampaign {
    pub id: String,
    pub name: String,
    pub daily_budget: f64,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub formula_metrics: Vec<FormulaMetric>,
}
