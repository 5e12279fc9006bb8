/// Failures of a single monitor evaluation or alarm operation.
///
/// Orchestrated evaluations report these per monitor and keep going.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// The metric source could not provide a value. The monitor's previous
    /// state is left untouched.
    #[error("metric source unavailable for monitor {monitor_id} ({metric_id}): {source}")]
    MetricSource {
        monitor_id: String,
        metric_id: String,
        source: anyhow::Error,
    },

    /// The monitor's configuration cannot be evaluated (e.g. a composite
    /// window of zero).
    #[error("invalid configuration for monitor {monitor_id}: {reason}")]
    InvalidConfig { monitor_id: String, reason: String },

    #[error("record store error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("alarm {0} not found")]
    AlarmNotFound(String),
}

impl EvaluationError {
    /// Short machine-readable kind, used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            EvaluationError::MetricSource { .. } => "metric_source_unavailable",
            EvaluationError::InvalidConfig { .. } => "invalid_config",
            EvaluationError::Storage(_) => "storage_error",
            EvaluationError::AlarmNotFound(_) => "not_found",
        }
    }
}

pub type Result<T> = std::result::Result<T, EvaluationError>;
