//! Insight enrichment for alarms.
//!
//! An [`InsightGenerator`] turns an alarm snapshot into a short summary,
//! ranked root causes and recommendations. Enrichment is best-effort: the
//! alarm engine dispatches it after the alarm is stored and tolerates
//! failure or slowness.

pub mod generator;
pub mod models;
pub mod prompt;
pub mod providers;

pub use generator::{InsightGenerator, InsightRequest};
pub use providers::heuristic::HeuristicInsightGenerator;
pub use providers::openai::OpenAiCompatProvider;
