pub mod heuristic;
pub mod openai;
