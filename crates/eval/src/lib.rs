//! Experiment runner and entity-level scoring for the Few-NERD prompt comparisons.

pub mod config;
pub mod results;
pub mod runner;
pub mod scoring;

pub use config::{ExperimentConfig, VariationSource, embedding_from_env, endpoint_from_env, load_dotenv};
pub use results::{ExampleResult, ResultsWriter, RunEvent, RunRecord, recover_run};
pub use runner::ExperimentRunner;
pub use scoring::{AggregateScore, Counts, ScoreRecord, TypeScore, aggregate, match_entities, score};
