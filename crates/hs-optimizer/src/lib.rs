//! # hs-optimizer
//!
//! Resumable hyperparameter search on top of the `hs-scheduler` worker pool
//! and the `hs-store` result files.
//!
//! Provides split-result aggregation, the point evaluator, grid, random and
//! Bayesian search strategies, and the [`SearchRunner`] tying them together.

pub mod aggregate;
pub mod config;
pub mod diagnostics;
pub mod evaluator;
pub mod monitor;
pub mod runner;
pub mod space;
pub mod strategy;

pub use aggregate::aggregate_split_results;
pub use config::{SearchConfig, SearchId, StrategyConfig};
pub use diagnostics::{Advisory, AdvisoryKind, Diagnostics};
pub use evaluator::{PointEvaluator, SearchEvaluator, FAILURE_PRIORITY};
pub use monitor::CompletionMonitor;
pub use runner::{GridCell, ScoreSummary, SearchRunner};
pub use space::{ParameterDef, ParameterKind, SearchSpace, SpaceSampler};
pub use strategy::{
    explore_batch, BayesianSearchStrategy, GridSearchStrategy, PointGenerator,
    RandomSearchStrategy, SearchStrategy, SequentialOptimizer, SurrogateOptimizer,
};
