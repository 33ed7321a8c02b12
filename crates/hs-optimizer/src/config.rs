//! Search run configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use hs_types::{config_error, SearchResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diagnostics::Diagnostics;
use crate::space::{SearchSpace, SpaceSampler};
use crate::strategy::{
    BayesianSearchStrategy, GridSearchStrategy, RandomSearchStrategy, SearchStrategy,
    SurrogateOptimizer,
};

/// Unique search run identifier.
pub type SearchId = Uuid;

/// Which strategy produces candidates, with its own settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Explicit value lists, one dictionary per alternative grid.
    Grid {
        grids: Vec<BTreeMap<String, serde_json::Value>>,
        #[serde(default)]
        shuffle_seed: Option<u64>,
    },
    /// Grid over a typed space.
    SpaceGrid {
        space: SearchSpace,
        #[serde(default = "default_float_steps")]
        float_steps: usize,
        #[serde(default)]
        shuffle_seed: Option<u64>,
    },
    Random {
        space: SearchSpace,
        #[serde(default)]
        seed: u64,
    },
    Bayesian {
        space: SearchSpace,
        #[serde(default = "default_exploration_weight")]
        exploration_weight: f64,
        #[serde(default)]
        seed: u64,
    },
}

fn default_float_steps() -> usize {
    5
}

fn default_exploration_weight() -> f64 {
    0.3
}

impl StrategyConfig {
    pub fn build(&self, diagnostics: &Diagnostics) -> SearchResult<Box<dyn SearchStrategy>> {
        let strategy: Box<dyn SearchStrategy> = match self {
            Self::Grid { grids, shuffle_seed } => {
                let grid = GridSearchStrategy::new(grids.clone());
                Box::new(match shuffle_seed {
                    Some(seed) => grid.with_shuffle(*seed),
                    None => grid,
                })
            }
            Self::SpaceGrid {
                space,
                float_steps,
                shuffle_seed,
            } => {
                let grid = GridSearchStrategy::from_space(space, *float_steps)?;
                Box::new(match shuffle_seed {
                    Some(seed) => grid.with_shuffle(*seed),
                    None => grid,
                })
            }
            Self::Random { space, seed } => Box::new(RandomSearchStrategy::new(Box::new(
                SpaceSampler::new(space.clone(), *seed)?,
            ))),
            Self::Bayesian {
                space,
                exploration_weight,
                seed,
            } => {
                if !(0.0..=1.0).contains(exploration_weight) {
                    return Err(config_error!(
                        "exploration_weight must be within [0, 1], got {}",
                        exploration_weight
                    ));
                }
                let optimizer = SurrogateOptimizer::new(space.clone(), *exploration_weight, *seed)?;
                Box::new(
                    BayesianSearchStrategy::new(Box::new(optimizer))
                        .with_diagnostics(diagnostics.clone()),
                )
            }
        };
        Ok(strategy)
    }
}

/// Top-level configuration for a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub id: SearchId,
    pub strategy: StrategyConfig,
    /// Maximum number of points to evaluate.
    pub n_iter: Option<usize>,
    /// Wall-clock budget in minutes.
    pub timeout_minutes: Option<f64>,
    /// Worker threads; 0 uses the available parallelism.
    pub n_threads: usize,
    /// Metric name recorded in the scores file.
    pub metric: String,
    /// Run directory for resumable results. Nothing is persisted when unset.
    pub output_dir: Option<PathBuf>,
    /// Creating this file soft-interrupts the search. Relative paths are
    /// resolved against `output_dir`.
    pub interrupt_file: Option<PathBuf>,
    /// Whether distributed execution could be used for this run.
    pub distributed_available: bool,
    /// Parameter receiving `best_iteration + 1` for the final refit, for
    /// methods with internal early stopping (e.g. "n_estimators").
    pub refit_iterations_param: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy: StrategyConfig::Grid {
                grids: Vec::new(),
                shuffle_seed: None,
            },
            n_iter: None,
            timeout_minutes: None,
            n_threads: 0,
            metric: "score".to_string(),
            output_dir: None,
            interrupt_file: None,
            distributed_available: false,
            refit_iterations_param: None,
        }
    }
}

impl SearchConfig {
    pub fn new(strategy: StrategyConfig) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Load a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> SearchResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| config_error!("Cannot read config {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| config_error!("Invalid config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SearchResult<()> {
        if let Some(timeout) = self.timeout_minutes {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(config_error!(
                    "timeout_minutes must be positive and finite, got {}",
                    timeout
                ));
            }
        }
        if self.metric.is_empty() {
            return Err(config_error!("metric must not be empty"));
        }
        Ok(())
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = Some(n_iter);
        self
    }

    pub fn with_timeout_minutes(mut self, minutes: f64) -> Self {
        self.timeout_minutes = Some(minutes);
        self
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    pub fn with_metric(mut self, metric: &str) -> Self {
        self.metric = metric.to_string();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_interrupt_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.interrupt_file = Some(path.into());
        self
    }

    pub fn with_distributed_available(mut self, available: bool) -> Self {
        self.distributed_available = available;
        self
    }

    pub fn with_refit_iterations_param(mut self, name: &str) -> Self {
        self.refit_iterations_param = Some(name.to_string());
        self
    }

    /// Number of worker threads to start.
    pub fn worker_count(&self) -> usize {
        if self.n_threads > 0 {
            return self.n_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn interrupt_path(&self) -> Option<PathBuf> {
        let file = self.interrupt_file.as_ref()?;
        match &self.output_dir {
            Some(dir) if file.is_relative() => Some(dir.join(file)),
            _ => Some(file.clone()),
        }
    }
}
