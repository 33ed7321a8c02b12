//! Drives a whole search: scheduler, store, interrupt watcher and strategy.

use std::sync::Arc;
use std::time::Duration;

use hs_scheduler::{InterruptWatcher, Scheduler, SplitEvaluator, WorkScheduler};
use hs_store::{NoopResultStore, OnDiskResultStore, ResultStore};
use hs_types::{
    config_error, AggregatedResult, HyperparameterPoint, ParameterValue, SearchError,
    SearchResult,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SearchConfig;
use crate::diagnostics::Diagnostics;
use crate::evaluator::SearchEvaluator;
use crate::monitor::CompletionMonitor;
use crate::strategy::SearchStrategy;

/// One explored point in a [`ScoreSummary`]. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub params: HyperparameterPoint,
    pub score: f64,
    pub score_std: f64,
    pub fit_time: f64,
    pub fit_time_std: f64,
    pub score_time: f64,
    pub score_time_std: f64,
}

/// What a finished search reports about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub used_grid_search: bool,
    pub grid_size: usize,
    pub grid_best_score: Option<f64>,
    pub grid_cells: Vec<GridCell>,
}

pub struct SearchRunner {
    config: SearchConfig,
    strategy: Box<dyn SearchStrategy>,
    diagnostics: Diagnostics,
    aggregated_results: Vec<AggregatedResult>,
    best_result: Option<AggregatedResult>,
}

impl SearchRunner {
    /// Build the runner and the strategy described by `config`.
    pub fn new(config: SearchConfig, diagnostics: Diagnostics) -> SearchResult<Self> {
        config.validate()?;
        let strategy = config.strategy.build(&diagnostics)?;
        Ok(Self::from_strategy(config, strategy, diagnostics))
    }

    /// Build the runner around an already constructed strategy; the
    /// strategy settings in `config` are ignored.
    pub fn from_strategy(
        config: SearchConfig,
        strategy: Box<dyn SearchStrategy>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            config,
            strategy,
            diagnostics,
            aggregated_results: Vec::new(),
            best_result: None,
        }
    }

    /// Planned number of candidates, capped by `n_iter`.
    pub fn experiments_count(&self) -> Option<usize> {
        match (self.strategy.experiments_count(), self.config.n_iter) {
            (Some(count), Some(n_iter)) => Some(count.min(n_iter)),
            (None, n_iter) => n_iter,
            (count, None) => count,
        }
    }

    /// Whether the search is pointless because at most one candidate would
    /// be tried. A search is always run when the final refit needs the
    /// iteration count it discovers.
    pub fn search_skipped(&self) -> bool {
        if self.config.refit_iterations_param.is_some() {
            return false;
        }
        matches!(self.experiments_count(), Some(count) if count <= 1)
    }

    /// Run the search and return the parameters to refit with.
    pub fn run<E: SplitEvaluator>(&mut self, split_evaluator: Arc<E>) -> SearchResult<HyperparameterPoint> {
        if self.search_skipped() {
            info!("Got single-point space, not performing hyperparameter search");
            return self.strategy.default_parameters();
        }
        self.config.validate()?;
        let timeout = self
            .config
            .timeout_minutes
            .map(|minutes| {
                Duration::try_from_secs_f64(minutes * 60.0)
                    .map_err(|e| config_error!("Invalid timeout of {} minutes: {}", minutes, e))
            })
            .transpose()?;

        let n_splits = split_evaluator.n_splits();
        let nb_experiments = self.experiments_count();
        match nb_experiments {
            Some(count) => info!(
                "Fitting {} splits for each of {} candidates, totalling {} fits",
                n_splits,
                count,
                count * n_splits
            ),
            None => info!(
                "Fitting {} splits for each candidate, for {:?} minutes",
                n_splits, self.config.timeout_minutes
            ),
        }

        let store: Arc<dyn ResultStore> = match &self.config.output_dir {
            Some(dir) => Arc::new(OnDiskResultStore::new(dir)?),
            None => Arc::new(NoopResultStore),
        };
        let scheduler = Arc::new(WorkScheduler::new(split_evaluator, self.config.worker_count())?);
        info!(
            "Search {} running {} locally on {} threads",
            self.config.id,
            self.strategy.name(),
            scheduler.workers_count()
        );

        store.init_result_file(
            nb_experiments,
            scheduler.workers_count(),
            n_splits,
            &self.config.metric,
            self.config.timeout_minutes,
        )?;

        let monitor = Arc::new(CompletionMonitor::new(
            self.config.distributed_available,
            false,
            self.diagnostics.clone(),
        ));
        let mut evaluator = SearchEvaluator::new(scheduler.clone(), Arc::clone(&store), n_splits)
            .with_max_n_iter(self.config.n_iter)
            .with_monitor(monitor);

        let watcher = InterruptWatcher::start(scheduler.clone(), timeout, self.config.interrupt_path())?;
        let explored = self.strategy.explore(&mut evaluator);
        watcher.stop();
        scheduler.shutdown();

        self.aggregated_results = explored?;
        store.update_final_grid_size()?;

        let best = self
            .aggregated_results
            .iter()
            .reduce(|best, r| {
                if r.test_score_gib_mean > best.test_score_gib_mean {
                    r
                } else {
                    best
                }
            })
            .cloned()
            .ok_or(SearchError::EmptySearchSpace)?;

        let mut best_parameters = best.parameters.clone();
        if let (Some(param), Some(iteration)) =
            (&self.config.refit_iterations_param, best.best_iteration)
        {
            // Iterations are counted from 0.
            best_parameters.insert(param.clone(), ParameterValue::Int(i64::from(iteration) + 1));
        }
        self.best_result = Some(best);

        info!(
            "Hyperparameter search done, best parameters being: {}",
            best_parameters
        );
        Ok(best_parameters)
    }

    pub fn aggregated_results(&self) -> &[AggregatedResult] {
        &self.aggregated_results
    }

    pub fn best_result(&self) -> Option<&AggregatedResult> {
        self.best_result.as_ref()
    }

    pub fn score_summary(&self) -> ScoreSummary {
        ScoreSummary {
            used_grid_search: !self.search_skipped(),
            grid_size: self.aggregated_results.len(),
            grid_best_score: self.best_result.as_ref().map(|r| r.test_score_mean),
            grid_cells: self
                .aggregated_results
                .iter()
                .map(|r| GridCell {
                    params: r.parameters.clone(),
                    score: r.test_score_mean,
                    score_std: r.test_score_std,
                    fit_time: r.fit_time_mean / 1000.0,
                    fit_time_std: r.fit_time_std / 1000.0,
                    score_time: r.score_time_mean / 1000.0,
                    score_time_std: r.score_time_std / 1000.0,
                })
                .collect(),
        }
    }
}
