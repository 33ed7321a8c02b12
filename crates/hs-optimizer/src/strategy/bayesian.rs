//! Sequential model-based search.

use std::time::{Duration, Instant};

use hs_types::{contains_point, AggregatedResult, HyperparameterPoint, ParameterValue, SearchResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::batch::explore_batch;
use super::SearchStrategy;
use crate::diagnostics::{Advisory, AdvisoryKind, Diagnostics};
use crate::evaluator::PointEvaluator;
use crate::space::{ParameterKind, SearchSpace};

/// Points requested from the optimizer per iteration.
pub const BAYESIAN_BATCH_SIZE: usize = 4;

/// Optimizer time per iteration above which a slowness advisory is raised.
pub const SLOW_OPTIMIZER_THRESHOLD: Duration = Duration::from_secs(60);

/// An optimizer proposing points from the losses it has been told about.
/// Lower losses are better.
pub trait SequentialOptimizer {
    fn ask(&mut self, n_points: usize) -> SearchResult<Vec<HyperparameterPoint>>;

    fn tell(&mut self, points: &[HyperparameterPoint], losses: &[f64]) -> SearchResult<()>;
}

pub struct BayesianSearchStrategy {
    optimizer: Box<dyn SequentialOptimizer>,
    batch_size: usize,
    slow_threshold: Duration,
    diagnostics: Diagnostics,
    slow_advised: bool,
}

impl BayesianSearchStrategy {
    pub fn new(optimizer: Box<dyn SequentialOptimizer>) -> Self {
        Self {
            optimizer,
            batch_size: BAYESIAN_BATCH_SIZE,
            slow_threshold: SLOW_OPTIMIZER_THRESHOLD,
            diagnostics: Diagnostics::new(),
            slow_advised: false,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    fn check_optimizer_time(&mut self, spent: Duration) {
        if self.slow_advised || spent <= self.slow_threshold {
            return;
        }
        self.slow_advised = true;
        self.diagnostics.emit(Advisory::new(
            AdvisoryKind::SlowOptimizer,
            format!(
                "Bayesian optimizer spent {:.1}s proposing points in one iteration; \
                 consider a cheaper search strategy",
                spent.as_secs_f64()
            ),
        ));
    }
}

impl SearchStrategy for BayesianSearchStrategy {
    fn explore(&mut self, evaluator: &mut dyn PointEvaluator) -> SearchResult<Vec<AggregatedResult>> {
        let mut seen: Vec<HyperparameterPoint> = Vec::new();
        let mut explored = Vec::new();

        loop {
            let ask_started = Instant::now();
            let proposed = self.optimizer.ask(self.batch_size)?;
            let mut optimizer_time = ask_started.elapsed();

            let mut batch = Vec::with_capacity(proposed.len());
            for point in proposed {
                if !contains_point(&seen, &point) {
                    seen.push(point.clone());
                    batch.push(point);
                }
            }
            if batch.is_empty() {
                info!("Bayesian optimizer exhausted after {} points", seen.len());
                break;
            }

            let (results, interrupted) = explore_batch(evaluator, batch)?;
            if !results.is_empty() {
                let points: Vec<HyperparameterPoint> =
                    results.iter().map(|r| r.aggregated.parameters.clone()).collect();
                let losses: Vec<f64> = results
                    .iter()
                    .map(|r| -r.aggregated.test_score_gib_mean)
                    .collect();
                let tell_started = Instant::now();
                self.optimizer.tell(&points, &losses)?;
                optimizer_time += tell_started.elapsed();
            }
            self.check_optimizer_time(optimizer_time);

            explored.extend(results.into_iter().map(|r| r.aggregated));
            if interrupted {
                break;
            }
        }

        Ok(explored)
    }

    fn experiments_count(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}

/// Default optimizer: samples the space uniformly, then increasingly
/// perturbs the best observed point.
///
/// With probability `exploration_weight` each proposal is a fresh uniform
/// sample; otherwise it is a small perturbation of the lowest-loss point.
#[derive(Debug)]
pub struct SurrogateOptimizer {
    space: SearchSpace,
    observations: Vec<(HyperparameterPoint, f64)>,
    exploration_weight: f64,
    rng: StdRng,
}

impl SurrogateOptimizer {
    pub fn new(space: SearchSpace, exploration_weight: f64, seed: u64) -> SearchResult<Self> {
        space.validate()?;
        Ok(Self {
            space,
            observations: Vec::new(),
            exploration_weight,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn observations(&self) -> &[(HyperparameterPoint, f64)] {
        &self.observations
    }

    fn best_observed(&self) -> Option<&HyperparameterPoint> {
        self.observations
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(point, _)| point)
    }

    fn exploit(&mut self, base: &HyperparameterPoint) -> HyperparameterPoint {
        let rng = &mut self.rng;
        self.space
            .parameters
            .iter()
            .map(|param| {
                let value = match (&param.kind, base.get(&param.name)) {
                    (ParameterKind::FloatRange { low, high }, Some(ParameterValue::Float(v))) => {
                        let noise = rng.random_range(-0.1..0.1) * (high - low);
                        ParameterValue::Float((v + noise).clamp(*low, *high))
                    }
                    (ParameterKind::IntRange { low, high }, Some(ParameterValue::Int(v))) => {
                        let delta: i64 = rng.random_range(-2..=2);
                        ParameterValue::Int(v.saturating_add(delta).clamp(*low, *high))
                    }
                    (ParameterKind::LogUniform { low, high }, Some(ParameterValue::Float(v))) => {
                        let noise = rng.random_range(-0.1..0.1) * (high.ln() - low.ln());
                        ParameterValue::Float((v.ln() + noise).exp().clamp(*low, *high))
                    }
                    // Choices and missing values are resampled.
                    (kind, _) => kind.sample(rng),
                };
                (param.name.clone(), value)
            })
            .collect()
    }
}

impl SequentialOptimizer for SurrogateOptimizer {
    fn ask(&mut self, n_points: usize) -> SearchResult<Vec<HyperparameterPoint>> {
        let mut proposals = Vec::with_capacity(n_points);
        for _ in 0..n_points {
            let best = self.best_observed().cloned();
            let point = match best {
                Some(best) if self.rng.random::<f64>() >= self.exploration_weight => {
                    self.exploit(&best)
                }
                _ => self.space.sample_point(&mut self.rng),
            };
            proposals.push(point);
        }
        Ok(proposals)
    }

    fn tell(&mut self, points: &[HyperparameterPoint], losses: &[f64]) -> SearchResult<()> {
        debug!("Surrogate optimizer told {} observations", points.len());
        self.observations
            .extend(points.iter().cloned().zip(losses.iter().copied()));
        Ok(())
    }
}
