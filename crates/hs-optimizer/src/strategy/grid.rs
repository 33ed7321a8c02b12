//! Exhaustive grid search.

use std::collections::BTreeMap;

use hs_types::{config_error, AggregatedResult, HyperparameterPoint, ParameterValue, SearchResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use super::batch::explore_batch;
use super::SearchStrategy;
use crate::evaluator::PointEvaluator;
use crate::space::{SearchSpace, MAX_GRID_POINTS};

/// Evaluates every point of one or more parameter grids as a single batch.
#[derive(Debug, Clone)]
pub struct GridSearchStrategy {
    points: Vec<HyperparameterPoint>,
}

impl GridSearchStrategy {
    /// Build the grid from alternative dictionaries mapping each parameter to
    /// a list of values. A scalar value is treated as a one-element list.
    pub fn new(grids: Vec<BTreeMap<String, serde_json::Value>>) -> Self {
        let points = grids
            .into_iter()
            .flat_map(|grid| {
                let axes: Vec<(String, Vec<ParameterValue>)> = grid
                    .into_iter()
                    .map(|(name, values)| {
                        let values = match values {
                            serde_json::Value::Array(values) => values,
                            scalar => vec![scalar],
                        };
                        (name, values.into_iter().map(ParameterValue::from_json).collect())
                    })
                    .collect();
                cartesian_product(axes)
            })
            .collect();
        Self { points }
    }

    /// Build the grid of a typed space; continuous dimensions get
    /// `float_steps` evenly spaced values.
    pub fn from_space(space: &SearchSpace, float_steps: usize) -> SearchResult<Self> {
        space.validate()?;
        let axes: Vec<(String, Vec<ParameterValue>)> = space
            .parameters
            .iter()
            .map(|param| Ok((param.name.clone(), param.kind.grid_values(float_steps)?)))
            .collect::<SearchResult<_>>()?;
        let total = axes
            .iter()
            .try_fold(1usize, |total, (_, values)| total.checked_mul(values.len()));
        if !total.is_some_and(|total| total <= MAX_GRID_POINTS) {
            return Err(config_error!(
                "Grid over {} parameters exceeds {} points",
                axes.len(),
                MAX_GRID_POINTS
            ));
        }
        Ok(Self {
            points: cartesian_product(axes),
        })
    }

    /// Randomize the traversal order. The set of points is unchanged.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.points.shuffle(&mut rng);
        self
    }

    pub fn points(&self) -> &[HyperparameterPoint] {
        &self.points
    }
}

/// The first axis varies slowest.
fn cartesian_product(axes: Vec<(String, Vec<ParameterValue>)>) -> Vec<HyperparameterPoint> {
    let mut result = vec![HyperparameterPoint::new()];
    for (name, values) in &axes {
        let mut next = Vec::with_capacity(result.len() * values.len());
        for existing in &result {
            for value in values {
                let mut combo = existing.clone();
                combo.insert(name.clone(), value.clone());
                next.push(combo);
            }
        }
        result = next;
    }
    result
}

impl SearchStrategy for GridSearchStrategy {
    fn explore(&mut self, evaluator: &mut dyn PointEvaluator) -> SearchResult<Vec<AggregatedResult>> {
        info!("Exploring grid of {} points", self.points.len());
        let (results, interrupted) = explore_batch(evaluator, self.points.iter().cloned())?;
        if interrupted {
            info!(
                "Grid search interrupted after {} of {} points",
                results.len(),
                self.points.len()
            );
        }
        Ok(results.into_iter().map(|r| r.aggregated).collect())
    }

    fn experiments_count(&self) -> Option<usize> {
        Some(self.points.len())
    }

    fn name(&self) -> &str {
        "grid"
    }
}
