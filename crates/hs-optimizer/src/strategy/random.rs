//! Random search over an external point generator.

use hs_types::{contains_point, AggregatedResult, HyperparameterPoint, SearchResult};
use tracing::{info, warn};

use super::batch::explore_batch;
use super::SearchStrategy;
use crate::evaluator::PointEvaluator;

/// Upper bound on the number of samples requested from a generator,
/// duplicates included.
pub const MAX_RANDOM_POINTS: usize = 1 << 31;

/// Consecutive duplicate samples after which a generator counts as exhausted.
pub const MAX_CONSECUTIVE_DUPLICATES: usize = 100;

/// Source of candidate points. `None` means the generator is exhausted.
pub trait PointGenerator {
    fn sample(&mut self) -> Option<HyperparameterPoint>;
}

/// Evaluates distinct points drawn lazily from a generator until the search
/// is interrupted or the generator runs dry.
pub struct RandomSearchStrategy {
    generator: Box<dyn PointGenerator>,
}

impl RandomSearchStrategy {
    pub fn new(generator: Box<dyn PointGenerator>) -> Self {
        Self { generator }
    }
}

/// Iterator over the distinct points of a generator, drawing at most
/// `max_requests` samples in total.
struct DistinctPoints<'a> {
    generator: &'a mut dyn PointGenerator,
    seen: Vec<HyperparameterPoint>,
    requested: usize,
    max_requests: usize,
}

impl<'a> DistinctPoints<'a> {
    fn new(generator: &'a mut dyn PointGenerator, max_requests: usize) -> Self {
        Self {
            generator,
            seen: Vec::new(),
            requested: 0,
            max_requests,
        }
    }
}

impl Iterator for DistinctPoints<'_> {
    type Item = HyperparameterPoint;

    fn next(&mut self) -> Option<HyperparameterPoint> {
        let mut duplicates = 0;
        loop {
            if self.requested >= self.max_requests {
                return None;
            }
            self.requested += 1;
            let point = self.generator.sample()?;
            if !contains_point(&self.seen, &point) {
                self.seen.push(point.clone());
                return Some(point);
            }
            duplicates += 1;
            if duplicates >= MAX_CONSECUTIVE_DUPLICATES {
                warn!(
                    "Random search space exhausted after {} distinct points",
                    self.seen.len()
                );
                return None;
            }
        }
    }
}

impl SearchStrategy for RandomSearchStrategy {
    fn explore(&mut self, evaluator: &mut dyn PointEvaluator) -> SearchResult<Vec<AggregatedResult>> {
        let points = DistinctPoints::new(self.generator.as_mut(), MAX_RANDOM_POINTS);
        let (results, interrupted) = explore_batch(evaluator, points)?;
        info!(
            "Random search evaluated {} points (interrupted: {})",
            results.len(),
            interrupted
        );
        Ok(results.into_iter().map(|r| r.aggregated).collect())
    }

    fn experiments_count(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str {
        "random"
    }
}
