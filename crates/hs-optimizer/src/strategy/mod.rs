//! Search strategies: how candidate points are produced and submitted.

pub mod batch;
pub mod bayesian;
pub mod grid;
pub mod random;

use hs_scheduler::TaskFuture;
use hs_types::{AggregatedResult, HyperparameterPoint, PointResult, SearchError, SearchResult};

use crate::evaluator::PointEvaluator;

pub use batch::explore_batch;
pub use bayesian::{BayesianSearchStrategy, SequentialOptimizer, SurrogateOptimizer};
pub use grid::GridSearchStrategy;
pub use random::{PointGenerator, RandomSearchStrategy};

/// Common trait for all search strategies.
pub trait SearchStrategy {
    /// Evaluate candidates until the strategy is exhausted or the search is
    /// soft-interrupted. Domain errors and hard interruptions propagate.
    fn explore(&mut self, evaluator: &mut dyn PointEvaluator) -> SearchResult<Vec<AggregatedResult>>;

    /// Planned number of candidates, `None` when unbounded.
    fn experiments_count(&self) -> Option<usize>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;

    /// The first point this strategy would try, found without fitting anything.
    fn default_parameters(&mut self) -> SearchResult<HyperparameterPoint> {
        let mut recorder = FirstPointRecorder::default();
        self.explore(&mut recorder)?;
        recorder.first.ok_or(SearchError::EmptySearchSpace)
    }
}

/// Records the first requested point and stops the search right away.
#[derive(Debug, Default)]
struct FirstPointRecorder {
    first: Option<HyperparameterPoint>,
}

impl PointEvaluator for FirstPointRecorder {
    fn evaluate(&mut self, point: &HyperparameterPoint) -> TaskFuture<PointResult> {
        if self.first.is_none() {
            self.first = Some(point.clone());
        }
        TaskFuture::from_error(SearchError::soft("looking up default parameters"))
    }
}
