//! Fans a point out to one sub-task per split and folds the outcomes back in.

use std::sync::Arc;

use hs_scheduler::{reraise_most_important, Scheduler, TaskFuture};
use hs_store::ResultStore;
use hs_types::{
    HyperparameterPoint, PointResult, SearchError, SearchResult, Severity, SplitResult,
};
use tracing::{debug, info};

use crate::aggregate::aggregate_split_results;
use crate::monitor::CompletionMonitor;

/// Domain errors outrank hard interruptions, which outrank soft ones.
pub const FAILURE_PRIORITY: [Severity; 3] = [Severity::Domain, Severity::Hard, Severity::Soft];

/// Evaluates hyperparameter points on behalf of a search strategy.
pub trait PointEvaluator {
    /// Start evaluating `point`. The returned future resolves once every
    /// split is done, or fails with the most important split failure.
    fn evaluate(&mut self, point: &HyperparameterPoint) -> TaskFuture<PointResult>;
}

/// The evaluator used by real searches: cached results come from the
/// store, everything else goes through the scheduler.
pub struct SearchEvaluator {
    scheduler: Arc<dyn Scheduler>,
    store: Arc<dyn ResultStore>,
    n_splits: usize,
    max_n_iter: Option<usize>,
    n_iter: usize,
    monitor: Arc<CompletionMonitor>,
}

impl SearchEvaluator {
    pub fn new(scheduler: Arc<dyn Scheduler>, store: Arc<dyn ResultStore>, n_splits: usize) -> Self {
        Self {
            scheduler,
            store,
            n_splits,
            max_n_iter: None,
            n_iter: 0,
            monitor: Arc::new(CompletionMonitor::disabled()),
        }
    }

    pub fn with_max_n_iter(mut self, max_n_iter: Option<usize>) -> Self {
        self.max_n_iter = max_n_iter;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<CompletionMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Number of points submitted so far.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn split_future(
        &self,
        split_id: usize,
        point: &HyperparameterPoint,
        is_soft_interruptible: bool,
    ) -> TaskFuture<SplitResult> {
        match self.store.find_split_result(split_id, point) {
            Ok(Some(_)) if is_soft_interruptible && self.scheduler.soft_interrupted() => {
                TaskFuture::from_error(SearchError::soft("search interrupted"))
            }
            Ok(Some(cached)) => {
                debug!("Reusing stored result for split {} of {}", split_id, point);
                TaskFuture::from_result(cached)
            }
            Ok(None) => self
                .scheduler
                .schedule_work(is_soft_interruptible, split_id, point),
            Err(e) => TaskFuture::from_error(e),
        }
    }
}

impl PointEvaluator for SearchEvaluator {
    fn evaluate(&mut self, point: &HyperparameterPoint) -> TaskFuture<PointResult> {
        if let Some(max_n_iter) = self.max_n_iter {
            if self.n_iter >= max_n_iter {
                info!("Reached the maximum number of iterations ({})", max_n_iter);
                return TaskFuture::from_error(SearchError::soft(format!(
                    "maximum number of iterations ({max_n_iter}) reached"
                )));
            }
        }

        let first_point = self.n_iter == 0;
        if !first_point && self.scheduler.soft_interrupted() {
            debug!("Search interrupted, not evaluating {}", point);
            return TaskFuture::from_error(SearchError::soft("search interrupted"));
        }

        // Only split 0 of the first point survives soft interruption, so an
        // interrupted run still has one result to return.
        let futures: Vec<TaskFuture<SplitResult>> = (0..self.n_splits)
            .map(|split_id| self.split_future(split_id, point, !first_point || split_id > 0))
            .collect();
        self.n_iter += 1;

        let store = Arc::clone(&self.store);
        let monitor = Arc::clone(&self.monitor);
        TaskFuture::from_async(move || {
            reraise_most_important(&futures, &FAILURE_PRIORITY)?;
            let per_split = futures
                .iter()
                .map(TaskFuture::result)
                .collect::<SearchResult<Vec<SplitResult>>>()?;

            for _ in &per_split {
                monitor.record_completion();
            }
            store.append_split_results(&per_split)?;
            let aggregated = aggregate_split_results(&per_split)?;
            store.append_aggregated_result(&aggregated)?;

            Ok(PointResult {
                aggregated,
                per_split,
            })
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use hs_scheduler::WorkScheduler;
    use hs_store::{NoopResultStore, OnDiskResultStore};
    use tempfile::tempdir;

    fn point(a: i64) -> HyperparameterPoint {
        HyperparameterPoint::new().with("a", a).with("b", 10)
    }

    #[test]
    fn evaluates_every_split_and_persists() {
        let dir = tempdir().unwrap();
        let store = Arc::new(OnDiskResultStore::new(dir.path()).unwrap());
        store.init_result_file(Some(1), 2, 3, "R2", None).unwrap();
        let fitter = Arc::new(CountingEvaluator::new(3));
        let scheduler = Arc::new(WorkScheduler::new(Arc::clone(&fitter), 2).unwrap());

        let mut evaluator = SearchEvaluator::new(scheduler, store.clone(), 3);
        let result = evaluator.evaluate(&point(3)).result().unwrap();

        assert_eq!(result.per_split.len(), 3);
        assert_eq!(result.aggregated.parameters, point(3));
        assert_eq!(fitter.calls(), 3);
        assert_eq!(evaluator.n_iter(), 1);
        assert_eq!(store.split_results().unwrap().len(), 3);
        assert_eq!(store.scores().unwrap().unwrap().grid_points.len(), 1);
    }

    #[test]
    fn fully_cached_point_never_reaches_the_fitter() {
        let dir = tempdir().unwrap();
        let store = Arc::new(OnDiskResultStore::new(dir.path()).unwrap());
        store.init_result_file(Some(1), 1, 2, "R2", None).unwrap();
        store
            .append_split_results(&[split_result(&point(1), 0), split_result(&point(1), 1)])
            .unwrap();

        let fitter = Arc::new(CountingEvaluator::new(2));
        let scheduler = Arc::new(WorkScheduler::new(Arc::clone(&fitter), 1).unwrap());
        let mut evaluator = SearchEvaluator::new(scheduler, store, 2);

        let result = evaluator.evaluate(&point(1)).result().unwrap();
        assert_eq!(result.per_split.len(), 2);
        assert_eq!(fitter.calls(), 0);
    }

    #[test]
    fn partially_cached_point_only_fits_missing_splits() {
        let dir = tempdir().unwrap();
        let store = Arc::new(OnDiskResultStore::new(dir.path()).unwrap());
        store.init_result_file(None, 1, 2, "R2", None).unwrap();
        store.append_split_results(&[split_result(&point(1), 0)]).unwrap();

        let fitter = Arc::new(CountingEvaluator::new(2));
        let scheduler = Arc::new(WorkScheduler::new(Arc::clone(&fitter), 1).unwrap());
        let mut evaluator = SearchEvaluator::new(scheduler, store, 2);

        evaluator.evaluate(&point(1)).result().unwrap();
        assert_eq!(fitter.seen.lock().clone(), vec![(1, point(1))]);
    }

    #[test]
    fn iteration_cap_fails_softly_before_scheduling() {
        let scheduler = Arc::new(ScriptedScheduler::new(vec![]));
        let mut evaluator =
            SearchEvaluator::new(scheduler.clone(), Arc::new(NoopResultStore), 2).with_max_n_iter(Some(0));

        let future = evaluator.evaluate(&point(1));
        assert!(future.is_finished());
        assert!(future.result().unwrap_err().is_soft_interruption());
        assert!(scheduler.submitted.lock().is_empty());
        assert_eq!(evaluator.n_iter(), 0);
    }

    #[test]
    fn only_the_first_split_of_the_first_point_is_shielded() {
        let outcomes = (0..3)
            .map(|split_id| TaskFuture::from_result(split_result(&point(1), split_id)))
            .collect();
        let scheduler = Arc::new(ScriptedScheduler::new(outcomes));
        let mut evaluator = SearchEvaluator::new(scheduler.clone(), Arc::new(NoopResultStore), 3);

        evaluator.evaluate(&point(1)).result().unwrap();
        assert_eq!(
            scheduler.submitted.lock().clone(),
            vec![(false, 0), (true, 1), (true, 2)]
        );
    }

    #[test]
    fn later_points_are_fully_interruptible() {
        let outcomes = [1, 2]
            .into_iter()
            .flat_map(|a| {
                (0..2).map(move |split_id| TaskFuture::from_result(split_result(&point(a), split_id)))
            })
            .collect();
        let scheduler = Arc::new(ScriptedScheduler::new(outcomes));
        let mut evaluator = SearchEvaluator::new(scheduler.clone(), Arc::new(NoopResultStore), 2);

        evaluator.evaluate(&point(1)).result().unwrap();
        evaluator.evaluate(&point(2)).result().unwrap();
        assert_eq!(
            scheduler.submitted.lock().clone(),
            vec![(false, 0), (true, 1), (true, 0), (true, 1)]
        );
    }

    #[test]
    fn interrupted_search_stops_scheduling_after_the_first_point() {
        let outcomes = vec![TaskFuture::from_result(split_result(&point(1), 0))];
        let mut scheduler = ScriptedScheduler::new(outcomes);
        scheduler.soft = true;
        let scheduler = Arc::new(scheduler);
        let mut evaluator = SearchEvaluator::new(scheduler.clone(), Arc::new(NoopResultStore), 1);

        evaluator.evaluate(&point(1)).result().unwrap();
        let second = evaluator.evaluate(&point(2));
        assert!(second.is_finished());
        assert!(second.result().unwrap_err().is_soft_interruption());
        assert_eq!(scheduler.submitted.lock().clone(), vec![(false, 0)]);
        assert_eq!(evaluator.n_iter(), 1);
    }

    #[test]
    fn domain_error_beats_concurrent_soft_interruption() {
        let outcomes = vec![
            TaskFuture::from_error(SearchError::soft("timeout")),
            TaskFuture::from_error(SearchError::Evaluation {
                split_id: 1,
                message: "diverged".into(),
            }),
        ];
        let scheduler = Arc::new(ScriptedScheduler::new(outcomes));
        let mut evaluator = SearchEvaluator::new(scheduler, Arc::new(NoopResultStore), 2);

        let err = evaluator.evaluate(&point(1)).result().unwrap_err();
        assert!(matches!(err, SearchError::Evaluation { split_id: 1, .. }));
    }

    #[test]
    fn cached_interruptible_split_is_skipped_after_soft_interruption() {
        let dir = tempdir().unwrap();
        let store = Arc::new(OnDiskResultStore::new(dir.path()).unwrap());
        store
            .append_split_results(&[split_result(&point(1), 0), split_result(&point(1), 1)])
            .unwrap();
        let mut scheduler = ScriptedScheduler::new(vec![]);
        scheduler.soft = true;
        let mut evaluator = SearchEvaluator::new(Arc::new(scheduler), store, 2);

        let err = evaluator.evaluate(&point(1)).result().unwrap_err();
        assert!(err.is_soft_interruption());
    }

    #[test]
    fn aggregate_requires_initialised_store() {
        let dir = tempdir().unwrap();
        let store = Arc::new(OnDiskResultStore::new(dir.path()).unwrap());
        let outcomes = vec![TaskFuture::from_result(split_result(&point(1), 0))];
        let scheduler = Arc::new(ScriptedScheduler::new(outcomes));
        let mut evaluator = SearchEvaluator::new(scheduler, store, 1);

        let err = evaluator.evaluate(&point(1)).result().unwrap_err();
        assert!(matches!(err, SearchError::Persistence { .. }));
    }
}
