//! Submission and collection of a batch of points.

use hs_scheduler::{reraise_most_important, TaskFuture};
use hs_types::{HyperparameterPoint, PointResult, SearchResult};
use tracing::debug;

use crate::evaluator::{PointEvaluator, FAILURE_PRIORITY};

/// Submit `points` in order and collect their results in submission order.
///
/// Submission stops early once any already-finished future has failed.
/// A soft interruption is a clean stop: the results up to the first failed
/// point are returned with `interrupted == true`, even when later points
/// succeeded. Any other failure is returned as an error.
pub fn explore_batch<I>(
    evaluator: &mut dyn PointEvaluator,
    points: I,
) -> SearchResult<(Vec<PointResult>, bool)>
where
    I: IntoIterator<Item = HyperparameterPoint>,
{
    let mut futures: Vec<TaskFuture<PointResult>> = Vec::new();
    // Every future before this index finished successfully.
    let mut settled_ok = 0;

    for point in points {
        futures.push(evaluator.evaluate(&point));

        while settled_ok < futures.len()
            && futures[settled_ok].is_finished()
            && futures[settled_ok].peek_error().is_none()
        {
            settled_ok += 1;
        }
        if futures[settled_ok..].iter().any(|f| f.peek_error().is_some()) {
            debug!("Stopping submission after {} points: a point failed", futures.len());
            break;
        }
    }

    let interrupted = match reraise_most_important(&futures, &FAILURE_PRIORITY) {
        Ok(()) => false,
        Err(e) if e.is_soft_interruption() => true,
        Err(e) => return Err(e),
    };

    let results = futures
        .iter()
        .map_while(|f| f.result().ok())
        .collect();
    Ok((results, interrupted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing::{point_result, succeeding, FnEvaluator};
    use hs_types::SearchError;
    use std::time::Duration;

    fn points(n: i64) -> Vec<HyperparameterPoint> {
        (0..n).map(|a| HyperparameterPoint::new().with("a", a)).collect()
    }

    #[test]
    fn results_follow_submission_order_not_completion_order() {
        let mut evaluator = FnEvaluator::new(|index, point| {
            let point = point.clone();
            // Earlier points finish last.
            let delay = Duration::from_millis(40 - 10 * index as u64);
            TaskFuture::from_async(move || {
                std::thread::sleep(delay);
                Ok(point_result(&point))
            })
        });

        let (results, interrupted) = explore_batch(&mut evaluator, points(4)).unwrap();
        assert!(!interrupted);
        let order: Vec<_> = results.iter().map(|r| r.aggregated.parameters.clone()).collect();
        assert_eq!(order, points(4));
    }

    #[test]
    fn soft_failure_truncates_even_when_later_points_succeed() {
        let mut evaluator = FnEvaluator::new(|index, point| match index {
            1 => TaskFuture::from_async(|| {
                std::thread::sleep(Duration::from_millis(20));
                Err(SearchError::soft("timeout"))
            }),
            _ => TaskFuture::from_result(point_result(point)),
        });

        let (results, interrupted) = explore_batch(&mut evaluator, points(4)).unwrap();
        assert!(interrupted);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].aggregated.parameters, points(1)[0]);
    }

    #[test]
    fn stops_submitting_after_an_observed_failure() {
        let mut evaluator = FnEvaluator::new(|index, point| {
            if index == 2 {
                TaskFuture::from_error(SearchError::soft("cap"))
            } else {
                TaskFuture::from_result(point_result(point))
            }
        });

        let (results, interrupted) = explore_batch(&mut evaluator, points(10)).unwrap();
        assert!(interrupted);
        assert_eq!(results.len(), 2);
        assert_eq!(evaluator.requested.len(), 3);
    }

    #[test]
    fn domain_error_wins_over_soft_interruption() {
        let mut evaluator = FnEvaluator::new(|index, point| match index {
            0 => TaskFuture::from_async(|| {
                std::thread::sleep(Duration::from_millis(20));
                Err(SearchError::Evaluation {
                    split_id: 0,
                    message: "bad fit".into(),
                })
            }),
            1 => TaskFuture::from_error(SearchError::soft("user")),
            _ => TaskFuture::from_result(point_result(point)),
        });

        let err = explore_batch(&mut evaluator, points(5)).unwrap_err();
        assert!(matches!(err, SearchError::Evaluation { .. }));
        assert!(evaluator.requested.len() <= 2);
    }

    #[test]
    fn unbounded_stream_is_consumed_lazily() {
        let mut evaluator = FnEvaluator::new(|index, point| {
            if index >= 5 {
                TaskFuture::from_error(SearchError::soft("cap"))
            } else {
                TaskFuture::from_result(point_result(point))
            }
        });
        let endless = (0..).map(|a: i64| HyperparameterPoint::new().with("a", a));

        let (results, interrupted) = explore_batch(&mut evaluator, endless).unwrap();
        assert!(interrupted);
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn empty_batch_is_not_interrupted() {
        let (results, interrupted) = explore_batch(&mut succeeding(), Vec::new()).unwrap();
        assert!(results.is_empty());
        assert!(!interrupted);
    }
}
