//! Per-point statistics over split results.

use hs_types::{internal_error, AggregatedResult, SearchResult, SplitResult};

/// Weighted mean and population standard deviation.
pub fn weighted_mean_std(values: &[f64], weights: &[f64]) -> (f64, f64) {
    let total: f64 = weights.iter().sum();
    let mean = values.iter().zip(weights).map(|(x, w)| x * w).sum::<f64>() / total;
    let variance = values
        .iter()
        .zip(weights)
        .map(|(x, w)| w * (x - mean).powi(2))
        .sum::<f64>()
        / total;
    (mean, variance.sqrt())
}

pub fn mean_std(values: &[f64]) -> (f64, f64) {
    weighted_mean_std(values, &vec![1.0; values.len()])
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Combine the split results of one point.
///
/// Scores are weighted by each split's sample count, falling back to equal
/// weights when every split reports zero samples. Timings are unweighted.
pub fn aggregate_split_results(results: &[SplitResult]) -> SearchResult<AggregatedResult> {
    let first = results
        .first()
        .ok_or_else(|| internal_error!("cannot aggregate an empty list of split results"))?;

    let mut weights: Vec<f64> = results.iter().map(|r| r.num_samples as f64).collect();
    if weights.iter().sum::<f64>() <= 0.0 {
        weights = vec![1.0; results.len()];
    }

    let column = |f: fn(&SplitResult) -> f64| results.iter().map(f).collect::<Vec<f64>>();

    let (test_score_gib_mean, test_score_gib_std) =
        weighted_mean_std(&column(|r| r.test_score_gib), &weights);
    let (test_score_mean, test_score_std) = weighted_mean_std(&column(|r| r.test_score), &weights);
    let (train_score_mean, train_score_std) =
        weighted_mean_std(&column(|r| r.train_score), &weights);
    let (fit_time_mean, fit_time_std) = mean_std(&column(|r| r.fit_time));
    let (score_time_mean, score_time_std) = mean_std(&column(|r| r.score_time));

    let finished_at = results
        .iter()
        .map(|r| r.done_at)
        .max()
        .unwrap_or(first.done_at);

    let best_iteration = median(
        results
            .iter()
            .filter_map(|r| r.best_iteration)
            .map(f64::from)
            .collect(),
    )
    .map(|m| m as u32);

    Ok(AggregatedResult {
        parameters: first.parameters.clone(),
        finished_at,
        score: test_score_mean,
        test_score_gib_mean,
        test_score_gib_std,
        test_score_mean,
        test_score_std,
        train_score_mean,
        train_score_std,
        time: results.iter().map(|r| r.time).sum(),
        fit_time_mean,
        fit_time_std,
        score_time_mean,
        score_time_std,
        best_iteration,
    })
}
