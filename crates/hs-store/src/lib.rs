pub mod noop;
pub mod on_disk;

pub use noop::*;
pub use on_disk::*;

use hs_types::{AggregatedResult, HyperparameterPoint, SearchResult, SplitResult};

/// Persistence of per-split and aggregated search results.
///
/// Every operation is safe to call concurrently from worker-completion
/// threads. I/O failures are returned as-is; stores never retry.
pub trait ResultStore: Send + Sync {
    /// Write the run header unless it already exists. An existing header
    /// means the search is being resumed.
    fn init_result_file(
        &self,
        candidate_count: Option<usize>,
        worker_count: usize,
        split_count: usize,
        metric: &str,
        timeout_minutes: Option<f64>,
    ) -> SearchResult<()>;

    /// Persist per-split results, skipping any `(split_id, point)` already stored.
    fn append_split_results(&self, new_points: &[SplitResult]) -> SearchResult<()>;

    /// Look up a stored per-split result, used to skip work on resume.
    fn find_split_result(
        &self,
        split_id: usize,
        point: &HyperparameterPoint,
    ) -> SearchResult<Option<SplitResult>>;

    /// Persist an aggregated result unless its point is already stored.
    fn append_aggregated_result(&self, aggregated: &AggregatedResult) -> SearchResult<()>;

    /// Set the declared grid size to the number of aggregated results stored.
    fn update_final_grid_size(&self) -> SearchResult<()>;
}
