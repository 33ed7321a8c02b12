use hs_types::{AggregatedResult, HyperparameterPoint, SearchResult, SplitResult};

use crate::ResultStore;

/// Store used when no run directory is configured. Nothing is persisted
/// and lookups never find a previous result.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResultStore;

impl ResultStore for NoopResultStore {
    fn init_result_file(
        &self,
        _candidate_count: Option<usize>,
        _worker_count: usize,
        _split_count: usize,
        _metric: &str,
        _timeout_minutes: Option<f64>,
    ) -> SearchResult<()> {
        Ok(())
    }

    fn append_split_results(&self, _new_points: &[SplitResult]) -> SearchResult<()> {
        Ok(())
    }

    fn find_split_result(
        &self,
        _split_id: usize,
        _point: &HyperparameterPoint,
    ) -> SearchResult<Option<SplitResult>> {
        Ok(None)
    }

    fn append_aggregated_result(&self, _aggregated: &AggregatedResult) -> SearchResult<()> {
        Ok(())
    }

    fn update_final_grid_size(&self) -> SearchResult<()> {
        Ok(())
    }
}
