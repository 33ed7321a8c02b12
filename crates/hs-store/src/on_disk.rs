use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hs_types::{
    AggregatedResult, HyperparameterPoint, SearchError, SearchResult, SplitResult,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ResultStore;

pub const PER_SPLIT_RESULTS_FILENAME: &str = "grid_search_done.json";
pub const AGGREGATED_RESULTS_FILENAME: &str = "grid_search_scores.json";

/// Run header plus the aggregated result of every explored point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoresDocument {
    pub started_at: DateTime<Utc>,
    /// Planned number of candidates; `None` when the strategy is unbounded.
    pub grid_size: Option<usize>,
    pub n_threads: usize,
    pub n_splits: usize,
    pub metric: String,
    /// Wall-clock budget in minutes.
    pub timeout: Option<f64>,
    pub grid_points: Vec<AggregatedResult>,
}

#[derive(Debug, Default)]
struct StoreCache {
    per_split: Option<Vec<SplitResult>>,
    scores: Option<ScoresDocument>,
}

/// Result store persisting two JSON documents in a run directory.
///
/// - per-split results go to [`PER_SPLIT_RESULTS_FILENAME`]
/// - the run header and aggregated results go to [`AGGREGATED_RESULTS_FILENAME`]
///
/// Every mutation reads the current document (from the in-memory cache once
/// loaded), merges, writes a temporary file and renames it over the target.
/// A single mutex serializes all of this, so concurrent callers in one
/// process are safe. Nothing coordinates separate processes.
#[derive(Debug)]
pub struct OnDiskResultStore {
    run_dir: PathBuf,
    cache: Mutex<StoreCache>,
}

impl OnDiskResultStore {
    pub fn new<P: AsRef<Path>>(run_dir: P) -> SearchResult<Self> {
        let run_dir = run_dir.as_ref().to_path_buf();
        fs::create_dir_all(&run_dir).map_err(|e| SearchError::persistence(&run_dir, e))?;

        Ok(Self {
            run_dir,
            cache: Mutex::new(StoreCache::default()),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn per_split_path(&self) -> PathBuf {
        self.run_dir.join(PER_SPLIT_RESULTS_FILENAME)
    }

    fn scores_path(&self) -> PathBuf {
        self.run_dir.join(AGGREGATED_RESULTS_FILENAME)
    }

    /// Snapshot of the scores document, if the run has been initialised.
    pub fn scores(&self) -> SearchResult<Option<ScoresDocument>> {
        let mut cache = self.cache.lock();
        Ok(self.load_scores(&mut cache)?.cloned())
    }

    /// Snapshot of every persisted per-split result.
    pub fn split_results(&self) -> SearchResult<Vec<SplitResult>> {
        let mut cache = self.cache.lock();
        Ok(self.load_per_split(&mut cache)?.clone())
    }

    fn load_per_split<'a>(&self, cache: &'a mut StoreCache) -> SearchResult<&'a Vec<SplitResult>> {
        if cache.per_split.is_none() {
            let path = self.per_split_path();
            let points = if path.exists() {
                read_json(&path)?
            } else {
                Vec::new()
            };
            cache.per_split = Some(points);
        }
        Ok(cache.per_split.get_or_insert_with(Vec::new))
    }

    fn load_scores<'a>(
        &self,
        cache: &'a mut StoreCache,
    ) -> SearchResult<Option<&'a ScoresDocument>> {
        if cache.scores.is_none() {
            let path = self.scores_path();
            if path.exists() {
                cache.scores = Some(read_json(&path)?);
            }
        }
        Ok(cache.scores.as_ref())
    }
}

impl ResultStore for OnDiskResultStore {
    fn init_result_file(
        &self,
        candidate_count: Option<usize>,
        worker_count: usize,
        split_count: usize,
        metric: &str,
        timeout_minutes: Option<f64>,
    ) -> SearchResult<()> {
        let mut cache = self.cache.lock();
        let path = self.scores_path();
        if path.exists() {
            info!("Resuming search from {}", path.display());
            return Ok(());
        }

        let document = ScoresDocument {
            started_at: Utc::now(),
            grid_size: candidate_count,
            n_threads: worker_count,
            n_splits: split_count,
            metric: metric.to_string(),
            timeout: timeout_minutes,
            grid_points: Vec::new(),
        };
        write_json_atomic(&path, &document)?;
        cache.scores = Some(document);
        Ok(())
    }

    fn append_split_results(&self, new_points: &[SplitResult]) -> SearchResult<()> {
        let mut cache = self.cache.lock();
        let mut points = self.load_per_split(&mut cache)?.clone();

        for new_point in new_points {
            // Already present when a resumed search re-uses a stored result.
            if !points.iter().any(|p| p.matches(new_point.split_id, &new_point.parameters)) {
                points.push(new_point.clone());
            }
        }

        write_json_atomic(&self.per_split_path(), &points)?;
        cache.per_split = Some(points);
        Ok(())
    }

    fn find_split_result(
        &self,
        split_id: usize,
        point: &HyperparameterPoint,
    ) -> SearchResult<Option<SplitResult>> {
        let mut cache = self.cache.lock();
        Ok(self
            .load_per_split(&mut cache)?
            .iter()
            .find(|p| p.matches(split_id, point))
            .cloned())
    }

    fn append_aggregated_result(&self, aggregated: &AggregatedResult) -> SearchResult<()> {
        let mut cache = self.cache.lock();
        let path = self.scores_path();
        let Some(scores) = self.load_scores(&mut cache)? else {
            return Err(SearchError::persistence(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "result file not initialised"),
            ));
        };

        if scores
            .grid_points
            .iter()
            .any(|existing| existing.parameters == aggregated.parameters)
        {
            debug!("Aggregated result already stored: {}", aggregated.parameters);
            return Ok(());
        }

        let mut scores = scores.clone();
        scores.grid_points.push(aggregated.clone());
        write_json_atomic(&path, &scores)?;
        cache.scores = Some(scores);
        Ok(())
    }

    fn update_final_grid_size(&self) -> SearchResult<()> {
        let mut cache = self.cache.lock();
        let path = self.scores_path();
        let Some(scores) = self.load_scores(&mut cache)? else {
            return Err(SearchError::persistence(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "result file not initialised"),
            ));
        };

        let mut scores = scores.clone();
        scores.grid_size = Some(scores.grid_points.len());
        write_json_atomic(&path, &scores)?;
        cache.scores = Some(scores);
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> SearchResult<T> {
    let bytes = fs::read(path).map_err(|e| SearchError::persistence(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Write to `<path>.tmp`, then rename over `path`.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> SearchResult<()> {
    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, bytes).map_err(|e| SearchError::persistence(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| SearchError::persistence(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn point(a: i64) -> HyperparameterPoint {
        HyperparameterPoint::new().with("a", a).with("b", 10)
    }

    fn split_result(split_id: usize, a: i64) -> SplitResult {
        SplitResult {
            split_id,
            parameters: point(a),
            test_score_gib: 0.8,
            test_score: 0.8,
            train_score: 0.9,
            num_samples: 50,
            fit_time: 120.0,
            score_time: 15.0,
            time: 135.0,
            done_at: Utc::now(),
            best_iteration: Some(42),
        }
    }

    fn aggregated(a: i64) -> AggregatedResult {
        AggregatedResult {
            parameters: point(a),
            finished_at: Utc::now(),
            score: 0.8,
            test_score_gib_mean: 0.8,
            test_score_gib_std: 0.01,
            test_score_mean: 0.8,
            test_score_std: 0.01,
            train_score_mean: 0.9,
            train_score_std: 0.02,
            time: 270.0,
            fit_time_mean: 120.0,
            fit_time_std: 3.0,
            score_time_mean: 15.0,
            score_time_std: 1.0,
            best_iteration: None,
        }
    }

    fn init(store: &OnDiskResultStore, grid_size: Option<usize>) {
        store
            .init_result_file(grid_size, 4, 2, "ROC_AUC", Some(30.0))
            .unwrap();
    }

    #[test]
    fn duplicate_split_results_are_skipped() {
        let dir = tempdir().unwrap();
        let store = OnDiskResultStore::new(dir.path()).unwrap();

        store.append_split_results(&[split_result(0, 1)]).unwrap();
        store
            .append_split_results(&[split_result(0, 1), split_result(1, 1)])
            .unwrap();

        let stored = store.split_results().unwrap();
        assert_eq!(stored.len(), 2);
        assert!(store.find_split_result(0, &point(1)).unwrap().is_some());
        assert!(store.find_split_result(1, &point(1)).unwrap().is_some());
        assert!(store.find_split_result(0, &point(2)).unwrap().is_none());
        assert!(!dir.path().join("grid_search_done.json.tmp").exists());
    }

    #[test]
    fn reopened_store_sees_persisted_results() {
        let dir = tempdir().unwrap();
        {
            let store = OnDiskResultStore::new(dir.path()).unwrap();
            init(&store, Some(3));
            store.append_split_results(&[split_result(0, 1)]).unwrap();
            store.append_aggregated_result(&aggregated(1)).unwrap();
        }

        let resumed = OnDiskResultStore::new(dir.path()).unwrap();
        let found = resumed.find_split_result(0, &point(1)).unwrap().unwrap();
        assert_eq!(found.best_iteration, Some(42));
        assert_eq!(found.parameters, point(1));

        let scores = resumed.scores().unwrap().unwrap();
        assert_eq!(scores.grid_points.len(), 1);
        assert_eq!(scores.grid_size, Some(3));
    }

    #[test]
    fn nan_scores_do_not_break_resume() {
        let dir = tempdir().unwrap();
        {
            let store = OnDiskResultStore::new(dir.path()).unwrap();
            init(&store, Some(2));
            let mut diverged = split_result(0, 1);
            diverged.train_score = f64::NAN;
            store.append_split_results(&[diverged]).unwrap();
            let mut nan_mean = aggregated(1);
            nan_mean.train_score_mean = f64::NAN;
            nan_mean.train_score_std = f64::NAN;
            store.append_aggregated_result(&nan_mean).unwrap();
        }

        let resumed = OnDiskResultStore::new(dir.path()).unwrap();
        assert!(resumed.find_split_result(1, &point(2)).unwrap().is_none());
        let found = resumed.find_split_result(0, &point(1)).unwrap().unwrap();
        assert!(found.train_score.is_nan());
        assert_eq!(found.test_score, 0.8);

        let scores = resumed.scores().unwrap().unwrap();
        assert!(scores.grid_points[0].train_score_mean.is_nan());
        resumed.append_aggregated_result(&aggregated(2)).unwrap();
        assert_eq!(resumed.scores().unwrap().unwrap().grid_points.len(), 2);
    }

    #[test]
    fn init_is_a_no_op_when_header_exists() {
        let dir = tempdir().unwrap();
        let store = OnDiskResultStore::new(dir.path()).unwrap();
        init(&store, Some(5));
        let first = store.scores().unwrap().unwrap();

        let resumed = OnDiskResultStore::new(dir.path()).unwrap();
        resumed
            .init_result_file(Some(99), 1, 7, "R2", None)
            .unwrap();
        let second = resumed.scores().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(second.grid_size, Some(5));
        assert_eq!(second.metric, "ROC_AUC");
    }

    #[test]
    fn aggregated_results_are_deduplicated_by_point() {
        let dir = tempdir().unwrap();
        let store = OnDiskResultStore::new(dir.path()).unwrap();
        init(&store, Some(4));

        store.append_aggregated_result(&aggregated(1)).unwrap();
        store.append_aggregated_result(&aggregated(1)).unwrap();
        store.append_aggregated_result(&aggregated(2)).unwrap();

        assert_eq!(store.scores().unwrap().unwrap().grid_points.len(), 2);
    }

    #[test]
    fn final_grid_size_matches_distinct_aggregated_results() {
        let dir = tempdir().unwrap();
        let store = OnDiskResultStore::new(dir.path()).unwrap();
        init(&store, Some(10));

        for a in [1, 2, 2, 3] {
            store.append_aggregated_result(&aggregated(a)).unwrap();
        }
        store.update_final_grid_size().unwrap();

        let on_disk: ScoresDocument =
            read_json(&dir.path().join(AGGREGATED_RESULTS_FILENAME)).unwrap();
        assert_eq!(on_disk.grid_size, Some(3));
    }

    #[test]
    fn aggregated_append_requires_initialised_run() {
        let dir = tempdir().unwrap();
        let store = OnDiskResultStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.append_aggregated_result(&aggregated(1)),
            Err(SearchError::Persistence { .. })
        ));
        assert!(matches!(
            store.update_final_grid_size(),
            Err(SearchError::Persistence { .. })
        ));
    }

    #[test]
    fn corrupt_file_surfaces_serialization_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PER_SPLIT_RESULTS_FILENAME), b"{not json").unwrap();
        let store = OnDiskResultStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.find_split_result(0, &point(1)),
            Err(SearchError::Serialization(_))
        ));
    }

    #[test]
    fn concurrent_appends_keep_every_record() {
        let dir = tempdir().unwrap();
        let store = Arc::new(OnDiskResultStore::new(dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|a| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .append_split_results(&[split_result(0, a), split_result(1, a)])
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = OnDiskResultStore::new(dir.path()).unwrap();
        assert_eq!(reopened.split_results().unwrap().len(), 16);
    }
}
