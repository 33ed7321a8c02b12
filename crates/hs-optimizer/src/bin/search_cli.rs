//! Runs a hyperparameter search against a synthetic objective and prints the
//! score summary as JSON.
//!
//! Usage: `hs-search <config.json>`, or set `HS_SEARCH_CONFIG`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use hs_optimizer::{Diagnostics, SearchConfig, SearchRunner};
use hs_scheduler::SplitEvaluator;
use hs_types::{HyperparameterPoint, SearchResult, SplitResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CliConfig {
    #[serde(flatten)]
    search: SearchConfig,
    n_splits: usize,
    /// Amplitude of the per-split score noise.
    noise: f64,
    seed: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            n_splits: 3,
            noise: 0.05,
            seed: 0,
        }
    }
}

/// Negated squared distance of the numeric parameters from 0.5, plus
/// deterministic noise per (point, split).
struct QuadraticBowl {
    n_splits: usize,
    noise: f64,
    seed: u64,
}

impl SplitEvaluator for QuadraticBowl {
    fn n_splits(&self) -> usize {
        self.n_splits
    }

    fn evaluate_split(&self, point: &HyperparameterPoint, split_id: usize) -> SearchResult<SplitResult> {
        let started = Instant::now();

        let mut hasher = DefaultHasher::new();
        point.to_string().hash(&mut hasher);
        split_id.hash(&mut hasher);
        self.seed.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());

        let distance: f64 = point
            .iter()
            .filter_map(|(_, value)| value.as_f64())
            .map(|x| (x - 0.5).powi(2))
            .sum();
        let noise = if self.noise > 0.0 {
            rng.random_range(-self.noise..=self.noise)
        } else {
            0.0
        };
        let test_score = -distance + noise;
        let fit_time = started.elapsed().as_secs_f64() * 1000.0;

        Ok(SplitResult {
            split_id,
            parameters: point.clone(),
            test_score_gib: test_score,
            test_score,
            train_score: -distance,
            num_samples: 100,
            fit_time,
            score_time: 0.0,
            time: fit_time,
            done_at: Utc::now(),
            best_iteration: None,
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HS_SEARCH_CONFIG").ok())
        .context("usage: hs-search <config.json> (or set HS_SEARCH_CONFIG)")?;
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let cli: CliConfig = serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

    let objective = Arc::new(QuadraticBowl {
        n_splits: cli.n_splits,
        noise: cli.noise,
        seed: cli.seed,
    });
    let mut runner = SearchRunner::new(cli.search, Diagnostics::new())?;
    let best = runner.run(objective)?;
    info!("Best parameters: {}", best);

    println!("{}", serde_json::to_string_pretty(&runner.score_summary())?);
    Ok(())
}
