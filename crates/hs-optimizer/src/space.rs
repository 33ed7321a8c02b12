//! Typed search space definitions and seeded sampling over them.

use hs_types::{config_error, HyperparameterPoint, ParameterValue, SearchResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::strategy::random::PointGenerator;

/// Upper bound on the number of points a grid may enumerate.
pub const MAX_GRID_POINTS: usize = 1 << 20;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name as passed to the fitting procedure (e.g. "max_depth").
    pub name: String,
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

impl ParameterKind {
    /// Draw one value.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParameterValue {
        match self {
            Self::FloatRange { low, high } => ParameterValue::Float(rng.random_range(*low..=*high)),
            Self::IntRange { low, high } => ParameterValue::Int(rng.random_range(*low..=*high)),
            Self::LogUniform { low, high } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp().clamp(*low, *high))
            }
            Self::Choice { values } => {
                let idx = rng.random_range(0..values.len());
                ParameterValue::from_json(values[idx].clone())
            }
        }
    }

    /// Grid values along this dimension; continuous ranges get `float_steps`
    /// evenly spaced values (at least 2). Integer ranges wider than
    /// [`MAX_GRID_POINTS`] are rejected.
    pub fn grid_values(&self, float_steps: usize) -> SearchResult<Vec<ParameterValue>> {
        let steps = float_steps.max(2);
        let fraction = |i: usize| i as f64 / (steps - 1) as f64;
        if let Self::IntRange { low, high } = self {
            match int_range_len(*low, *high) {
                Some(len) if len <= MAX_GRID_POINTS => {}
                _ => {
                    return Err(config_error!(
                        "Integer range [{}, {}] is too wide for a grid",
                        low,
                        high
                    ))
                }
            }
        }
        let values = match self {
            Self::FloatRange { low, high } => (0..steps)
                .map(|i| ParameterValue::Float(low + fraction(i) * (high - low)))
                .collect(),
            Self::IntRange { low, high } => (*low..=*high).map(ParameterValue::Int).collect(),
            Self::LogUniform { low, high } => {
                let (log_low, log_high) = (low.ln(), high.ln());
                (0..steps)
                    .map(|i| ParameterValue::Float((log_low + fraction(i) * (log_high - log_low)).exp()))
                    .collect()
            }
            Self::Choice { values } => values.iter().cloned().map(ParameterValue::from_json).collect(),
        };
        Ok(values)
    }
}

/// Number of integers in `[low, high]`, if it fits in a `usize`.
fn int_range_len(low: i64, high: i64) -> Option<usize> {
    let span = high.checked_sub(low)?;
    usize::try_from(span).ok()?.checked_add(1)
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, name: impl Into<String>, kind: ParameterKind) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn add_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, ParameterKind::FloatRange { low, high })
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(name, ParameterKind::IntRange { low, high })
    }

    pub fn add_log_uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, ParameterKind::LogUniform { low, high })
    }

    pub fn add_choice(self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.add(name, ParameterKind::Choice { values })
    }

    /// Total number of grid points (returns `None` if any parameter is
    /// continuous without a natural grid).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            let dim_size = match &param.kind {
                ParameterKind::IntRange { low, high } => int_range_len(*low, *high)?,
                ParameterKind::Choice { values } => values.len(),
                _ => return None,
            };
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }

    /// Reject ranges that cannot be sampled.
    pub fn validate(&self) -> SearchResult<()> {
        for param in &self.parameters {
            let valid = match &param.kind {
                ParameterKind::FloatRange { low, high } => low <= high,
                ParameterKind::IntRange { low, high } => low <= high,
                ParameterKind::LogUniform { low, high } => *low > 0.0 && low <= high,
                ParameterKind::Choice { values } => !values.is_empty(),
            };
            if !valid {
                return Err(config_error!("Invalid range for parameter '{}'", param.name));
            }
        }
        Ok(())
    }

    pub fn sample_point<R: Rng>(&self, rng: &mut R) -> HyperparameterPoint {
        self.parameters
            .iter()
            .map(|param| (param.name.clone(), param.kind.sample(rng)))
            .collect()
    }
}

/// Endless, reproducible stream of independent samples from a space.
#[derive(Debug)]
pub struct SpaceSampler {
    space: SearchSpace,
    rng: StdRng,
}

impl SpaceSampler {
    pub fn new(space: SearchSpace, seed: u64) -> SearchResult<Self> {
        space.validate()?;
        Ok(Self {
            space,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl PointGenerator for SpaceSampler {
    fn sample(&mut self) -> Option<HyperparameterPoint> {
        Some(self.space.sample_point(&mut self.rng))
    }
}
