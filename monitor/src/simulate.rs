//! Synthetic feature frames for exercising the monitor without real data.

use features::FEATURE_NAMES;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{DriftError, FeatureFrame};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub reference_rows: usize,
    pub current_rows: usize,
    /// Added to every value of the current frame.
    pub shift: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            reference_rows: 1000,
            current_rows: 500,
            shift: 0.5,
        }
    }
}

/// Standard-normal reference frame and a current frame drawn from the same
/// distribution plus `shift`, both with the feature column names.
pub fn synthetic_frames(
    config: &SimulationConfig,
) -> Result<(FeatureFrame, FeatureFrame), DriftError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let reference = normal_frame(&mut rng, config.reference_rows, 0.0)?;
    let current = normal_frame(&mut rng, config.current_rows, config.shift)?;
    Ok((reference, current))
}

fn normal_frame(rng: &mut StdRng, rows: usize, offset: f64) -> Result<FeatureFrame, DriftError> {
    let names = FEATURE_NAMES.iter().map(|n| n.to_string()).collect();
    let columns = FEATURE_NAMES
        .iter()
        .map(|_| (0..rows).map(|_| standard_normal(rng) + offset).collect())
        .collect();
    FeatureFrame::from_columns(names, columns)
}

/// Box–Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
