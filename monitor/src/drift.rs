use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{ks::ks_2samp, stats, ColumnStats, DriftError, FeatureFrame};

/// Outcome of a single strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub drift_detected: bool,
    /// Scale depends on the strategy that produced it.
    pub drift_score: f64,
    pub drifted_columns: Vec<String>,
}

/// One way of deciding whether `current` has drifted away from `reference`.
pub trait DriftStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(
        &self,
        reference: &FeatureFrame,
        current: &FeatureFrame,
        threshold: f64,
    ) -> Result<Detection, DriftError>;
}

/// Per-column two-sample KS test. The result is categorical, so the score is
/// a fixed stand-in: `detected_score` or `clean_score`.
#[derive(Debug, Clone, Copy)]
pub struct KsStrategy {
    pub significance: f64,
    pub detected_score: f64,
    pub clean_score: f64,
}

impl Default for KsStrategy {
    fn default() -> Self {
        Self {
            significance: 0.05,
            detected_score: 0.2,
            clean_score: 0.05,
        }
    }
}

impl DriftStrategy for KsStrategy {
    fn name(&self) -> &'static str {
        "ks_test"
    }

    fn detect(
        &self,
        reference: &FeatureFrame,
        current: &FeatureFrame,
        _threshold: f64,
    ) -> Result<Detection, DriftError> {
        let mut drifted_columns = Vec::new();
        for (name, ours, theirs) in reference.shared_columns(current) {
            if ks_2samp(name, ours, theirs)?.p_value < self.significance {
                drifted_columns.push(name.to_string());
            }
        }

        let drift_detected = !drifted_columns.is_empty();
        Ok(Detection {
            drift_detected,
            drift_score: if drift_detected {
                self.detected_score
            } else {
                self.clean_score
            },
            drifted_columns,
        })
    }
}

/// How [`ColumnMeanShift`] turns column shifts into a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShiftScore {
    /// The largest relative shift over all columns.
    Largest,
    /// Categorical, like [`KsStrategy`].
    Fixed { detected: f64, clean: f64 },
}

impl ShiftScore {
    fn score(self, largest_shift: f64, drift_detected: bool) -> f64 {
        match self {
            Self::Largest => largest_shift,
            Self::Fixed { detected, .. } if drift_detected => detected,
            Self::Fixed { clean, .. } => clean,
        }
    }
}

/// Relative shift of each shared column's mean. Columns whose reference mean
/// is exactly zero are skipped.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMeanShift {
    pub column_threshold: f64,
    pub score: ShiftScore,
}

impl Default for ColumnMeanShift {
    fn default() -> Self {
        Self {
            column_threshold: 0.1,
            score: ShiftScore::Largest,
        }
    }
}

impl DriftStrategy for ColumnMeanShift {
    fn name(&self) -> &'static str {
        "column_mean_shift"
    }

    fn detect(
        &self,
        reference: &FeatureFrame,
        current: &FeatureFrame,
        _threshold: f64,
    ) -> Result<Detection, DriftError> {
        let mut drifted_columns = Vec::new();
        let mut largest_shift = 0.0f64;

        for (name, ours, theirs) in reference.shared_columns(current) {
            let ref_mean = finite_mean(name, ours)?;
            let cur_mean = finite_mean(name, theirs)?;
            if ref_mean == 0.0 {
                continue;
            }
            let shift = (cur_mean - ref_mean).abs() / ref_mean.abs();
            largest_shift = largest_shift.max(shift);
            if shift > self.column_threshold {
                drifted_columns.push(name.to_string());
            }
        }

        let drift_detected = !drifted_columns.is_empty();
        Ok(Detection {
            drift_detected,
            drift_score: self.score.score(largest_shift, drift_detected),
            drifted_columns,
        })
    }
}

/// Relative shift of the grand mean (mean of column means) of each frame,
/// compared against the caller's threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateMeanShift;

impl AggregateMeanShift {
    fn grand_mean(frame: &FeatureFrame) -> Result<f64, DriftError> {
        if frame.n_columns() == 0 || frame.n_rows() == 0 {
            return Err(DriftError::EmptyFrame);
        }
        let column_means = frame
            .columns()
            .map(|(name, values)| finite_mean(name, values))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats::mean(&column_means))
    }
}

impl DriftStrategy for AggregateMeanShift {
    fn name(&self) -> &'static str {
        "aggregate_mean_shift"
    }

    fn detect(
        &self,
        reference: &FeatureFrame,
        current: &FeatureFrame,
        threshold: f64,
    ) -> Result<Detection, DriftError> {
        let ref_mean = Self::grand_mean(reference)?;
        let cur_mean = Self::grand_mean(current)?;
        let drift_score = if ref_mean == 0.0 {
            0.0
        } else {
            (ref_mean - cur_mean).abs() / ref_mean.abs()
        };

        Ok(Detection {
            drift_detected: drift_score > threshold,
            drift_score,
            drifted_columns: Vec::new(),
        })
    }
}

fn finite_mean(column: &str, values: &[f64]) -> Result<f64, DriftError> {
    if values.is_empty() {
        return Err(DriftError::EmptyColumn {
            column: column.to_string(),
        });
    }
    let mean = stats::mean(values);
    if !mean.is_finite() {
        return Err(DriftError::NonFinite {
            column: column.to_string(),
        });
    }
    Ok(mean)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftReport {
    pub drift_detected: bool,
    pub drift_score: f64,
    /// Name of the strategy that produced the decision.
    pub method: &'static str,
    pub drifted_columns: Vec<String>,
    pub reference_stats: BTreeMap<String, ColumnStats>,
    pub current_stats: BTreeMap<String, ColumnStats>,
}

/// Runs drift strategies in order until one succeeds.
pub struct DriftMonitor {
    strategies: Vec<Box<dyn DriftStrategy>>,
}

impl Default for DriftMonitor {
    /// KS test, then per-column mean shift, then aggregate mean shift.
    fn default() -> Self {
        Self::new(vec![
            Box::new(KsStrategy::default()),
            Box::new(ColumnMeanShift::default()),
            Box::new(AggregateMeanShift),
        ])
    }
}

impl DriftMonitor {
    pub fn new(strategies: Vec<Box<dyn DriftStrategy>>) -> Self {
        Self { strategies }
    }

    /// Compares `current` against `reference`.
    ///
    /// A failing strategy is logged and the next one is tried; the error of
    /// the last strategy is returned only when all of them fail. Descriptive
    /// statistics of every shared column are attached whichever strategy
    /// decided.
    #[instrument(
        skip_all,
        fields(n_reference = reference.n_rows(), n_current = current.n_rows()),
        level = "trace"
    )]
    pub fn check_drift(
        &self,
        reference: &FeatureFrame,
        current: &FeatureFrame,
        threshold: f64,
    ) -> Result<DriftReport, DriftError> {
        let mut last_error = None;
        let mut decision = None;
        for strategy in &self.strategies {
            match strategy.detect(reference, current, threshold) {
                Ok(detection) => {
                    decision = Some((strategy.name(), detection));
                    break;
                }
                Err(err) => {
                    warn!(strategy = strategy.name(), %err, "drift strategy failed, falling back");
                    last_error = Some(err);
                }
            }
        }

        let Some((method, detection)) = decision else {
            return Err(match last_error {
                Some(last) => DriftError::Exhausted {
                    last: Box::new(last),
                },
                None => DriftError::NoStrategies,
            });
        };

        let (reference_stats, current_stats): (BTreeMap<_, _>, BTreeMap<_, _>) = reference
            .shared_columns(current)
            .into_iter()
            .map(|(name, ours, theirs)| {
                (
                    (name.to_string(), ColumnStats::describe(ours)),
                    (name.to_string(), ColumnStats::describe(theirs)),
                )
            })
            .unzip();

        if detection.drift_detected {
            warn!(method, drift_score = detection.drift_score, "data drift detected");
            send_alert(&format!(
                "Data drift detected with score: {}",
                detection.drift_score
            ));
        } else {
            info!(method, drift_score = detection.drift_score, "no significant drift detected");
        }

        Ok(DriftReport {
            drift_detected: detection.drift_detected,
            drift_score: detection.drift_score,
            method,
            drifted_columns: detection.drifted_columns,
            reference_stats,
            current_stats,
        })
    }
}

/// Alerts are log events on the `alert` target; routing them elsewhere is
/// left to the subscriber.
fn send_alert(message: &str) {
    warn!(target: "alert", "ALERT: {message}");
}
