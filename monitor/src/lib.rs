//! Distribution drift detection over feature matrices.
//!
//! [`DriftMonitor::check_drift`] runs an ordered chain of
//! [`DriftStrategy`]s; each one is only tried when every earlier one failed.

pub mod drift;
mod error;
pub mod frame;
pub mod ks;
pub mod simulate;
pub mod stats;

pub use drift::{
    AggregateMeanShift, ColumnMeanShift, Detection, DriftMonitor, DriftReport, DriftStrategy,
    KsStrategy, ShiftScore,
};
pub use error::DriftError;
pub use frame::FeatureFrame;
pub use stats::ColumnStats;
