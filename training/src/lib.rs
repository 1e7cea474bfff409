pub mod dataset;
pub mod encoder;
mod error;
pub mod forest;
mod manifest;
pub mod metrics;
pub mod partition;
pub mod trainer;

pub use dataset::{DatasetBuilder, LabeledDataset};
pub use encoder::LabelEncoder;
pub use error::TrainingError;
pub use forest::{ForestParams, RandomForest};
pub use partition::{partition, EncodedDataset, SplitStrategy, SPLIT_SEED};
pub use trainer::{LogRecorder, Prediction, TrainedModel, Trainer, TrialRecord, TrialRecorder};
