use std::path::Path;

use features::FeatureVector;
use serde::Serialize;
use store::ArtifactStore;
use tracing::{info, instrument};

use crate::{
    forest::argmax, metrics::ClassificationReport, EncodedDataset, ForestParams, LabelEncoder,
    RandomForest, TrainingError,
};

pub const MODEL_ARTIFACT: &str = "model.json";
pub const ENCODER_ARTIFACT: &str = "label_encoder.json";

/// A fitted classifier together with the encoder needed to name its output.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub classifier: RandomForest,
    pub encoder: LabelEncoder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

impl TrainedModel {
    /// Reads the two artifacts written by [`Trainer::save`].
    #[instrument(level = "trace")]
    pub fn load(dir: &Path) -> Result<Self, TrainingError> {
        let store = ArtifactStore::open(dir);
        Ok(Self {
            classifier: store.read(MODEL_ARTIFACT)?,
            encoder: store.read(ENCODER_ARTIFACT)?,
        })
    }

    /// Most probable class and its probability. `None` if the classifier
    /// predicts a code the encoder does not know.
    pub fn predict(&self, features: &FeatureVector) -> Option<Prediction> {
        let (code, confidence) = argmax(&self.classifier.predict_proba(features));
        let label = self.encoder.decode(code)?;
        Some(Prediction {
            label: label.to_string(),
            confidence,
        })
    }
}

/// One training run as reported to experiment tracking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    pub experiment: String,
    pub params: ForestParams,
    pub accuracy: f64,
    pub n_train: usize,
    pub n_test: usize,
}

/// Receives one record per completed fit.
pub trait TrialRecorder: Send + Sync {
    fn record(&self, trial: &TrialRecord);
}

/// Emits trials as structured events on the `experiment` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

impl TrialRecorder for LogRecorder {
    fn record(&self, trial: &TrialRecord) {
        info!(
            target: "experiment",
            experiment = %trial.experiment,
            n_estimators = trial.params.n_estimators,
            max_depth = trial.params.max_depth,
            seed = trial.params.seed,
            accuracy = trial.accuracy,
            n_train = trial.n_train,
            n_test = trial.n_test,
            "trial completed"
        );
    }
}

pub struct Trainer {
    experiment: String,
    params: ForestParams,
    recorder: Box<dyn TrialRecorder>,
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new("audio_sentiment", ForestParams::default())
    }
}

impl Trainer {
    pub fn new(experiment: impl Into<String>, params: ForestParams) -> Self {
        Self {
            experiment: experiment.into(),
            params,
            recorder: Box::new(LogRecorder),
        }
    }

    pub fn with_recorder(mut self, recorder: impl TrialRecorder + 'static) -> Self {
        self.recorder = Box::new(recorder);
        self
    }

    /// Fits on the training partition and scores accuracy on the test
    /// partition. A full classification report is logged alongside.
    #[instrument(skip_all, fields(n_train = train_x.len(), n_test = test_x.len()), level = "trace")]
    pub fn fit(
        &self,
        train_x: &[FeatureVector],
        train_y: &[usize],
        test_x: &[FeatureVector],
        test_y: &[usize],
        encoder: &LabelEncoder,
    ) -> Result<(TrainedModel, f64), TrainingError> {
        if test_x.len() != test_y.len() {
            return Err(TrainingError::InvalidInput(format!(
                "{} test rows but {} test labels",
                test_x.len(),
                test_y.len()
            )));
        }
        let classifier = RandomForest::fit(self.params, train_x, train_y)?;

        let predicted = classifier.predict_many(test_x);
        let report = ClassificationReport::new(test_y, &predicted, encoder.classes());
        let accuracy = report.accuracy;
        info!("model accuracy: {accuracy:.4}");
        info!("classification report:\n{report}");

        self.recorder.record(&TrialRecord {
            experiment: self.experiment.clone(),
            params: self.params,
            accuracy,
            n_train: train_x.len(),
            n_test: test_x.len(),
        });

        let model = TrainedModel {
            classifier,
            encoder: encoder.clone(),
        };
        Ok((model, accuracy))
    }

    pub fn fit_dataset(&self, data: &EncodedDataset) -> Result<(TrainedModel, f64), TrainingError> {
        self.fit(
            &data.train_features,
            &data.train_labels,
            &data.test_features,
            &data.test_labels,
            &data.encoder,
        )
    }

    /// Writes the classifier and the label encoder as two independent
    /// artifacts under `dir`, creating it if needed.
    #[instrument(skip(self, model), level = "trace")]
    pub fn save(&self, model: &TrainedModel, dir: &Path) -> Result<(), TrainingError> {
        let store = ArtifactStore::create(dir)?;
        store.write(MODEL_ARTIFACT, &model.classifier)?;
        store.write(ENCODER_ARTIFACT, &model.encoder)?;
        info!(dir = %dir.display(), "model saved");
        Ok(())
    }
}
