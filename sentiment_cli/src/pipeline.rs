//! Sequential data → train → monitor pipeline.
//!
//! A stage that fails logs the cause and yields `None`; later stages still
//! run, so the pipeline always finishes with a [`PipelineOutcome`].

use features::FeatureExtractor;
use monitor::{simulate, DriftError, DriftMonitor, FeatureFrame};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use training::{partition, DatasetBuilder, EncodedDataset, TrainedModel, Trainer};

use crate::config::{MonitorSource, PipelineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub drift_detected: bool,
    pub model_trained: bool,
}

pub struct Pipeline {
    config: PipelineConfig,
    builder: DatasetBuilder,
    trainer: Trainer,
    monitor: DriftMonitor,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let extractor = FeatureExtractor::new(config.extractor.clone());
        let builder = DatasetBuilder::new(extractor, config.audio_extension.clone());
        let trainer = Trainer::new(config.experiment.clone(), config.forest);
        Self {
            config,
            builder,
            trainer,
            monitor: DriftMonitor::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[instrument(skip(self), level = "trace")]
    pub fn run(&self) -> PipelineOutcome {
        info!("starting ML pipeline");

        let data = self.process_data();
        let model = self.train_model(data.as_ref());
        let drift_detected = match self.monitor_model(data.as_ref()) {
            Ok(detected) => detected,
            Err(err) => {
                error!(%err, "drift monitoring failed");
                false
            }
        };

        match &model {
            Some((_, accuracy)) => info!("pipeline completed, model accuracy: {accuracy:.4}"),
            None => error!("pipeline failed during training"),
        }

        let outcome = PipelineOutcome {
            drift_detected,
            model_trained: model.is_some(),
        };
        info!(?outcome, "pipeline result");
        outcome
    }

    /// Builds and partitions the configured corpus.
    pub fn process_data(&self) -> Option<EncodedDataset> {
        info!("processing audio data");
        let data_dir = &self.config.data_dir;
        if !data_dir.exists() {
            error!(data_dir = %data_dir.display(), "data directory not found");
            return None;
        }

        let result = self
            .builder
            .build(data_dir, self.config.manifest.as_deref())
            .and_then(|dataset| partition(&dataset, self.config.test_fraction));
        match result {
            Ok(data) => Some(data),
            Err(err) => {
                error!(%err, "data processing failed");
                None
            }
        }
    }

    /// Fits and saves a model. Does nothing when `data` is absent.
    pub fn train_model(&self, data: Option<&EncodedDataset>) -> Option<(TrainedModel, f64)> {
        let Some(data) = data else {
            error!("no data provided for training");
            return None;
        };
        info!("training model");

        let result = self.trainer.fit_dataset(data).and_then(|(model, accuracy)| {
            self.trainer.save(&model, &self.config.model_dir)?;
            Ok((model, accuracy))
        });
        match result {
            Ok(trained) => Some(trained),
            Err(err) => {
                error!(%err, "training failed");
                None
            }
        }
    }

    /// Runs drift detection on the configured source. Independent of the
    /// training outcome; `data` is only consulted for the `training` source.
    pub fn monitor_model(&self, data: Option<&EncodedDataset>) -> Result<bool, DriftError> {
        info!("running model monitoring");
        let (reference, current) = self.monitor_frames(data)?;
        let report = self
            .monitor
            .check_drift(&reference, &current, self.config.drift_threshold)?;

        if report.drift_detected {
            warn!("model retraining recommended due to data drift");
        }
        Ok(report.drift_detected)
    }

    fn monitor_frames(
        &self,
        data: Option<&EncodedDataset>,
    ) -> Result<(FeatureFrame, FeatureFrame), DriftError> {
        match (&self.config.monitor, data) {
            (MonitorSource::Synthetic(sim), _) => simulate::synthetic_frames(sim),
            (MonitorSource::Training, Some(data)) => {
                let frame = FeatureFrame::from_vectors(&data.train_features);
                Ok((frame.clone(), frame))
            }
            (MonitorSource::Training, None) => {
                error!("no training features to monitor");
                Err(DriftError::EmptyFrame)
            }
            (MonitorSource::Files { reference, current }, _) => {
                Ok((FeatureFrame::load(reference)?, FeatureFrame::load(current)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use training::ForestParams;

    use super::*;

    fn write_tone(path: &Path, freq: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..4_096 {
            let v = 0.4 * (std::f32::consts::TAU * freq * i as f32 / 22_050.0).sin();
            writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn corpus(root: &Path) {
        for (c, class) in ["negative", "neutral", "positive"].iter().enumerate() {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..10 {
                let freq = 300.0 + c as f32 * 900.0 + i as f32 * 11.0;
                write_tone(&dir.join(format!("{i}.wav")), freq);
            }
        }
    }

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig {
            data_dir: root.join("audio"),
            model_dir: root.join("models"),
            forest: ForestParams {
                n_estimators: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn missing_data_dir_skips_training_but_still_monitors() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path()));

        assert!(pipeline.process_data().is_none());
        assert!(pipeline.train_model(None).is_none());
        assert!(!pipeline.config().model_dir.exists());

        let outcome = pipeline.run();
        // default synthetic source shifts every column by 0.5
        assert_eq!(
            outcome,
            PipelineOutcome {
                drift_detected: true,
                model_trained: false
            }
        );
        assert!(!pipeline.config().model_dir.exists());
    }

    #[test]
    fn full_run_trains_and_monitors_training_features() {
        let dir = tempfile::tempdir().unwrap();
        corpus(&dir.path().join("audio"));
        let pipeline = Pipeline::new(PipelineConfig {
            monitor: MonitorSource::Training,
            ..config(dir.path())
        });

        let data = pipeline.process_data().unwrap();
        assert_eq!((data.train_indices.len(), data.test_indices.len()), (21, 9));
        let (_, accuracy) = pipeline.train_model(Some(&data)).unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        assert!(!pipeline.monitor_model(Some(&data)).unwrap());

        let outcome = pipeline.run();
        assert_eq!(
            outcome,
            PipelineOutcome {
                drift_detected: false,
                model_trained: true
            }
        );
        let loaded = TrainedModel::load(&pipeline.config().model_dir).unwrap();
        assert_eq!(loaded.encoder.classes(), ["negative", "neutral", "positive"]);
    }

    #[test]
    fn frame_files_are_monitored() {
        let dir = tempfile::tempdir().unwrap();
        let frame = FeatureFrame::from_columns(
            vec!["a".into()],
            vec![(1..=50).map(f64::from).collect()],
        )
        .unwrap();
        let path = dir.path().join("frame.json");
        std::fs::write(&path, serde_json::to_vec(&frame).unwrap()).unwrap();

        let pipeline = Pipeline::new(PipelineConfig {
            monitor: MonitorSource::Files {
                reference: path.clone(),
                current: path,
            },
            ..config(dir.path())
        });
        assert!(!pipeline.monitor_model(None).unwrap());
    }

    #[test]
    fn unreadable_frame_files_fail_monitoring() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineConfig {
            monitor: MonitorSource::Files {
                reference: PathBuf::from("missing_ref.json"),
                current: PathBuf::from("missing_cur.json"),
            },
            ..config(dir.path())
        });
        assert!(matches!(
            pipeline.monitor_model(None),
            Err(DriftError::Read { .. })
        ));
        assert_eq!(
            pipeline.run(),
            PipelineOutcome {
                drift_detected: false,
                model_trained: false
            }
        );
    }

    #[test]
    fn training_source_without_data_fails_monitoring() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineConfig {
            monitor: MonitorSource::Training,
            ..config(dir.path())
        });
        assert!(matches!(
            pipeline.monitor_model(None),
            Err(DriftError::EmptyFrame)
        ));
        assert!(!pipeline.run().drift_detected);
    }
}
