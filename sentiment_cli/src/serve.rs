//! HTTP prediction service.
//!
//! API endpoints:
//! - POST /predict - raw audio bytes in, `{sentiment, confidence}` or `{error}` out
//! - GET /health   - `{status}`, healthy once a model is loaded

use std::{net::SocketAddr, path::Path, sync::Arc};

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use features::{ExtractorConfig, FeatureError, FeatureExtractor};
use serde::Serialize;
use tracing::{error, info, instrument};
use training::{Prediction, TrainedModel};

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("Model not loaded")]
    ModelNotLoaded,
    #[error(transparent)]
    Features(#[from] FeatureError),
    #[error("model produced an unknown class")]
    UnknownClass,
}

/// Model and extractor shared by every request.
pub struct ModelService {
    model: Option<TrainedModel>,
    extractor: FeatureExtractor,
}

impl ModelService {
    pub fn new(model: Option<TrainedModel>, extractor: FeatureExtractor) -> Self {
        Self { model, extractor }
    }

    /// Loads the artifacts from `model_dir`. A missing or unreadable model is
    /// logged and leaves the service running unhealthy.
    pub fn load(model_dir: &Path, config: ExtractorConfig) -> Self {
        let model = match TrainedModel::load(model_dir) {
            Ok(model) => {
                info!(dir = %model_dir.display(), "model loaded successfully");
                Some(model)
            }
            Err(err) => {
                error!(dir = %model_dir.display(), %err, "error loading model");
                None
            }
        };
        Self::new(model, FeatureExtractor::new(config))
    }

    pub fn is_healthy(&self) -> bool {
        self.model.is_some()
    }

    #[instrument(skip_all, fields(n_bytes = bytes.len()), level = "trace")]
    pub fn predict(&self, bytes: Vec<u8>) -> Result<Prediction, ServeError> {
        let model = self.model.as_ref().ok_or(ServeError::ModelNotLoaded)?;
        let features = self.extractor.extract_bytes(bytes)?;
        model.predict(&features).ok_or(ServeError::UnknownClass)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Prediction { sentiment: String, confidence: f64 },
    Error { error: String },
}

impl PredictResponse {
    fn error(message: impl ToString) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub fn router(service: Arc<ModelService>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .with_state(service)
}

pub async fn serve(addr: SocketAddr, service: ModelService) -> Result<()> {
    let app = router(Arc::new(service));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "serving predictions");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn predict(State(service): State<Arc<ModelService>>, body: Bytes) -> Json<PredictResponse> {
    let bytes = body.to_vec();
    let result = tokio::task::spawn_blocking(move || service.predict(bytes)).await;

    let response = match result {
        Ok(Ok(prediction)) => PredictResponse::Prediction {
            sentiment: prediction.label,
            confidence: prediction.confidence,
        },
        Ok(Err(err)) => {
            error!(%err, "prediction error");
            PredictResponse::error(err)
        }
        Err(err) => {
            error!(%err, "prediction task failed");
            PredictResponse::error(err)
        }
    };
    Json(response)
}

async fn health(State(service): State<Arc<ModelService>>) -> Json<HealthResponse> {
    let status = if service.is_healthy() {
        "healthy"
    } else {
        "unhealthy"
    };
    Json(HealthResponse { status })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use training::{ForestParams, LabelEncoder, RandomForest};

    use super::*;

    fn tone_wav(freq: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buf = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut buf, spec).unwrap();
        for i in 0..4_096 {
            let v = 0.4 * (std::f32::consts::TAU * freq * i as f32 / 22_050.0).sin();
            writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
        buf.into_inner()
    }

    fn tone_service() -> ModelService {
        let extractor = FeatureExtractor::default();
        let encoder = LabelEncoder::fit(&["high", "low"]);
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..6 {
            let offset = i as f32 * 20.0;
            features.push(extractor.extract_bytes(tone_wav(3_000.0 + offset)).unwrap());
            labels.push(0);
            features.push(extractor.extract_bytes(tone_wav(200.0 + offset)).unwrap());
            labels.push(1);
        }
        let params = ForestParams {
            n_estimators: 10,
            ..Default::default()
        };
        let classifier = RandomForest::fit(params, &features, &labels).unwrap();
        ModelService::new(
            Some(TrainedModel {
                classifier,
                encoder,
            }),
            extractor,
        )
    }

    #[tokio::test]
    async fn missing_model_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(ModelService::load(dir.path(), ExtractorConfig::default()));

        let Json(status) = health(State(service.clone())).await;
        assert_eq!(status.status, "unhealthy");

        let Json(response) = predict(State(service), Bytes::from(tone_wav(440.0))).await;
        assert_eq!(response, PredictResponse::error("Model not loaded"));
    }

    #[tokio::test]
    async fn loaded_model_predicts_a_known_class() {
        let service = Arc::new(tone_service());

        let Json(status) = health(State(service.clone())).await;
        assert_eq!(status.status, "healthy");

        let Json(response) = predict(State(service), Bytes::from(tone_wav(250.0))).await;
        match response {
            PredictResponse::Prediction {
                sentiment,
                confidence,
            } => {
                assert!(["high", "low"].contains(&sentiment.as_str()));
                assert!(confidence > 0.0 && confidence <= 1.0);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_audio_is_an_error_response() {
        let service = Arc::new(tone_service());
        let Json(response) = predict(State(service), Bytes::from_static(b"not audio")).await;
        assert!(matches!(response, PredictResponse::Error { .. }));
    }

    #[test]
    fn responses_serialize_flat() {
        let ok = PredictResponse::Prediction {
            sentiment: "positive".into(),
            confidence: 0.5,
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"sentiment": "positive", "confidence": 0.5})
        );
        assert_eq!(
            serde_json::to_value(PredictResponse::error("boom")).unwrap(),
            serde_json::json!({"error": "boom"})
        );
    }
}
