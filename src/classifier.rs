//! Classification gateway
//!
//! The classifier is an external HTTP service that receives a raw metadata
//! artifact and predicts its content category.

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::types::Category;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Classifier answer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted category name
    #[serde(rename = "prediction")]
    pub label: String,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
}

impl Prediction {
    /// Whether the confidence reaches `threshold` percent.
    ///
    /// Compared unrounded, so 0.496 does not reach 50. NaN never does.
    pub fn reaches(&self, threshold: u8) -> bool {
        self.confidence * 100.0 >= f32::from(threshold)
    }

    /// Confidence as a whole percentage for display, clamped to `0..=100`
    pub fn confidence_percent(&self) -> u8 {
        // NaN casts to 0
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u8
    }

    /// Category named by the label, [`Category::Unknown`] when unrecognized
    pub fn category(&self) -> Category {
        Category::parse(&self.label)
    }
}

/// Predicts the category of a metadata artifact
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify the artifact stored at `artifact`
    async fn classify(&self, artifact: &Path) -> Result<Prediction>;
}

/// [`Classifier`] that posts the artifact bytes to an HTTP endpoint
#[derive(Clone, Debug)]
pub struct HttpClassifier {
    http: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    /// Client for the configured endpoint
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.url.clone(),
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, artifact: &Path) -> Result<Prediction> {
        let bytes = tokio::fs::read(artifact).await?;
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        let prediction: Prediction = serde_json::from_slice(&body)
            .map_err(|e| Error::Classifier(format!("unexpected response: {e}")))?;
        tracing::debug!(
            artifact = %artifact.display(),
            label = %prediction.label,
            confidence = prediction.confidence,
            "artifact classified"
        );
        Ok(prediction)
    }
}
