//! Model capability clients.
//!
//! Both models are externally supplied and served over HTTP by a local
//! inference service: a general-purpose classifier that ranks species labels
//! and a domain-specific identifier that maps a photo to an enrolled class.
//! Every call is bounded by the configured timeout; a timeout or transport
//! failure surfaces as a retryable outage, never as an accept/reject verdict.

use anyhow::Result;
use async_trait::async_trait;
use herd_shared::error::HerdError;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;

use crate::config::VisionConfig;
use crate::identify::Identification;

/// One entry of the general classifier's ranked output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RankedLabel {
    pub label: String,
    pub score: f32,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    labels: Vec<RankedLabel>,
}

#[derive(Debug, Deserialize)]
struct IdentifyResponse {
    class_id: u32,
    score: f32,
}

/// The two model capabilities, behind one seam so the dispatcher can be
/// exercised with stubs.
#[async_trait]
pub trait Vision: Send + Sync {
    /// Rank species labels for the photo (general-purpose classifier).
    async fn classify(&self, image: &[u8]) -> Result<Vec<RankedLabel>, HerdError>;

    /// Map the photo to an enrolled class and a confidence in [0, 1]
    /// (domain-specific classifier).
    async fn identify(&self, image: &[u8]) -> Result<Identification, HerdError>;
}

/// HTTP client for the inference service.
pub struct HttpVision {
    client: reqwest::Client,
    base: String,
}

impl HttpVision {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn post_image(&self, path: &str, image: &[u8]) -> Result<reqwest::Response, HerdError> {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(HerdError::ClassificationUnavailable(format!(
                "inference service returned {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Vision for HttpVision {
    async fn classify(&self, image: &[u8]) -> Result<Vec<RankedLabel>, HerdError> {
        let body: ClassifyResponse = self
            .post_image("/v1/classify", image)
            .await?
            .json()
            .await
            .map_err(unavailable)?;
        Ok(body.labels)
    }

    async fn identify(&self, image: &[u8]) -> Result<Identification, HerdError> {
        let body: IdentifyResponse = self
            .post_image("/v1/identify", image)
            .await?
            .json()
            .await
            .map_err(unavailable)?;
        Ok(Identification {
            animal_id: body.class_id.to_string(),
            confidence: body.score,
        })
    }
}

fn unavailable(err: reqwest::Error) -> HerdError {
    if err.is_timeout() {
        HerdError::ClassificationUnavailable("inference call timed out".to_string())
    } else {
        HerdError::ClassificationUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_response_shape() {
        let body: ClassifyResponse = serde_json::from_str(
            r#"{"labels":[{"label":"cow","score":0.91},{"label":"hay","score":0.05}]}"#,
        )
        .unwrap();
        assert_eq!(body.labels.len(), 2);
        assert_eq!(body.labels[0].label, "cow");
    }

    #[test]
    fn test_identify_response_maps_class_to_string_id() {
        let body: IdentifyResponse =
            serde_json::from_str(r#"{"class_id":12,"score":0.91}"#).unwrap();
        let ident = Identification {
            animal_id: body.class_id.to_string(),
            confidence: body.score,
        };
        assert_eq!(ident.animal_id, "12");
    }
}
