//! HTTP client for the external analysis provider service.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use super::models::{AnalysisPayload, AudioAnalysis, AudioFeatures, NowPlaying};
use super::{AnalysisProvider, ProviderError};

/// HTTP client for communicating with the analysis provider.
pub struct HttpAnalysisProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisProvider {
    /// Create a new provider client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the provider service (e.g., "http://localhost:8080")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: String, timeout_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Self { client, base_url }
    }

    /// Get the base URL of the provider service.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Internal helper: GET a JSON payload, mapping 404 and empty 204
    /// responses to `None`.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, ProviderError> {
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let value = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;
                Ok(Some(value))
            }
            status => Err(ProviderError::UnexpectedStatus(status.as_u16())),
        }
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    async fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>, ProviderError> {
        let url = format!("{}/v1/audio-features/{}", self.base_url, track_id);
        self.get_json(&url).await
    }

    async fn audio_analysis(&self, track_id: &str) -> Result<Option<AudioAnalysis>, ProviderError> {
        let url = format!("{}/v1/audio-analysis/{}", self.base_url, track_id);
        let payload: Option<AnalysisPayload> = self.get_json(&url).await?;
        Ok(payload.map(AudioAnalysis::from))
    }

    async fn now_playing(&self) -> Result<Option<NowPlaying>, ProviderError> {
        let url = format!("{}/v1/now-playing", self.base_url);
        self.get_json(&url).await
    }
}
