//! External audio-analysis provider interface.
//!
//! The engine never talks to the provider service directly; everything goes
//! through the [`AnalysisProvider`] trait so tests can substitute a scripted
//! implementation.

mod client;
mod models;

pub use client::HttpAnalysisProvider;
pub use models::{AudioAnalysis, AudioFeatures, NowPlaying};

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while talking to the analysis provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("provider returned invalid payload: {0}")]
    InvalidPayload(String),
}

/// Client for an external audio-analysis provider.
///
/// All methods return `Ok(None)` when the provider has no data for the
/// request (missing track, analysis not computed yet, nothing playing).
/// `Err` is reserved for transport-level failures.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Fetch lightweight audio features for a track.
    async fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>, ProviderError>;

    /// Fetch the full audio analysis for a track. Heavier and slower than
    /// [`Self::audio_features`]; may be rate-limited by the provider.
    async fn audio_analysis(&self, track_id: &str) -> Result<Option<AudioAnalysis>, ProviderError>;

    /// Fetch the currently playing track, if any.
    async fn now_playing(&self) -> Result<Option<NowPlaying>, ProviderError>;
}
