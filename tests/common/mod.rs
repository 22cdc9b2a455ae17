//! Shared helpers for integration tests: a scripted provider with
//! per-endpoint delays and a recording consumer.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beatsync_engine::provider::{
    AnalysisProvider, AudioAnalysis, AudioFeatures, NowPlaying, ProviderError,
};
use beatsync_engine::{MusicStateConsumer, ProcessedMusicState};

pub struct TrackData {
    pub features: Option<AudioFeatures>,
    pub analysis: Option<AudioAnalysis>,
}

/// Provider stub serving per-track canned data with configurable latency.
pub struct DelayedProvider {
    tracks: HashMap<String, TrackData>,
    pub features_delay: Duration,
    pub analysis_delay: Duration,
}

impl DelayedProvider {
    pub fn new() -> Self {
        Self {
            tracks: HashMap::new(),
            features_delay: Duration::ZERO,
            analysis_delay: Duration::ZERO,
        }
    }

    pub fn with_track(mut self, track_id: &str, data: TrackData) -> Self {
        self.tracks.insert(track_id.to_string(), data);
        self
    }

    pub fn with_analysis_delay(mut self, delay: Duration) -> Self {
        self.analysis_delay = delay;
        self
    }
}

#[async_trait]
impl AnalysisProvider for DelayedProvider {
    async fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>, ProviderError> {
        if !self.features_delay.is_zero() {
            tokio::time::sleep(self.features_delay).await;
        }
        Ok(self
            .tracks
            .get(track_id)
            .and_then(|t| t.features.clone()))
    }

    async fn audio_analysis(&self, track_id: &str) -> Result<Option<AudioAnalysis>, ProviderError> {
        if !self.analysis_delay.is_zero() {
            tokio::time::sleep(self.analysis_delay).await;
        }
        Ok(self
            .tracks
            .get(track_id)
            .and_then(|t| t.analysis.clone()))
    }

    async fn now_playing(&self) -> Result<Option<NowPlaying>, ProviderError> {
        Ok(None)
    }
}

/// Consumer that records every delivered state in order.
pub struct Recorder {
    states: Mutex<Vec<ProcessedMusicState>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(Vec::new()),
        })
    }

    pub fn all(&self) -> Vec<ProcessedMusicState> {
        self.states.lock().unwrap().clone()
    }

    /// Published snapshots only, beat events filtered out.
    pub fn snapshots(&self) -> Vec<ProcessedMusicState> {
        self.all()
            .into_iter()
            .filter(|s| !s.beat_occurred)
            .collect()
    }

    pub fn beat_count(&self) -> usize {
        self.all().iter().filter(|s| s.beat_occurred).count()
    }
}

impl MusicStateConsumer for Recorder {
    fn on_music_state(
        &self,
        state: &ProcessedMusicState,
        _raw_features: Option<&AudioFeatures>,
        _track_id: &str,
    ) -> anyhow::Result<()> {
        self.states.lock().unwrap().push(state.clone());
        Ok(())
    }
}

pub fn dance_features() -> AudioFeatures {
    AudioFeatures {
        danceability: Some(0.8),
        energy: Some(0.7),
        valence: Some(0.5),
        tempo: Some(120.0),
        ..Default::default()
    }
}

pub fn analysis_with_grid(tempo: f64, beat_grid: Vec<f64>) -> AudioAnalysis {
    AudioAnalysis {
        tempo,
        loudness_db: -7.0,
        beat_grid,
        ..Default::default()
    }
}

pub fn playing(track_id: &str) -> NowPlaying {
    NowPlaying {
        track_id: track_id.to_string(),
        duration_ms: 180_000,
        progress_ms: Some(0),
    }
}
