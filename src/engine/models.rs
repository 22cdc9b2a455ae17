use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::provider::AudioFeatures;

/// Where the data behind a published state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Fresh provider response
    Live,
    /// Served from the TTL cache
    Cache,
    /// Provider unavailable, synthetic defaults
    Fallback,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Live => "live",
            DataSource::Cache => "cache",
            DataSource::Fallback => "fallback",
        }
    }
}

/// Coarse emotional read of a track, derived from energy and valence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Euphoric,
    Energetic,
    Melancholic,
    Calm,
    Neutral,
}

impl Mood {
    /// High energy splits on valence; low valence reads melancholic even at
    /// mid energy; low energy without sadness is calm.
    pub fn derive(energy: f64, valence: f64) -> Self {
        if energy > 0.7 && valence > 0.6 {
            Mood::Euphoric
        } else if energy > 0.7 {
            Mood::Energetic
        } else if valence < 0.35 {
            Mood::Melancholic
        } else if energy < 0.4 {
            Mood::Calm
        } else {
            Mood::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Euphoric => "euphoric",
            Mood::Energetic => "energetic",
            Mood::Melancholic => "melancholic",
            Mood::Calm => "calm",
            Mood::Neutral => "neutral",
        }
    }
}

/// Fully processed music state, the unit of publication to consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedMusicState {
    pub track_id: String,
    pub timestamp: DateTime<Utc>,
    /// Raw provider tempo, BPM
    pub tempo: f64,
    /// Fused, genre-adjusted BPM
    pub enhanced_bpm: f64,
    /// Milliseconds between beats at the enhanced BPM, 0 when unknown
    pub beat_interval_ms: f64,
    pub energy: f64,
    pub valence: f64,
    /// Suggested overall visual drive in [0, 1]
    pub visual_intensity: f64,
    pub mood: Mood,
    pub genre: String,
    pub data_source: DataSource,
    /// True only on discrete beat events, never on state snapshots
    pub beat_occurred: bool,
}

/// Visual intensity leans on energy with danceability as a secondary driver.
pub fn visual_intensity(features: Option<&AudioFeatures>) -> f64 {
    let energy = features.and_then(|f| f.energy).unwrap_or(0.5);
    let danceability = features.and_then(|f| f.danceability).unwrap_or(0.5);
    (0.6 * energy + 0.4 * danceability).clamp(0.0, 1.0)
}
