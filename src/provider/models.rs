//! Wire and domain models for provider data.
//!
//! Fields the provider omits or sends as null deserialize to `None` and are
//! treated as absent everywhere downstream, never as zero.

use serde::{Deserialize, Serialize};

/// Lightweight per-track audio features.
///
/// Tempo is in BPM; all other values are normalized to [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub valence: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub tempo: Option<f64>,
}

impl AudioFeatures {
    /// A features payload is usable only if it carries a positive tempo.
    /// Zero or missing tempo means the provider has not finished analyzing
    /// the track yet.
    pub fn has_valid_tempo(&self) -> bool {
        self.tempo.is_some_and(|t| t > 0.0)
    }
}

/// Full audio analysis for a track.
///
/// The beat grid is an ordered list of beat timestamps in seconds from
/// track start. Bar and section grids follow the same convention but are
/// optional refinements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioAnalysis {
    pub tempo: f64,
    pub loudness_db: f64,
    /// Pitch class 0-11, or None when the provider could not determine it.
    pub key: Option<u8>,
    pub time_signature: Option<u8>,
    pub beat_grid: Vec<f64>,
    #[serde(default)]
    pub bar_grid: Vec<f64>,
    #[serde(default)]
    pub section_grid: Vec<f64>,
}

impl AudioAnalysis {
    pub fn has_valid_tempo(&self) -> bool {
        self.tempo > 0.0
    }
}

/// Host "now playing" signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub track_id: String,
    pub duration_ms: u64,
    /// Playback position at the time of the signal, when the host reports it.
    #[serde(default)]
    pub progress_ms: Option<u64>,
}

/// Raw audio-analysis payload as returned by the provider.
///
/// The provider nests track-level values under `track` and reports beats as
/// timed events; we flatten this into [`AudioAnalysis`] at the boundary.
#[derive(Debug, Deserialize)]
pub(crate) struct AnalysisPayload {
    pub track: TrackAnalysisPayload,
    #[serde(default)]
    pub beats: Vec<TimedEventPayload>,
    #[serde(default)]
    pub bars: Vec<TimedEventPayload>,
    #[serde(default)]
    pub sections: Vec<TimedEventPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackAnalysisPayload {
    #[serde(default)]
    pub tempo: f64,
    #[serde(default)]
    pub loudness: f64,
    pub key: Option<i32>,
    pub time_signature: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TimedEventPayload {
    pub start: f64,
}

impl From<AnalysisPayload> for AudioAnalysis {
    fn from(payload: AnalysisPayload) -> Self {
        // Provider uses -1 for "unknown" key; anything outside 0-11 is unknown.
        let key = payload
            .track
            .key
            .filter(|k| (0..=11).contains(k))
            .map(|k| k as u8);
        let time_signature = payload
            .track
            .time_signature
            .filter(|ts| *ts > 0)
            .map(|ts| ts as u8);

        Self {
            tempo: payload.track.tempo,
            loudness_db: payload.track.loudness,
            key,
            time_signature,
            beat_grid: payload.beats.into_iter().map(|b| b.start).collect(),
            bar_grid: payload.bars.into_iter().map(|b| b.start).collect(),
            section_grid: payload.sections.into_iter().map(|s| s.start).collect(),
        }
    }
}
