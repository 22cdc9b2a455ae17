//! Rule-based genre classification.
//!
//! Maps audio features to a genre tag and a tuning profile consumed by the
//! tempo synthesizer. The rule chain is evaluated in a fixed priority order
//! and falls through to the default profile when no rule matches or features
//! are absent. Pure and side-effect-free.

use crate::provider::AudioFeatures;
use serde::Serialize;

/// Genre tag used when no rule matches.
pub const DEFAULT_GENRE: &str = "default";

/// Tempo threshold separating techno from the broader electronic branch.
const TECHNO_TEMPO_BPM: f64 = 140.0;

/// Multiplicative tuning factors associated with a genre.
///
/// A factor of 1.0 is neutral; profiles that don't care about a given
/// factor leave it at 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenreProfile {
    /// Multiplier applied to the synthesized BPM.
    pub beat_emphasis: f64,
    /// Multiplier applied to energy-driven visual effects.
    pub energy_boost: f64,
    /// How tightly visuals should track the beat grid, in [0, 1].
    pub precision: f64,
}

impl Default for GenreProfile {
    fn default() -> Self {
        Self {
            beat_emphasis: 1.0,
            energy_boost: 1.0,
            precision: 0.7,
        }
    }
}

const TECHNO: GenreProfile = GenreProfile {
    beat_emphasis: 1.15,
    energy_boost: 1.2,
    precision: 0.9,
};

const ELECTRONIC: GenreProfile = GenreProfile {
    beat_emphasis: 1.1,
    energy_boost: 1.1,
    precision: 0.85,
};

const DANCE: GenreProfile = GenreProfile {
    beat_emphasis: 1.1,
    energy_boost: 1.15,
    precision: 0.8,
};

const CLASSICAL: GenreProfile = GenreProfile {
    beat_emphasis: 0.9,
    energy_boost: 0.8,
    precision: 0.6,
};

const AMBIENT: GenreProfile = GenreProfile {
    beat_emphasis: 0.85,
    energy_boost: 0.7,
    precision: 0.5,
};

const ROCK: GenreProfile = GenreProfile {
    beat_emphasis: 1.05,
    energy_boost: 1.1,
    precision: 0.75,
};

const POP: GenreProfile = GenreProfile {
    beat_emphasis: 1.0,
    energy_boost: 1.0,
    precision: 0.7,
};

/// Classify a track's features into a genre tag and tuning profile.
///
/// Absent features (or absent individual fields) never match a rule, so a
/// sparse payload degrades gracefully toward the default profile.
pub fn classify(features: Option<&AudioFeatures>) -> (&'static str, GenreProfile) {
    let Some(f) = features else {
        return (DEFAULT_GENRE, GenreProfile::default());
    };

    let above = |v: Option<f64>, threshold: f64| v.is_some_and(|v| v > threshold);
    let below = |v: Option<f64>, threshold: f64| v.is_some_and(|v| v < threshold);

    // Instrumental + synthetic + energetic: electronic family, split by tempo.
    if above(f.instrumentalness, 0.7) && below(f.acousticness, 0.3) && above(f.energy, 0.6) {
        if f.tempo.is_some_and(|t| t >= TECHNO_TEMPO_BPM) {
            return ("techno", TECHNO);
        }
        return ("electronic", ELECTRONIC);
    }

    if above(f.danceability, 0.7) && above(f.energy, 0.6) {
        return ("dance", DANCE);
    }

    if above(f.acousticness, 0.7) && below(f.energy, 0.4) {
        return ("classical", CLASSICAL);
    }

    if below(f.energy, 0.3) && above(f.instrumentalness, 0.5) {
        return ("ambient", AMBIENT);
    }

    if above(f.energy, 0.7) && below(f.acousticness, 0.4) {
        return ("rock", ROCK);
    }

    if above(f.danceability, 0.5) && above(f.valence, 0.5) {
        return ("pop", POP);
    }

    (DEFAULT_GENRE, GenreProfile::default())
}
