//! Tempo fusion.
//!
//! Fuses the provider-reported tempo with danceability, energy, valence and
//! the genre profile into a single "enhanced BPM" that downstream visuals
//! can rely on. The synthesizer is total: any combination of missing or
//! garbage inputs produces a well-formed, clamped BPM.
//!
//! Tuning constants (chosen once, documented here, covered by tests):
//! - blend weights: danceability 0.30, energy 0.25, normalized tempo 0.45
//! - a component whose value falls below 0.30 has its weight halved, so a
//!   weak signal counts less instead of dragging the blend down full force
//! - valence nudges the result by at most ±6%
//! - 120 BPM is the normalization reference (raw tempo 120 maps to 1.0)

use crate::config::TempoSettings;
use crate::genre::GenreProfile;
use crate::provider::AudioFeatures;

const REFERENCE_BPM: f64 = 120.0;

const WEIGHT_DANCEABILITY: f64 = 0.30;
const WEIGHT_ENERGY: f64 = 0.25;
const WEIGHT_TEMPO: f64 = 0.45;

/// Below this value a blend component is considered weak.
const WEAK_COMPONENT_THRESHOLD: f64 = 0.30;
/// Weight multiplier applied to weak components.
const WEAK_COMPONENT_ATTENUATION: f64 = 0.5;

/// Valence above this nudges the BPM up, scaling to +6% at valence 1.0.
const HAPPY_VALENCE: f64 = 0.6;
/// Valence below this, combined with low energy, nudges the BPM down.
const SAD_VALENCE: f64 = 0.35;
const LOW_ENERGY: f64 = 0.4;
const MAX_VALENCE_NUDGE: f64 = 0.06;

/// Fuses raw tempo and audio features into an enhanced BPM.
#[derive(Debug, Clone)]
pub struct TempoSynthesizer {
    settings: TempoSettings,
}

impl TempoSynthesizer {
    pub fn new(settings: TempoSettings) -> Self {
        Self { settings }
    }

    /// Compute the enhanced BPM.
    ///
    /// - absent or non-positive raw tempo: fixed fallback BPM
    /// - features absent: raw tempo clamped (basic mode)
    /// - otherwise: weighted blend, valence nudge, genre emphasis, clamp
    ///
    /// The result is rounded to two decimal places so repeated calls with
    /// identical inputs are bit-identical.
    pub fn synthesize(
        &self,
        raw_tempo: Option<f64>,
        features: Option<&AudioFeatures>,
        profile: &GenreProfile,
    ) -> f64 {
        let tempo = match raw_tempo {
            Some(t) if t > 0.0 && t.is_finite() => t,
            _ => return self.settings.fallback_bpm,
        };

        let Some(f) = features else {
            return round2(self.clamp(tempo));
        };

        let normalized_tempo = tempo / REFERENCE_BPM;

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        let mut blend = |value: Option<f64>, weight: f64| {
            if let Some(v) = value {
                let weight = if v < WEAK_COMPONENT_THRESHOLD {
                    weight * WEAK_COMPONENT_ATTENUATION
                } else {
                    weight
                };
                weighted_sum += v * weight;
                total_weight += weight;
            }
        };

        blend(f.danceability, WEIGHT_DANCEABILITY);
        blend(f.energy, WEIGHT_ENERGY);
        blend(Some(normalized_tempo), WEIGHT_TEMPO);

        // total_weight is always > 0: the tempo component is always present.
        let average = weighted_sum / total_weight;

        let nudge = valence_multiplier(f.valence, f.energy);
        let bpm = average * REFERENCE_BPM * nudge * profile.beat_emphasis;

        round2(self.clamp(bpm))
    }

    /// Beat interval in milliseconds for a BPM, with 0 as the explicit
    /// "no rhythmic sync available" sentinel. Never divides by zero.
    pub fn beat_interval_ms(bpm: f64) -> f64 {
        if bpm > 0.0 {
            60_000.0 / bpm
        } else {
            0.0
        }
    }

    /// Rough feature estimate from tempo and loudness, used when the
    /// provider has no features for a track. Loudness maps from the usual
    /// [-60, 0] dB range onto energy.
    pub fn estimate_features(tempo: f64, loudness_db: f64) -> AudioFeatures {
        AudioFeatures {
            danceability: Some((tempo / 150.0).clamp(0.0, 1.0)),
            energy: Some(((loudness_db + 60.0) / 60.0).clamp(0.0, 1.0)),
            valence: Some(0.5),
            acousticness: None,
            instrumentalness: None,
            tempo: Some(tempo),
        }
    }

    fn clamp(&self, bpm: f64) -> f64 {
        bpm.clamp(self.settings.min_bpm, self.settings.max_bpm)
    }
}

/// Happier tracks get nudged slightly up, sad low-energy tracks slightly
/// down. Magnitude is intentionally small (≤ ±6%); absent valence is
/// neutral.
fn valence_multiplier(valence: Option<f64>, energy: Option<f64>) -> f64 {
    let Some(valence) = valence else {
        return 1.0;
    };

    if valence >= HAPPY_VALENCE {
        let excess = (valence - HAPPY_VALENCE) / (1.0 - HAPPY_VALENCE);
        return 1.0 + excess.clamp(0.0, 1.0) * MAX_VALENCE_NUDGE;
    }

    if valence <= SAD_VALENCE && energy.is_some_and(|e| e <= LOW_ENERGY) {
        let deficit = (SAD_VALENCE - valence) / SAD_VALENCE;
        return 1.0 - deficit.clamp(0.0, 1.0) * MAX_VALENCE_NUDGE;
    }

    1.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesizer() -> TempoSynthesizer {
        TempoSynthesizer::new(TempoSettings::default())
    }

    fn full_features(danceability: f64, energy: f64, valence: f64) -> AudioFeatures {
        AudioFeatures {
            danceability: Some(danceability),
            energy: Some(energy),
            valence: Some(valence),
            acousticness: Some(0.5),
            instrumentalness: Some(0.1),
            tempo: Some(120.0),
        }
    }

    #[test]
    fn test_fallback_for_absent_tempo() {
        let s = synthesizer();
        let f = full_features(0.8, 0.7, 0.5);
        assert_eq!(s.synthesize(None, Some(&f), &GenreProfile::default()), 75.0);
    }

    #[test]
    fn test_fallback_totality_for_bad_tempo() {
        let s = synthesizer();
        let profile = GenreProfile::default();
        for bad in [Some(0.0), Some(-10.0), Some(f64::NAN), None] {
            assert_eq!(s.synthesize(bad, None, &profile), 75.0);
        }
    }

    #[test]
    fn test_basic_mode_clamps_raw_tempo() {
        let s = synthesizer();
        let profile = GenreProfile::default();
        // Scenario from the requirements: 128 raw, no features
        assert_eq!(s.synthesize(Some(128.0), None, &profile), 128.0);
        // Out-of-range tempos clamp
        assert_eq!(s.synthesize(Some(30.0), None, &profile), 60.0);
        assert_eq!(s.synthesize(Some(300.0), None, &profile), 180.0);
    }

    #[test]
    fn test_full_fusion_reference_value() {
        // raw=120, dance=0.8, energy=0.7, valence=0.5, default profile:
        //   blend = (0.30*0.8 + 0.25*0.7 + 0.45*1.0) / 1.0 = 0.865
        //   no attenuation (all components >= 0.30), neutral valence
        //   bpm = 0.865 * 120 = 103.8
        let s = synthesizer();
        let f = full_features(0.8, 0.7, 0.5);
        let bpm = s.synthesize(Some(120.0), Some(&f), &GenreProfile::default());
        assert!((bpm - 103.8).abs() < 1e-9, "got {}", bpm);
    }

    #[test]
    fn test_idempotence() {
        let s = synthesizer();
        let f = full_features(0.73, 0.61, 0.42);
        let profile = GenreProfile::default();
        let first = s.synthesize(Some(117.3), Some(&f), &profile);
        let second = s.synthesize(Some(117.3), Some(&f), &profile);
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn test_output_always_clamped() {
        let s = synthesizer();
        let profile = GenreProfile {
            beat_emphasis: 1.15,
            ..Default::default()
        };
        for tempo in [1.0, 60.0, 120.0, 175.0, 240.0, 1000.0] {
            for (d, e, v) in [(0.0, 0.0, 0.0), (1.0, 1.0, 1.0), (0.5, 0.1, 0.9)] {
                let f = full_features(d, e, v);
                let bpm = s.synthesize(Some(tempo), Some(&f), &profile);
                assert!((60.0..=180.0).contains(&bpm), "bpm {} out of range", bpm);
            }
        }
    }

    #[test]
    fn test_weak_component_attenuation() {
        let s = synthesizer();
        let profile = GenreProfile::default();
        // danceability 0.1 is weak: its weight halves to 0.15
        //   blend = (0.15*0.1 + 0.25*0.7 + 0.45*1.0) / 0.85 = 0.64/0.85
        let f = full_features(0.1, 0.7, 0.5);
        let bpm = s.synthesize(Some(120.0), Some(&f), &profile);
        let expected = round2(0.64 / 0.85 * 120.0);
        assert!((bpm - expected).abs() < 1e-9, "got {}", bpm);
    }

    #[test]
    fn test_missing_component_dropped_from_blend() {
        let s = synthesizer();
        let profile = GenreProfile::default();
        // No danceability: blend over energy + tempo only
        //   blend = (0.25*0.7 + 0.45*1.0) / 0.70 = 0.625/0.70
        let f = AudioFeatures {
            danceability: None,
            energy: Some(0.7),
            valence: Some(0.5),
            tempo: Some(120.0),
            ..Default::default()
        };
        let bpm = s.synthesize(Some(120.0), Some(&f), &profile);
        let expected = round2(0.625 / 0.70 * 120.0);
        assert!((bpm - expected).abs() < 1e-9, "got {}", bpm);
    }

    #[test]
    fn test_happy_track_nudged_up() {
        let s = synthesizer();
        let profile = GenreProfile::default();
        let neutral = s.synthesize(Some(120.0), Some(&full_features(0.8, 0.7, 0.5)), &profile);
        let happy = s.synthesize(Some(120.0), Some(&full_features(0.8, 0.7, 1.0)), &profile);
        assert!(happy > neutral);
        // Nudge is capped at 6%
        assert!(happy <= neutral * 1.0601);
    }

    #[test]
    fn test_sad_low_energy_track_nudged_down() {
        let s = synthesizer();
        let profile = GenreProfile::default();
        let neutral = s.synthesize(Some(120.0), Some(&full_features(0.8, 0.35, 0.5)), &profile);
        let sad = s.synthesize(Some(120.0), Some(&full_features(0.8, 0.35, 0.1)), &profile);
        assert!(sad < neutral);
        assert!(sad >= neutral * 0.94 - 0.01);
    }

    #[test]
    fn test_sad_high_energy_track_not_nudged() {
        // Sad but energetic: no downward nudge
        assert_eq!(valence_multiplier(Some(0.1), Some(0.9)), 1.0);
    }

    #[test]
    fn test_beat_emphasis_applied() {
        let s = synthesizer();
        let f = full_features(0.8, 0.7, 0.5);
        let neutral = s.synthesize(Some(120.0), Some(&f), &GenreProfile::default());
        let emphasized = s.synthesize(
            Some(120.0),
            Some(&f),
            &GenreProfile {
                beat_emphasis: 1.1,
                ..Default::default()
            },
        );
        assert!((emphasized - round2(neutral * 1.1)).abs() < 0.01);
    }

    #[test]
    fn test_beat_interval() {
        assert_eq!(TempoSynthesizer::beat_interval_ms(120.0), 500.0);
        assert_eq!(TempoSynthesizer::beat_interval_ms(60.0), 1000.0);
        // Sentinel, not a division by zero
        assert_eq!(TempoSynthesizer::beat_interval_ms(0.0), 0.0);
        assert_eq!(TempoSynthesizer::beat_interval_ms(-5.0), 0.0);
    }

    #[test]
    fn test_estimate_features() {
        let f = TempoSynthesizer::estimate_features(75.0, -30.0);
        assert_eq!(f.tempo, Some(75.0));
        assert_eq!(f.energy, Some(0.5));
        assert_eq!(f.danceability, Some(0.5));
        assert_eq!(f.valence, Some(0.5));
        assert_eq!(f.acousticness, None);

        // Loudness outside the expected range clamps
        let quiet = TempoSynthesizer::estimate_features(75.0, -90.0);
        assert_eq!(quiet.energy, Some(0.0));
        let loud = TempoSynthesizer::estimate_features(75.0, 5.0);
        assert_eq!(loud.energy, Some(1.0));
    }
}
