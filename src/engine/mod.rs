//! Pipeline orchestration: from a now-playing signal to published states.
//!
//! Processing is progressive. A track change immediately kicks off two
//! stages: a quick features-based state so consumers react fast, then a
//! refined state once the full analysis (with its beat grid) arrives. A
//! generation counter guards every publish so a late-resolving fetch for a
//! previous track can never overwrite the current one.

mod models;

pub use models::{visual_intensity, DataSource, Mood, ProcessedMusicState};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::beat::{BeatScheduler, Clock};
use crate::cache::TtlCache;
use crate::config::{CacheSettings, GatewaySettings, TempoSettings};
use crate::gateway::AnalysisGateway;
use crate::genre;
use crate::hub::SyncHub;
use crate::metrics;
use crate::provider::{AnalysisProvider, AudioFeatures, NowPlaying};
use crate::tempo::TempoSynthesizer;

struct CurrentTrack {
    track_id: String,
    generation: u64,
    started: Instant,
    progress_offset_ms: u64,
    duration_ms: u64,
}

/// Central coordinator wiring the gateway, synthesizer, scheduler and hub.
pub struct MusicSyncEngine {
    gateway: AnalysisGateway,
    hub: Arc<SyncHub>,
    scheduler: BeatScheduler,
    synthesizer: TempoSynthesizer,
    state_cache: Arc<TtlCache<String, ProcessedMusicState>>,
    current: Mutex<Option<CurrentTrack>>,
    generation: AtomicU64,
}

impl MusicSyncEngine {
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        hub: Arc<SyncHub>,
        clock: Arc<dyn Clock>,
        gateway_settings: &GatewaySettings,
        cache_settings: &CacheSettings,
        tempo_settings: TempoSettings,
    ) -> Self {
        Self {
            gateway: AnalysisGateway::new(provider, gateway_settings, cache_settings),
            hub: Arc::clone(&hub),
            scheduler: BeatScheduler::new(hub, clock),
            synthesizer: TempoSynthesizer::new(tempo_settings),
            state_cache: Arc::new(TtlCache::new(
                cache_settings.ttl,
                cache_settings.max_entries,
            )),
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn hub(&self) -> &Arc<SyncHub> {
        &self.hub
    }

    /// Spawn periodic sweep tasks for every cache the engine owns.
    pub fn spawn_sweepers(&self, settings: &CacheSettings, shutdown_token: &CancellationToken) {
        self.gateway.spawn_sweepers(settings, shutdown_token);
        let _ = self
            .state_cache
            .spawn_sweeper(settings.sweep_interval, shutdown_token.child_token());
    }

    /// React to a now-playing signal.
    ///
    /// Repeated signals for the track already being processed are ignored.
    /// A different track bumps the generation, disarms the beat scheduler
    /// and spawns the two-stage processing pipeline.
    pub fn handle_now_playing(self: &Arc<Self>, now_playing: NowPlaying) {
        let generation = {
            let mut current = self.current.lock().unwrap();
            if current
                .as_ref()
                .is_some_and(|c| c.track_id == now_playing.track_id)
            {
                return;
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = Some(CurrentTrack {
                track_id: now_playing.track_id.clone(),
                generation,
                started: Instant::now(),
                progress_offset_ms: now_playing.progress_ms.unwrap_or(0),
                duration_ms: now_playing.duration_ms,
            });
            generation
        };

        info!(
            "Track changed to '{}' (position {:?}ms)",
            now_playing.track_id, now_playing.progress_ms
        );
        self.scheduler.disarm();

        // Replay a cached processed state immediately so consumers don't go
        // dark while the pipeline runs.
        if let Some(mut cached) = self.state_cache.get(&now_playing.track_id) {
            cached.timestamp = chrono::Utc::now();
            cached.data_source = DataSource::Cache;
            cached.beat_occurred = false;
            self.hub.publish(cached, None);
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine
                .process_track(now_playing.track_id, generation, Instant::now())
                .await;
        });
    }

    /// React to playback stopping: disarm the scheduler and forget the
    /// current track so it reprocesses when it comes back.
    pub fn handle_stopped(&self) {
        let had_track = self.current.lock().unwrap().take().is_some();
        if had_track {
            debug!("Playback stopped");
            self.scheduler.disarm();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let current = self.current.lock().unwrap();
        current.as_ref().is_some_and(|c| c.generation == generation)
    }

    async fn process_track(self: Arc<Self>, track_id: String, generation: u64, start: Instant) {
        // Stage 1: lightweight features for a fast first state.
        let features = self.gateway.fetch_features(&track_id).await;
        if !self.is_current(generation) {
            debug!("Dropping stale features result for '{}'", track_id);
            return;
        }

        let (features, state) = match features {
            Some((features, source)) => {
                let (genre_name, profile) = genre::classify(Some(&features));
                let bpm = self
                    .synthesizer
                    .synthesize(features.tempo, Some(&features), &profile);
                let state = self.build_state(
                    &track_id,
                    features.tempo.unwrap_or(0.0),
                    Some(&features),
                    genre_name,
                    bpm,
                    source,
                );
                (Some(features), state)
            }
            None => {
                let (genre_name, profile) = genre::classify(None);
                let bpm = self.synthesizer.synthesize(None, None, &profile);
                let state = self.build_state(
                    &track_id,
                    0.0,
                    None,
                    genre_name,
                    bpm,
                    DataSource::Fallback,
                );
                (None, state)
            }
        };

        metrics::observe_processing_time(start.elapsed());
        self.state_cache.set(track_id.clone(), state.clone());
        self.hub.publish(state, features.clone());

        // Stage 2: full analysis refines the BPM and arms the beat grid.
        let Some((analysis, source)) = self.gateway.fetch_analysis(&track_id).await else {
            debug!("No analysis for '{}', staying on features state", track_id);
            return;
        };
        if !self.is_current(generation) {
            debug!("Dropping stale analysis result for '{}'", track_id);
            return;
        }

        let fusion_features = features.unwrap_or_else(|| {
            TempoSynthesizer::estimate_features(analysis.tempo, analysis.loudness_db)
        });
        let (genre_name, profile) = genre::classify(Some(&fusion_features));
        let bpm = self
            .synthesizer
            .synthesize(Some(analysis.tempo), Some(&fusion_features), &profile);
        let state = self.build_state(
            &track_id,
            analysis.tempo,
            Some(&fusion_features),
            genre_name,
            bpm,
            source,
        );

        self.state_cache.set(track_id.clone(), state.clone());
        self.hub.publish(state, Some(fusion_features));

        // Arm against where playback actually is now, not where it was when
        // the signal arrived. The arm stays under the current-track lock:
        // a concurrent track change either bumps the generation before the
        // check here, or disarms this grid right after taking over. Never
        // arm a track that has already run past its end.
        let current = self.current.lock().unwrap();
        match current.as_ref() {
            Some(c) if c.generation == generation => {
                let position_ms = c.progress_offset_ms + c.started.elapsed().as_millis() as u64;
                if position_ms >= c.duration_ms {
                    debug!("Track '{}' already past its end, not arming", track_id);
                } else {
                    self.scheduler.arm(analysis.beat_grid, position_ms);
                }
            }
            _ => debug!("Track changed before arming beat grid for '{}'", track_id),
        }
    }

    fn build_state(
        &self,
        track_id: &str,
        raw_tempo: f64,
        features: Option<&AudioFeatures>,
        genre_name: &str,
        enhanced_bpm: f64,
        source: DataSource,
    ) -> ProcessedMusicState {
        let energy = features.and_then(|f| f.energy).unwrap_or(0.5);
        let valence = features.and_then(|f| f.valence).unwrap_or(0.5);
        ProcessedMusicState {
            track_id: track_id.to_string(),
            timestamp: chrono::Utc::now(),
            tempo: raw_tempo,
            enhanced_bpm,
            beat_interval_ms: TempoSynthesizer::beat_interval_ms(enhanced_bpm),
            energy,
            valence,
            visual_intensity: visual_intensity(features),
            mood: Mood::derive(energy, valence),
            genre: genre_name.to_string(),
            data_source: source,
            beat_occurred: false,
        }
    }
}
