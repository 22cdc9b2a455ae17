//! Beat-grid scheduling.
//!
//! Given an ordered list of beat timestamps and the playback position at
//! arm time, fires precisely-timed beat events through the [`SyncHub`].
//! A beat whose deadline has already passed is skipped entirely rather
//! than fired late; correctness priority is "beats feel on-time", not
//! "every beat must eventually fire".

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hub::SyncHub;
use crate::metrics;

/// Schedules beat events from a beat grid.
///
/// State machine: Idle → Armed (grid loaded, timer task running) → Idle
/// (grid exhausted or disarmed). Re-arming cancels the previous timer task
/// before starting a new one, so two schedulers never fire concurrently.
pub struct BeatScheduler {
    hub: Arc<SyncHub>,
    clock: Arc<dyn Clock>,
    active: Mutex<Option<CancellationToken>>,
}

impl BeatScheduler {
    pub fn new(hub: Arc<SyncHub>, clock: Arc<dyn Clock>) -> Self {
        Self {
            hub,
            clock,
            active: Mutex::new(None),
        }
    }

    /// Arm the scheduler with a beat grid.
    ///
    /// `position_ms` is how far playback already is into the track; the
    /// track-start reference is reconstructed from it so beats line up with
    /// the audio even when analysis arrives seconds after the track began.
    /// Any previously armed grid is cancelled first.
    pub fn arm(&self, beat_grid: Vec<f64>, position_ms: u64) {
        let token = CancellationToken::new();
        {
            let mut active = self.active.lock().unwrap();
            if let Some(previous) = active.replace(token.clone()) {
                previous.cancel();
            }
        }

        if beat_grid.is_empty() {
            debug!("Armed with empty beat grid, nothing to schedule");
            token.cancel();
            return;
        }

        info!(
            "Beat scheduler armed: {} beats, position {}ms",
            beat_grid.len(),
            position_ms
        );

        let hub = Arc::clone(&self.hub);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            run_grid(hub, clock, beat_grid, position_ms, token).await;
        });
    }

    /// Cancel any armed grid and return to Idle.
    pub fn disarm(&self) {
        let mut active = self.active.lock().unwrap();
        if let Some(token) = active.take() {
            token.cancel();
            debug!("Beat scheduler disarmed");
        }
    }

    /// Whether a grid is currently armed (timer task live).
    pub fn is_armed(&self) -> bool {
        let active = self.active.lock().unwrap();
        active.as_ref().is_some_and(|t| !t.is_cancelled())
    }

}

/// Timer loop for one armed grid.
///
/// For each beat: `delay = beat_time - elapsed`. Non-negative delays sleep
/// then fire; negative delays mean the scheduler fell behind (delayed arm,
/// long pause) and the beat is skipped, moving straight to the next one.
async fn run_grid(
    hub: Arc<SyncHub>,
    clock: Arc<dyn Clock>,
    beat_grid: Vec<f64>,
    position_ms: u64,
    token: CancellationToken,
) {
    let start_ref_ms = clock.now_ms() as i64 - position_ms as i64;
    let mut cursor = 0usize;
    let mut fired = 0usize;
    let mut skipped = 0usize;

    while cursor < beat_grid.len() {
        if token.is_cancelled() {
            debug!("Beat grid cancelled at cursor {}", cursor);
            return;
        }

        let target_ms = (beat_grid[cursor] * 1000.0).round() as i64;
        let elapsed_ms = clock.now_ms() as i64 - start_ref_ms;
        let delay_ms = target_ms - elapsed_ms;

        if delay_ms < 0 {
            // Fell behind: skip this beat rather than firing it late.
            metrics::record_beat_skipped();
            skipped += 1;
            cursor += 1;
            continue;
        }

        tokio::select! {
            _ = token.cancelled() => {
                debug!("Beat grid cancelled while waiting for beat {}", cursor);
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms as u64)) => {
                // The cancel must win over a concurrently elapsed timer:
                // a stale grid must never fire after a new track armed.
                if token.is_cancelled() {
                    return;
                }
                hub.publish_beat();
                fired += 1;
                cursor += 1;
            }
        }
    }

    debug!(
        "Beat grid exhausted: {} fired, {} skipped",
        fired, skipped
    );
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DataSource, Mood, ProcessedMusicState};
    use crate::hub::MusicStateConsumer;
    use crate::provider::AudioFeatures;
    use std::sync::Mutex as StdMutex;

    struct BeatCounter {
        beats: StdMutex<Vec<ProcessedMusicState>>,
    }

    impl BeatCounter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                beats: StdMutex::new(Vec::new()),
            })
        }

        fn beat_count(&self) -> usize {
            self.beats
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.beat_occurred)
                .count()
        }
    }

    impl MusicStateConsumer for BeatCounter {
        fn on_music_state(
            &self,
            state: &ProcessedMusicState,
            _raw_features: Option<&AudioFeatures>,
            _track_id: &str,
        ) -> anyhow::Result<()> {
            self.beats.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    fn seeded_hub() -> (Arc<SyncHub>, Arc<BeatCounter>) {
        let hub = Arc::new(SyncHub::new());
        let counter = BeatCounter::new();
        hub.subscribe("counter", counter.clone());
        // Beat events clone the last snapshot, so seed one.
        hub.publish(
            ProcessedMusicState {
                track_id: "t1".to_string(),
                timestamp: chrono::Utc::now(),
                tempo: 120.0,
                enhanced_bpm: 120.0,
                beat_interval_ms: 500.0,
                energy: 0.5,
                valence: 0.5,
                visual_intensity: 0.5,
                mood: Mood::Neutral,
                genre: "default".to_string(),
                data_source: DataSource::Live,
                beat_occurred: false,
            },
            None,
        );
        (hub, counter)
    }

    #[tokio::test]
    async fn test_fires_all_beats_in_order() {
        let (hub, counter) = seeded_hub();
        let scheduler = BeatScheduler::new(hub, Arc::new(SystemClock::new()));

        scheduler.arm(vec![0.01, 0.05, 0.1], 0);
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(counter.beat_count(), 3);
        assert!(!scheduler.is_armed(), "grid exhausted, back to idle");
    }

    #[tokio::test]
    async fn test_skips_beats_already_in_the_past() {
        // Grid [0.0, 0.5, 1.0] with playback already at 0.9s: beats 0 and 1
        // are in the past and must be skipped; only beat 2 fires, once.
        let (hub, counter) = seeded_hub();
        let clock = Arc::new(ManualClock::new(0));
        let scheduler = BeatScheduler::new(hub, clock.clone());

        scheduler.arm(vec![0.0, 0.5, 1.0], 900);
        // Beat 2 is due in 100ms of real sleep
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.beat_count(), 0, "beat 2 not due yet");
        clock.advance(100);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(counter.beat_count(), 1, "only the future beat fires");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.beat_count(), 1, "beat 2 never fires twice");
    }

    #[tokio::test]
    async fn test_position_beyond_grid_fires_nothing() {
        let (hub, counter) = seeded_hub();
        let scheduler = BeatScheduler::new(hub, Arc::new(SystemClock::new()));

        scheduler.arm(vec![0.0, 0.1, 0.2], 5_000);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(counter.beat_count(), 0);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test]
    async fn test_rearm_cancels_previous_grid() {
        let (hub, counter) = seeded_hub();
        let scheduler = BeatScheduler::new(hub, Arc::new(SystemClock::new()));

        // First grid would fire many beats over the next second
        let first: Vec<f64> = (0..20).map(|i| 0.05 * i as f64).collect();
        scheduler.arm(first, 0);
        tokio::time::sleep(Duration::from_millis(120)).await;
        let fired_before_rearm = counter.beat_count();

        // Re-arm with a silent grid far in the future
        scheduler.arm(vec![30.0], 0);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(
            counter.beat_count(),
            fired_before_rearm,
            "no stale beats after re-arm"
        );
        assert!(scheduler.is_armed());
        scheduler.disarm();
    }

    #[tokio::test]
    async fn test_disarm_stops_firing() {
        let (hub, counter) = seeded_hub();
        let scheduler = BeatScheduler::new(hub, Arc::new(SystemClock::new()));

        let grid: Vec<f64> = (0..20).map(|i| 0.05 * i as f64).collect();
        scheduler.arm(grid, 0);
        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.disarm();
        let fired_at_disarm = counter.beat_count();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.beat_count(), fired_at_disarm);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test]
    async fn test_empty_grid_is_idle() {
        let (hub, _counter) = seeded_hub();
        let scheduler = BeatScheduler::new(hub, Arc::new(SystemClock::new()));
        scheduler.arm(Vec::new(), 0);
        assert!(!scheduler.is_armed());
    }
}
