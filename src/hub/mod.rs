//! Subscriber registry and notification fan-out.
//!
//! Consumers register under a unique name and receive every published
//! music-state snapshot and beat event. A failing consumer is logged and
//! skipped; it never blocks delivery to the others and is never
//! auto-unsubscribed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::engine::ProcessedMusicState;
use crate::metrics;
use crate::provider::AudioFeatures;

/// Callback interface for music-state consumers.
///
/// Implementations must be cheap: fan-out is synchronous and runs on the
/// publishing task. Returning an error marks the delivery as failed for
/// this consumer only.
pub trait MusicStateConsumer: Send + Sync {
    fn on_music_state(
        &self,
        state: &ProcessedMusicState,
        raw_features: Option<&AudioFeatures>,
        track_id: &str,
    ) -> anyhow::Result<()>;
}

struct LastPublished {
    state: ProcessedMusicState,
    raw_features: Option<AudioFeatures>,
}

/// Registry of named consumers plus the latest published state.
pub struct SyncHub {
    consumers: RwLock<HashMap<String, Arc<dyn MusicStateConsumer>>>,
    last: RwLock<Option<LastPublished>>,
    consumer_errors: AtomicU64,
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncHub {
    pub fn new() -> Self {
        Self {
            consumers: RwLock::new(HashMap::new()),
            last: RwLock::new(None),
            consumer_errors: AtomicU64::new(0),
        }
    }

    /// Register a consumer under a unique name.
    ///
    /// Registering a duplicate name is a warned no-op. If a state has
    /// already been published, the new consumer receives it synchronously
    /// before this method returns (late-join catch-up).
    pub fn subscribe(&self, name: &str, consumer: Arc<dyn MusicStateConsumer>) {
        {
            let mut consumers = self.consumers.write().unwrap();
            if consumers.contains_key(name) {
                warn!("Consumer '{}' is already subscribed, ignoring", name);
                return;
            }
            consumers.insert(name.to_string(), Arc::clone(&consumer));
            metrics::set_active_consumers(consumers.len());
        }
        debug!("Consumer '{}' subscribed", name);

        // Late-join catch-up: deliver the latest known state immediately so
        // the consumer doesn't wait for the next track change. Clone out of
        // the lock first; the callback may publish and take it for writing.
        let last = {
            let last = self.last.read().unwrap();
            last.as_ref()
                .map(|l| (l.state.clone(), l.raw_features.clone()))
        };
        if let Some((state, raw_features)) = last {
            self.deliver(name, &consumer, &state, raw_features.as_ref());
        }
    }

    /// Remove a consumer. Unknown names are a warned no-op.
    pub fn unsubscribe(&self, name: &str) {
        let mut consumers = self.consumers.write().unwrap();
        if consumers.remove(name).is_none() {
            warn!("Cannot unsubscribe unknown consumer '{}'", name);
            return;
        }
        metrics::set_active_consumers(consumers.len());
        debug!("Consumer '{}' unsubscribed", name);
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.read().unwrap().len()
    }

    /// Total number of failed consumer deliveries since startup.
    pub fn consumer_error_count(&self) -> u64 {
        self.consumer_errors.load(Ordering::Relaxed)
    }

    /// Publish a state snapshot to all consumers and retain it for
    /// late-join catch-up.
    pub fn publish(&self, state: ProcessedMusicState, raw_features: Option<AudioFeatures>) {
        metrics::record_state_published(state.data_source.as_str());

        {
            let mut last = self.last.write().unwrap();
            *last = Some(LastPublished {
                state: state.clone(),
                raw_features: raw_features.clone(),
            });
        }

        self.fan_out(&state, raw_features.as_ref());
    }

    /// Publish a discrete beat event: the last snapshot with the beat flag
    /// set. Does nothing before the first snapshot, and does not replace
    /// the retained snapshot.
    pub fn publish_beat(&self) {
        let beat_state = {
            let last = self.last.read().unwrap();
            match last.as_ref() {
                Some(last) => {
                    let mut state = last.state.clone();
                    state.beat_occurred = true;
                    state.timestamp = chrono::Utc::now();
                    (state, last.raw_features.clone())
                }
                None => {
                    debug!("Beat event before any published state, dropping");
                    return;
                }
            }
        };

        metrics::record_beat_fired();
        self.fan_out(&beat_state.0, beat_state.1.as_ref());
    }

    /// Snapshot-then-iterate so consumers can subscribe/unsubscribe while a
    /// publish is in flight.
    fn fan_out(&self, state: &ProcessedMusicState, raw_features: Option<&AudioFeatures>) {
        let snapshot: Vec<(String, Arc<dyn MusicStateConsumer>)> = {
            let consumers = self.consumers.read().unwrap();
            consumers
                .iter()
                .map(|(name, consumer)| (name.clone(), Arc::clone(consumer)))
                .collect()
        };

        for (name, consumer) in snapshot {
            self.deliver(&name, &consumer, state, raw_features);
        }
    }

    fn deliver(
        &self,
        name: &str,
        consumer: &Arc<dyn MusicStateConsumer>,
        state: &ProcessedMusicState,
        raw_features: Option<&AudioFeatures>,
    ) {
        if let Err(e) = consumer.on_music_state(state, raw_features, &state.track_id) {
            self.consumer_errors.fetch_add(1, Ordering::Relaxed);
            metrics::record_consumer_error(name);
            warn!("Consumer '{}' failed to handle music state: {:#}", name, e);
        }
    }
}
