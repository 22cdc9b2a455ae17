//! Beatsync Engine Library
//!
//! Turns raw track metadata and audio-analysis data into a continuously
//! updated, cached, and broadcast music state consumed by independent
//! visual consumers.
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod beat;
pub mod cache;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod genre;
pub mod hub;
pub mod metrics;
pub mod provider;
pub mod tempo;

// Re-export commonly used types for convenience
pub use beat::{BeatScheduler, Clock, SystemClock};
pub use cache::TtlCache;
pub use engine::{DataSource, Mood, MusicSyncEngine, ProcessedMusicState};
pub use gateway::AnalysisGateway;
pub use hub::{MusicStateConsumer, SyncHub};
pub use provider::{
    AnalysisProvider, AudioAnalysis, AudioFeatures, HttpAnalysisProvider, NowPlaying,
};
pub use tempo::TempoSynthesizer;
