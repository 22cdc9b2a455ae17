//! Cache-first access to provider analysis data.
//!
//! The gateway is the only component that talks to the provider. Every
//! fetch checks the TTL cache first; misses go through the shared retry
//! combinator, and only responses with a positive tempo are accepted and
//! cached. Exhausted retries surface as `None`, which callers treat as a
//! normal outcome requiring fallback.

mod retry;

pub use retry::RetryPolicy;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::config::{CacheSettings, GatewaySettings};
use crate::engine::DataSource;
use crate::metrics;
use crate::provider::{AnalysisProvider, AudioAnalysis, AudioFeatures};

pub struct AnalysisGateway {
    provider: Arc<dyn AnalysisProvider>,
    features_cache: Arc<TtlCache<String, AudioFeatures>>,
    analysis_cache: Arc<TtlCache<String, AudioAnalysis>>,
    retry: RetryPolicy,
}

impl AnalysisGateway {
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        gateway_settings: &GatewaySettings,
        cache_settings: &CacheSettings,
    ) -> Self {
        Self {
            provider,
            features_cache: Arc::new(TtlCache::new(
                cache_settings.ttl,
                cache_settings.max_entries,
            )),
            analysis_cache: Arc::new(TtlCache::new(
                cache_settings.ttl,
                cache_settings.max_entries,
            )),
            retry: RetryPolicy {
                max_attempts: gateway_settings.max_attempts,
                delay: gateway_settings.retry_delay,
            },
        }
    }

    /// Spawn the periodic sweep tasks for both caches.
    pub fn spawn_sweepers(&self, settings: &CacheSettings, shutdown_token: &CancellationToken) {
        let _ = self
            .features_cache
            .spawn_sweeper(settings.sweep_interval, shutdown_token.child_token());
        let _ = self
            .analysis_cache
            .spawn_sweeper(settings.sweep_interval, shutdown_token.child_token());
    }

    /// Fetch lightweight audio features, cache-first.
    pub async fn fetch_features(&self, track_id: &str) -> Option<(AudioFeatures, DataSource)> {
        if let Some(features) = self.features_cache.get(&track_id.to_string()) {
            metrics::record_cache_lookup("features", true);
            return Some((features, DataSource::Cache));
        }
        metrics::record_cache_lookup("features", false);

        let features = self
            .retry
            .run("features", AudioFeatures::has_valid_tempo, || {
                self.provider.audio_features(track_id)
            })
            .await?;

        self.features_cache
            .set(track_id.to_string(), features.clone());
        Some((features, DataSource::Live))
    }

    /// Fetch the full audio analysis, cache-first.
    pub async fn fetch_analysis(&self, track_id: &str) -> Option<(AudioAnalysis, DataSource)> {
        if let Some(analysis) = self.analysis_cache.get(&track_id.to_string()) {
            metrics::record_cache_lookup("analysis", true);
            return Some((analysis, DataSource::Cache));
        }
        metrics::record_cache_lookup("analysis", false);

        let analysis = self
            .retry
            .run("analysis", AudioAnalysis::has_valid_tempo, || {
                self.provider.audio_analysis(track_id)
            })
            .await?;

        self.analysis_cache
            .set(track_id.to_string(), analysis.clone());
        Some((analysis, DataSource::Live))
    }

    /// Number of cached feature entries (diagnostics).
    pub fn cached_features(&self) -> usize {
        self.features_cache.len()
    }

    /// Number of cached analysis entries (diagnostics).
    pub fn cached_analyses(&self) -> usize {
        self.analysis_cache.len()
    }
}
