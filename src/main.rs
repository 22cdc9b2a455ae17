use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use beatsync_engine::config::{CliConfig, EngineConfig, FileConfig};
use beatsync_engine::engine::ProcessedMusicState;
use beatsync_engine::{
    metrics, AnalysisProvider, AudioFeatures, HttpAnalysisProvider, MusicStateConsumer,
    MusicSyncEngine, SyncHub, SystemClock,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Base URL of the audio analysis provider service.
    #[clap(long)]
    pub provider_url: Option<String>,

    /// Path to an optional TOML config file. Values in the file override
    /// CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Timeout in seconds for provider requests.
    #[clap(long, default_value_t = 10)]
    pub provider_timeout_sec: u64,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Interval in milliseconds between now-playing polls.
    #[clap(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,
}

/// Default consumer: logs every published state so the engine is
/// observable even with no visual consumers attached.
struct LoggingConsumer;

impl MusicStateConsumer for LoggingConsumer {
    fn on_music_state(
        &self,
        state: &ProcessedMusicState,
        _raw_features: Option<&AudioFeatures>,
        track_id: &str,
    ) -> anyhow::Result<()> {
        if state.beat_occurred {
            return Ok(());
        }
        info!(
            "State for '{}': {:.2} bpm ({}), mood {}, genre {}",
            track_id,
            state.enhanced_bpm,
            state.data_source.as_str(),
            state.mood.as_str(),
            state.genre
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!("Beatsync engine starting (git {})", env!("GIT_HASH"));

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        provider_url: cli_args.provider_url,
        provider_timeout_sec: cli_args.provider_timeout_sec,
        metrics_port: cli_args.metrics_port,
        poll_interval_ms: cli_args.poll_interval_ms,
    };
    let config = EngineConfig::resolve(&cli_config, file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Provider service configured at {}", config.provider_url);
    let provider: Arc<dyn AnalysisProvider> = Arc::new(HttpAnalysisProvider::new(
        config.provider_url.clone(),
        config.provider_timeout_sec,
    ));

    let hub = Arc::new(SyncHub::new());
    hub.subscribe("logging", Arc::new(LoggingConsumer));

    let engine = Arc::new(MusicSyncEngine::new(
        Arc::clone(&provider),
        Arc::clone(&hub),
        Arc::new(SystemClock::new()),
        &config.gateway,
        &config.cache,
        config.tempo.clone(),
    ));

    let shutdown_token = CancellationToken::new();
    engine.spawn_sweepers(&config.cache, &shutdown_token);

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::serve_metrics(metrics_port).await {
            error!("Metrics server failed: {:#}", e);
        }
    });

    info!(
        "Polling now-playing every {:?}",
        config.poll_interval
    );
    let mut ticker = tokio::time::interval(config.poll_interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                match provider.now_playing().await {
                    Ok(Some(now_playing)) => engine.handle_now_playing(now_playing),
                    Ok(None) => engine.handle_stopped(),
                    Err(e) => warn!("Now-playing poll failed: {}", e),
                }
            }
        }
    }

    shutdown_token.cancel();
    info!("Beatsync engine stopped");
    Ok(())
}
