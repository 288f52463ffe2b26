use std::{net::SocketAddr, sync::Arc};

use dub_core::{AlignmentConfig, VoiceMap};
use server::{app, config::ServerConfig, jobs::JobRegistry, local_synthesizers, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};
use translate_core::{OpenAiTranslator, Translator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting dubbing server...");

    let config = ServerConfig::from_env();
    let alignment = AlignmentConfig::from_env()?;
    info!(
        min_speed = alignment.min_speed(),
        max_speed = alignment.max_speed(),
        wrap_offset = alignment.wrap_offset(),
        sample_rate = alignment.sample_rate(),
        overrides = alignment.overrides().indices.len() + alignment.overrides().keys.len(),
        "Alignment configuration loaded"
    );

    let voices = Arc::new(VoiceMap::from_path(&config.voice_map).unwrap_or_else(|e| {
        warn!("Could not load {}: {e:#}, using empty map.", config.voice_map.display());
        VoiceMap::default()
    }));
    info!("Loaded {} voice languages", voices.languages().len());

    let translator: Option<Arc<dyn Translator>> =
        match OpenAiTranslator::new(&config.translation_model) {
            Ok(t) => Some(Arc::new(t)),
            Err(e) => {
                warn!("Translation disabled: {e:#}");
                None
            }
        };

    info!(
        "Server configuration loaded: port={}, request_timeout={}s, clip_cache={}, keep_clips={}",
        config.port,
        config.request_timeout_secs,
        config.clip_cache_dir.display(),
        config.keep_clips
    );

    let state = AppState {
        config: config.clone(),
        alignment: Arc::new(alignment),
        synthesizers: local_synthesizers(voices.clone()),
        voices,
        translator,
        jobs: JobRegistry::default(),
    };

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
