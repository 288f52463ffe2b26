// Configuration for the dubbing server

use std::{path::PathBuf, time::Duration};

/// Extra time the outer HTTP timeout allows past the handler timeout, so a
/// handler that gives up still gets to send its own 504 body.
const LAYER_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Root directory for per-job clip caches.
    pub clip_cache_dir: PathBuf,
    /// Keep cached clips after a successful run.
    pub keep_clips: bool,
    pub accept_model_terms: bool,
    pub voice_map: PathBuf,
    pub translation_model: String,
    /// Parallel synthesis workers per dub job; 1 disables prefetching.
    pub prefetch_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            request_timeout_secs: 600,
            cors_allowed_origins: None,
            clip_cache_dir: PathBuf::from("data/audio_segments"),
            keep_clips: false,
            accept_model_terms: false,
            voice_map: PathBuf::from("models/map.json"),
            translation_model: "gpt-3.5-turbo".to_string(),
            prefetch_workers: 1,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        let clip_cache_dir = std::env::var("CLIP_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.clip_cache_dir);

        let voice_map = std::env::var("VOICE_MAP")
            .map(PathBuf::from)
            .unwrap_or(defaults.voice_map);

        let translation_model = std::env::var("TRANSLATION_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(defaults.translation_model);

        let prefetch_workers = std::env::var("PREFETCH_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.prefetch_workers);

        Self {
            port,
            request_timeout_secs,
            cors_allowed_origins,
            clip_cache_dir,
            keep_clips: env_flag("KEEP_CLIPS"),
            accept_model_terms: env_flag("ACCEPT_MODEL_TERMS"),
            voice_map,
            translation_model,
            prefetch_workers,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Timeout of the outer HTTP layer.
    pub fn layer_timeout(&self) -> Duration {
        self.request_timeout() + LAYER_TIMEOUT_GRACE
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
