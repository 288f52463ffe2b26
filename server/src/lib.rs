pub mod config;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod validation;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use dub_core::{AlignmentConfig, SynthesisConfig, Synthesizer, VoiceMap};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use translate_core::Translator;

use crate::config::ServerConfig;
use crate::jobs::JobRegistry;

/// Builds a synthesizer for the voice a request asks for.
pub type SynthesizerFactory =
    Arc<dyn Fn(&SynthesisConfig) -> anyhow::Result<Arc<dyn Synthesizer>> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub alignment: Arc<AlignmentConfig>,
    pub voices: Arc<VoiceMap>,
    pub synthesizers: SynthesizerFactory,
    pub translator: Option<Arc<dyn Translator>>,
    pub jobs: JobRegistry,
}

/// Local voice backend for `voices`.
///
/// Without the `piper` feature there is no backend compiled in and every dub
/// request fails with a synthesis error naming the missing feature.
pub fn local_synthesizers(voices: Arc<VoiceMap>) -> SynthesizerFactory {
    #[cfg(feature = "piper")]
    {
        Arc::new(move |cfg: &SynthesisConfig| -> anyhow::Result<Arc<dyn Synthesizer>> {
            let synth = dub_core::synth::PiperSynthesizer::load(&voices, cfg)?;
            Ok(Arc::new(synth) as Arc<dyn Synthesizer>)
        })
    }
    #[cfg(not(feature = "piper"))]
    {
        Arc::new(move |cfg: &SynthesisConfig| -> anyhow::Result<Arc<dyn Synthesizer>> {
            voices.resolve(cfg)?;
            anyhow::bail!("server was built without the `piper` feature, no local voice backend available")
        })
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let Some(allowed_origins) = &config.cors_allowed_origins else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        return base.allow_origin(Any);
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    // A hyphenated uuid is always a valid header value.
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &header {
        request.headers_mut().insert("x-request-id", value.clone());
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// The full HTTP application: routes, middleware and state.
pub fn app(state: AppState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.layer_timeout()))
        .layer(cors_layer(&state.config))
        .into_inner();

    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/voices", get(routes::list_voices))
        .route("/windows", post(routes::windows_endpoint))
        .route("/translate", post(routes::translate_endpoint))
        .route("/dub", post(routes::dub_endpoint));

    Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state)
}
