//! HTTP handlers.

use std::time::Instant;

use axum::{extract::State, Json};
use dub_core::{
    timeline::{total_span, windows},
    Assembler, AudioTrack, ChunkKey, ChunkRecord, ClipCache, SegmentReport, SynthesisConfig,
    TimelineWindow, Transcript,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::validation::{validate_chunks, validate_dub_request};
use crate::AppState;

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_voices(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.voices.languages())
}

#[derive(Deserialize)]
pub struct WindowsRequest {
    pub chunks: Vec<ChunkRecord>,
    pub wrap_offset: Option<f64>,
}

#[derive(Serialize)]
pub struct WindowsResponse {
    pub windows: Vec<TimelineWindow>,
    pub total_duration: f64,
}

/// Timeline windows of a chunk list, without synthesizing anything.
pub async fn windows_endpoint(
    State(state): State<AppState>,
    Json(req): Json<WindowsRequest>,
) -> Result<Json<WindowsResponse>, ApiError> {
    validate_chunks(&req.chunks)?;
    let wrap_offset = match req.wrap_offset {
        Some(w) if !w.is_finite() || w < 0.0 => {
            return Err(ApiError::InvalidInput(format!("Invalid wrap offset: {w}")));
        }
        Some(w) => w,
        None => state.alignment.wrap_offset(),
    };

    let transcript = Transcript::from_records(req.chunks)?;
    let windows = windows(transcript.chunks(), wrap_offset)?;
    let total_duration = total_span(&windows);
    Ok(Json(WindowsResponse {
        windows,
        total_duration,
    }))
}

#[derive(Deserialize)]
pub struct TranslateRequest {
    pub chunks: Vec<ChunkRecord>,
}

#[derive(Serialize)]
pub struct TranslateResponse {
    pub text: String,
    pub chunks: Vec<ChunkRecord>,
}

pub async fn translate_endpoint(
    State(state): State<AppState>,
    Json(req): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    validate_chunks(&req.chunks)?;
    let translator = state.translator.clone().ok_or_else(|| {
        ApiError::Configuration("translation is not configured (set OPENAI_API_KEY)".to_string())
    })?;
    let transcript = Transcript::from_records(req.chunks)?;
    let start_time = Instant::now();

    let timeout = state.config.request_timeout();
    let result = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || {
            translate_core::translate_transcript(&transcript, translator.as_ref())
        }),
    )
    .await;

    let translated = match result {
        Ok(Ok(Ok(translated))) => translated,
        Ok(Ok(Err(e))) => return Err(ApiError::Translation(e)),
        Ok(Err(join_err)) => {
            error!("Translation task join error: {join_err}");
            return Err(ApiError::Internal(format!("Task join error: {join_err}")));
        }
        Err(_) => return Err(ApiError::Timeout(timeout.as_secs())),
    };

    info!(
        chunks = translated.len(),
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "Transcript translated"
    );
    Ok(Json(TranslateResponse {
        text: translated.concat_text(),
        chunks: translated.records(),
    }))
}

#[derive(Deserialize)]
pub struct DubRequest {
    pub chunks: Vec<ChunkRecord>,
    pub language: String,
    pub voice: Option<String>,
    /// Reuse the clip cache of an earlier (failed or kept) job.
    pub job_id: Option<String>,
    #[serde(default)]
    pub speed_override_indices: Vec<usize>,
    #[serde(default)]
    pub speed_override_keys: Vec<String>,
}

#[derive(Serialize)]
pub struct DubResponse {
    pub job_id: String,
    pub audio_base64: String,
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub segments: Vec<SegmentReport>,
}

/// Synthesize and align a dubbed track for a chunk list.
pub async fn dub_endpoint(
    State(state): State<AppState>,
    Json(req): Json<DubRequest>,
) -> Result<Json<DubResponse>, ApiError> {
    validate_dub_request(&req.chunks, &req.language, req.job_id.as_deref())?;
    let transcript = Transcript::from_records(req.chunks)?;

    let synthesis = SynthesisConfig {
        language: Some(req.language),
        voice: req.voice,
        reference_voice: None,
        accept_model_terms: state.config.accept_model_terms,
    };
    state
        .voices
        .resolve(&synthesis)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let alignment = state
        .alignment
        .as_ref()
        .clone()
        .with_override_indices(req.speed_override_indices)
        .with_override_keys(req.speed_override_keys.into_iter().map(ChunkKey::from_hex));

    let job_id = req
        .job_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let job = state
        .jobs
        .claim(&job_id)
        .ok_or_else(|| ApiError::Conflict(job_id.clone()))?;
    let cache_dir = state.config.clip_cache_dir.join(&job_id);
    let keep_clips = state.config.keep_clips;
    let workers = state.config.prefetch_workers;
    let synthesizers = state.synthesizers.clone();
    let start_time = Instant::now();

    info!(
        job_id = %job_id,
        chunks = transcript.len(),
        language = ?synthesis.language,
        "Dub request received"
    );

    // Run synthesis and assembly in a blocking task with timeout.
    // The job stays claimed until the blocking work ends, even after a timeout.
    let timeout = state.config.request_timeout();
    let result = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || -> Result<AudioTrack, ApiError> {
            let _job = job;
            let synthesizer = synthesizers(&synthesis).map_err(ApiError::Synthesis)?;
            let cache = ClipCache::open(&cache_dir)?;
            let assembler = Assembler::new(&alignment, synthesizer.as_ref(), &cache);
            if workers > 1 {
                assembler.prefetch(&transcript, workers)?;
            }
            let track = assembler.assemble(&transcript)?;
            if !keep_clips {
                assembler.cleanup(&transcript);
            }
            Ok(track)
        }),
    )
    .await;

    let track = match result {
        Ok(Ok(track)) => track.map_err(|e| ApiError::for_job(&job_id, e))?,
        Ok(Err(join_err)) => {
            error!("Dub task join error: {join_err}");
            return Err(ApiError::for_job(
                &job_id,
                ApiError::Internal(format!("Task join error: {join_err}")),
            ));
        }
        Err(_) => {
            warn!(job_id = %job_id, "Dub request timed out, clips stay cached for a retry");
            return Err(ApiError::for_job(&job_id, ApiError::Timeout(timeout.as_secs())));
        }
    };

    let audio_base64 = track
        .to_wav_base64()
        .map_err(|e| ApiError::for_job(&job_id, e.into()))?;
    info!(
        job_id = %job_id,
        duration_secs = track.duration_secs(),
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "Dub request completed"
    );

    Ok(Json(DubResponse {
        job_id,
        audio_base64,
        sample_rate: track.audio.sample_rate,
        duration_secs: track.duration_secs(),
        segments: track.segments,
    }))
}
