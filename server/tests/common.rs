//! Common utilities for integration tests

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use dub_core::{AlignmentConfig, AudioBuffer, SynthesisConfig, Synthesizer, VoiceMap};
use server::{app, config::ServerConfig, jobs::JobRegistry, AppState, SynthesizerFactory};
use tower::ServiceExt;
use translate_core::Translator;

pub const SAMPLE_RATE: u32 = 8_000;

const VOICE_MAP: &str = r#"{
    "en_US": {
        "default_voice": "amy",
        "voices": {
            "amy": { "config": "models/en_US/amy.onnx.json", "speaker_id": null }
        }
    },
    "pt_BR": "models/pt_BR/faber.onnx.json"
}"#;

/// Speaks 0.1s of tone per character; fails on texts containing "fail" and
/// takes 300ms on texts containing "slow".
pub struct FakeSynth {
    pub calls: Arc<AtomicUsize>,
}

impl Synthesizer for FakeSynth {
    fn synthesize(&self, text: &str, index: usize) -> anyhow::Result<AudioBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("slow") {
            std::thread::sleep(Duration::from_millis(300));
        }
        if text.contains("fail") {
            anyhow::bail!("fake voice refused chunk {index}");
        }
        let frames = text.chars().count() * SAMPLE_RATE as usize / 10;
        let samples = (0..frames).map(|i| (i as f32 * 0.03).sin() * 0.5).collect();
        Ok(AudioBuffer::mono(samples, SAMPLE_RATE)?)
    }
}

pub struct TestApp {
    pub router: Router,
    pub calls: Arc<AtomicUsize>,
}

impl TestApp {
    pub fn synth_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Create a test app instance with clips cached under `cache_root`.
pub fn create_test_app(cache_root: &Path, translator: Option<Arc<dyn Translator>>) -> TestApp {
    let config = ServerConfig {
        clip_cache_dir: cache_root.to_path_buf(),
        ..ServerConfig::default()
    };
    create_test_app_with_config(config, translator)
}

pub fn create_test_app_with_config(
    config: ServerConfig,
    translator: Option<Arc<dyn Translator>>,
) -> TestApp {
    let calls = Arc::new(AtomicUsize::new(0));
    let factory_calls = calls.clone();
    let synthesizers: SynthesizerFactory =
        Arc::new(move |_cfg: &SynthesisConfig| -> anyhow::Result<Arc<dyn Synthesizer>> {
            Ok(Arc::new(FakeSynth {
                calls: factory_calls.clone(),
            }))
        });

    let alignment = AlignmentConfig::default()
        .with_sample_rate(SAMPLE_RATE)
        .expect("valid sample rate");
    let state = AppState {
        config,
        alignment: Arc::new(alignment),
        voices: Arc::new(VoiceMap::from_json(VOICE_MAP).expect("valid voice map")),
        synthesizers,
        translator,
        jobs: JobRegistry::default(),
    };

    TestApp {
        router: app(state),
        calls,
    }
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}
