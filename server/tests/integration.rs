//! Integration tests for the dubbing server

mod common;

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use server::config::ServerConfig;
use tower::ServiceExt;
use translate_core::Translator;

use common::*;

fn speech(chars: usize) -> String {
    "a".repeat(chars)
}

#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let (status, body) = get(&app.router, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_list_voices() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);

    let (status, body) = get(&app.router, "/voices").await;
    assert_eq!(status, StatusCode::OK);
    let voices: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(voices, vec!["en_US", "pt_BR"]);
}

#[tokio::test]
async fn test_windows_with_wrapped_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);

    let (status, body) = post_json(
        &app.router,
        "/windows",
        json!({
            "chunks": [
                { "timestamp": [0.0, 2.0], "text": "oi" },
                { "timestamp": [1.0, 3.0], "text": "tudo bem" }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_duration"], 32.0);
    assert_eq!(body["windows"][0]["total_duration"], 30.0);
    assert_eq!(body["windows"][0]["speech_duration"], 2.0);
    assert_eq!(body["windows"][0]["wrapped"], true);
    assert_eq!(body["windows"][1]["wrapped"], false);
}

#[tokio::test]
async fn test_windows_rejects_empty_chunk_list() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);

    let (status, body) = post_json(&app.router, "/windows", json!({ "chunks": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_dub_success() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);

    let (status, body) = post_json(
        &app.router,
        "/dub",
        json!({
            "language": "en_US",
            "chunks": [
                { "timestamp": [0.0, 2.0], "text": speech(30) },
                { "timestamp": [2.5, 4.0], "text": speech(10) }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["sample_rate"], SAMPLE_RATE);
    assert_eq!(body["duration_secs"], 4.0);
    assert!(!body["audio_base64"].as_str().unwrap().is_empty());

    let segments = body["segments"].as_array().unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0]["rule"], "fit_slot");
    assert!((segments[0]["speed"].as_f64().unwrap() - 1.2).abs() < 1e-9);
    assert_eq!(segments[0]["cache"], "synthesized");
    assert_eq!(segments[1]["speed"], 1.0);
    assert_eq!(app.synth_calls(), 2);

    // Clips are removed once the track is produced.
    let job_id = body["job_id"].as_str().unwrap();
    assert!(!dir.path().join(job_id).exists());
}

#[tokio::test]
async fn test_dub_speed_override() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);

    let (status, body) = post_json(
        &app.router,
        "/dub",
        json!({
            "language": "pt_BR",
            "speed_override_indices": [0],
            "chunks": [
                { "timestamp": [0.0, 2.0], "text": speech(22) },
                { "timestamp": [4.0, 5.0], "text": speech(5) }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["segments"][0]["rule"], "override");
    assert_eq!(body["segments"][0]["speed"], 1.25);
    assert_eq!(body["segments"][1]["rule"], "speech_below_floor");
}

#[tokio::test]
async fn test_dub_failure_can_resume() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);
    let job_dir = dir.path().join("resume-job");

    let (status, body) = post_json(
        &app.router,
        "/dub",
        json!({
            "language": "en_US",
            "job_id": "resume-job",
            "chunks": [
                { "timestamp": [0.0, 1.0], "text": "ok" },
                { "timestamp": [1.0, 2.0], "text": "fail here" },
                { "timestamp": [2.0, 3.0], "text": "later" }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["chunk_index"], 1);
    assert!(body["error"].as_str().unwrap().contains("chunk 1"));
    assert_eq!(app.synth_calls(), 2);
    assert!(job_dir.join("0.wav").is_file());

    let (status, body) = post_json(
        &app.router,
        "/dub",
        json!({
            "language": "en_US",
            "job_id": "resume-job",
            "chunks": [
                { "timestamp": [0.0, 1.0], "text": "ok" },
                { "timestamp": [1.0, 2.0], "text": "fixed" },
                { "timestamp": [2.0, 3.0], "text": "later" }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["job_id"], "resume-job");
    assert_eq!(body["segments"][0]["cache"], "hit");
    assert_eq!(app.synth_calls(), 4);
    assert!(!job_dir.exists());
}

#[tokio::test]
async fn test_dub_failure_returns_generated_job_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);

    let (status, body) = post_json(
        &app.router,
        "/dub",
        json!({
            "language": "en_US",
            "chunks": [
                { "timestamp": [0.0, 1.0], "text": "ok" },
                { "timestamp": [1.0, 2.0], "text": "fail here" }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["chunk_index"], 1);
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert!(dir.path().join(&job_id).join("0.wav").is_file());

    let (status, body) = post_json(
        &app.router,
        "/dub",
        json!({
            "language": "en_US",
            "job_id": job_id,
            "chunks": [
                { "timestamp": [0.0, 1.0], "text": "ok" },
                { "timestamp": [1.0, 2.0], "text": "fixed" }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["segments"][0]["cache"], "hit");
    assert_eq!(app.synth_calls(), 3);
    assert!(!dir.path().join(&job_id).exists());
}

#[tokio::test]
async fn test_dub_rejects_job_id_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);
    let request = json!({
        "language": "en_US",
        "job_id": "busy-job",
        "chunks": [
            { "timestamp": [0.0, 1.0], "text": "slow" },
            { "timestamp": [1.0, 2.0], "text": "slow" }
        ]
    });

    let router = app.router.clone();
    let first_request = request.clone();
    let first = tokio::spawn(async move { post_json(&router, "/dub", first_request).await });
    while app.synth_calls() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (status, body) = post_json(&app.router, "/dub", request.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("busy-job"));

    let (status, body) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.synth_calls(), 2);

    // Free again once the first run is done.
    let (status, _) = post_json(&app.router, "/dub", request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_dub_timeout_is_gateway_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        clip_cache_dir: dir.path().to_path_buf(),
        request_timeout_secs: 0,
        ..ServerConfig::default()
    };
    let app = create_test_app_with_config(config, None);

    let (status, body) = post_json(
        &app.router,
        "/dub",
        json!({
            "language": "en_US",
            "job_id": "slow-job",
            "chunks": [{ "timestamp": [0.0, 1.0], "text": "slow" }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], 504);
    assert_eq!(body["job_id"], "slow-job");
}

#[tokio::test]
async fn test_dub_missing_end_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);

    let (status, body) = post_json(
        &app.router,
        "/dub",
        json!({
            "language": "en_US",
            "chunks": [
                { "timestamp": [0.0, 1.0], "text": "fine" },
                { "timestamp": [1.0, null], "text": "cut off" }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["chunk_index"], 1);
    assert_eq!(app.synth_calls(), 0);
}

#[tokio::test]
async fn test_dub_rejects_bad_language() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);
    let chunks = json!([{ "timestamp": [0.0, 1.0], "text": "oi" }]);

    let (status, _) = post_json(
        &app.router,
        "/dub",
        json!({ "language": "portuguese", "chunks": chunks.clone() }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        &app.router,
        "/dub",
        json!({ "language": "fr_FR", "chunks": chunks }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("fr_FR"));
}

#[tokio::test]
async fn test_translate_requires_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), None);

    let (status, body) = post_json(
        &app.router,
        "/translate",
        json!({ "chunks": [{ "timestamp": [0.0, 1.0], "text": "Olá" }] }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("OPENAI_API_KEY"));
}

#[tokio::test]
async fn test_translate_keeps_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let translator: Arc<dyn Translator> =
        Arc::new(|text: &str| -> anyhow::Result<String> { Ok(format!("[en] {text}")) });
    let app = create_test_app(dir.path(), Some(translator));

    let (status, body) = post_json(
        &app.router,
        "/translate",
        json!({
            "chunks": [
                { "timestamp": [0.0, 1.5], "text": "Olá, pessoal." },
                { "timestamp": [2.0, 3.0], "text": "Beleza?" }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["chunks"][0]["text"], "[en] Olá, pessoal.");
    assert_eq!(body["chunks"][1]["timestamp"], json!([2.0, 3.0]));
    assert_eq!(body["text"], "[en] Olá, pessoal. [en] Beleza?");
}
