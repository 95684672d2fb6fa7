//! REST API route definitions: router, shared state, and handlers.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::CacheVoiceError;
use crate::pipeline::RequestPipeline;

/// Shared application state handed to every handler.
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
    /// Most recent fallback-exhaustion error, for `/health`'s `provider_status`.
    last_error: Mutex<Option<(String, String)>>,
}

impl AppState {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self {
            pipeline,
            last_error: Mutex::new(None),
        }
    }

    fn record_error(&self, message: String) {
        let mut slot = self.last_error.lock().unwrap();
        *slot = Some((message, Utc::now().to_rfc3339()));
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/audio/speech", post(synthesize_speech))
        .route("/health", get(health))
        .route("/v1/cache/stats", get(cache_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SpeechRequest {
    input: String,
    voice: String,
    model: Option<String>,
    response_format: Option<String>,
}

/// `POST /v1/audio/speech` — synthesize or serve from cache.
async fn synthesize_speech(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SpeechRequest>,
) -> Result<impl IntoResponse, CacheVoiceError> {
    let format = body.response_format.as_deref().unwrap_or("mp3").to_string();

    let result = state
        .pipeline
        .handle(&body.input, &body.voice, body.model.as_deref(), &format)
        .await;

    match result {
        Ok(response) => {
            let content_type = content_type_for(&response.format);
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type)],
                response.audio,
            ))
        }
        Err(err) => {
            if matches!(
                err,
                CacheVoiceError::UpstreamExhausted(_) | CacheVoiceError::NoProvider
            ) {
                state.record_error(err.to_string());
            }
            Err(err)
        }
    }
}

fn content_type_for(format: &str) -> &'static str {
    match format {
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "audio/mpeg",
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    provider_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error_time: Option<String>,
}

/// `GET /health` — liveness and provider availability.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let has_providers = state.pipeline.providers.available();
    let last_error = state.last_error.lock().unwrap().clone();

    let provider_status = if !has_providers {
        "unavailable"
    } else if last_error.is_some() {
        "unknown"
    } else {
        "available"
    };

    Json(HealthResponse {
        status: "ok",
        provider_status,
        last_error_time: last_error.map(|(_, ts)| ts),
    })
}

/// `GET /v1/cache/stats` — aggregate hit/miss counters.
async fn cache_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, CacheVoiceError> {
    let stats = state.pipeline.cache.db.get_stats()?;
    Ok(Json(stats))
}
