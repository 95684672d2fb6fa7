//! Error kinds surfaced by the cache core.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Result type used across the cache core.
pub type CacheVoiceResult<T> = Result<T, CacheVoiceError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheVoiceError {
    /// `len(text) > max_text_length`. Not terminal: the pipeline still
    /// forwards the request to the provider without caching.
    #[error("input text too long ({len} bytes, max {max})")]
    InputTooLarge { len: usize, max: usize },

    /// Fallback chain is empty or every provider lacks credentials.
    #[error("no TTS provider configured")]
    NoProvider,

    /// All providers failed with fallback-eligible errors.
    #[error("upstream TTS providers exhausted: {0}")]
    UpstreamExhausted(String),

    /// A provider rejected the request itself (bad input, auth).
    #[error("upstream rejected request: {0}")]
    UpstreamRejected(String),

    /// Hot Index / DB pointed at a path that no longer exists.
    #[error("cached file missing for {text_preview:?} ({voice_id})")]
    FileMissingOnHit {
        text_preview: String,
        voice_id: String,
    },

    /// Unique-constraint violation during `add_entry`; recovered locally.
    #[error("write race on unique key")]
    WriteRace,

    /// `record_hit` raced with eviction; recovered as a silent no-op.
    #[error("eviction race on hit")]
    EvictionRaceOnHit,

    /// DB schema migration aborted; fatal at startup.
    #[error("schema migration failed: {0}")]
    SchemaMigrationFailure(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected error: {0}")]
    Internal(String),
}

impl IntoResponse for CacheVoiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheVoiceError::NoProvider | CacheVoiceError::UpstreamExhausted(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheVoiceError::UpstreamRejected(_) => StatusCode::BAD_REQUEST,
            CacheVoiceError::SchemaMigrationFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
