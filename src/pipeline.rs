//! Request Pipeline. Drives lookup -> (hit | provider call -> store)
//! and schedules background variety warm-up.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, error, warn};

use crate::cache::{Cache, LookupOutcome};
use crate::error::{CacheVoiceError, CacheVoiceResult};
use crate::provider::SynthesizeRequest;
use crate::provider::fallback::ProviderFallback;

/// Response returned to the HTTP layer.
pub struct SynthesisResponse {
    pub audio: Vec<u8>,
    pub format: String,
}

/// Per-request classification, logged as `reason_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    ExactHit,
    FuzzyHit,
    Miss,
    MissNoCache,
    MissTextTooLong,
    ErrorFileNotFound,
}

impl ReasonCode {
    fn as_str(self) -> &'static str {
        match self {
            ReasonCode::ExactHit => "exact_hit",
            ReasonCode::FuzzyHit => "fuzzy_hit",
            ReasonCode::Miss => "miss",
            ReasonCode::MissNoCache => "miss_no_cache",
            ReasonCode::MissTextTooLong => "miss_text_too_long",
            ReasonCode::ErrorFileNotFound => "error_file_not_found",
        }
    }
}

/// Drives a single request end to end, and schedules background
/// warm-up tasks for additional variety versions.
pub struct RequestPipeline {
    pub cache: Arc<Cache>,
    pub providers: Arc<ProviderFallback>,
    pub max_text_length: usize,
    pub cache_enabled: bool,
    pub variety_depth: u32,
    /// Keys currently being warmed up, deduplicating concurrent scheduling.
    in_flight_warmups: Arc<DashSet<(String, String)>>,
}

impl RequestPipeline {
    pub fn new(
        cache: Arc<Cache>,
        providers: Arc<ProviderFallback>,
        max_text_length: usize,
        cache_enabled: bool,
        variety_depth: u32,
    ) -> Self {
        Self {
            cache,
            providers,
            max_text_length,
            cache_enabled,
            variety_depth,
            in_flight_warmups: Arc::new(DashSet::new()),
        }
    }

    pub async fn handle(
        &self,
        text: &str,
        voice_id: &str,
        model: Option<&str>,
        response_format: &str,
    ) -> CacheVoiceResult<SynthesisResponse> {
        if text.len() > self.max_text_length {
            self.cache.db.record_miss();
            log_request(ReasonCode::MissTextTooLong, text, voice_id, None, response_format);
            return self.synthesize_uncached(text, voice_id, model, response_format).await;
        }

        if !self.cache_enabled {
            self.cache.db.record_miss();
            log_request(ReasonCode::MissNoCache, text, voice_id, None, response_format);
            return self.synthesize_uncached(text, voice_id, model, response_format).await;
        }

        match self.cache.lookup(text, voice_id)? {
            LookupOutcome::ExactHit { path } => {
                self.handle_hit(ReasonCode::ExactHit, path, None, text, voice_id, response_format).await
            }
            LookupOutcome::FuzzyHit { path, score, .. } => {
                self.handle_hit(ReasonCode::FuzzyHit, path, Some(score), text, voice_id, response_format).await
            }
            LookupOutcome::Miss => self.handle_miss(text, voice_id, model, response_format).await,
        }
    }

    async fn handle_hit(
        &self,
        reason: ReasonCode,
        path: std::path::PathBuf,
        score: Option<u32>,
        text: &str,
        voice_id: &str,
        response_format: &str,
    ) -> CacheVoiceResult<SynthesisResponse> {
        match self.cache.audio_store.read(&path) {
            Ok(audio) => {
                log_request(reason, text, voice_id, score, response_format);

                let text_normalized = self.cache.normalize_text(text);
                let version_count = self.cache.db.get_version_count(&text_normalized, voice_id)?;
                if version_count < self.variety_depth {
                    self.schedule_warmup(text_normalized, voice_id.to_string(), None);
                }

                Ok(SynthesisResponse { audio, format: response_format.to_string() })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let text_normalized = self.cache.normalize_text(text);
                error!(
                    voice_id,
                    text_preview = %preview(&text_normalized),
                    "error_file_not_found"
                );
                self.cache.hot_index.remove(&text_normalized, voice_id);
                log_request(ReasonCode::ErrorFileNotFound, text, voice_id, None, response_format);
                self.handle_miss(text, voice_id, None, response_format).await
            }
            Err(e) => Err(CacheVoiceError::Io(e)),
        }
    }

    async fn handle_miss(
        &self,
        text: &str,
        voice_id: &str,
        model: Option<&str>,
        response_format: &str,
    ) -> CacheVoiceResult<SynthesisResponse> {
        log_request(ReasonCode::Miss, text, voice_id, None, response_format);

        let request = SynthesizeRequest { text, voice: Some(voice_id), model };
        let result = self.providers.synthesize(&request).await?;

        let (_, version_num) = self.cache.store(text, voice_id, &result.audio, response_format)?;

        if self.variety_depth > 1 && version_num == 1 {
            let text_normalized = self.cache.normalize_text(text);
            self.schedule_warmup(text_normalized, voice_id.to_string(), model.map(str::to_string));
        }

        Ok(SynthesisResponse { audio: result.audio, format: response_format.to_string() })
    }

    async fn synthesize_uncached(
        &self,
        text: &str,
        voice_id: &str,
        model: Option<&str>,
        response_format: &str,
    ) -> CacheVoiceResult<SynthesisResponse> {
        let request = SynthesizeRequest { text, voice: Some(voice_id), model };
        let result = self.providers.synthesize(&request).await?;
        Ok(SynthesisResponse { audio: result.audio, format: response_format.to_string() })
    }

    /// Fire-and-forget: synthesize the next version and store it. Skips
    /// scheduling if the key is already in flight. Failures are logged at
    /// WARN and never surfaced to the originating request.
    fn schedule_warmup(&self, text_normalized: String, voice_id: String, model: Option<String>) {
        let key = (text_normalized.clone(), voice_id.clone());
        if !self.in_flight_warmups.insert(key.clone()) {
            debug!(voice_id = %voice_id, "warm-up already in flight, skipping");
            return;
        }

        let cache = Arc::clone(&self.cache);
        let providers = Arc::clone(&self.providers);
        let in_flight = Arc::clone(&self.in_flight_warmups);

        tokio::spawn(async move {
            let result: CacheVoiceResult<()> = async {
                let request = SynthesizeRequest {
                    text: &text_normalized,
                    voice: Some(&voice_id),
                    model: model.as_deref(),
                };
                let synth = providers.synthesize(&request).await?;
                cache.store(&text_normalized, &voice_id, &synth.audio, "mp3")?;
                Ok(())
            }
            .await;

            if let Err(e) = result {
                warn!(voice_id = %voice_id, error = %e, "warm-up synthesis failed");
            }
            in_flight.remove(&key);
        });
    }
}

fn preview(text: &str) -> &str {
    crate::utils::safe_truncate(text, 50)
}

fn log_request(reason: ReasonCode, text: &str, voice_id: &str, score: Option<u32>, format: &str) {
    match score {
        Some(s) => debug!(
            reason_code = reason.as_str(),
            text_preview = %preview(text),
            voice_id,
            score = s,
            format,
            "cache operation"
        ),
        None => debug!(
            reason_code = reason.as_str(),
            text_preview = %preview(text),
            voice_id,
            format,
            "cache operation"
        ),
    }
}
