//! Mock TTS provider for tests and credential-free local runs: deterministic
//! output, no external dependencies.

use async_trait::async_trait;
use tokio::time::sleep;

use super::{ProviderError, SynthesizeRequest, TtsProvider};

/// Mock provider that returns deterministic bytes derived from the input
/// text, optionally after a simulated latency, or fails in a configured way.
pub struct MockTtsProvider {
    name: String,
    latency_ms: u64,
    fail_with: Option<ProviderError>,
}

impl MockTtsProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency_ms: 0,
            fail_with: None,
        }
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn failing_with(mut self, err: ProviderError) -> Self {
        self.fail_with = Some(err);
        self
    }
}

#[async_trait]
impl TtsProvider for MockTtsProvider {
    async fn synthesize(&self, request: &SynthesizeRequest<'_>) -> Result<Vec<u8>, ProviderError> {
        if self.latency_ms > 0 {
            sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        Ok(format!("audio:{}:{}", self.name, request.text).into_bytes())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
