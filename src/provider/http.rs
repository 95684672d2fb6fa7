//! HTTP-backed TTS provider stub: a named, credentials-gated chain entry.
//! The real upstream wire format is out of scope here, so the body is a
//! documented stub.

use async_trait::async_trait;

use crate::config::ProviderConfig;

use super::{ProviderError, SynthesizeRequest, TtsProvider};

/// A generic REST-based TTS provider, configured from `providers.configs.<name>`.
pub struct HttpTtsProvider {
    name: String,
    config: ProviderConfig,
}

impl HttpTtsProvider {
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

#[async_trait]
impl TtsProvider for HttpTtsProvider {
    async fn synthesize(&self, _request: &SynthesizeRequest<'_>) -> Result<Vec<u8>, ProviderError> {
        // Stub — would POST to the provider's REST endpoint using
        // `self.config.api_key` / `default_voice` / `default_model`.
        // The per-call deadline is enforced by the caller, not here.
        Err(ProviderError::NoDeploymentConfigured)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_is_fallback_eligible() {
        let provider = HttpTtsProvider::new("aivis-speech", ProviderConfig {
            api_key: Some("key".into()),
            default_voice: None,
            default_model: None,
            timeout_s: None,
        });
        let request = SynthesizeRequest {
            text: "hi",
            voice: None,
            model: None,
        };
        let err = provider.synthesize(&request).await.unwrap_err();
        assert!(super::super::is_fallback_eligible(&err));
    }
}
