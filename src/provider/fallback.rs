//! Provider Fallback. Ordered chain of synthesize providers.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::CacheVoiceError;

use super::{ProviderError, SynthesizeRequest, TtsProvider, is_fallback_eligible};

/// Successful synthesis result: the audio bytes plus which provider
/// produced them.
pub struct FallbackResult {
    pub audio: Vec<u8>,
    pub provider_name: String,
}

/// Orchestrates an ordered chain of providers, each with its own per-call
/// timeout, and fallback-eligible error filtering.
pub struct ProviderFallback {
    providers: Vec<(Arc<dyn TtsProvider>, Duration)>,
}

impl ProviderFallback {
    pub fn new(providers: Vec<(Arc<dyn TtsProvider>, Duration)>) -> Self {
        Self { providers }
    }

    /// `true` when the chain is non-empty.
    pub fn available(&self) -> bool {
        !self.providers.is_empty()
    }

    pub async fn synthesize(
        &self,
        request: &SynthesizeRequest<'_>,
    ) -> Result<FallbackResult, CacheVoiceError> {
        if self.providers.is_empty() {
            return Err(CacheVoiceError::NoProvider);
        }

        let mut last_eligible_error: Option<String> = None;

        for (provider, timeout) in &self.providers {
            let attempt = tokio::time::timeout(*timeout, provider.synthesize(request)).await;

            let result = match attempt {
                Ok(inner) => inner,
                Err(_) => Err(ProviderError::Timeout),
            };

            match result {
                Ok(audio) => {
                    return Ok(FallbackResult {
                        audio,
                        provider_name: provider.name().to_string(),
                    });
                }
                Err(err) if is_fallback_eligible(&err) => {
                    warn!(provider = provider.name(), error = %err, "provider failed, trying next");
                    last_eligible_error = Some(format!("{}: {err}", provider.name()));
                }
                Err(err) => {
                    return Err(CacheVoiceError::UpstreamRejected(format!(
                        "{}: {err}",
                        provider.name()
                    )));
                }
            }
        }

        Err(CacheVoiceError::UpstreamExhausted(
            last_eligible_error.unwrap_or_else(|| "no providers attempted".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockTtsProvider;

    fn req(text: &str) -> SynthesizeRequest<'_> {
        SynthesizeRequest {
            text,
            voice: Some("v1"),
            model: None,
        }
    }

    #[tokio::test]
    async fn empty_chain_is_no_provider() {
        let chain = ProviderFallback::new(vec![]);
        assert!(!chain.available());
        let err = chain.synthesize(&req("hi")).await.unwrap_err();
        assert!(matches!(err, CacheVoiceError::NoProvider));
    }

    #[tokio::test]
    async fn first_provider_success_short_circuits() {
        let p1: Arc<dyn TtsProvider> = Arc::new(MockTtsProvider::new("p1"));
        let p2: Arc<dyn TtsProvider> = Arc::new(
            MockTtsProvider::new("p2").failing_with(ProviderError::Timeout),
        );
        let chain = ProviderFallback::new(vec![
            (p1, Duration::from_secs(1)),
            (p2, Duration::from_secs(1)),
        ]);
        let result = chain.synthesize(&req("hi")).await.unwrap();
        assert_eq!(result.provider_name, "p1");
    }

    #[tokio::test]
    async fn falls_back_to_next_provider_on_eligible_error() {
        let p1: Arc<dyn TtsProvider> = Arc::new(
            MockTtsProvider::new("p1").failing_with(ProviderError::Timeout),
        );
        let p2: Arc<dyn TtsProvider> = Arc::new(MockTtsProvider::new("p2"));
        let chain = ProviderFallback::new(vec![
            (p1, Duration::from_secs(1)),
            (p2, Duration::from_secs(1)),
        ]);
        let result = chain.synthesize(&req("hi")).await.unwrap();
        assert_eq!(result.provider_name, "p2");
    }

    #[tokio::test]
    async fn all_providers_exhausted_returns_503_class_error() {
        let p1: Arc<dyn TtsProvider> = Arc::new(
            MockTtsProvider::new("p1").failing_with(ProviderError::Timeout),
        );
        let p2: Arc<dyn TtsProvider> = Arc::new(
            MockTtsProvider::new("p2").failing_with(ProviderError::Transport("down".into())),
        );
        let chain = ProviderFallback::new(vec![
            (p1, Duration::from_secs(1)),
            (p2, Duration::from_secs(1)),
        ]);
        let err = chain.synthesize(&req("hi")).await.unwrap_err();
        assert!(matches!(err, CacheVoiceError::UpstreamExhausted(_)));
    }

    #[tokio::test]
    async fn non_eligible_error_propagates_immediately() {
        let p1: Arc<dyn TtsProvider> = Arc::new(
            MockTtsProvider::new("p1").failing_with(ProviderError::Rejected("bad input".into())),
        );
        let p2: Arc<dyn TtsProvider> = Arc::new(MockTtsProvider::new("p2"));
        let chain = ProviderFallback::new(vec![
            (p1, Duration::from_secs(1)),
            (p2, Duration::from_secs(1)),
        ]);
        let err = chain.synthesize(&req("hi")).await.unwrap_err();
        assert!(matches!(err, CacheVoiceError::UpstreamRejected(_)));
    }

    #[tokio::test]
    async fn provider_timeout_is_fallback_eligible() {
        let p1: Arc<dyn TtsProvider> = Arc::new(MockTtsProvider::new("slow").with_latency(200));
        let p2: Arc<dyn TtsProvider> = Arc::new(MockTtsProvider::new("fast"));
        let chain = ProviderFallback::new(vec![
            (p1, Duration::from_millis(10)),
            (p2, Duration::from_millis(10)),
        ]);
        let result = chain.synthesize(&req("hi")).await.unwrap();
        assert_eq!(result.provider_name, "fast");
    }
}
