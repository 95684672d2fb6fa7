//! TTS provider trait and fallback orchestration.

pub mod fallback;
pub mod http;
pub mod mock;

use async_trait::async_trait;

/// Errors a provider's `synthesize` call can raise. The orchestrator
/// classifies these via [`is_fallback_eligible`].
#[derive(Debug, thiserror::Error, Clone)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("no deployment configured for this provider")]
    NoDeploymentConfigured,
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// An upstream failure class that permits the orchestrator to try the
/// next provider rather than surfacing immediately.
pub fn is_fallback_eligible(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::Transport(_) | ProviderError::Timeout | ProviderError::NoDeploymentConfigured
    )
}

/// Synthesis parameters passed to a provider.
#[derive(Debug, Clone)]
pub struct SynthesizeRequest<'a> {
    pub text: &'a str,
    pub voice: Option<&'a str>,
    pub model: Option<&'a str>,
}

/// Text-to-speech provider.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesize text into audio bytes in the provider's native format.
    async fn synthesize(&self, request: &SynthesizeRequest<'_>) -> Result<Vec<u8>, ProviderError>;

    /// Human-readable provider name.
    fn name(&self) -> &str;
}

/// Empty string, whitespace-only, and unresolved placeholder references
/// (e.g. `"${API_KEY}"`, `"<unset>"`) all count as absent, so an
/// un-configured provider is skipped cleanly.
pub fn has_credentials(key: Option<&str>) -> bool {
    match key {
        None => false,
        Some(k) => {
            let trimmed = k.trim();
            if trimmed.is_empty() {
                return false;
            }
            let looks_like_placeholder = (trimmed.starts_with("${") && trimmed.ends_with('}'))
                || (trimmed.starts_with('<') && trimmed.ends_with('>'));
            !looks_like_placeholder
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_eligible_classes() {
        assert!(is_fallback_eligible(&ProviderError::Transport("x".into())));
        assert!(is_fallback_eligible(&ProviderError::Timeout));
        assert!(is_fallback_eligible(&ProviderError::NoDeploymentConfigured));
        assert!(!is_fallback_eligible(&ProviderError::Rejected("bad".into())));
    }

    #[test]
    fn credentials_absent_cases() {
        assert!(!has_credentials(None));
        assert!(!has_credentials(Some("")));
        assert!(!has_credentials(Some("   ")));
        assert!(!has_credentials(Some("${API_KEY}")));
        assert!(!has_credentials(Some("<unset>")));
    }

    #[test]
    fn credentials_present_case() {
        assert!(has_credentials(Some("sk-real-key-123")));
    }
}
