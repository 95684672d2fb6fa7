//! Startup filler-phrase generation, gated by `fillers.auto_generate_on_startup`.
//!
//! Fillers are short "please hold" style phrases synthesized once and
//! written into `<data_dir>/audio/fillers/`, bypassing the Metadata DB
//! entirely since they are not keyed by input text.

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::audio_store::AudioStore;
use crate::error::CacheVoiceResult;
use crate::provider::fallback::ProviderFallback;
use crate::provider::SynthesizeRequest;

const FILLER_PHRASES: &[&str] = &[
    "One moment please.",
    "Let me check on that for you.",
    "Just a second.",
    "Thanks for your patience.",
];

/// Synthesize each filler phrase that doesn't already have a file on disk.
/// Individual provider failures are logged and skipped rather than aborting
/// startup.
pub async fn generate_on_startup(
    audio_store: &AudioStore,
    providers: &ProviderFallback,
    voice_id: &str,
) -> CacheVoiceResult<usize> {
    audio_store.ensure_dirs()?;
    let mut generated = 0;

    for phrase in FILLER_PHRASES {
        let path = filler_path(audio_store, phrase);
        if audio_store.exists(&path) {
            continue;
        }

        let request = SynthesizeRequest {
            text: phrase,
            voice: Some(voice_id),
            model: None,
        };

        match providers.synthesize(&request).await {
            Ok(result) => {
                audio_store.write_atomic(&path, &result.audio)?;
                generated += 1;
            }
            Err(e) => {
                warn!(phrase, error = %e, "filler generation failed, skipping");
            }
        }
    }

    info!(generated, total = FILLER_PHRASES.len(), "startup filler generation complete");
    Ok(generated)
}

fn filler_path(audio_store: &AudioStore, phrase: &str) -> std::path::PathBuf {
    let digest = Sha256::digest(phrase.as_bytes());
    audio_store.root().join("fillers").join(format!("{}.mp3", hex::encode(digest)))
}
