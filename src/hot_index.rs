//! Hot Index. In-memory fast-path lookup, keyed by voice then text.

use std::collections::HashMap;
use std::sync::RwLock;

use rand::Rng;

use crate::fuzzy::{FuzzyConfig, FuzzyMatch};
use crate::normalize::NormalizedText;

type Bucket = HashMap<NormalizedText, Vec<String>>;

/// In-memory `voice_id -> NormalizedText -> [audio_path]` index.
///
/// Backed by a reader-preferring lock (`std::sync::RwLock`): lookups
/// vastly outnumber writes.
pub struct HotIndex {
    buckets: RwLock<HashMap<String, Bucket>>,
    variety_depth: u32,
}

impl HotIndex {
    pub fn new(variety_depth: u32) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            variety_depth,
        }
    }

    /// Append `audio_path` to the `(voice, text)` bucket, deduplicating
    /// and capping the list length at `variety_depth` (oldest dropped).
    pub fn add(&self, text_normalized: &str, voice_id: &str, audio_path: &str) {
        let mut buckets = self.buckets.write().unwrap();
        let bucket = buckets.entry(voice_id.to_string()).or_default();
        let paths = bucket.entry(text_normalized.to_string()).or_default();

        if let Some(pos) = paths.iter().position(|p| p == audio_path) {
            paths.remove(pos);
        }
        paths.push(audio_path.to_string());

        while paths.len() > self.variety_depth as usize {
            paths.remove(0);
        }
    }

    /// Drop the entire bucket entry for `(text, voice)`.
    pub fn remove(&self, text_normalized: &str, voice_id: &str) {
        let mut buckets = self.buckets.write().unwrap();
        if let Some(bucket) = buckets.get_mut(voice_id) {
            bucket.remove(text_normalized);
        }
    }

    /// Return one path chosen uniformly at random from the bucket, or
    /// `None` if the bucket is empty/absent.
    pub fn exact_lookup(&self, text_normalized: &str, voice_id: &str) -> Option<String> {
        let buckets = self.buckets.read().unwrap();
        let paths = buckets.get(voice_id)?.get(text_normalized)?;
        if paths.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..paths.len());
        Some(paths[idx].clone())
    }

    /// Full bucket contents, for variety-depth introspection.
    pub fn get_paths(&self, text_normalized: &str, voice_id: &str) -> Vec<String> {
        let buckets = self.buckets.read().unwrap();
        buckets
            .get(voice_id)
            .and_then(|b| b.get(text_normalized))
            .cloned()
            .unwrap_or_default()
    }

    /// Fuzzy lookup scoped to `voice_id`'s bucket only; never across voices.
    pub fn fuzzy_lookup(
        &self,
        input_normalized: &str,
        voice_id: &str,
        config: &FuzzyConfig,
    ) -> Option<FuzzyMatch> {
        let buckets = self.buckets.read().unwrap();
        let bucket = buckets.get(voice_id)?;
        let best = crate::fuzzy::best_match(input_normalized, bucket.keys(), config)?;
        let path = bucket.get(&best.matched_text)?.first()?.clone();
        Some(FuzzyMatch {
            path,
            ..best
        })
    }

    /// Count of distinct `(voice, text)` buckets.
    pub fn size(&self) -> usize {
        let buckets = self.buckets.read().unwrap();
        buckets.values().map(|b| b.len()).sum()
    }
}
