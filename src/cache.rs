//! Cache Facade. Composes the normalizer, hot index, fuzzy matcher, audio
//! store, and metadata DB behind `lookup` / `store`.

use std::path::PathBuf;

use tracing::debug;

use crate::audio_store::AudioStore;
use crate::config::{FuzzyConfig as ConfigFuzzyConfig, NormalizeConfig};
use crate::db::MetadataDb;
use crate::error::CacheVoiceResult;
use crate::fuzzy::FuzzyConfig;
use crate::hot_index::HotIndex;
use crate::normalize::normalize;

/// Outcome of a [`Cache::lookup`] call.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    ExactHit {
        path: PathBuf,
    },
    FuzzyHit {
        path: PathBuf,
        matched_text: String,
        score: u32,
    },
    Miss,
}

/// Composition point: Normalizer + Hot Index + Fuzzy Matcher + Audio
/// Store + Metadata DB, exposing `lookup` / `store`.
pub struct Cache {
    pub db: MetadataDb,
    pub hot_index: HotIndex,
    pub audio_store: AudioStore,
    pub normalize_config: NormalizeConfig,
    pub fuzzy_config: ConfigFuzzyConfig,
    pub variety_depth: u32,
}

impl Cache {
    pub fn new(
        db: MetadataDb,
        audio_store: AudioStore,
        normalize_config: NormalizeConfig,
        fuzzy_config: ConfigFuzzyConfig,
        variety_depth: u32,
    ) -> CacheVoiceResult<Self> {
        let hot_index = HotIndex::new(variety_depth);
        let cache = Self {
            db,
            hot_index,
            audio_store,
            normalize_config,
            fuzzy_config,
            variety_depth,
        };
        cache.load_hot_index()?;
        Ok(cache)
    }

    /// Load the Hot Index from the DB at startup. Entries pointing at a
    /// missing file are skipped and logged; the Reconciler deletes them
    /// from the DB afterwards.
    fn load_hot_index(&self) -> CacheVoiceResult<()> {
        for entry in self.db.get_all_entries_with_ids()? {
            let path = PathBuf::from(&entry.audio_path);
            if self.audio_store.exists(&path) {
                self.hot_index.add(&entry.text_normalized, &entry.voice_id, &entry.audio_path);
            } else {
                tracing::warn!(
                    path = %entry.audio_path,
                    voice_id = %entry.voice_id,
                    "hot index load: skipping entry with missing file"
                );
            }
        }
        Ok(())
    }

    pub fn normalize_text(&self, text: &str) -> String {
        normalize(text, &self.normalize_config)
    }

    /// (a) normalize, (b) Hot Index exact, (c) Hot Index fuzzy if enabled,
    /// (d) miss. Hits `record_hit` on the matched entry's normalized text.
    pub fn lookup(&self, text: &str, voice_id: &str) -> CacheVoiceResult<LookupOutcome> {
        let text_normalized = self.normalize_text(text);

        if let Some(path) = self.hot_index.exact_lookup(&text_normalized, voice_id) {
            self.db.record_hit(&text_normalized, voice_id, None)?;
            debug!(voice_id, text_preview = %preview(&text_normalized), "exact_hit");
            return Ok(LookupOutcome::ExactHit { path: PathBuf::from(path) });
        }

        let fuzzy_config: FuzzyConfig = (&self.fuzzy_config).into();
        if fuzzy_config.enabled {
            if let Some(m) = self.hot_index.fuzzy_lookup(&text_normalized, voice_id, &fuzzy_config) {
                self.db.record_hit(&m.matched_text, voice_id, None)?;
                debug!(voice_id, score = m.score, "fuzzy_hit");
                return Ok(LookupOutcome::FuzzyHit {
                    path: PathBuf::from(m.path),
                    matched_text: m.matched_text,
                    score: m.score,
                });
            }
        }

        self.db.record_miss();
        debug!(voice_id, text_preview = %preview(&text_normalized), "miss");
        Ok(LookupOutcome::Miss)
    }

    /// Normalize, derive the next version number, write the file
    /// atomically, then record the DB row. On a lost unique-key race,
    /// returns the existing row's path without re-writing the file.
    pub fn store(
        &self,
        text: &str,
        voice_id: &str,
        audio_bytes: &[u8],
        format: &str,
    ) -> CacheVoiceResult<(PathBuf, u32)> {
        let text_normalized = self.normalize_text(text);
        let existing_count = self.db.get_version_count(&text_normalized, voice_id)?;
        let version_num = (existing_count + 1).min(self.variety_depth).max(1);

        let path = self
            .audio_store
            .derive_path(&text_normalized, voice_id, version_num, format);

        self.audio_store.write_atomic(&path, audio_bytes)?;

        let path_str = path.to_string_lossy().to_string();
        self.db.add_entry(
            &text_normalized,
            voice_id,
            version_num,
            &path_str,
            format,
            audio_bytes.len() as i64,
        )?;

        self.hot_index.add(&text_normalized, voice_id, &path_str);

        Ok((path, version_num))
    }

    pub fn get_version_count(&self, text: &str, voice_id: &str) -> CacheVoiceResult<u32> {
        let text_normalized = self.normalize_text(text);
        self.db.get_version_count(&text_normalized, voice_id)
    }
}

fn preview(text: &str) -> &str {
    crate::utils::safe_truncate(text, 50)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_cache(dir: &std::path::Path, variety_depth: u32) -> Cache {
        let db = MetadataDb::in_memory().unwrap();
        let audio_store = AudioStore::new(dir);
        audio_store.ensure_dirs().unwrap();
        Cache::new(
            db,
            audio_store,
            NormalizeConfig::default(),
            ConfigFuzzyConfig::default(),
            variety_depth,
        )
        .unwrap()
    }

    #[test]
    fn miss_then_store_then_exact_hit() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path(), 1);

        assert!(matches!(cache.lookup("Hello, World!", "v1").unwrap(), LookupOutcome::Miss));

        let (path, version) = cache.store("Hello, World!", "v1", b"audio-bytes", "mp3").unwrap();
        assert_eq!(version, 1);
        assert!(path.is_file());

        let outcome = cache.lookup("Hello, World!", "v1").unwrap();
        match outcome {
            LookupOutcome::ExactHit { path: hit_path } => assert_eq!(hit_path, path),
            other => panic!("expected exact hit, got {other:?}"),
        }
    }

    #[test]
    fn case_and_punctuation_variants_still_hit() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path(), 1);
        cache.store("Hello, World!", "v1", b"audio-bytes", "mp3").unwrap();

        let outcome = cache.lookup("hello world", "v1").unwrap();
        assert!(matches!(outcome, LookupOutcome::ExactHit { .. }));
    }

    #[test]
    fn different_voice_is_separate_entry() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path(), 1);
        cache.store("Hello, World!", "v1", b"audio-bytes", "mp3").unwrap();

        assert!(matches!(cache.lookup("Hello, World!", "v2").unwrap(), LookupOutcome::Miss));
    }

    #[test]
    fn version_caps_at_variety_depth() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path(), 2);
        let (_, v1) = cache.store("hi", "v1", b"a", "mp3").unwrap();
        let (_, v2) = cache.store("hi", "v1", b"b", "mp3").unwrap();
        let (_, v3) = cache.store("hi", "v1", b"c", "mp3").unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
        assert_eq!(v3, 2);
    }

    #[test]
    fn concurrent_store_race_returns_same_path() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path(), 1);
        let (path1, v1) = cache.store("hi", "v1", b"a", "mp3").unwrap();
        // Simulated second writer for the same key, interchangeable bytes.
        let (path2, v2) = cache.store("hi", "v1", b"b", "mp3").unwrap();
        assert_eq!(path1, path2);
        assert_eq!(v1, v2);
    }

    #[test]
    fn store_then_lookup_preserves_format() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path(), 1);
        let (path, _) = cache.store("hi", "v1", b"a", "wav").unwrap();
        assert_eq!(path.extension().unwrap(), "wav");
    }

    #[test]
    fn fuzzy_hit_records_hit_on_matched_entry_not_input() {
        let dir = tempdir().unwrap();
        let db = MetadataDb::in_memory().unwrap();
        let audio_store = AudioStore::new(dir.path());
        audio_store.ensure_dirs().unwrap();
        let fuzzy_config = ConfigFuzzyConfig {
            enabled: true,
            threshold: 50,
            scorer: "ratio".to_string(),
        };
        let cache = Cache::new(db, audio_store, NormalizeConfig::default(), fuzzy_config, 1).unwrap();
        cache.store("hello world", "v1", b"a", "mp3").unwrap();

        let outcome = cache.lookup("hello wrld", "v1").unwrap();
        match outcome {
            LookupOutcome::FuzzyHit { matched_text, .. } => assert_eq!(matched_text, "hello world"),
            other => panic!("expected fuzzy hit, got {other:?}"),
        }
    }
}
