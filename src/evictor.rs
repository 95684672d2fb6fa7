//! Evictor. Periodic, age/capacity-driven deletion across all tiers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::cache::Cache;
use crate::error::CacheVoiceResult;

/// Runs eviction once: query candidates, then for each, remove from the
/// Hot Index *first* so no lookup between DB delete and file delete can
/// race into returning a ghost path.
pub fn run_once(cache: &Cache, max_entries: usize, min_age_days: u32) -> CacheVoiceResult<usize> {
    let candidates = cache.db.get_eviction_candidates(max_entries, min_age_days)?;
    if candidates.is_empty() {
        return Ok(0);
    }

    let mut ids = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        cache.hot_index.remove(&candidate.text_normalized, &candidate.voice_id);
        let path = std::path::Path::new(&candidate.audio_path);
        // A missing file here is not an error.
        cache.audio_store.delete(path)?;
        ids.push(candidate.id);
    }

    cache.db.delete_entries_by_ids(&ids)?;
    debug!(count = ids.len(), "evictor: removed entries");
    Ok(ids.len())
}

/// Spawn the periodic eviction timer. Returns a handle whose abort stops
/// the loop (used at shutdown).
pub fn spawn(
    cache: Arc<Cache>,
    max_entries: usize,
    min_age_days: u32,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match run_once(&cache, max_entries, min_age_days) {
                Ok(0) => {}
                Ok(n) => info!(count = n, "evictor: evicted entries"),
                Err(e) => tracing::error!(error = %e, "evictor: run failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_store::AudioStore;
    use crate::config::{FuzzyConfig, NormalizeConfig};
    use crate::db::MetadataDb;
    use crate::cache::LookupOutcome;
    use tempfile::tempdir;

    fn new_cache(dir: &std::path::Path) -> Cache {
        let db = MetadataDb::in_memory().unwrap();
        let audio_store = AudioStore::new(dir);
        audio_store.ensure_dirs().unwrap();
        Cache::new(db, audio_store, NormalizeConfig::default(), FuzzyConfig::default(), 3).unwrap()
    }

    #[test]
    fn evicts_overflow_entries_beyond_cap() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path());
        for i in 0..5 {
            cache.store(&format!("text {i}"), "v1", b"audio", "mp3").unwrap();
        }

        let evicted = run_once(&cache, 3, 36500).unwrap();
        assert_eq!(evicted, 2);
        assert_eq!(cache.db.get_all_entries_with_ids().unwrap().len(), 3);
    }

    #[test]
    fn eviction_removes_from_hot_index_and_disk() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path());
        let (path, _) = cache.store("only entry", "v1", b"audio", "mp3").unwrap();

        run_once(&cache, 0, 36500).unwrap();

        assert!(!path.is_file());
        assert!(matches!(cache.lookup("only entry", "v1").unwrap(), LookupOutcome::Miss));
    }

    #[test]
    fn no_candidates_is_a_no_op() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path());
        cache.store("hi", "v1", b"audio", "mp3").unwrap();
        let evicted = run_once(&cache, 100, 36500).unwrap();
        assert_eq!(evicted, 0);
    }
}
