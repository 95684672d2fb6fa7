//! Integrity Reconciler. Startup-only pass reconciling DB and FS.

use std::collections::HashSet;

use tracing::info;

use crate::cache::Cache;
use crate::error::CacheVoiceResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileReport {
    pub orphan_db_entries: usize,
    pub orphan_files: usize,
}

/// Run once during startup, after Hot Index load, before the HTTP
/// listener accepts traffic.
pub fn run(cache: &Cache) -> CacheVoiceResult<ReconcileReport> {
    let orphan_db_entries = reconcile_db_to_fs(cache)?;
    let orphan_files = reconcile_fs_to_db(cache)?;

    info!(
        orphan_db_entries,
        orphan_files, "Startup: removed {orphan_db_entries} orphan DB entries, {orphan_files} orphan files"
    );

    Ok(ReconcileReport {
        orphan_db_entries,
        orphan_files,
    })
}

/// Phase 1: any DB entry whose `audio_path` does not exist is dropped.
fn reconcile_db_to_fs(cache: &Cache) -> CacheVoiceResult<usize> {
    let entries = cache.db.get_all_entries_with_ids()?;
    let mut orphan_ids = Vec::new();

    for entry in &entries {
        let path = std::path::Path::new(&entry.audio_path);
        if !cache.audio_store.exists(path) {
            orphan_ids.push(entry.id);
            cache.hot_index.remove(&entry.text_normalized, &entry.voice_id);
        }
    }

    if !orphan_ids.is_empty() {
        cache.db.delete_entries_by_ids(&orphan_ids)?;
    }

    Ok(orphan_ids.len())
}

/// Phase 2: any top-level file (excluding `fillers/`, non-recursive)
/// unreferenced by any DB row is deleted.
fn reconcile_fs_to_db(cache: &Cache) -> CacheVoiceResult<usize> {
    let referenced: HashSet<String> = cache
        .db
        .get_all_entries_with_ids()?
        .into_iter()
        .map(|e| e.audio_path)
        .collect();

    let mut removed = 0;
    for path in cache.audio_store.list_top_level_files()? {
        let path_str = path.to_string_lossy().to_string();
        if !referenced.contains(&path_str) {
            cache.audio_store.delete(&path)?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_store::AudioStore;
    use crate::config::{FuzzyConfig, NormalizeConfig};
    use crate::db::MetadataDb;
    use tempfile::tempdir;

    fn new_cache(dir: &std::path::Path) -> Cache {
        let db = MetadataDb::in_memory().unwrap();
        let audio_store = AudioStore::new(dir);
        audio_store.ensure_dirs().unwrap();
        Cache::new(db, audio_store, NormalizeConfig::default(), FuzzyConfig::default(), 1).unwrap()
    }

    #[test]
    fn removes_db_row_with_missing_file() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path());
        let (path, _) = cache.store("hi", "v1", b"audio", "mp3").unwrap();
        std::fs::remove_file(&path).unwrap();

        let report = run(&cache).unwrap();
        assert_eq!(report.orphan_db_entries, 1);
        assert!(cache.db.get_all_entries_with_ids().unwrap().is_empty());
    }

    #[test]
    fn removes_unreferenced_file() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path());
        cache.store("hi", "v1", b"audio", "mp3").unwrap();
        let orphan = cache.audio_store.root().join("orphan.mp3");
        std::fs::write(&orphan, b"stray").unwrap();

        let report = run(&cache).unwrap();
        assert_eq!(report.orphan_files, 1);
        assert!(!orphan.is_file());
    }

    #[test]
    fn preserves_fillers_subdirectory() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path());
        let filler = cache.audio_store.root().join("fillers").join("wait.mp3");
        std::fs::write(&filler, b"filler-audio").unwrap();

        run(&cache).unwrap();
        assert!(filler.is_file());
    }

    #[test]
    fn clean_state_reports_zero_orphans() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path());
        cache.store("hi", "v1", b"audio", "mp3").unwrap();

        let report = run(&cache).unwrap();
        assert_eq!(report.orphan_db_entries, 0);
        assert_eq!(report.orphan_files, 0);
    }

    #[test]
    fn subsequent_lookup_for_orphaned_key_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = new_cache(dir.path());
        let (path, _) = cache.store("hi", "v1", b"audio", "mp3").unwrap();
        std::fs::remove_file(&path).unwrap();
        run(&cache).unwrap();

        assert!(matches!(
            cache.lookup("hi", "v1").unwrap(),
            crate::cache::LookupOutcome::Miss
        ));
    }
}
