//! Metadata DB. Durable, single-writer record of cache entries.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::{CacheVoiceError, CacheVoiceResult};

/// A persistent cache entry row.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub id: i64,
    pub text_normalized: String,
    pub voice_id: String,
    pub version_num: u32,
    pub audio_path: String,
    pub format: String,
    pub size_bytes: i64,
    pub created_at: String,
    pub hit_count: i64,
}

/// An eviction candidate row.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub id: i64,
    pub audio_path: String,
    pub text_normalized: String,
    pub voice_id: String,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: i64,
    pub total_hits: i64,
    pub hit_rate: f64,
    pub cache_age_seconds: i64,
    pub per_voice: std::collections::HashMap<String, VoiceStats>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct VoiceStats {
    pub entries: i64,
    pub hits: i64,
    pub size_bytes: i64,
}

const SCHEMA_VERSION: i64 = 2;

/// Single-writer SQLite metadata store.
///
/// All operations compete for the same `Mutex<Connection>`; there are no
/// additional file-level locks.
pub struct MetadataDb {
    conn: Mutex<Connection>,
    /// Process-local counter, reset on restart.
    total_misses: AtomicU64,
}

impl MetadataDb {
    /// Open (or create) the database file and run `init()`.
    pub fn open(path: &Path) -> CacheVoiceResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
            total_misses: AtomicU64::new(0),
        };
        db.init()?;
        Ok(db)
    }

    /// In-memory database, for tests.
    pub fn in_memory() -> CacheVoiceResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
            total_misses: AtomicU64::new(0),
        };
        db.init()?;
        Ok(db)
    }

    /// Detect current schema and migrate/create as needed.
    fn init(&self) -> CacheVoiceResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
        )?;

        let current_version: Option<i64> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match current_version {
            None => {
                // Fresh database: create v2 directly.
                conn.execute_batch(
                    "CREATE TABLE cache_entries (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        text_normalized TEXT NOT NULL,
                        voice_id TEXT NOT NULL,
                        version_num INTEGER NOT NULL DEFAULT 1,
                        audio_path TEXT NOT NULL,
                        format TEXT NOT NULL,
                        size_bytes INTEGER NOT NULL,
                        created_at TEXT NOT NULL DEFAULT (datetime('now')),
                        hit_count INTEGER NOT NULL DEFAULT 0
                    );
                    CREATE UNIQUE INDEX idx_cache_entries_unique
                        ON cache_entries(text_normalized, voice_id, version_num);",
                )?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
                info!(version = SCHEMA_VERSION, "initialized fresh cache schema");
            }
            Some(1) => {
                self.migrate_v1_to_v2(&conn)?;
            }
            Some(v) if v == SCHEMA_VERSION => {
                debug!(version = v, "cache schema up to date");
            }
            Some(v) => {
                return Err(CacheVoiceError::SchemaMigrationFailure(format!(
                    "unsupported schema version {v}"
                )));
            }
        }

        Ok(())
    }

    fn migrate_v1_to_v2(&self, conn: &Connection) -> CacheVoiceResult<()> {
        // Probe for the version_num column; ADD COLUMN is not idempotent
        // on its own, so we check pragma table_info first.
        let has_version_num: bool = conn
            .prepare("PRAGMA table_info(cache_entries)")?
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(|r| r.ok())
            .any(|name| name == "version_num");

        if !has_version_num {
            conn.execute(
                "ALTER TABLE cache_entries ADD COLUMN version_num INTEGER NOT NULL DEFAULT 1",
                [],
            )
            .map_err(|e| {
                CacheVoiceError::SchemaMigrationFailure(format!(
                    "failed to add version_num column: {e}"
                ))
            })?;
        }

        // Dedupe rows with identical (text_normalized, voice_id), keeping
        // the one with the highest hit_count; ties broken by lowest id.
        conn.execute_batch(
            "DELETE FROM cache_entries
             WHERE id NOT IN (
                 SELECT id FROM (
                     SELECT id,
                            ROW_NUMBER() OVER (
                                PARTITION BY text_normalized, voice_id
                                ORDER BY hit_count DESC, id ASC
                            ) AS rn
                     FROM cache_entries
                 )
                 WHERE rn = 1
             );",
        )
        .map_err(|e| {
            CacheVoiceError::SchemaMigrationFailure(format!("dedupe failed: {e}"))
        })?;

        conn.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_cache_entries_unique
                ON cache_entries(text_normalized, voice_id, version_num);",
        )
        .map_err(|e| {
            CacheVoiceError::SchemaMigrationFailure(format!("unique index failed: {e}"))
        })?;

        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;

        info!("migrated cache schema v1 -> v2");
        Ok(())
    }

    /// Upsert-ignore on the unique key. Returns the row id whether the
    /// insert happened or a concurrent writer already won the race.
    pub fn add_entry(
        &self,
        text_normalized: &str,
        voice_id: &str,
        version_num: u32,
        audio_path: &str,
        format: &str,
        size_bytes: i64,
    ) -> CacheVoiceResult<i64> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO cache_entries
                (text_normalized, voice_id, version_num, audio_path, format, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![text_normalized, voice_id, version_num, audio_path, format, size_bytes],
        )?;

        if changed > 0 {
            return Ok(conn.last_insert_rowid());
        }

        // Lost the race: select the existing row.
        conn.query_row(
            "SELECT id FROM cache_entries WHERE text_normalized = ?1 AND voice_id = ?2 AND version_num = ?3",
            params![text_normalized, voice_id, version_num],
            |row| row.get(0),
        )
        .map_err(Into::into)
    }

    /// Increment `hit_count`. If `version_num` is `None`, increments all
    /// versions for the pair (legacy behavior, preserved intentionally).
    pub fn record_hit(
        &self,
        text_normalized: &str,
        voice_id: &str,
        version_num: Option<u32>,
    ) -> CacheVoiceResult<()> {
        let conn = self.conn.lock().unwrap();
        match version_num {
            Some(v) => {
                conn.execute(
                    "UPDATE cache_entries SET hit_count = hit_count + 1
                     WHERE text_normalized = ?1 AND voice_id = ?2 AND version_num = ?3",
                    params![text_normalized, voice_id, v],
                )?;
            }
            None => {
                conn.execute(
                    "UPDATE cache_entries SET hit_count = hit_count + 1
                     WHERE text_normalized = ?1 AND voice_id = ?2",
                    params![text_normalized, voice_id],
                )?;
            }
        }
        Ok(())
    }

    /// In-memory counter only.
    pub fn record_miss(&self) {
        self.total_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_misses(&self) -> u64 {
        self.total_misses.load(Ordering::Relaxed)
    }

    pub fn get_version_count(&self, text_normalized: &str, voice_id: &str) -> CacheVoiceResult<u32> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE text_normalized = ?1 AND voice_id = ?2",
            params![text_normalized, voice_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Rows matching either age-based or overflow (lowest-hit_count beyond
    /// cap) eviction criteria.
    pub fn get_eviction_candidates(
        &self,
        max_entries: usize,
        min_age_days: u32,
    ) -> CacheVoiceResult<Vec<EvictionCandidate>> {
        let conn = self.conn.lock().unwrap();

        let mut candidates = Vec::new();
        let mut seen_ids = std::collections::HashSet::new();

        // Age candidates.
        {
            let mut stmt = conn.prepare(
                "SELECT id, audio_path, text_normalized, voice_id FROM cache_entries
                 WHERE created_at <= datetime('now', ?1)",
            )?;
            let age_param = format!("-{min_age_days} days");
            let rows = stmt.query_map(params![age_param], row_to_candidate)?;
            for row in rows {
                let candidate = row?;
                if seen_ids.insert(candidate.id) {
                    candidates.push(candidate);
                }
            }
        }

        // Overflow candidates: lowest hit_count beyond max_entries.
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        if total as usize > max_entries {
            let overflow = total as usize - max_entries;
            let mut stmt = conn.prepare(
                "SELECT id, audio_path, text_normalized, voice_id FROM cache_entries
                 ORDER BY hit_count ASC, id ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![overflow as i64], row_to_candidate)?;
            for row in rows {
                let candidate = row?;
                if seen_ids.insert(candidate.id) {
                    candidates.push(candidate);
                }
            }
        }

        Ok(candidates)
    }

    pub fn delete_entries_by_ids(&self, ids: &[i64]) -> CacheVoiceResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders: Vec<String> = ids.iter().map(|_| "?".to_string()).collect();
        let sql = format!(
            "DELETE FROM cache_entries WHERE id IN ({})",
            placeholders.join(",")
        );
        let params: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        conn.execute(&sql, params.as_slice())?;
        Ok(())
    }

    pub fn get_all_entries_with_ids(&self) -> CacheVoiceResult<Vec<CacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, text_normalized, voice_id, version_num, audio_path, format, size_bytes, created_at, hit_count
             FROM cache_entries",
        )?;
        let rows = stmt.query_map([], row_to_entry)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_stats(&self) -> CacheVoiceResult<CacheStats> {
        let conn = self.conn.lock().unwrap();

        let total_entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        let total_hits: i64 = conn
            .query_row("SELECT COALESCE(SUM(hit_count), 0) FROM cache_entries", [], |row| {
                row.get(0)
            })?;
        let total_misses = self.total_misses() as f64;
        let hit_rate = if total_hits as f64 + total_misses > 0.0 {
            (total_hits as f64 / (total_hits as f64 + total_misses) * 10000.0).round() / 10000.0
        } else {
            0.0
        };

        let min_created_at: Option<String> = conn.query_row(
            "SELECT MIN(created_at) FROM cache_entries",
            [],
            |row| row.get::<_, Option<String>>(0),
        )?;
        let cache_age_seconds = match min_created_at {
            Some(ts) => {
                let age: i64 = conn
                    .query_row(
                        "SELECT CAST(strftime('%s', 'now') AS INTEGER) - CAST(strftime('%s', ?1) AS INTEGER)",
                        params![ts],
                        |row| row.get(0),
                    )
                    .unwrap_or(0);
                age.max(0)
            }
            None => 0,
        };

        let mut per_voice = std::collections::HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT voice_id, COUNT(*), COALESCE(SUM(hit_count), 0), COALESCE(SUM(size_bytes), 0)
                 FROM cache_entries GROUP BY voice_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    VoiceStats {
                        entries: row.get(1)?,
                        hits: row.get(2)?,
                        size_bytes: row.get(3)?,
                    },
                ))
            })?;
            for row in rows {
                let (voice_id, stats) = row?;
                per_voice.insert(voice_id, stats);
            }
        }

        Ok(CacheStats {
            total_entries,
            total_hits,
            hit_rate,
            cache_age_seconds,
            per_voice,
        })
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        id: row.get(0)?,
        text_normalized: row.get(1)?,
        voice_id: row.get(2)?,
        version_num: row.get::<_, i64>(3)? as u32,
        audio_path: row.get(4)?,
        format: row.get(5)?,
        size_bytes: row.get(6)?,
        created_at: row.get(7)?,
        hit_count: row.get(8)?,
    })
}

fn row_to_candidate(row: &rusqlite::Row) -> rusqlite::Result<EvictionCandidate> {
    Ok(EvictionCandidate {
        id: row.get(0)?,
        audio_path: row.get(1)?,
        text_normalized: row.get(2)?,
        voice_id: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_db() -> MetadataDb {
        MetadataDb::in_memory().unwrap()
    }

    #[test]
    fn add_entry_returns_new_id() {
        let db = new_db();
        let id = db.add_entry("hello", "v1", 1, "/tmp/a.mp3", "mp3", 100).unwrap();
        assert!(id > 0);
    }

    #[test]
    fn add_entry_race_returns_existing_id() {
        let db = new_db();
        let id1 = db.add_entry("hello", "v1", 1, "/tmp/a.mp3", "mp3", 100).unwrap();
        // Simulated race: same unique key inserted again.
        let id2 = db.add_entry("hello", "v1", 1, "/tmp/b.mp3", "mp3", 50).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn record_hit_without_version_increments_all_versions() {
        let db = new_db();
        db.add_entry("hello", "v1", 1, "/tmp/a.mp3", "mp3", 100).unwrap();
        db.add_entry("hello", "v1", 2, "/tmp/b.mp3", "mp3", 100).unwrap();
        db.record_hit("hello", "v1", None).unwrap();

        let entries = db.get_all_entries_with_ids().unwrap();
        assert!(entries.iter().all(|e| e.hit_count == 1));
    }

    #[test]
    fn record_hit_with_version_increments_only_that_version() {
        let db = new_db();
        db.add_entry("hello", "v1", 1, "/tmp/a.mp3", "mp3", 100).unwrap();
        db.add_entry("hello", "v1", 2, "/tmp/b.mp3", "mp3", 100).unwrap();
        db.record_hit("hello", "v1", Some(1)).unwrap();

        let entries = db.get_all_entries_with_ids().unwrap();
        let v1 = entries.iter().find(|e| e.version_num == 1).unwrap();
        let v2 = entries.iter().find(|e| e.version_num == 2).unwrap();
        assert_eq!(v1.hit_count, 1);
        assert_eq!(v2.hit_count, 0);
    }

    #[test]
    fn record_hit_on_missing_row_is_a_no_op() {
        let db = new_db();
        assert!(db.record_hit("ghost", "v1", None).is_ok());
    }

    #[test]
    fn get_version_count_counts_rows_for_pair() {
        let db = new_db();
        db.add_entry("hello", "v1", 1, "/tmp/a.mp3", "mp3", 100).unwrap();
        db.add_entry("hello", "v1", 2, "/tmp/b.mp3", "mp3", 100).unwrap();
        db.add_entry("hello", "v2", 1, "/tmp/c.mp3", "mp3", 100).unwrap();
        assert_eq!(db.get_version_count("hello", "v1").unwrap(), 2);
        assert_eq!(db.get_version_count("hello", "v2").unwrap(), 1);
    }

    #[test]
    fn get_stats_reports_totals_and_per_voice() {
        let db = new_db();
        db.add_entry("hello", "v1", 1, "/tmp/a.mp3", "mp3", 100).unwrap();
        db.add_entry("world", "v2", 1, "/tmp/b.mp3", "mp3", 200).unwrap();
        db.record_hit("hello", "v1", None).unwrap();
        db.record_miss();

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_hits, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.per_voice.get("v1").unwrap().entries, 1);
        assert_eq!(stats.per_voice.get("v2").unwrap().size_bytes, 200);
    }

    #[test]
    fn eviction_candidates_include_overflow_rows() {
        let db = new_db();
        for i in 0..5 {
            db.add_entry(&format!("text{i}"), "v1", 1, &format!("/tmp/{i}.mp3"), "mp3", 10)
                .unwrap();
        }
        // Boost hit_count on one entry so it's not the lowest.
        db.record_hit("text4", "v1", None).unwrap();

        let candidates = db.get_eviction_candidates(3, 36500).unwrap();
        // 5 entries, cap 3 -> 2 overflow candidates, lowest hit_count first.
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.text_normalized != "text4"));
    }

    #[test]
    fn delete_entries_by_ids_removes_rows() {
        let db = new_db();
        let id = db.add_entry("hello", "v1", 1, "/tmp/a.mp3", "mp3", 100).unwrap();
        db.delete_entries_by_ids(&[id]).unwrap();
        assert!(db.get_all_entries_with_ids().unwrap().is_empty());
    }

    #[test]
    fn delete_entries_by_ids_empty_slice_is_a_no_op() {
        let db = new_db();
        db.add_entry("hello", "v1", 1, "/tmp/a.mp3", "mp3", 100).unwrap();
        db.delete_entries_by_ids(&[]).unwrap();
        assert_eq!(db.get_all_entries_with_ids().unwrap().len(), 1);
    }

    #[test]
    fn unique_constraint_enforced_across_versions() {
        let db = new_db();
        let id1 = db.add_entry("hello", "v1", 1, "/tmp/a.mp3", "mp3", 100).unwrap();
        let id2 = db.add_entry("hello", "v1", 1, "/tmp/other.mp3", "mp3", 999).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(db.get_version_count("hello", "v1").unwrap(), 1);
    }
}
