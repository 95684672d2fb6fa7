//! Audio Store. Deterministic filenames and atomic on-disk writes.
//!
//! Filenames are a SHA-256 hex digest of the synthesis parameters, with a
//! version suffix for variety slots beyond the first.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// On-disk audio file store rooted at `<data_dir>/audio/`.
#[derive(Debug, Clone)]
pub struct AudioStore {
    root: PathBuf,
}

impl AudioStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("audio"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the store's directory tree exists (including `fillers/`).
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.root.join("fillers"))?;
        Ok(())
    }

    /// Derive the deterministic path for a given cache key.
    ///
    /// `suffix` is empty for version 1 (preserving legacy v1 hashes) and
    /// `"|v{version_num}"` for versions >= 2.
    pub fn derive_path(
        &self,
        text_normalized: &str,
        voice_id: &str,
        version_num: u32,
        format: &str,
    ) -> PathBuf {
        let suffix = if version_num >= 2 {
            format!("|v{version_num}")
        } else {
            String::new()
        };
        let preimage = format!("{text_normalized}|{voice_id}{suffix}");
        let digest = Sha256::digest(preimage.as_bytes());
        let hex_digest = hex::encode(digest);
        self.root.join(format!("{hex_digest}.{format}"))
    }

    /// Write `bytes` to `final_path` atomically: write to a temp file in
    /// the same directory, then rename. Writing the file before the DB row
    /// means a file without a DB row is a reclaimable orphan, while a DB
    /// row without a file would be a broken invariant.
    pub fn write_atomic(&self, final_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let dir = final_path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir)?;
        let tmp_path = dir.join(format!(
            ".{}.tmp",
            final_path.file_name().unwrap().to_string_lossy()
        ));
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, final_path)?;
        Ok(())
    }

    pub fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    pub fn delete(&self, path: &Path) -> std::io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Non-recursive listing of the top-level audio directory, excluding
    /// the `fillers/` subdirectory.
    pub fn list_top_level_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                out.push(path);
            }
        }
        Ok(out)
    }
}
