//! Pristine copies of asset bytes, captured once before the first edit.
//!
//! Each backup is stored as `<asset key>.wav` inside the backup directory
//! with a `<asset key>.backup.json` manifest beside it. The directory comes
//! from configuration, so the whole store can be relocated.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::assets::{AssetId, write_atomic};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupManifest {
    pub asset_id: AssetId,
    pub captured_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn backup_path(&self, id: &AssetId) -> PathBuf {
        self.dir.join(format!("{}.wav", id.key()))
    }

    fn manifest_path(&self, id: &AssetId) -> PathBuf {
        self.dir.join(format!("{}.backup.json", id.key()))
    }

    #[must_use]
    pub fn has_backup(&self, id: &AssetId) -> bool {
        self.backup_path(id).is_file()
    }

    /// Stores `current` as the original of `id` unless a backup already
    /// exists. Returns `true` when this call captured it.
    #[instrument(skip(self, current), fields(asset = %id, len = current.len()))]
    pub fn ensure_backup(&self, id: &AssetId, current: &[u8]) -> Result<bool> {
        let path = self.backup_path(id);
        if path.is_file() {
            debug!("backup already present");
            return Ok(false);
        }

        fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create backup directory: {}", self.dir.display())
        })?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&self.dir)
            .context("failed to create temp backup file")?;
        temp_file
            .write_all(current)
            .context("failed to write temp backup file")?;
        // A concurrent capture that won the race keeps its bytes.
        match temp_file.persist_noclobber(&path) {
            Ok(_) => {}
            Err(error) if error.error.kind() == ErrorKind::AlreadyExists => {
                debug!("backup captured concurrently");
                return Ok(false);
            }
            Err(error) => {
                return Err(anyhow::anyhow!(error.error))
                    .with_context(|| format!("failed to persist backup: {}", path.display()));
            }
        }

        let manifest = BackupManifest {
            asset_id: id.clone(),
            captured_at: Utc::now(),
            size_bytes: current.len() as u64,
            sha256: hash_hex(current),
        };
        let json = serde_json::to_vec_pretty(&manifest).context("failed to encode backup manifest")?;
        write_atomic(&self.manifest_path(id), &json)?;

        info!(path = %path.display(), "original captured");
        Ok(true)
    }

    /// Returns the original bytes of `id`, verified against the manifest
    /// digest when a manifest is present.
    #[instrument(skip(self), fields(asset = %id))]
    pub fn get_backup(&self, id: &AssetId) -> Result<Option<Vec<u8>>> {
        let path = self.backup_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read backup: {}", path.display()));
            }
        };

        match self.manifest(id)? {
            Some(manifest) if manifest.sha256 != hash_hex(&bytes) => {
                return Err(anyhow::anyhow!(
                    "backup {} does not match its recorded digest",
                    path.display()
                ));
            }
            Some(_) => {}
            None => warn!(path = %path.display(), "backup has no manifest, skipping digest check"),
        }

        Ok(Some(bytes))
    }

    pub fn manifest(&self, id: &AssetId) -> Result<Option<BackupManifest>> {
        let path = self.manifest_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read backup manifest: {}", path.display()));
            }
        };
        let manifest = serde_json::from_slice(&bytes)
            .with_context(|| format!("invalid backup manifest: {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// Removes the original of `id`. Returns `false` when none existed.
    #[instrument(skip(self), fields(asset = %id))]
    pub fn delete_backup(&self, id: &AssetId) -> Result<bool> {
        remove_if_present(&self.manifest_path(id))?;
        let removed = remove_if_present(&self.backup_path(id))?;
        if removed {
            info!("backup deleted");
        }
        Ok(removed)
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => {
            Err(error).with_context(|| format!("failed to remove {}", path.display()))
        }
    }
}

fn hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}
