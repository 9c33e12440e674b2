use std::{
    collections::BTreeMap,
    fmt,
    fs,
    io::Write,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

/// Stable, content-independent identity of an audio asset, usually its path
/// relative to the asset root with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into().replace('\\', "/"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 hex of the identity. Used to address backups and settings so
    /// that neither depends on the asset's bytes.
    #[must_use]
    pub fn key(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        format!("{digest:x}")
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Host storage holding the live bytes of each asset.
pub trait AssetStore: Send + Sync {
    fn read(&self, id: &AssetId) -> Result<Vec<u8>>;
    fn write(&self, id: &AssetId, bytes: &[u8]) -> Result<()>;
}

/// Assets stored as files under a root directory; the id is the relative path.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, id: &AssetId) -> Result<PathBuf> {
        let relative = Path::new(id.as_str());
        let escapes_root = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if id.as_str().is_empty() || escapes_root {
            return Err(anyhow::anyhow!(
                "asset id {id} is not a relative path inside the asset root"
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl AssetStore for FsAssetStore {
    #[instrument(skip(self), fields(asset = %id))]
    fn read(&self, id: &AssetId) -> Result<Vec<u8>> {
        let path = self.path_of(id)?;
        fs::read(&path).with_context(|| format!("failed to read asset: {}", path.display()))
    }

    #[instrument(skip(self, bytes), fields(asset = %id, len = bytes.len()))]
    fn write(&self, id: &AssetId, bytes: &[u8]) -> Result<()> {
        let path = self.path_of(id)?;
        write_atomic(&path, bytes)?;
        debug!(path = %path.display(), "asset written");
        Ok(())
    }
}

/// In-process asset store, mainly for hosts that keep assets in memory and
/// for tests.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    blobs: Mutex<BTreeMap<AssetId, Vec<u8>>>,
}

impl MemoryAssetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: AssetId, bytes: Vec<u8>) {
        self.blobs.lock().insert(id, bytes);
    }

    #[must_use]
    pub fn get(&self, id: &AssetId) -> Option<Vec<u8>> {
        self.blobs.lock().get(id).cloned()
    }
}

impl AssetStore for MemoryAssetStore {
    fn read(&self, id: &AssetId) -> Result<Vec<u8>> {
        self.get(id)
            .ok_or_else(|| anyhow::anyhow!("asset not found: {id}"))
    }

    fn write(&self, id: &AssetId, bytes: &[u8]) -> Result<()> {
        self.insert(id.clone(), bytes.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioAssetEntry {
    pub id: AssetId,
    pub path: String,
    pub size_bytes: u64,
}

/// Lists `.wav` files below `root`, with ids relative to `root`. The backup
/// directory is skipped when it lives inside the tree.
#[instrument(fields(root = %root.display()))]
pub fn scan_audio_assets(root: &Path, exclude: Option<&Path>) -> Result<Vec<AudioAssetEntry>> {
    if !root.is_dir() {
        return Err(anyhow::anyhow!(
            "audio asset root is not a directory: {}",
            root.display()
        ));
    }

    let mut assets = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| exclude.is_none_or(|excluded| entry.path() != excluded));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(
                    ?error,
                    "ignoring unreadable entry while scanning audio assets"
                );
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_wav(entry.path()) {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let id = AssetId::new(relative.to_string_lossy());
        let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        assets.push(AudioAssetEntry {
            id,
            path: entry.path().display().to_string(),
            size_bytes,
        });
    }

    assets.sort_by(|left, right| left.id.cmp(&right.id));
    debug!(count = assets.len(), "audio asset scan complete");
    Ok(assets)
}

/// Writes through a temp file in the destination directory and renames it
/// into place, so readers never observe a half-written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf);
    fs::create_dir_all(&parent)
        .with_context(|| format!("failed to create directory: {}", parent.display()))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(&parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    temp_file
        .write_all(bytes)
        .context("failed to write temp file")?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow::anyhow!(error.error))
        .with_context(|| format!("failed to persist {}", path.display()))?;
    Ok(())
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("wav"))
}
