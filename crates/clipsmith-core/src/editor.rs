use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    assets::{AssetId, AssetStore},
    backup::BackupManager,
    codec::{self, CodecError},
    config::EditorConfig,
    model::{EditSettings, SampleBuffer, SettingsError, validate_silence_threshold},
    pipeline,
    settings::{EditStateStore, JsonFileSettingsBackend},
};

#[derive(Debug, Error)]
pub enum EditError {
    #[error("malformed container: {0}")]
    MalformedContainer(#[from] CodecError),
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] SettingsError),
    #[error("no backup to restore for {0}")]
    BackupUnavailable(AssetId),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("batch aborted before {0} was processed")]
    Aborted(AssetId),
}

impl From<anyhow::Error> for EditError {
    fn from(value: anyhow::Error) -> Self {
        Self::Storage(format!("{value:#}"))
    }
}

impl EditError {
    /// Outcomes that skip the asset without anything going wrong.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::BackupUnavailable(_) | Self::Aborted(_))
    }
}

/// Settings produced by a batch mutator plus anything worth telling the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsChange {
    pub settings: EditSettings,
    pub warnings: Vec<String>,
}

impl From<EditSettings> for SettingsChange {
    fn from(settings: EditSettings) -> Self {
        Self {
            settings,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "operation")]
pub enum BatchOperation {
    Normalize,
    Denormalize,
    SetVolume { volume: f32 },
    TrimSilence { threshold: f32 },
    Reset,
}

/// Shared flag a host can raise to skip the remaining items of a batch.
/// Items already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub parallel: bool,
    pub abort: AbortHandle,
}

#[derive(Debug)]
pub struct BatchItem {
    pub asset_id: AssetId,
    pub outcome: Result<Vec<u8>, EditError>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.outcome.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(&item.outcome, Err(error) if !error.is_noop()))
            .count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(&item.outcome, Err(error) if error.is_noop()))
            .count()
    }

    #[must_use]
    pub fn item(&self, id: &AssetId) -> Option<&BatchItem> {
        self.items.iter().find(|item| &item.asset_id == id)
    }
}

/// One mutex per asset key; writes to the same asset serialize, different
/// assets never contend. An entry lives only while some caller holds or
/// waits for it.
#[derive(Debug, Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn with_lock<T>(&self, id: &AssetId, f: impl FnOnce() -> T) -> T {
        let key = id.key();
        let lock = Arc::clone(
            self.locks
                .lock()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );

        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.locks.lock();
        // Clones are only taken under the map lock, so a count of two (map
        // plus ours) means nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Non-destructive edit orchestration over backups and persisted settings.
///
/// The live asset is always recomputed from the captured original and the
/// latest settings, so repeated edits never compound.
#[derive(Debug)]
pub struct Editor {
    backups: BackupManager,
    settings: EditStateStore,
    locks: KeyedLocks,
}

impl Editor {
    #[must_use]
    pub fn new(backups: BackupManager, settings: EditStateStore) -> Self {
        Self {
            backups,
            settings,
            locks: KeyedLocks::default(),
        }
    }

    /// Filesystem-backed editor using the backup directory and settings file
    /// named by `config`.
    pub fn from_config(config: &EditorConfig) -> Result<Self, EditError> {
        let backend = JsonFileSettingsBackend::open(config.settings_path())?;
        Ok(Self::new(
            BackupManager::new(config.backup_dir()),
            EditStateStore::new(Arc::new(backend)),
        ))
    }

    #[must_use]
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        self.backups.dir()
    }

    #[must_use]
    pub fn has_backup(&self, id: &AssetId) -> bool {
        self.backups.has_backup(id)
    }

    /// Current persisted settings, defaults when none are stored.
    pub fn settings(&self, id: &AssetId) -> Result<EditSettings, EditError> {
        Ok(self.settings.load(id)?)
    }

    /// Settings for an editing session. Settings left behind by a backup that
    /// has since disappeared are discarded so the session starts clean.
    #[instrument(skip(self), fields(asset = %id))]
    pub fn open_settings(&self, id: &AssetId) -> Result<EditSettings, EditError> {
        self.locks.with_lock(id, || {
            if !self.backups.has_backup(id) && self.settings.has_settings(id)? {
                warn!("settings found without a backup, discarding them");
                self.settings.clear(id)?;
            }
            Ok(self.settings.load(id)?)
        })
    }

    /// Runs the pipeline for display or playback without capturing a backup,
    /// persisting settings, or producing bytes.
    #[instrument(skip(self, current, settings), fields(asset = %id))]
    pub fn preview(
        &self,
        id: &AssetId,
        current: &[u8],
        settings: &EditSettings,
    ) -> Result<SampleBuffer, EditError> {
        settings.validate()?;
        let source = self.source_buffer(id, current)?;
        Ok(pipeline::process(&source, settings))
    }

    /// Re-renders `id` from its original with `settings` and records them.
    /// Returns the bytes the host should store at the asset's location.
    #[instrument(skip(self, current, settings), fields(asset = %id, normalize = settings.normalize, volume = settings.volume))]
    pub fn apply_edit(
        &self,
        id: &AssetId,
        current: &[u8],
        settings: &EditSettings,
    ) -> Result<Vec<u8>, EditError> {
        self.locks
            .with_lock(id, || self.apply_locked(id, current, settings))
    }

    /// Hands back the original bytes of `id` and forgets its edit state.
    /// `Ok(None)` means there was nothing to reset.
    #[instrument(skip(self), fields(asset = %id))]
    pub fn reset(&self, id: &AssetId) -> Result<Option<Vec<u8>>, EditError> {
        self.locks.with_lock(id, || {
            let Some(original) = self.backups.get_backup(id)? else {
                debug!("no backup, nothing to reset");
                return Ok(None);
            };
            self.forget_edits(id)?;
            Ok(Some(original))
        })
    }

    /// [`Editor::apply_edit`] reading and writing the asset through `store`.
    #[instrument(skip(self, store, settings), fields(asset = %id))]
    pub fn apply_to_asset(
        &self,
        store: &dyn AssetStore,
        id: &AssetId,
        settings: &EditSettings,
    ) -> Result<Vec<u8>, EditError> {
        self.locks.with_lock(id, || {
            let current = store.read(id)?;
            let encoded = self.apply_locked(id, &current, settings)?;
            store.write(id, &encoded)?;
            Ok(encoded)
        })
    }

    /// Restores the original into `store` before dropping the backup, so a
    /// failed write never loses it.
    #[instrument(skip(self, store), fields(asset = %id))]
    pub fn reset_asset(
        &self,
        store: &dyn AssetStore,
        id: &AssetId,
    ) -> Result<Option<Vec<u8>>, EditError> {
        self.locks.with_lock(id, || {
            let Some(original) = self.backups.get_backup(id)? else {
                debug!("no backup, nothing to reset");
                return Ok(None);
            };
            store.write(id, &original)?;
            self.forget_edits(id)?;
            Ok(Some(original))
        })
    }

    /// Loads each asset's settings, passes them through `mutator` together
    /// with the asset's original samples, and applies the result. Every
    /// asset succeeds or fails on its own.
    #[instrument(skip(self, store, ids, options, mutator), fields(count = ids.len(), parallel = options.parallel))]
    pub fn batch_apply<F, C>(
        &self,
        store: &dyn AssetStore,
        ids: &[AssetId],
        options: &BatchOptions,
        mutator: F,
    ) -> BatchReport
    where
        F: Fn(&AssetId, &SampleBuffer, EditSettings) -> Result<C, EditError> + Sync,
        C: Into<SettingsChange>,
    {
        let run = |id: &AssetId| -> BatchItem {
            if options.abort.is_aborted() {
                return BatchItem {
                    asset_id: id.clone(),
                    outcome: Err(EditError::Aborted(id.clone())),
                    warnings: Vec::new(),
                };
            }

            let mut warnings = Vec::new();
            let outcome = self.batch_item(store, id, &mutator, &mut warnings);
            if let Err(error) = &outcome {
                warn!(asset = %id, %error, "batch item failed");
            }
            BatchItem {
                asset_id: id.clone(),
                outcome,
                warnings,
            }
        };

        let items: Vec<BatchItem> = if options.parallel {
            ids.par_iter().map(run).collect()
        } else {
            ids.iter().map(run).collect()
        };

        let report = BatchReport { items };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "batch complete"
        );
        report
    }

    /// Runs one of the built-in batch operations over `ids`.
    pub fn run_batch(
        &self,
        store: &dyn AssetStore,
        ids: &[AssetId],
        operation: BatchOperation,
        options: &BatchOptions,
    ) -> BatchReport {
        match operation {
            BatchOperation::Normalize => {
                self.batch_apply(store, ids, options, |_, _, settings| {
                    Ok(EditSettings {
                        normalize: true,
                        ..settings
                    })
                })
            }
            BatchOperation::Denormalize => {
                self.batch_apply(store, ids, options, |_, _, settings| {
                    Ok(EditSettings {
                        normalize: false,
                        ..settings
                    })
                })
            }
            BatchOperation::SetVolume { volume } => {
                self.batch_apply(store, ids, options, |_, _, settings| {
                    Ok(EditSettings { volume, ..settings })
                })
            }
            BatchOperation::TrimSilence { threshold } => {
                self.batch_apply(store, ids, options, |id, source, settings| {
                    trim_silence_change(id, source, settings, threshold)
                })
            }
            BatchOperation::Reset => self.batch_reset(store, ids, options),
        }
    }

    #[instrument(skip(self, store, ids, options), fields(count = ids.len()))]
    fn batch_reset(
        &self,
        store: &dyn AssetStore,
        ids: &[AssetId],
        options: &BatchOptions,
    ) -> BatchReport {
        let run = |id: &AssetId| -> BatchItem {
            let outcome = if options.abort.is_aborted() {
                Err(EditError::Aborted(id.clone()))
            } else {
                self.reset_asset(store, id).and_then(|original| {
                    original.ok_or_else(|| EditError::BackupUnavailable(id.clone()))
                })
            };
            BatchItem {
                asset_id: id.clone(),
                outcome,
                warnings: Vec::new(),
            }
        };

        let items: Vec<BatchItem> = if options.parallel {
            ids.par_iter().map(run).collect()
        } else {
            ids.iter().map(run).collect()
        };
        BatchReport { items }
    }

    fn batch_item<F, C>(
        &self,
        store: &dyn AssetStore,
        id: &AssetId,
        mutator: &F,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<u8>, EditError>
    where
        F: Fn(&AssetId, &SampleBuffer, EditSettings) -> Result<C, EditError>,
        C: Into<SettingsChange>,
    {
        self.locks.with_lock(id, || {
            let current = store.read(id)?;
            let source = self.source_buffer(id, &current)?;
            let loaded = self.settings.load(id)?;
            let change: SettingsChange = mutator(id, &source, loaded)?.into();
            warnings.extend(change.warnings);
            change.settings.validate()?;

            let encoded = self.render(id, &current, &source, &change.settings)?;
            store.write(id, &encoded)?;
            Ok(encoded)
        })
    }

    fn apply_locked(
        &self,
        id: &AssetId,
        current: &[u8],
        settings: &EditSettings,
    ) -> Result<Vec<u8>, EditError> {
        settings.validate()?;
        let source = self.source_buffer(id, current)?;
        self.render(id, current, &source, settings)
    }

    /// Captures the original when needed, then encodes the pipeline output
    /// and persists `settings`. Callers validate `settings` first.
    fn render(
        &self,
        id: &AssetId,
        current: &[u8],
        source: &SampleBuffer,
        settings: &EditSettings,
    ) -> Result<Vec<u8>, EditError> {
        if self.backups.ensure_backup(id, current)? {
            debug!("first edit, original captured");
        }

        let edited = pipeline::process(source, settings);
        let encoded = codec::encode(&edited)?;
        self.settings.save(id, settings)?;
        info!(
            frames = edited.frame_count(),
            bytes = encoded.len(),
            "edit applied"
        );
        Ok(encoded)
    }

    /// Decoded original of `id`: the backup if one exists, otherwise
    /// `current`, which is what the backup will capture.
    pub fn source_buffer(&self, id: &AssetId, current: &[u8]) -> Result<SampleBuffer, EditError> {
        let (buffer, _) = match self.backups.get_backup(id)? {
            Some(original) => codec::decode(&original)?,
            None => codec::decode(current)?,
        };
        Ok(buffer)
    }

    fn forget_edits(&self, id: &AssetId) -> Result<(), EditError> {
        self.settings.clear(id)?;
        self.backups.delete_backup(id)?;
        info!("asset reset to original");
        Ok(())
    }
}

/// Sets trim bounds to the non-silent region of `source`. A silent clip
/// gets the full range (0 to 1) and a warning instead of an error.
pub fn trim_silence_change(
    id: &AssetId,
    source: &SampleBuffer,
    settings: EditSettings,
    threshold: f32,
) -> Result<SettingsChange, EditError> {
    validate_silence_threshold(threshold)?;
    let detected = pipeline::detect_silence(source, threshold);
    if detected.fully_silent {
        return Ok(SettingsChange {
            settings: EditSettings {
                trim_start: 0.0,
                trim_end: 1.0,
                ..settings
            },
            warnings: vec![format!(
                "{id} is completely silent below threshold {threshold}, left untrimmed"
            )],
        });
    }

    Ok(EditSettings {
        trim_start: detected.trim_start,
        trim_end: detected.trim_end,
        ..settings
    }
    .into())
}
