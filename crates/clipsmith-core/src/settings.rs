//! Persisted [`EditSettings`], one backend entry per field.
//!
//! Keys are `ClipEditor_<asset key>_<Field>`, where the asset key is derived
//! from the asset identity, never from its bytes.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    assets::{AssetId, write_atomic},
    curve::FadeCurve,
    model::EditSettings,
};

const KEY_PREFIX: &str = "ClipEditor";
const TRIM_START: &str = "TrimStart";
const TRIM_END: &str = "TrimEnd";
const FADE_IN: &str = "FadeIn";
const FADE_OUT: &str = "FadeOut";
const VOLUME: &str = "Volume";
const NORMALIZE: &str = "Normalize";
const FADE_IN_CURVE: &str = "FadeInCurve";
const FADE_OUT_CURVE: &str = "FadeOutCurve";

const FIELDS: [&str; 8] = [
    TRIM_START,
    TRIM_END,
    FADE_IN,
    FADE_OUT,
    VOLUME,
    NORMALIZE,
    FADE_IN_CURVE,
    FADE_OUT_CURVE,
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
    Float(f32),
    Int(i32),
    Blob(String),
}

/// Key/value persistence the store is layered on.
pub trait SettingsBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<SettingValue>>;
    fn set_many(&self, entries: Vec<(String, SettingValue)>) -> Result<()>;
    fn remove_many(&self, keys: &[String]) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySettingsBackend {
    entries: Mutex<BTreeMap<String, SettingValue>>,
}

impl MemorySettingsBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SettingsBackend for MemorySettingsBackend {
    fn get(&self, key: &str) -> Result<Option<SettingValue>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set_many(&self, entries: Vec<(String, SettingValue)>) -> Result<()> {
        self.entries.lock().extend(entries);
        Ok(())
    }

    fn remove_many(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// All entries in one JSON document, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonFileSettingsBackend {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, SettingValue>>,
}

impl JsonFileSettingsBackend {
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read(&path) {
            Ok(content) => serde_json::from_slice(&content)
                .with_context(|| format!("invalid settings json: {}", path.display()))?,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("settings file missing, starting empty");
                BTreeMap::new()
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read settings: {}", path.display()));
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, SettingValue>) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries).context("failed to serialize settings")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("failed to save settings: {}", self.path.display()))
    }
}

impl SettingsBackend for JsonFileSettingsBackend {
    fn get(&self, key: &str) -> Result<Option<SettingValue>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set_many(&self, entries: Vec<(String, SettingValue)>) -> Result<()> {
        let mut current = self.entries.lock();
        let mut next = current.clone();
        next.extend(entries);
        self.persist(&next)?;
        *current = next;
        Ok(())
    }

    fn remove_many(&self, keys: &[String]) -> Result<()> {
        let mut current = self.entries.lock();
        let mut next = current.clone();
        for key in keys {
            next.remove(key);
        }
        if next.len() == current.len() {
            return Ok(());
        }
        self.persist(&next)?;
        *current = next;
        Ok(())
    }
}

#[derive(Clone)]
pub struct EditStateStore {
    backend: Arc<dyn SettingsBackend>,
}

impl std::fmt::Debug for EditStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditStateStore").finish_non_exhaustive()
    }
}

impl EditStateStore {
    #[must_use]
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySettingsBackend::new()))
    }

    #[must_use]
    pub fn key_prefix(id: &AssetId) -> String {
        format!("{KEY_PREFIX}_{}", id.key())
    }

    fn field_key(id: &AssetId, field: &str) -> String {
        format!("{}_{field}", Self::key_prefix(id))
    }

    /// Stored settings for `id`, or defaults for any missing field.
    #[instrument(skip(self), fields(asset = %id))]
    pub fn load(&self, id: &AssetId) -> Result<EditSettings> {
        let defaults = EditSettings::default();
        Ok(EditSettings {
            trim_start: self.load_float(id, TRIM_START, defaults.trim_start)?,
            trim_end: self.load_float(id, TRIM_END, defaults.trim_end)?,
            fade_in_seconds: self.load_float(id, FADE_IN, defaults.fade_in_seconds)?,
            fade_out_seconds: self.load_float(id, FADE_OUT, defaults.fade_out_seconds)?,
            fade_in_curve: self.load_curve(id, FADE_IN_CURVE)?,
            fade_out_curve: self.load_curve(id, FADE_OUT_CURVE)?,
            volume: self.load_float(id, VOLUME, defaults.volume)?,
            normalize: self.load_flag(id, NORMALIZE, defaults.normalize)?,
        })
    }

    /// Replaces every stored field of `id` with `settings`.
    #[instrument(skip(self, settings), fields(asset = %id))]
    pub fn save(&self, id: &AssetId, settings: &EditSettings) -> Result<()> {
        let entries = vec![
            (
                Self::field_key(id, TRIM_START),
                SettingValue::Float(settings.trim_start),
            ),
            (
                Self::field_key(id, TRIM_END),
                SettingValue::Float(settings.trim_end),
            ),
            (
                Self::field_key(id, FADE_IN),
                SettingValue::Float(settings.fade_in_seconds),
            ),
            (
                Self::field_key(id, FADE_OUT),
                SettingValue::Float(settings.fade_out_seconds),
            ),
            (
                Self::field_key(id, VOLUME),
                SettingValue::Float(settings.volume),
            ),
            (
                Self::field_key(id, NORMALIZE),
                SettingValue::Int(i32::from(settings.normalize)),
            ),
            (
                Self::field_key(id, FADE_IN_CURVE),
                SettingValue::Blob(
                    settings
                        .fade_in_curve
                        .to_blob()
                        .context("failed to encode fade-in curve")?,
                ),
            ),
            (
                Self::field_key(id, FADE_OUT_CURVE),
                SettingValue::Blob(
                    settings
                        .fade_out_curve
                        .to_blob()
                        .context("failed to encode fade-out curve")?,
                ),
            ),
        ];
        self.backend.set_many(entries)?;
        debug!("settings saved");
        Ok(())
    }

    #[instrument(skip(self), fields(asset = %id))]
    pub fn clear(&self, id: &AssetId) -> Result<()> {
        let keys: Vec<String> = FIELDS
            .iter()
            .map(|field| Self::field_key(id, field))
            .collect();
        self.backend.remove_many(&keys)?;
        info!("settings cleared");
        Ok(())
    }

    pub fn has_settings(&self, id: &AssetId) -> Result<bool> {
        for field in FIELDS {
            if self.backend.get(&Self::field_key(id, field))?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn load_float(&self, id: &AssetId, field: &str, default: f32) -> Result<f32> {
        match self.backend.get(&Self::field_key(id, field))? {
            None => Ok(default),
            Some(SettingValue::Float(value)) => Ok(value),
            Some(other) => {
                warn!(setting = field, value = ?other, "unexpected setting type, using default");
                Ok(default)
            }
        }
    }

    fn load_flag(&self, id: &AssetId, field: &str, default: bool) -> Result<bool> {
        match self.backend.get(&Self::field_key(id, field))? {
            None => Ok(default),
            Some(SettingValue::Int(value)) => Ok(value == 1),
            Some(other) => {
                warn!(setting = field, value = ?other, "unexpected setting type, using default");
                Ok(default)
            }
        }
    }

    fn load_curve(&self, id: &AssetId, field: &str) -> Result<FadeCurve> {
        let blob = match self.backend.get(&Self::field_key(id, field))? {
            None => return Ok(FadeCurve::linear()),
            Some(SettingValue::Blob(blob)) => blob,
            Some(other) => {
                warn!(setting = field, value = ?other, "curve stored as scalar, using linear");
                return Ok(FadeCurve::linear());
            }
        };

        match FadeCurve::from_blob(&blob) {
            Ok(curve) => Ok(curve),
            Err(error) => {
                warn!(setting = field, %error, "malformed curve blob, using linear");
                Ok(FadeCurve::linear())
            }
        }
    }
}
