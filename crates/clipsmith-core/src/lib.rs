pub mod assets;
pub mod backup;
pub mod codec;
pub mod config;
pub mod curve;
pub mod debounce;
pub mod diagnostics;
pub mod editor;
pub mod fixtures;
pub mod model;
pub mod pipeline;
pub mod settings;
pub mod time;

pub use assets::{
    AssetId, AssetStore, AudioAssetEntry, FsAssetStore, MemoryAssetStore, scan_audio_assets,
};
pub use backup::{BackupManager, BackupManifest};
pub use codec::{CodecError, ContainerFormat, decode, encode};
pub use config::EditorConfig;
pub use curve::{FadeCurve, Keyframe};
pub use debounce::DebouncedCommitter;
pub use diagnostics::{
    TelemetryGuard, init_tracing, init_tracing_from_config, init_tracing_with_options,
};
pub use editor::{
    AbortHandle, BatchItem, BatchOperation, BatchOptions, BatchReport, EditError, Editor,
    SettingsChange, trim_silence_change,
};
pub use model::{BufferError, EditSettings, SampleBuffer, SettingsError};
pub use pipeline::{SilenceTrim, adjust_volume, apply_fade, detect_silence, normalize, trim};
pub use settings::{
    EditStateStore, JsonFileSettingsBackend, MemorySettingsBackend, SettingValue, SettingsBackend,
};
