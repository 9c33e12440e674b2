use std::path::Path;

use clipsmith_core::{
    AssetId, EditSettings, Editor, EditorConfig, FsAssetStore, codec, scan_audio_assets,
};
use tempfile::tempdir;

fn write_test_wav(path: &Path, seconds: f32) {
    let sample_rate = 48_000_u32;
    let frame_count = (seconds * sample_rate as f32).round() as usize;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("test wav directory should be creatable");
    }
    let mut writer = hound::WavWriter::create(path, spec).expect("test wav should be creatable");
    for frame in 0..frame_count {
        let phase = frame as f32 / sample_rate as f32 * 220.0 * std::f32::consts::TAU;
        let sample = (phase.sin() * 0.5 * f32::from(i16::MAX)).round() as i16;
        writer
            .write_sample(sample)
            .expect("test wav sample write should succeed");
    }
    writer.finalize().expect("test wav finalize should succeed");
}

#[test]
fn scan_lists_wav_files_with_relative_ids() {
    let temp = tempdir().expect("tempdir should be creatable");
    write_test_wav(&temp.path().join("sfx/hit.wav"), 0.1);
    write_test_wav(&temp.path().join("music/Theme.WAV"), 0.2);
    std::fs::write(temp.path().join("notes.txt"), "not audio").expect("text should write");

    let entries = scan_audio_assets(temp.path(), None).expect("scan should succeed");
    let ids: Vec<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, vec!["music/Theme.WAV", "sfx/hit.wav"]);
    assert!(entries.iter().all(|entry| entry.size_bytes > 44));
}

#[test]
fn scan_skips_the_backup_directory() {
    let temp = tempdir().expect("tempdir should be creatable");
    let mut config = EditorConfig::default();
    config.storage.asset_root = temp.path().to_path_buf();
    write_test_wav(&temp.path().join("voice/line.wav"), 0.25);

    let editor = Editor::from_config(&config).expect("editor should open");
    let store = FsAssetStore::new(temp.path());
    let id = AssetId::new("voice/line.wav");
    editor
        .apply_to_asset(
            &store,
            &id,
            &EditSettings {
                trim_end: 0.5,
                ..EditSettings::default()
            },
        )
        .expect("edit should apply");
    assert!(editor.backups().backup_path(&id).is_file());

    let entries =
        scan_audio_assets(temp.path(), Some(editor.backup_dir())).expect("scan should succeed");
    let ids: Vec<&AssetId> = entries.iter().map(|entry| &entry.id).collect();
    assert_eq!(ids, vec![&id]);

    let edited = std::fs::read(temp.path().join("voice/line.wav")).expect("asset should read");
    let (buffer, format) = codec::decode(&edited).expect("edited asset should decode");
    assert_eq!(format.sample_rate, 48_000);
    assert_eq!(buffer.frame_count(), 6_000);
}

#[test]
fn scan_rejects_missing_root() {
    let temp = tempdir().expect("tempdir should be creatable");
    assert!(scan_audio_assets(&temp.path().join("absent"), None).is_err());
}

#[test]
fn fs_store_refuses_ids_outside_the_root() {
    let temp = tempdir().expect("tempdir should be creatable");
    let store = FsAssetStore::new(temp.path().join("assets"));
    assert!(store.path_of(&AssetId::new("../escape.wav")).is_err());
    assert!(store.path_of(&AssetId::new("/etc/passwd")).is_err());
    assert!(store.path_of(&AssetId::new("")).is_err());
    assert_eq!(
        store
            .path_of(&AssetId::new("sfx\\hit.wav"))
            .expect("nested id should resolve"),
        temp.path().join("assets").join("sfx/hit.wav")
    );
}
