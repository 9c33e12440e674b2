use approx::assert_abs_diff_eq;
use clipsmith_core::{
    AbortHandle, AssetId, BackupManager, BatchOperation, BatchOptions, EditError, EditSettings,
    EditStateStore, Editor, MemoryAssetStore, SettingsChange, codec, fixtures,
};
use tempfile::{TempDir, tempdir};

fn editor_in(temp: &TempDir) -> Editor {
    Editor::new(
        BackupManager::new(temp.path().join("originals")),
        EditStateStore::in_memory(),
    )
}

fn seeded_store() -> (MemoryAssetStore, Vec<AssetId>) {
    let store = MemoryAssetStore::new();
    let ids = vec![
        AssetId::new("sfx/quiet.wav"),
        AssetId::new("sfx/tone.wav"),
        AssetId::new("music/stereo.wav"),
    ];
    store.insert(
        ids[0].clone(),
        fixtures::encoded(&fixtures::constant(8_000, 400, 0.25).expect("fixture")),
    );
    store.insert(
        ids[1].clone(),
        fixtures::encoded(&fixtures::sine_tone(8_000, 0.1, 250.0, 0.4).expect("fixture")),
    );
    store.insert(
        ids[2].clone(),
        fixtures::encoded(&fixtures::stereo_tone(8_000, 0.1, 250.0).expect("fixture")),
    );
    (store, ids)
}

fn peak_of(store: &MemoryAssetStore, id: &AssetId) -> f32 {
    let bytes = store.get(id).expect("asset should exist");
    codec::decode(&bytes).expect("asset should decode").0.peak()
}

#[test]
fn normalize_then_denormalize_round_trips_every_asset() {
    let temp = tempdir().expect("tempdir should be creatable");
    let editor = editor_in(&temp);
    let (store, ids) = seeded_store();
    let originals: Vec<Vec<u8>> = ids
        .iter()
        .map(|id| store.get(id).expect("seeded"))
        .collect();

    let report = editor.run_batch(
        &store,
        &ids,
        BatchOperation::Normalize,
        &BatchOptions::default(),
    );
    assert_eq!(report.succeeded(), 3);
    for id in &ids {
        assert_abs_diff_eq!(peak_of(&store, id), 1.0, epsilon = 1.0 / 32_767.0);
        assert!(editor.settings(id).expect("settings").normalize);
    }

    let report = editor.run_batch(
        &store,
        &ids,
        BatchOperation::Denormalize,
        &BatchOptions::default(),
    );
    assert_eq!(report.succeeded(), 3);
    for (id, original) in ids.iter().zip(&originals) {
        assert_eq!(store.get(id).as_ref(), Some(original));
    }
}

#[test]
fn volume_batch_keeps_other_settings() {
    let temp = tempdir().expect("tempdir should be creatable");
    let editor = editor_in(&temp);
    let (store, ids) = seeded_store();

    editor
        .apply_to_asset(
            &store,
            &ids[0],
            &EditSettings {
                trim_end: 0.5,
                ..EditSettings::default()
            },
        )
        .expect("edit should apply");

    let report = editor.run_batch(
        &store,
        &ids[..1],
        BatchOperation::SetVolume { volume: 2.0 },
        &BatchOptions::default(),
    );
    assert_eq!(report.succeeded(), 1);

    let settings = editor.settings(&ids[0]).expect("settings");
    assert_eq!(settings.trim_end, 0.5);
    assert_eq!(settings.volume, 2.0);
    let (buffer, _) = codec::decode(&store.get(&ids[0]).expect("asset")).expect("decode");
    assert_eq!(buffer.frame_count(), 200);
    assert_abs_diff_eq!(buffer.peak(), 0.5, epsilon = 2.0 / 32_767.0);
}

#[test]
fn trim_silence_finds_the_audible_region() {
    let temp = tempdir().expect("tempdir should be creatable");
    let editor = editor_in(&temp);
    let store = MemoryAssetStore::new();
    let id = AssetId::new("voice/padded.wav");
    store.insert(
        id.clone(),
        fixtures::encoded(&fixtures::padded_tone(8_000, 0.1, 0.2).expect("fixture")),
    );

    let report = editor.run_batch(
        &store,
        std::slice::from_ref(&id),
        BatchOperation::TrimSilence { threshold: 0.05 },
        &BatchOptions::default(),
    );
    let item = report.item(&id).expect("item should be reported");
    assert!(item.outcome.is_ok());
    assert!(item.warnings.is_empty());

    let settings = editor.settings(&id).expect("settings");
    assert_abs_diff_eq!(settings.trim_start, 0.25);
    assert_abs_diff_eq!(settings.trim_end, 0.75);
    let (buffer, _) = codec::decode(&store.get(&id).expect("asset")).expect("decode");
    assert_eq!(buffer.frame_count(), 1_600);
}

#[test]
fn silent_clip_is_left_untrimmed_with_a_warning() {
    let temp = tempdir().expect("tempdir should be creatable");
    let editor = editor_in(&temp);
    let store = MemoryAssetStore::new();
    let id = AssetId::new("silence.wav");
    store.insert(
        id.clone(),
        fixtures::encoded(&fixtures::constant(8_000, 800, 0.0).expect("fixture")),
    );

    let report = editor.run_batch(
        &store,
        std::slice::from_ref(&id),
        BatchOperation::TrimSilence { threshold: 0.05 },
        &BatchOptions::default(),
    );
    let item = report.item(&id).expect("item should be reported");
    assert!(item.outcome.is_ok());
    assert_eq!(item.warnings.len(), 1);

    let settings = editor.settings(&id).expect("settings");
    assert_eq!(settings.trim_start, 0.0);
    assert_eq!(settings.trim_end, 1.0);
}

#[test]
fn invalid_threshold_fails_each_item() {
    let temp = tempdir().expect("tempdir should be creatable");
    let editor = editor_in(&temp);
    let (store, ids) = seeded_store();

    let report = editor.run_batch(
        &store,
        &ids,
        BatchOperation::TrimSilence { threshold: 1.5 },
        &BatchOptions::default(),
    );
    assert_eq!(report.failed(), 3);
    assert!(
        report
            .items
            .iter()
            .all(|item| matches!(item.outcome, Err(EditError::InvalidSettings(_))))
    );
    assert!(ids.iter().all(|id| !editor.has_backup(id)));
}

#[test]
fn one_malformed_asset_does_not_stop_the_batch() {
    let temp = tempdir().expect("tempdir should be creatable");
    let editor = editor_in(&temp);
    let (store, mut ids) = seeded_store();
    let broken = AssetId::new("sfx/broken.wav");
    store.insert(broken.clone(), b"RIFF\0\0\0\0WAVE".to_vec());
    ids.insert(1, broken.clone());
    let missing = AssetId::new("sfx/missing.wav");
    ids.push(missing.clone());

    let report = editor.run_batch(
        &store,
        &ids,
        BatchOperation::SetVolume { volume: 0.5 },
        &BatchOptions::default(),
    );
    assert_eq!(report.items.len(), 5);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed(), 2);
    assert!(matches!(
        report.item(&broken).expect("reported").outcome,
        Err(EditError::MalformedContainer(_))
    ));
    assert!(matches!(
        report.item(&missing).expect("reported").outcome,
        Err(EditError::Storage(_))
    ));
    assert_eq!(
        store.get(&broken),
        Some(b"RIFF\0\0\0\0WAVE".to_vec())
    );
}

#[test]
fn aborted_batch_skips_remaining_items() {
    let temp = tempdir().expect("tempdir should be creatable");
    let editor = editor_in(&temp);
    let (store, ids) = seeded_store();
    let originals: Vec<Vec<u8>> = ids
        .iter()
        .map(|id| store.get(id).expect("seeded"))
        .collect();

    let abort = AbortHandle::new();
    abort.abort();
    let options = BatchOptions {
        parallel: false,
        abort,
    };
    let report = editor.run_batch(&store, &ids, BatchOperation::Normalize, &options);
    assert_eq!(report.skipped(), 3);
    assert!(
        report
            .items
            .iter()
            .all(|item| matches!(item.outcome, Err(EditError::Aborted(_))))
    );
    for (id, original) in ids.iter().zip(&originals) {
        assert_eq!(store.get(id).as_ref(), Some(original));
    }
}

#[test]
fn abort_raised_mid_batch_stops_later_items() {
    let temp = tempdir().expect("tempdir should be creatable");
    let editor = editor_in(&temp);
    let (store, ids) = seeded_store();
    let abort = AbortHandle::new();
    let options = BatchOptions {
        parallel: false,
        abort: abort.clone(),
    };

    let report = editor.batch_apply(&store, &ids, &options, |_, _, settings| {
        abort.abort();
        Ok(EditSettings {
            volume: 0.5,
            ..settings
        })
    });
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.skipped(), 2);
    assert!(report.items[0].outcome.is_ok());
}

#[test]
fn parallel_batch_matches_sequential() {
    let sequential_dir = tempdir().expect("tempdir should be creatable");
    let parallel_dir = tempdir().expect("tempdir should be creatable");
    let (sequential_store, ids) = seeded_store();
    let (parallel_store, _) = seeded_store();
    let operation = BatchOperation::SetVolume { volume: 1.75 };

    editor_in(&sequential_dir).run_batch(
        &sequential_store,
        &ids,
        operation,
        &BatchOptions::default(),
    );
    let report = editor_in(&parallel_dir).run_batch(
        &parallel_store,
        &ids,
        operation,
        &BatchOptions {
            parallel: true,
            ..BatchOptions::default()
        },
    );

    assert_eq!(report.succeeded(), ids.len());
    let reported: Vec<&AssetId> = report.items.iter().map(|item| &item.asset_id).collect();
    assert_eq!(reported, ids.iter().collect::<Vec<_>>());
    for id in &ids {
        assert_eq!(sequential_store.get(id), parallel_store.get(id));
    }
}

#[test]
fn custom_mutator_warnings_reach_the_report() {
    let temp = tempdir().expect("tempdir should be creatable");
    let editor = editor_in(&temp);
    let (store, ids) = seeded_store();

    let report = editor.batch_apply(&store, &ids, &BatchOptions::default(), |id, source, settings| {
        let mut change = SettingsChange::from(EditSettings {
            fade_out_seconds: 0.01,
            ..settings
        });
        if source.channels() > 1 {
            change.warnings.push(format!("{id} is not mono"));
        }
        Ok(change)
    });

    assert_eq!(report.succeeded(), 3);
    let warned: Vec<&AssetId> = report
        .items
        .iter()
        .filter(|item| !item.warnings.is_empty())
        .map(|item| &item.asset_id)
        .collect();
    assert_eq!(warned, vec![&ids[2]]);
}

#[test]
fn batch_reset_restores_edited_assets_and_skips_the_rest() {
    let temp = tempdir().expect("tempdir should be creatable");
    let editor = editor_in(&temp);
    let (store, ids) = seeded_store();
    let original = store.get(&ids[0]).expect("seeded");

    editor
        .apply_to_asset(
            &store,
            &ids[0],
            &EditSettings {
                volume: 0.1,
                ..EditSettings::default()
            },
        )
        .expect("edit should apply");

    let report = editor.run_batch(
        &store,
        &ids[..2],
        BatchOperation::Reset,
        &BatchOptions::default(),
    );
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.skipped(), 1);
    assert!(matches!(
        report.item(&ids[1]).expect("reported").outcome,
        Err(EditError::BackupUnavailable(_))
    ));
    assert_eq!(store.get(&ids[0]), Some(original));
    assert!(editor.settings(&ids[0]).expect("settings").is_default());
}
