use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use clipsmith_core::{
    AssetId, AssetStore, BatchOperation, BatchOptions, BatchReport, Editor, EditorConfig,
    FadeCurve, FsAssetStore, diagnostics::init_tracing_from_config, pipeline::waveform_peaks,
    scan_audio_assets,
};

#[derive(Debug, Parser)]
#[command(name = "clipsmith-cli")]
#[command(about = "Non-destructive trim, fade, normalize and volume edits for WAV assets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file; discovered from the environment or working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    asset_root: Option<PathBuf>,

    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Re-render an asset from its original. Unset flags keep the stored value.
    Apply {
        asset: String,

        #[arg(long)]
        trim_start: Option<f32>,

        #[arg(long)]
        trim_end: Option<f32>,

        #[arg(long)]
        fade_in: Option<f32>,

        #[arg(long)]
        fade_out: Option<f32>,

        #[arg(long, value_enum)]
        fade_in_curve: Option<CurveArg>,

        #[arg(long, value_enum)]
        fade_out_curve: Option<CurveArg>,

        #[arg(long)]
        volume: Option<f32>,

        #[arg(long)]
        normalize: Option<bool>,
    },
    /// Print the stored settings of an asset with a waveform summary as JSON.
    Show {
        asset: String,

        #[arg(long, default_value_t = 32)]
        peaks: usize,
    },
    /// Restore the original of an asset and forget its edits.
    Reset { asset: String },
    /// List WAV assets under the asset root.
    Scan,
    Batch {
        #[arg(value_enum)]
        operation: BatchArg,

        /// Assets to process; every scanned asset when omitted.
        assets: Vec<String>,

        #[arg(long)]
        volume: Option<f32>,

        #[arg(long)]
        threshold: Option<f32>,

        #[arg(long)]
        parallel: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CurveArg {
    Linear,
    EaseOut,
}

impl From<CurveArg> for FadeCurve {
    fn from(value: CurveArg) -> Self {
        match value {
            CurveArg::Linear => Self::linear(),
            CurveArg::EaseOut => Self::ease_out(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BatchArg {
    Normalize,
    Denormalize,
    Volume,
    TrimSilence,
    Reset,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EditorConfig::load_from(path)?,
        None => EditorConfig::load_or_default()?,
    };
    if let Some(asset_root) = cli.asset_root {
        config.storage.asset_root = asset_root;
    }
    if let Some(log_dir) = cli.log_dir {
        config.diagnostics.log_dir = log_dir;
    }
    let _telemetry = init_tracing_from_config(&config.diagnostics)?;

    let editor = Editor::from_config(&config)?;
    let store = FsAssetStore::new(&config.storage.asset_root);

    match cli.command {
        Commands::Apply {
            asset,
            trim_start,
            trim_end,
            fade_in,
            fade_out,
            fade_in_curve,
            fade_out_curve,
            volume,
            normalize,
        } => {
            let id = AssetId::new(asset);
            let mut settings = editor.open_settings(&id)?;
            if let Some(value) = trim_start {
                settings.trim_start = value;
            }
            if let Some(value) = trim_end {
                settings.trim_end = value;
            }
            if let Some(value) = fade_in {
                settings.fade_in_seconds = value;
            }
            if let Some(value) = fade_out {
                settings.fade_out_seconds = value;
            }
            if let Some(curve) = fade_in_curve {
                settings.fade_in_curve = curve.into();
            }
            if let Some(curve) = fade_out_curve {
                settings.fade_out_curve = curve.into();
            }
            if let Some(value) = volume {
                settings.volume = value;
            }
            if let Some(value) = normalize {
                settings.normalize = value;
            }

            let encoded = editor.apply_to_asset(&store, &id, &settings)?;
            tracing::info!(asset = %id, bytes = encoded.len(), "asset updated");
        }
        Commands::Show { asset, peaks } => {
            let id = AssetId::new(asset);
            let settings = editor.open_settings(&id)?;
            let current = store.read(&id)?;
            let source = editor.source_buffer(&id, &current)?;
            let edited = editor.preview(&id, &current, &settings)?;
            let bucket_frames = edited.frame_count().div_ceil(peaks.max(1)).max(1);

            let summary = serde_json::json!({
                "asset": id,
                "has_backup": editor.has_backup(&id),
                "source_seconds": source.duration_seconds(),
                "max_fade_seconds": settings.max_fade_seconds(source.duration_seconds()),
                "settings": settings,
                "peaks": waveform_peaks(&edited, bucket_frames),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Reset { asset } => {
            let id = AssetId::new(asset);
            match editor.reset_asset(&store, &id)? {
                Some(_) => tracing::info!(asset = %id, "asset restored"),
                None => tracing::warn!(asset = %id, "asset has no backup, nothing to reset"),
            }
        }
        Commands::Scan => {
            for entry in scan_audio_assets(store.root(), Some(editor.backup_dir()))? {
                println!("{}\t{}", entry.id, entry.size_bytes);
            }
        }
        Commands::Batch {
            operation,
            assets,
            volume,
            threshold,
            parallel,
        } => {
            let operation = match operation {
                BatchArg::Normalize => BatchOperation::Normalize,
                BatchArg::Denormalize => BatchOperation::Denormalize,
                BatchArg::Volume => BatchOperation::SetVolume {
                    volume: volume.context("--volume is required for the volume batch")?,
                },
                BatchArg::TrimSilence => BatchOperation::TrimSilence {
                    threshold: threshold.unwrap_or(config.editing.silence_threshold),
                },
                BatchArg::Reset => BatchOperation::Reset,
            };

            let ids: Vec<AssetId> = if assets.is_empty() {
                scan_audio_assets(store.root(), Some(editor.backup_dir()))?
                    .into_iter()
                    .map(|entry| entry.id)
                    .collect()
            } else {
                assets.into_iter().map(AssetId::new).collect()
            };

            let options = BatchOptions {
                parallel: parallel || config.editing.batch_parallel,
                ..BatchOptions::default()
            };
            let report = editor.run_batch(&store, &ids, operation, &options);
            print_report(&report);
            if report.failed() > 0 {
                anyhow::bail!("{} of {} assets failed", report.failed(), report.items.len());
            }
        }
    }

    Ok(())
}

fn print_report(report: &BatchReport) {
    for item in &report.items {
        match &item.outcome {
            Ok(_) => println!("ok\t{}", item.asset_id),
            Err(error) if error.is_noop() => println!("skipped\t{}\t{error}", item.asset_id),
            Err(error) => println!("failed\t{}\t{error}", item.asset_id),
        }
        for warning in &item.warnings {
            println!("warning\t{}\t{warning}", item.asset_id);
        }
    }
    println!(
        "{} succeeded, {} skipped, {} failed",
        report.succeeded(),
        report.skipped(),
        report.failed()
    );
}
