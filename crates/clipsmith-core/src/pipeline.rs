//! Sample transforms, run in the fixed order trim, fade, normalize, volume.
//!
//! Multi-channel buffers are processed per frame: trim bounds and fade
//! positions index frames, and a frame's multiplier applies to each of its
//! channels. For mono input a frame is a single sample.

use serde::{Deserialize, Serialize};
use tracing::{instrument, trace, warn};

use crate::{
    curve::FadeCurve,
    model::{EditSettings, SampleBuffer},
    time::{fraction_to_frame, frame_to_fraction, seconds_to_frames},
};

/// Trim bounds detected by [`detect_silence`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SilenceTrim {
    pub trim_start: f32,
    pub trim_end: f32,
    pub fully_silent: bool,
}

/// Returns frames `[floor(start * frames), floor(end * frames))` as a new
/// buffer. `end <= start` gives an empty buffer.
#[must_use]
pub fn trim(buffer: &SampleBuffer, start: f32, end: f32) -> SampleBuffer {
    let frames = buffer.frame_count();
    let start_frame = fraction_to_frame(start, frames);
    let end_frame = fraction_to_frame(end, frames);
    if end_frame <= start_frame {
        return buffer.with_samples(Vec::new());
    }

    let channels = usize::from(buffer.channels());
    let slice = &buffer.samples()[start_frame * channels..end_frame * channels];
    buffer.with_samples(slice.to_vec())
}

/// Scales the head and tail of `buffer` in place.
///
/// Head frame `i` is multiplied by `fade_in_curve(i / fade_in_frames)`, tail
/// frame `len - 1 - i` by `fade_out_curve(i / fade_out_frames)`. When the two
/// regions overlap both multipliers apply.
pub fn apply_fade(
    buffer: &mut SampleBuffer,
    fade_in_seconds: f32,
    fade_out_seconds: f32,
    fade_in_curve: &FadeCurve,
    fade_out_curve: &FadeCurve,
) {
    let sample_rate = buffer.sample_rate();
    let channels = usize::from(buffer.channels());
    let frames = buffer.frame_count();
    let fade_in_frames = seconds_to_frames(fade_in_seconds, sample_rate);
    let fade_out_frames = seconds_to_frames(fade_out_seconds, sample_rate);
    let samples = buffer.samples_mut();

    for index in 0..fade_in_frames.min(frames) {
        let gain = fade_in_curve.evaluate(index as f32 / fade_in_frames as f32);
        scale_frame(samples, channels, index, gain);
    }

    for index in 0..fade_out_frames.min(frames) {
        let gain = fade_out_curve.evaluate(index as f32 / fade_out_frames as f32);
        scale_frame(samples, channels, frames - 1 - index, gain);
    }
}

/// Scales the buffer in place so its peak magnitude is 1.0. All-zero input is
/// left untouched.
pub fn normalize(buffer: &mut SampleBuffer) {
    let peak = buffer.peak();
    if peak <= 0.0 {
        return;
    }

    let multiplier = 1.0 / peak;
    for sample in buffer.samples_mut() {
        *sample *= multiplier;
    }
}

/// Multiplies every sample by `volume` in place, then hard-clips to `[-1, 1]`.
pub fn adjust_volume(buffer: &mut SampleBuffer, volume: f32) {
    for sample in buffer.samples_mut() {
        *sample = (*sample * volume).clamp(-1.0, 1.0);
    }
}

/// Runs every stage against `source` and returns the edited buffer. The
/// source is never modified.
#[instrument(skip(source, settings), fields(frames = source.frame_count(), channels = source.channels()))]
#[must_use]
pub fn process(source: &SampleBuffer, settings: &EditSettings) -> SampleBuffer {
    let mut buffer = trim(source, settings.trim_start, settings.trim_end);
    apply_fade(
        &mut buffer,
        settings.fade_in_seconds,
        settings.fade_out_seconds,
        &settings.fade_in_curve,
        &settings.fade_out_curve,
    );
    if settings.normalize {
        normalize(&mut buffer);
    }
    adjust_volume(&mut buffer, settings.volume);

    trace!(output_frames = buffer.frame_count(), "pipeline complete");
    buffer
}

/// Finds the leading and trailing runs of frames whose every channel sits
/// below `threshold`. A clip that is silent throughout keeps full bounds.
#[must_use]
pub fn detect_silence(buffer: &SampleBuffer, threshold: f32) -> SilenceTrim {
    let channels = usize::from(buffer.channels());
    let frames = buffer.frame_count();
    let is_silent = |frame: usize| {
        buffer.samples()[frame * channels..(frame + 1) * channels]
            .iter()
            .all(|sample| sample.abs() < threshold)
    };

    let mut start = 0;
    while start < frames && is_silent(start) {
        start += 1;
    }

    let mut end = frames;
    while end > start && is_silent(end - 1) {
        end -= 1;
    }

    if end <= start {
        warn!(frames, threshold, "clip is silent throughout, keeping full bounds");
        return SilenceTrim {
            trim_start: 0.0,
            trim_end: 1.0,
            fully_silent: true,
        };
    }

    SilenceTrim {
        trim_start: frame_to_fraction(start, frames),
        trim_end: frame_to_fraction(end, frames),
        fully_silent: false,
    }
}

/// Peak magnitude of each run of `bucket_frames` frames, for waveform display.
#[must_use]
pub fn waveform_peaks(buffer: &SampleBuffer, bucket_frames: usize) -> Vec<f32> {
    let bucket_len = bucket_frames.max(1) * usize::from(buffer.channels());
    buffer
        .samples()
        .chunks(bucket_len)
        .map(|chunk| chunk.iter().copied().map(f32::abs).fold(0.0_f32, f32::max))
        .collect()
}

fn scale_frame(samples: &mut [f32], channels: usize, frame: usize, gain: f32) {
    for sample in &mut samples[frame * channels..(frame + 1) * channels] {
        *sample *= gain;
    }
}
