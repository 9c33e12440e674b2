use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{curve::FadeCurve, time::frames_to_seconds};

pub const DEFAULT_VOLUME: f32 = 1.0;
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.05;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("channel count must be at least 1")]
    ZeroChannels,
    #[error("sample rate must be at least 1 Hz")]
    ZeroSampleRate,
    #[error("{len} samples do not divide into {channels} channels")]
    PartialFrame { len: usize, channels: u16 },
}

/// Interleaved float samples plus their format.
///
/// The length is always a whole number of frames; stages that keep the
/// length get mutable access through [`SampleBuffer::samples_mut`], stages
/// that change it build a new buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
}

impl SampleBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Result<Self, BufferError> {
        if channels == 0 {
            return Err(BufferError::ZeroChannels);
        }
        if sample_rate == 0 {
            return Err(BufferError::ZeroSampleRate);
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(BufferError::PartialFrame {
                len: samples.len(),
                channels,
            });
        }

        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    pub fn silent(sample_rate: u32, channels: u16, frames: usize) -> Result<Self, BufferError> {
        Self::new(
            sample_rate,
            channels,
            vec![0.0; frames.saturating_mul(usize::from(channels))],
        )
    }

    /// Same format as `self`, different frames. Callers slice on frame
    /// boundaries so the frame invariant carries over.
    pub(crate) fn with_samples(&self, samples: Vec<f32>) -> Self {
        debug_assert_eq!(samples.len() % usize::from(self.channels), 0);
        Self {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples,
        }
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        frames_to_seconds(self.frame_count(), self.sample_rate)
    }

    #[must_use]
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .copied()
            .map(f32::abs)
            .fold(0.0_f32, f32::max)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("trim bounds must lie in [0, 1] with start <= end (got {start}..{end})")]
    TrimBounds { start: f32, end: f32 },
    #[error("{field} must be a finite, non-negative number of seconds (got {value})")]
    FadeDuration { field: &'static str, value: f32 },
    #[error("volume must be finite and non-negative (got {0})")]
    Volume(f32),
    #[error("silence threshold must lie strictly between 0 and 1 (got {0})")]
    SilenceThreshold(f32),
}

/// Declarative description of every transform applied to one asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditSettings {
    pub trim_start: f32,
    pub trim_end: f32,
    pub fade_in_seconds: f32,
    pub fade_out_seconds: f32,
    pub fade_in_curve: FadeCurve,
    pub fade_out_curve: FadeCurve,
    pub volume: f32,
    pub normalize: bool,
}

impl Default for EditSettings {
    fn default() -> Self {
        Self {
            trim_start: 0.0,
            trim_end: 1.0,
            fade_in_seconds: 0.0,
            fade_out_seconds: 0.0,
            fade_in_curve: FadeCurve::linear(),
            fade_out_curve: FadeCurve::linear(),
            volume: DEFAULT_VOLUME,
            normalize: false,
        }
    }
}

impl EditSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let in_unit = |value: f32| (0.0..=1.0).contains(&value);
        if !in_unit(self.trim_start) || !in_unit(self.trim_end) || self.trim_start > self.trim_end
        {
            return Err(SettingsError::TrimBounds {
                start: self.trim_start,
                end: self.trim_end,
            });
        }

        for (field, value) in [
            ("fade_in_seconds", self.fade_in_seconds),
            ("fade_out_seconds", self.fade_out_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SettingsError::FadeDuration { field, value });
            }
        }

        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(SettingsError::Volume(self.volume));
        }

        Ok(())
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Longest fade that fits inside the trimmed region of a source clip.
    #[must_use]
    pub fn max_fade_seconds(&self, source_duration_seconds: f64) -> f64 {
        let span = f64::from((self.trim_end - self.trim_start).max(0.0));
        source_duration_seconds.max(0.0) * span
    }
}

pub fn validate_silence_threshold(threshold: f32) -> Result<(), SettingsError> {
    if threshold.is_finite() && threshold > 0.0 && threshold < 1.0 {
        Ok(())
    } else {
        Err(SettingsError::SilenceThreshold(threshold))
    }
}
