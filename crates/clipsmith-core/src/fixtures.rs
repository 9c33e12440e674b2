//! Deterministic signals for tests and the CLI demo.

use crate::{
    codec,
    model::{BufferError, SampleBuffer},
};

pub fn constant(sample_rate: u32, frames: usize, value: f32) -> Result<SampleBuffer, BufferError> {
    SampleBuffer::new(sample_rate, 1, vec![value; frames])
}

pub fn sine_tone(
    sample_rate: u32,
    seconds: f32,
    frequency: f32,
    amplitude: f32,
) -> Result<SampleBuffer, BufferError> {
    SampleBuffer::new(
        sample_rate,
        1,
        tone_samples(sample_rate, seconds, frequency, amplitude),
    )
}

/// Two channels carrying the same tone at different levels.
pub fn stereo_tone(
    sample_rate: u32,
    seconds: f32,
    frequency: f32,
) -> Result<SampleBuffer, BufferError> {
    let left = tone_samples(sample_rate, seconds, frequency, 0.6);
    let samples = left
        .iter()
        .flat_map(|sample| [*sample, *sample * 0.5])
        .collect();
    SampleBuffer::new(sample_rate, 2, samples)
}

/// A mono tone with `padding_seconds` of digital silence on both sides.
pub fn padded_tone(
    sample_rate: u32,
    padding_seconds: f32,
    tone_seconds: f32,
) -> Result<SampleBuffer, BufferError> {
    let padding = (padding_seconds.max(0.0) * sample_rate as f32).round() as usize;
    let mut samples = vec![0.0; padding];
    samples.extend(tone_samples(sample_rate, tone_seconds, 440.0, 0.8));
    samples.extend(std::iter::repeat_n(0.0, padding));
    SampleBuffer::new(sample_rate, 1, samples)
}

/// Encoded bytes of `buffer`, for seeding asset stores.
///
/// # Panics
/// When `buffer` is too large for a 32-bit container.
#[must_use]
pub fn encoded(buffer: &SampleBuffer) -> Vec<u8> {
    codec::encode(buffer).expect("fixture buffer should fit a container")
}

fn tone_samples(sample_rate: u32, seconds: f32, frequency: f32, amplitude: f32) -> Vec<f32> {
    let frames = (seconds.max(0.0) * sample_rate as f32).round() as usize;
    (0..frames)
        .map(|frame| {
            // Start at a peak so the first frame is never silent.
            let phase = frame as f32 / sample_rate as f32 * frequency * std::f32::consts::TAU;
            phase.cos() * amplitude
        })
        .collect()
}
