//! 16-bit PCM RIFF/WAVE container encode and decode.
//!
//! Layout (44-byte header, little-endian):
//! - `[0..4]`   `RIFF`
//! - `[4..8]`   total size: `36 + data_size`
//! - `[8..12]`  `WAVE`
//! - `[12..16]` `fmt `
//! - `[16..20]` fmt chunk size: 16
//! - `[20..22]` format code: 1 (linear PCM)
//! - `[22..24]` channel count
//! - `[24..28]` sample rate
//! - `[28..32]` byte rate: `sample_rate * channels * 2`
//! - `[32..34]` block align: `channels * 2`
//! - `[34..36]` bits per sample: 16
//! - `[36..40]` `data`
//! - `[40..44]` data size: `frames * channels * 2`
//! - `[44..]`   interleaved `i16` samples

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{BufferError, SampleBuffer};

pub const HEADER_LEN: usize = 44;
pub const RIFF_TAG: [u8; 4] = *b"RIFF";
pub const WAVE_TAG: [u8; 4] = *b"WAVE";
pub const FMT_TAG: [u8; 4] = *b"fmt ";
pub const DATA_TAG: [u8; 4] = *b"data";

const FMT_CHUNK_LEN: u32 = 16;
const PCM_FORMAT_CODE: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: usize = 2;
const QUANTIZE_SCALE: f32 = 32_767.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("container truncated: needed {needed} bytes, found {available}")]
    Truncated { needed: usize, available: usize },
    #[error("bad tag at offset {offset}: expected {expected:?}, found {found:?}")]
    BadTag {
        offset: usize,
        expected: String,
        found: String,
    },
    #[error("unsupported sample format: code {format_code}, {bits_per_sample} bits")]
    UnsupportedFormat {
        format_code: u16,
        bits_per_sample: u16,
    },
    #[error("invalid stream format: {0}")]
    InvalidFormat(#[from] BufferError),
    #[error("declared data size {declared} does not fit {available} remaining bytes as whole frames")]
    DataSizeMismatch { declared: u32, available: usize },
    #[error("buffer of {samples} samples is too large for a 32-bit container")]
    TooLarge { samples: usize },
    #[error("{channels} channels at {sample_rate} Hz overflow the block align or byte rate field")]
    HeaderOverflow { channels: u16, sample_rate: u32 },
}

/// Format fields read from a container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl ContainerFormat {
    /// `None` when the value does not fit the 16-bit header field.
    #[must_use]
    pub fn block_align(&self) -> Option<u16> {
        self.channels.checked_mul(self.bits_per_sample / 8)
    }

    /// `None` when the value does not fit the 32-bit header field.
    #[must_use]
    pub fn byte_rate(&self) -> Option<u32> {
        self.sample_rate
            .checked_mul(u32::from(self.block_align()?))
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        match self.block_align() {
            None | Some(0) => 0,
            Some(align) => self.data_size as usize / usize::from(align),
        }
    }

    fn overflow(&self) -> CodecError {
        CodecError::HeaderOverflow {
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }
}

#[must_use]
pub fn quantize(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * QUANTIZE_SCALE).round() as i16
}

#[must_use]
pub fn dequantize(value: i16) -> f32 {
    f32::from(value) / QUANTIZE_SCALE
}

/// Encodes a buffer as a 16-bit PCM container. Output is byte-for-byte
/// deterministic for a given buffer.
pub fn encode(buffer: &SampleBuffer) -> Result<Vec<u8>, CodecError> {
    let too_large = || CodecError::TooLarge {
        samples: buffer.len(),
    };
    let data_size = buffer
        .len()
        .checked_mul(BYTES_PER_SAMPLE)
        .and_then(|bytes| u32::try_from(bytes).ok())
        .ok_or_else(too_large)?;
    let riff_size = data_size.checked_add(36).ok_or_else(too_large)?;

    let format = ContainerFormat {
        sample_rate: buffer.sample_rate(),
        channels: buffer.channels(),
        bits_per_sample: BITS_PER_SAMPLE,
        data_size,
    };

    let block_align = format.block_align().ok_or_else(|| format.overflow())?;
    let byte_rate = format.byte_rate().ok_or_else(|| format.overflow())?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + data_size as usize);
    bytes.extend_from_slice(&RIFF_TAG);
    bytes.extend_from_slice(&riff_size.to_le_bytes());
    bytes.extend_from_slice(&WAVE_TAG);
    bytes.extend_from_slice(&FMT_TAG);
    bytes.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    bytes.extend_from_slice(&PCM_FORMAT_CODE.to_le_bytes());
    bytes.extend_from_slice(&format.channels.to_le_bytes());
    bytes.extend_from_slice(&format.sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&format.bits_per_sample.to_le_bytes());
    bytes.extend_from_slice(&DATA_TAG);
    bytes.extend_from_slice(&data_size.to_le_bytes());

    for sample in buffer.samples() {
        bytes.extend_from_slice(&quantize(*sample).to_le_bytes());
    }

    Ok(bytes)
}

/// Reads and validates the fixed header without touching sample data.
pub fn read_format(bytes: &[u8]) -> Result<ContainerFormat, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            needed: HEADER_LEN,
            available: bytes.len(),
        });
    }

    expect_tag(bytes, 0, RIFF_TAG)?;
    expect_tag(bytes, 8, WAVE_TAG)?;
    expect_tag(bytes, 12, FMT_TAG)?;
    expect_tag(bytes, 36, DATA_TAG)?;

    let format_code = read_u16(bytes, 20);
    let channels = read_u16(bytes, 22);
    let sample_rate = read_u32(bytes, 24);
    let bits_per_sample = read_u16(bytes, 34);
    let data_size = read_u32(bytes, 40);

    if format_code != PCM_FORMAT_CODE || bits_per_sample != BITS_PER_SAMPLE {
        return Err(CodecError::UnsupportedFormat {
            format_code,
            bits_per_sample,
        });
    }
    if channels == 0 {
        return Err(BufferError::ZeroChannels.into());
    }
    if sample_rate == 0 {
        return Err(BufferError::ZeroSampleRate.into());
    }

    let format = ContainerFormat {
        sample_rate,
        channels,
        bits_per_sample,
        data_size,
    };

    let available = bytes.len() - HEADER_LEN;
    let fits = data_size as usize <= available;
    let block_align = format.block_align().ok_or_else(|| format.overflow())?;
    let whole_frames = data_size as usize % usize::from(block_align) == 0;
    if !fits || !whole_frames {
        return Err(CodecError::DataSizeMismatch {
            declared: data_size,
            available,
        });
    }

    Ok(format)
}

/// Decodes a container into samples in `[-1, 1]` plus its header format.
/// Bytes after the declared data chunk are ignored.
pub fn decode(bytes: &[u8]) -> Result<(SampleBuffer, ContainerFormat), CodecError> {
    let format = read_format(bytes)?;
    let data = &bytes[HEADER_LEN..HEADER_LEN + format.data_size as usize];

    let samples = data
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| dequantize(i16::from_le_bytes([pair[0], pair[1]])))
        .collect();
    let buffer = SampleBuffer::new(format.sample_rate, format.channels, samples)?;
    Ok((buffer, format))
}

fn expect_tag(bytes: &[u8], offset: usize, expected: [u8; 4]) -> Result<(), CodecError> {
    let found = &bytes[offset..offset + 4];
    if found == expected {
        return Ok(());
    }

    Err(CodecError::BadTag {
        offset,
        expected: String::from_utf8_lossy(&expected).into_owned(),
        found: String::from_utf8_lossy(found).into_owned(),
    })
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
