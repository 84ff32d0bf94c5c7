// The 18-byte bundle header and its binary codec

use thiserror::Error;

use crate::engine::error::EncodeError;
use crate::engine::params::EncodeParams;

/// ASCII tag opening every bundle file.
pub const SIGNATURE: &[u8; 7] = b"BND!VID";
/// Current container revision.
pub const FORMAT_VERSION: u8 = 1;
/// Encoded header length in bytes.
pub const HEADER_SIZE: usize = 18;

/// Fixed-size file header. All multi-byte fields are little-endian.
///
/// Layout: 7-byte signature, u8 version, u32 frame count, u16 audio chunk
/// size, u16 sample rate, u8 frame height, u8 frame width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleHeader {
    pub version: u8,
    pub frame_count: u32,
    pub audio_chunk_size: u16,
    pub sample_rate: u16,
    pub frame_height: u8,
    pub frame_width: u8,
}

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("file too short for a bundle header ({0} bytes, need {HEADER_SIZE})")]
    TooShort(usize),

    #[error("bad signature, not a bundle file")]
    BadSignature,
}

impl BundleHeader {
    /// Build a header from resolved parameters, rejecting any value that
    /// does not fit its field width. Nothing is ever truncated silently.
    pub fn from_params(params: &EncodeParams) -> Result<Self, EncodeError> {
        Ok(Self {
            version: FORMAT_VERSION,
            frame_count: field(params.frame_count, "frame count", u32::MAX as u64)? as u32,
            audio_chunk_size: field(params.audio_chunk_size, "audio chunk size", u16::MAX as u64)?
                as u16,
            sample_rate: field(params.sample_rate as u64, "sample rate", u16::MAX as u64)? as u16,
            frame_height: field(params.frame_height as u64, "frame height", u8::MAX as u64)? as u8,
            frame_width: field(params.frame_width as u64, "frame width", u8::MAX as u64)? as u8,
        })
    }

    /// Serialize to the 18-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..7].copy_from_slice(SIGNATURE);
        buf[7] = self.version;
        buf[8..12].copy_from_slice(&self.frame_count.to_le_bytes());
        buf[12..14].copy_from_slice(&self.audio_chunk_size.to_le_bytes());
        buf[14..16].copy_from_slice(&self.sample_rate.to_le_bytes());
        buf[16] = self.frame_height;
        buf[17] = self.frame_width;
        buf
    }

    /// Parse a header back from the start of a file.
    pub fn decode(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < HEADER_SIZE {
            return Err(HeaderError::TooShort(buf.len()));
        }
        if &buf[..7] != SIGNATURE {
            return Err(HeaderError::BadSignature);
        }
        Ok(Self {
            version: buf[7],
            frame_count: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            audio_chunk_size: u16::from_le_bytes([buf[12], buf[13]]),
            sample_rate: u16::from_le_bytes([buf[14], buf[15]]),
            frame_height: buf[16],
            frame_width: buf[17],
        })
    }

    /// Bytes in one packed frame at this geometry.
    pub fn frame_size(&self) -> u64 {
        self.frame_width as u64 * self.frame_height as u64 / 8
    }

    /// Total file size implied by the header fields.
    pub fn expected_file_size(&self) -> u64 {
        HEADER_SIZE as u64
            + self.frame_count as u64 * (self.frame_size() + self.audio_chunk_size as u64)
    }
}

fn field(value: u64, field: &'static str, limit: u64) -> Result<u64, EncodeError> {
    if value > limit {
        return Err(EncodeError::FormatLimit {
            field,
            value,
            limit,
        });
    }
    Ok(value)
}
