/// The bundle writer: header first, then every packed frame interleaved
/// with its audio chunk.
///
/// The encoder only sees two `Read` streams; it neither knows nor cares
/// that they are ffmpeg stdout pipes. Ordering is fixed: for each frame
/// index the video bytes are read and written before the audio bytes, and
/// an index is never revisited. `encode` consumes the encoder, so a
/// finished run cannot be resumed or double-finished.
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use crate::engine::error::{EncodeError, StreamKind};
use crate::engine::header::BundleHeader;
use crate::engine::params::EncodeParams;

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeReport {
    pub frames_written: u64,
    pub bytes_written: u64,
    pub estimated_file_size: u64,
}

impl EncodeReport {
    /// False triggers the advisory size-mismatch warning; the file is
    /// kept either way.
    pub fn size_matches(&self) -> bool {
        self.bytes_written == self.estimated_file_size
    }
}

/// Create the destination file for exclusive sequential writing.
pub fn create_output(path: &Path) -> Result<File, EncodeError> {
    File::create(path).map_err(|source| EncodeError::OutputUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

pub struct BundleEncoder<W: Write> {
    out: W,
    frame_size: usize,
    audio_chunk_size: usize,
    frame_count: u64,
    estimated_file_size: u64,
    bytes_written: u64,
}

impl<W: Write> BundleEncoder<W> {
    pub fn new(out: W, params: &EncodeParams) -> Self {
        Self {
            out,
            frame_size: params.frame_size as usize,
            audio_chunk_size: params.audio_chunk_size as usize,
            frame_count: params.frame_count,
            estimated_file_size: params.estimated_file_size,
            bytes_written: 0,
        }
    }

    /// Write the whole container: header, then `frame_count` interleaved
    /// pairs. `progress` is called with each frame index as it lands. A
    /// short read leaves the partial file in place and reports which
    /// stream fell behind.
    pub fn encode<V, A, F>(
        mut self,
        header: BundleHeader,
        video: &mut V,
        audio: &mut A,
        mut progress: F,
    ) -> Result<EncodeReport, EncodeError>
    where
        V: Read,
        A: Read,
        F: FnMut(u64),
    {
        let header_bytes = header.encode();
        self.out.write_all(&header_bytes)?;
        self.bytes_written += header_bytes.len() as u64;

        let mut frame = vec![0u8; self.frame_size];
        let mut chunk = vec![0u8; self.audio_chunk_size];

        for index in 1..=self.frame_count {
            read_stream(video, &mut frame, StreamKind::Video, index)?;
            read_stream(audio, &mut chunk, StreamKind::Audio, index)?;

            // monow packs the leftmost pixel into the high bit; the
            // device renderer scans low bit first. Mirror every byte,
            // keeping byte order untouched.
            for byte in frame.iter_mut() {
                *byte = byte.reverse_bits();
            }

            self.out.write_all(&frame)?;
            self.out.write_all(&chunk)?;
            self.bytes_written += (self.frame_size + self.audio_chunk_size) as u64;
            progress(index);
        }

        self.out.flush()?;

        Ok(EncodeReport {
            frames_written: self.frame_count,
            bytes_written: self.bytes_written,
            estimated_file_size: self.estimated_file_size,
        })
    }
}

fn read_stream<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    stream: StreamKind,
    frame: u64,
) -> Result<(), EncodeError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Err(EncodeError::PipelineDesync { stream, frame })
        }
        Err(e) => Err(EncodeError::Io(e)),
    }
}
