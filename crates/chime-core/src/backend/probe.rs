//! Media probing with symphonia.
//!
//! Reads container headers only; nothing is decoded.

use std::fs::File;
use std::path::Path;

use serde::Serialize;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{BackendError, BackendResult};

/// Format of the default track of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Unknown for some containers until fully decoded.
    pub duration_ms: Option<u64>,
}

/// Probe `path` and describe its default track.
pub fn probe_media(path: &Path) -> BackendResult<MediaInfo> {
    let file = File::open(path).map_err(|source| BackendError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| BackendError::Decode(e.to_string()))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| BackendError::Decode("no default track".into()))?;
    let params = &track.codec_params;

    let sample_rate = params.sample_rate.unwrap_or(44100);
    let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);
    let duration_ms = params
        .n_frames
        .filter(|_| sample_rate > 0)
        .map(|frames| frames * 1000 / u64::from(sample_rate));

    Ok(MediaInfo {
        sample_rate,
        channels,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Minimal 16-bit PCM WAV of silence.
    fn wav_bytes(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
        let block_align = channels * 2;
        let data_len = frames * u32::from(block_align);
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(44 + data_len as usize, 0);
        out
    }

    #[test]
    fn probes_wav_header() {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(&wav_bytes(8000, 1, 8000)).unwrap();
        file.flush().unwrap();

        let info = probe_media(file.path()).unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.duration_ms, Some(1000));
    }

    #[test]
    fn missing_file_is_open_error() {
        let err = probe_media(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, BackendError::Open { .. }));
    }

    #[test]
    fn garbage_is_decode_error() {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(b"this is not audio at all").unwrap();
        file.flush().unwrap();

        let err = probe_media(file.path()).unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }
}
