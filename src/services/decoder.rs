//! Container/codec decoding using symphonia.
//!
//! Decodes WAV, MP3, FLAC, AAC/MP4 and Vorbis files to interleaved `f32`
//! PCM at the file's own rate and channel count. Conversion to the render
//! format happens afterwards in [`crate::services::resampler`].

use crate::audio::AudioBuffer;
use crate::error::AssetError;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Raw decoder output before conforming.
#[derive(Debug)]
pub struct DecodedAudio {
    /// Interleaved samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn into_buffer(self) -> Result<AudioBuffer, crate::error::AudioError> {
        AudioBuffer::from_interleaved(&self.samples, self.channels, self.sample_rate)
    }
}

fn decode_error(path: &Path, reason: impl std::fmt::Display) -> AssetError {
    AssetError::Decode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Decode an entire audio file.
///
/// # Errors
/// - [`AssetError::NotFound`] if the file does not exist
/// - [`AssetError::Unreadable`] for other open failures
/// - [`AssetError::Decode`] if the container or codec cannot be parsed, or
///   the file holds no audio frames
pub fn decode_file(path: &Path) -> Result<DecodedAudio, AssetError> {
    debug!("Decoding entire file: {}", path.display());

    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            AssetError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            AssetError::Unreadable {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(path, format!("unrecognized container: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error(path, "no audio track found"))?;
    let track_id = track.id;
    let declared_frames = track.codec_params.n_frames;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(path, format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    let mut format_info: Option<(u32, u16)> = None;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_error(path, format!("failed to read packet: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| decode_error(path, format!("corrupt packet at {}: {e}", packet.ts())))?;

        let spec = *decoded.spec();
        if format_info.is_none() {
            format_info = Some((spec.rate, spec.channels.count() as u16));
        }

        let needs_alloc = sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < decoded.capacity() * spec.channels.count());
        if needs_alloc {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let (sample_rate, channels) =
        format_info.ok_or_else(|| decode_error(path, "file contains no audio frames"))?;

    let decoded = DecodedAudio {
        samples,
        sample_rate,
        channels,
    };

    // A stream that ends early reads as a clean EOF; the header knows better
    if let Some(expected) = declared_frames {
        if (decoded.frames() as u64) < expected {
            warn!(
                path = %path.display(),
                decoded = decoded.frames(),
                expected,
                "Audio stream is truncated"
            );
            return Err(decode_error(
                path,
                format!("truncated: {} of {} frames", decoded.frames(), expected),
            ));
        }
    }

    debug!(
        path = %path.display(),
        sample_rate,
        channels,
        frames = decoded.frames(),
        "Decoded audio file"
    );

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{create_test_wav_file, generate_sine_wave};
    use std::io::Write;

    #[test]
    fn test_decode_wav() {
        let signal = generate_sine_wave(440.0, 0.25, 22_050, 0.5);
        let file = create_test_wav_file(&signal, 22_050, 1);

        let decoded = decode_file(file.path()).unwrap();

        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.frames(), signal.len());

        let peak = decoded.samples.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!((peak - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_decode_missing_file() {
        let result = decode_file(Path::new("/nonexistent/intro.wav"));
        assert!(matches!(result, Err(AssetError::NotFound { .. })));
    }

    #[test]
    fn test_decode_truncated_wav() {
        let signal = generate_sine_wave(440.0, 1.0, 8000, 0.5);
        let file = create_test_wav_file(&signal, 8000, 1);

        // Cut the data chunk in half; the header still claims every frame
        let len = std::fs::metadata(file.path()).unwrap().len();
        std::fs::OpenOptions::new()
            .write(true)
            .open(file.path())
            .unwrap()
            .set_len(len / 2)
            .unwrap();

        match decode_file(file.path()) {
            Err(AssetError::Decode { reason, .. }) => {
                assert!(!reason.is_empty());
            }
            other => panic!("expected Decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_garbage_file() {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(b"definitely not an mp3 stream, just text").unwrap();
        file.flush().unwrap();

        let result = decode_file(file.path());
        assert!(matches!(result, Err(AssetError::Decode { .. })));
    }
}
