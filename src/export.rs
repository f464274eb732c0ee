//! Encoding the finished mix as PCM WAV.

use crate::audio::AudioBuffer;
use crate::config::{AudioFormatConfig, ExportConfig};
use crate::error::ExportError;
use crate::services::resampler;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use tracing::info;

/// What was written by an export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportStats {
    pub frames: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Samples that hit full scale during quantization
    pub clipped_samples: usize,
}

#[derive(Debug, Clone)]
pub struct Exporter {
    bits_per_sample: u16,
    format: AudioFormatConfig,
}

impl Exporter {
    pub fn new(export: ExportConfig, format: AudioFormatConfig) -> Self {
        Self {
            bits_per_sample: export.bits_per_sample,
            format,
        }
    }

    /// Write `buffer` to `path`, creating parent directories as needed.
    pub fn export_to_file(&self, buffer: &AudioBuffer, path: &Path) -> Result<ExportStats, ExportError> {
        let io_error = |source| ExportError::Io {
            path: Box::new(path.to_path_buf()),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let file = File::create(path).map_err(io_error)?;

        let stats = self.export_to_writer(buffer, BufWriter::new(file))?;
        info!(
            path = %path.display(),
            frames = stats.frames,
            bits = stats.bits_per_sample,
            "Episode written"
        );
        Ok(stats)
    }

    /// Encode `buffer` into any seekable writer.
    ///
    /// The buffer is conformed to the configured format first, so callers
    /// may hand over audio at any rate or channel count.
    pub fn export_to_writer<W: Write + Seek>(
        &self,
        buffer: &AudioBuffer,
        writer: W,
    ) -> Result<ExportStats, ExportError> {
        let max = match self.bits_per_sample {
            16 => i16::MAX as f32,
            24 => 8_388_607.0,
            bits => return Err(ExportError::UnsupportedBitDepth { bits }),
        };

        let conformed;
        let buffer = if buffer.sample_rate() == self.format.sample_rate
            && buffer.channel_count() == self.format.channels
        {
            buffer
        } else {
            conformed = resampler::conform(buffer, self.format.sample_rate, self.format.channels)?;
            &conformed
        };

        let spec = hound::WavSpec {
            channels: self.format.channels,
            sample_rate: self.format.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };
        let encode = |source| ExportError::Encode { source };

        let mut wav = hound::WavWriter::new(writer, spec).map_err(encode)?;
        let mut clipped_samples = 0usize;
        for frame in 0..buffer.frames() {
            for channel in buffer.channels() {
                let sample = channel[frame];
                if sample.abs() >= 1.0 {
                    clipped_samples += 1;
                }
                let value = (sample.clamp(-1.0, 1.0) * max).round() as i32;
                wav.write_sample(value).map_err(encode)?;
            }
        }
        wav.finalize().map_err(encode)?;

        Ok(ExportStats {
            frames: buffer.frames(),
            sample_rate: self.format.sample_rate,
            channels: self.format.channels,
            bits_per_sample: self.bits_per_sample,
            clipped_samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::generate_sine_wave;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn format(sample_rate: u32, channels: u16) -> AudioFormatConfig {
        AudioFormatConfig {
            sample_rate,
            channels,
        }
    }

    #[test]
    fn test_export_16_bit_readback() {
        let tone = generate_sine_wave(440.0, 0.1, 8000, 0.5);
        let buffer = AudioBuffer::mono(tone.clone(), 8000).unwrap();
        let exporter = Exporter::new(ExportConfig { bits_per_sample: 16 }, format(8000, 1));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("episode.wav");
        let stats = exporter.export_to_file(&buffer, &path).unwrap();
        assert_eq!(stats.frames, 800);
        assert_eq!(stats.clipped_samples, 0);

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 800);
        for (written, original) in samples.iter().zip(&tone) {
            let back = *written as f32 / i16::MAX as f32;
            assert!((back - original).abs() < 1e-3);
        }
    }

    #[test]
    fn test_export_24_bit_stereo() {
        let buffer = AudioBuffer::new(vec![vec![0.5; 100], vec![-0.25; 100]], 44_100).unwrap();
        let exporter = Exporter::new(ExportConfig { bits_per_sample: 24 }, format(44_100, 2));

        let mut cursor = Cursor::new(Vec::new());
        exporter.export_to_writer(&buffer, &mut cursor).unwrap();

        cursor.set_position(0);
        let mut reader = hound::WavReader::new(cursor).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().bits_per_sample, 24);
        let samples: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples[0], (0.5f32 * 8_388_607.0).round() as i32);
        assert_eq!(samples[1], (-0.25f32 * 8_388_607.0).round() as i32);
    }

    #[test]
    fn test_export_is_deterministic() {
        let buffer = AudioBuffer::mono(generate_sine_wave(220.0, 0.05, 8000, 0.8), 8000).unwrap();
        let exporter = Exporter::new(ExportConfig::default(), format(8000, 1));

        let mut first = Cursor::new(Vec::new());
        let mut second = Cursor::new(Vec::new());
        exporter.export_to_writer(&buffer, &mut first).unwrap();
        exporter.export_to_writer(&buffer, &mut second).unwrap();
        assert_eq!(first.into_inner(), second.into_inner());
    }

    #[test]
    fn test_export_conforms_channels() {
        let buffer = AudioBuffer::mono(vec![0.1; 50], 8000).unwrap();
        let exporter = Exporter::new(ExportConfig::default(), format(8000, 2));

        let mut cursor = Cursor::new(Vec::new());
        let stats = exporter.export_to_writer(&buffer, &mut cursor).unwrap();
        assert_eq!(stats.channels, 2);
        assert_eq!(stats.frames, 50);
    }

    #[test]
    fn test_unsupported_bit_depth() {
        let buffer = AudioBuffer::mono(vec![0.0; 10], 8000).unwrap();
        let exporter = Exporter::new(ExportConfig { bits_per_sample: 8 }, format(8000, 1));
        let result = exporter.export_to_writer(&buffer, Cursor::new(Vec::new()));
        assert!(matches!(result, Err(ExportError::UnsupportedBitDepth { bits: 8 })));
    }

    #[test]
    fn test_full_scale_counted_as_clipped() {
        let buffer = AudioBuffer::mono(vec![1.0, 0.5, -1.2], 8000).unwrap();
        let exporter = Exporter::new(ExportConfig::default(), format(8000, 1));
        let stats = exporter
            .export_to_writer(&buffer, Cursor::new(Vec::new()))
            .unwrap();
        assert_eq!(stats.clipped_samples, 2);
    }
}
