//! Synthetic audio test fixtures for development and testing
//!
//! Deterministic signals with known properties, so tests and benches can
//! exercise loading and mixing without committing binary audio files.

use crate::audio::AudioBuffer;
use crate::timeline::NarrationSegment;
use std::f32::consts::PI;

/// Generate a pure sine wave at the given frequency
///
/// # Example
/// ```
/// use episode_mixer::test_fixtures::generate_sine_wave;
/// // 1 second of A4 (440Hz) at half volume
/// let tone = generate_sine_wave(440.0, 1.0, 44100, 0.5);
/// assert_eq!(tone.len(), 44100);
/// ```
pub fn generate_sine_wave(
    frequency: f32,
    duration_secs: f32,
    sample_rate: u32,
    amplitude: f32,
) -> Vec<f32> {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

/// Generate pseudo-random white noise
///
/// Deterministic noise based on sample index for reproducible tests.
pub fn generate_white_noise(duration_secs: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let num_samples = (duration_secs * sample_rate as f32) as usize;
    (0..num_samples)
        .map(|i| {
            let mut hasher = DefaultHasher::new();
            i.hash(&mut hasher);
            let hash = hasher.finish();
            let normalized = ((hash % 2000) as f32 / 1000.0) - 1.0;
            amplitude * normalized
        })
        .collect()
}

/// A buffer holding the same value in every sample.
///
/// Constant signals make gain arithmetic in mixer tests exact.
pub fn constant_buffer(value: f32, frames: usize, channels: u16, sample_rate: u32) -> AudioBuffer {
    AudioBuffer::new(vec![vec![value; frames]; channels as usize], sample_rate)
        .expect("constant buffer parameters are valid")
}

/// Narration segment of `duration_secs` filled with a constant value.
pub fn constant_narration(
    value: f32,
    duration_secs: f64,
    channels: u16,
    sample_rate: u32,
    label: Option<&str>,
) -> NarrationSegment {
    let frames = (duration_secs * sample_rate as f64).round() as usize;
    let segment = NarrationSegment::new(constant_buffer(value, frames, channels, sample_rate));
    match label {
        Some(label) => segment.with_label(label),
        None => segment,
    }
}

/// Write samples to a temporary 16-bit PCM WAV file.
///
/// `samples` are interleaved when `channels > 1`. The file keeps a `.wav`
/// suffix so decoders can use the extension as a format hint.
pub fn create_test_wav_file(
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> tempfile::NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".wav")
        .tempfile()
        .expect("create temp file");

    write_wav(file.path(), samples, sample_rate, channels);
    file
}

/// Write samples to a 16-bit PCM WAV file at `path`.
pub fn write_wav(path: &std::path::Path, samples: &[f32], sample_rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).expect("create wav writer");
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}
