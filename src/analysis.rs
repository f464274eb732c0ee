use crate::audio::AudioBuffer;
use crate::utils::gain_to_db;

/// Loudness summary of a buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelStats {
    /// Maximum absolute sample value
    pub peak: f32,
    /// Root mean square over all channels
    pub rms: f32,
    pub peak_dbfs: f32,
    pub rms_dbfs: f32,
}

/// Maximum absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, &s| peak.max(s.abs()))
}

/// Root mean square of a signal. Empty input is silent.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    // Accumulate in f64; episode-length sums lose precision in f32
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// RMS over consecutive windows of `window` samples.
///
/// A trailing partial window is included. Useful for checking that a bed
/// actually drops while narration plays.
pub fn windowed_rms(samples: &[f32], window: usize) -> Vec<f32> {
    if window == 0 {
        return Vec::new();
    }
    samples.chunks(window).map(rms).collect()
}

/// Peak and RMS levels over every channel of `buffer`.
pub fn analyze(buffer: &AudioBuffer) -> LevelStats {
    let peak = buffer.peak();

    let total = buffer.frames() * buffer.channel_count() as usize;
    let rms = if total == 0 {
        0.0
    } else {
        let sum: f64 = buffer
            .channels()
            .flat_map(|c| c.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum / total as f64).sqrt() as f32
    };

    LevelStats {
        peak,
        rms,
        peak_dbfs: gain_to_db(peak),
        rms_dbfs: gain_to_db(rms),
    }
}
