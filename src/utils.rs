//! Time, frame and gain helpers shared across the render stages

use crate::config::VolumeScale;

/// Attenuation at volume 0.0 when using [`VolumeScale::Decibel`].
pub const DECIBEL_VOLUME_RANGE: f32 = 20.0;

/// Format duration in seconds to MM:SS.SS format
pub fn format_duration(duration_secs: f32) -> String {
    let minutes = (duration_secs / 60.0) as u32;
    let seconds = duration_secs % 60.0;
    format!("{:02}:{:05.2}", minutes, seconds)
}

/// Convert seconds to a whole number of frames, rounding to nearest.
pub fn secs_to_frames(secs: f64, sample_rate: u32) -> usize {
    if secs <= 0.0 {
        return 0;
    }
    (secs * sample_rate as f64).round() as usize
}

pub fn ms_to_frames(ms: u32, sample_rate: u32) -> usize {
    secs_to_frames(ms as f64 / 1000.0, sample_rate)
}

pub fn frames_to_secs(frames: usize, sample_rate: u32) -> f64 {
    frames as f64 / sample_rate as f64
}

/// Map a configured volume in `[0, 1]` to a linear gain multiplier.
pub fn volume_to_gain(volume: f32, scale: VolumeScale) -> f32 {
    let volume = volume.clamp(0.0, 1.0);
    match scale {
        VolumeScale::Linear => volume,
        VolumeScale::Decibel => db_to_gain(-DECIBEL_VOLUME_RANGE * (1.0 - volume)),
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Convert a linear amplitude to dBFS. Silence maps to negative infinity.
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_zero() {
        let result = format_duration(0.0);
        assert_eq!(result, "00:00.00");
    }

    #[test]
    fn test_format_duration_minutes_and_seconds() {
        let result = format_duration(125.45);
        assert_eq!(result, "02:05.45");
    }

    #[test]
    fn test_format_duration_long() {
        let result = format_duration(3661.25); // 1 hour, 1 minute, 1.25 seconds
        assert_eq!(result, "61:01.25"); // Should show as 61 minutes
    }

    #[test]
    fn test_frame_conversions() {
        assert_eq!(secs_to_frames(1.5, 44_100), 66_150);
        assert_eq!(secs_to_frames(-3.0, 44_100), 0);
        assert_eq!(ms_to_frames(200, 48_000), 9_600);
        assert!((frames_to_secs(22_050, 44_100) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_linear_volume() {
        assert_eq!(volume_to_gain(0.6, VolumeScale::Linear), 0.6);
        assert_eq!(volume_to_gain(1.7, VolumeScale::Linear), 1.0);
    }

    #[test]
    fn test_decibel_volume() {
        assert!((volume_to_gain(1.0, VolumeScale::Decibel) - 1.0).abs() < 1e-6);
        // Half volume is 10 dB down
        let half = volume_to_gain(0.5, VolumeScale::Decibel);
        assert!((gain_to_db(half) + 10.0).abs() < 1e-3);
        assert!((volume_to_gain(0.0, VolumeScale::Decibel) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_gain_to_db_silence() {
        assert_eq!(gain_to_db(0.0), f32::NEG_INFINITY);
        assert!((gain_to_db(1.0)).abs() < 1e-6);
    }
}
