//! Sample-rate conversion using rubato, and conforming buffers to the
//! render format (rate + channel count).

use crate::audio::AudioBuffer;
use crate::error::AudioError;
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Resample planar channels from `input_rate` to `output_rate`.
///
/// The whole signal is processed as one chunk, then the resampler is
/// flushed so its output delay can be dropped from the front. Output length
/// is exactly `round(frames * output_rate / input_rate)`.
pub fn resample_planar(
    planar: &[&[f32]],
    input_rate: u32,
    output_rate: u32,
) -> Result<Vec<Vec<f32>>, AudioError> {
    if input_rate == output_rate {
        debug!("Sample rate already at {}Hz, skipping resample", output_rate);
        return Ok(planar.iter().map(|c| c.to_vec()).collect());
    }

    let input_frames = planar.first().map_or(0, |c| c.len());
    let ratio = output_rate as f64 / input_rate as f64;
    let expected_frames = (input_frames as f64 * ratio).round() as usize;

    if input_frames == 0 {
        return Ok(vec![Vec::new(); planar.len()]);
    }

    debug!(
        "Resampling from {}Hz to {}Hz ({} channels, {} frames)",
        input_rate,
        output_rate,
        planar.len(),
        input_frames
    );

    let failed = |reason: String| AudioError::ResampleFailed {
        from: input_rate,
        to: output_rate,
        reason,
    };

    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        planar.len(),
    )
    .map_err(|e| failed(e.to_string()))?;

    let delay = resampler.output_delay();
    let mut output = resampler
        .process(planar, None)
        .map_err(|e| failed(e.to_string()))?;

    if delay > 0 {
        let tail = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| failed(e.to_string()))?;
        for (channel, rest) in output.iter_mut().zip(tail) {
            channel.extend(rest);
            channel.drain(..delay.min(channel.len()));
        }
        debug!(delay, "Compensated resampler output delay");
    }

    for channel in &mut output {
        channel.resize(expected_frames, 0.0);
    }

    Ok(output)
}

/// Convert a buffer to the given sample rate and channel count.
pub fn conform(
    buffer: &AudioBuffer,
    sample_rate: u32,
    channels: u16,
) -> Result<AudioBuffer, AudioError> {
    let rated = if buffer.sample_rate() == sample_rate {
        buffer.clone()
    } else {
        let planar: Vec<&[f32]> = buffer.channels().collect();
        let resampled = resample_planar(&planar, buffer.sample_rate(), sample_rate)?;
        AudioBuffer::new(resampled, sample_rate)?
    };

    rated.with_channel_count(channels)
}
