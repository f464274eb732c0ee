use crate::error::AudioError;
use std::sync::Arc;

/// Immutable planar audio with `f32` samples in `[-1.0, 1.0]`.
///
/// # Architecture Decision: Arc&lt;[f32]&gt; per channel
///
/// Channels are stored as `Arc<[f32]>` so that clips placed several times
/// in a timeline (chimes, looped intro bodies trimmed from a cached decode)
/// share their sample data. Cloning a buffer only bumps reference counts.
///
/// A buffer never changes after construction; every transformation
/// (`truncated`, `looped_to`, `with_channel_count`) returns a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Arc<[f32]>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build a buffer from planar channel data.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::UnsupportedChannels`] for zero channels,
    /// [`AudioError::InvalidSampleRate`] for a zero sample rate and
    /// [`AudioError::RaggedChannels`] when channel lengths differ.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, AudioError> {
        if channels.is_empty() {
            return Err(AudioError::UnsupportedChannels { channels: 0 });
        }
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate { rate: sample_rate });
        }

        let expected = channels[0].len();
        if let Some((channel, samples)) = channels
            .iter()
            .enumerate()
            .find(|(_, samples)| samples.len() != expected)
        {
            return Err(AudioError::RaggedChannels {
                channel,
                expected,
                actual: samples.len(),
            });
        }

        Ok(Self {
            channels: channels.into_iter().map(Arc::from).collect(),
            sample_rate,
        })
    }

    /// Split interleaved samples (`[L, R, L, R, ...]`) into channels.
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(
        samples: &[f32],
        channels: u16,
        sample_rate: u32,
    ) -> Result<Self, AudioError> {
        if channels == 0 {
            return Err(AudioError::UnsupportedChannels { channels });
        }
        let count = channels as usize;
        let frames = samples.len() / count;

        let mut planar = vec![Vec::with_capacity(frames); count];
        for frame in samples.chunks_exact(count) {
            for (channel, &sample) in planar.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Self::new(planar, sample_rate)
    }

    /// Mono buffer from a single sample vector.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        Self::new(vec![samples], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Samples for one channel. Panics if `index` is out of range.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(|c| c.as_ref())
    }

    /// Maximum absolute sample value over all channels.
    pub fn peak(&self) -> f32 {
        self.channels()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |peak, &s| peak.max(s.abs()))
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        let count = self.channels.len();
        let mut out = Vec::with_capacity(self.frames() * count);
        for frame in 0..self.frames() {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }

    /// First `max_frames` frames. Returns a cheap clone when already short enough.
    pub fn truncated(&self, max_frames: usize) -> Self {
        if self.frames() <= max_frames {
            return self.clone();
        }
        Self {
            channels: self
                .channels
                .iter()
                .map(|c| Arc::from(&c[..max_frames]))
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Repeat the buffer until it is exactly `frames` long.
    ///
    /// Longer buffers are truncated; an empty buffer stays empty.
    pub fn looped_to(&self, frames: usize) -> Self {
        let source_frames = self.frames();
        if source_frames == 0 || source_frames == frames {
            return self.truncated(frames);
        }
        Self {
            channels: self
                .channels
                .iter()
                .map(|c| c.iter().copied().cycle().take(frames).collect())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Up-mix or down-mix to `target` channels.
    ///
    /// Mono is duplicated to every output channel; going to mono averages
    /// all channels; stereo from more channels keeps the first two.
    pub fn with_channel_count(&self, target: u16) -> Result<Self, AudioError> {
        let current = self.channel_count();
        if current == target {
            return Ok(self.clone());
        }

        let channels: Vec<Arc<[f32]>> = match (current, target) {
            (_, 0) => return Err(AudioError::UnsupportedChannels { channels: target }),
            (1, _) => (0..target).map(|_| Arc::clone(&self.channels[0])).collect(),
            (_, 1) => {
                let scale = 1.0 / current as f32;
                let mixed: Vec<f32> = (0..self.frames())
                    .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() * scale)
                    .collect();
                vec![mixed.into()]
            }
            (_, _) if current > target => self.channels[..target as usize].to_vec(),
            _ => return Err(AudioError::UnsupportedChannels { channels: target }),
        };

        Ok(Self {
            channels,
            sample_rate: self.sample_rate,
        })
    }

    pub(crate) fn from_arcs(channels: Vec<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }
}
