//! Summing placed clips into the episode buffer.
//!
//! The mixer is the only stage that touches samples in bulk. It refuses
//! plans with uncovered output regions, sums every clip at
//! `gain x envelope x fade`, then scales the result under the peak
//! ceiling. Channels are mixed in parallel; each channel's sum runs in
//! plan order, so output is bit-identical across runs.

use crate::audio::AudioBuffer;
use crate::config::MixerConfig;
use crate::envelope::Envelope;
use crate::error::MixError;
use crate::timeline::{MixPlan, PlacedClip};
use crate::utils::{frames_to_secs, gain_to_db, ms_to_frames};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Mixed episode plus the normalization applied to it.
#[derive(Debug, Clone)]
pub struct MixOutput {
    pub buffer: AudioBuffer,
    /// Peak of the raw sum, before normalization
    pub peak_before: f32,
    /// Gain applied by normalization (1.0 when untouched)
    pub applied_gain: f32,
}

#[derive(Debug, Clone)]
pub struct Mixer {
    config: MixerConfig,
}

impl Mixer {
    pub fn new(config: MixerConfig) -> Self {
        Self { config }
    }

    /// Mix `plan` using one envelope per clip.
    ///
    /// # Errors
    ///
    /// [`MixError::EnvelopeMismatch`] when `envelopes` is not aligned with
    /// the plan, [`MixError::ClipFormat`] when a clip does not match the
    /// plan's rate and channel count, [`MixError::Internal`] when some
    /// output region has no clip playing.
    pub fn mix(&self, plan: &MixPlan, envelopes: &[Envelope]) -> Result<MixOutput, MixError> {
        if envelopes.len() != plan.clips().len() {
            return Err(MixError::EnvelopeMismatch {
                clips: plan.clips().len(),
                envelopes: envelopes.len(),
            });
        }

        check_formats(plan)?;
        check_coverage(plan)?;

        let sample_rate = plan.sample_rate();
        let gains: Vec<Vec<f32>> = plan
            .clips()
            .par_iter()
            .zip(envelopes.par_iter())
            .map(|(clip, envelope)| clip_gains(clip, envelope, sample_rate))
            .collect();

        let total_frames = plan.duration_frames();
        let mut channels: Vec<Vec<f32>> = (0..plan.channels() as usize)
            .into_par_iter()
            .map(|channel| {
                let mut out = vec![0.0f32; total_frames];
                for (clip, clip_gains) in plan.clips().iter().zip(&gains) {
                    let source = clip.clip.buffer.channel(channel);
                    let target = &mut out[clip.start_frame..clip.end_frame()];
                    for ((sample, &value), &gain) in target.iter_mut().zip(source).zip(clip_gains) {
                        *sample += value * gain;
                    }
                }
                out
            })
            .collect();

        let peak_before = channels
            .par_iter()
            .map(|c| c.iter().fold(0.0f32, |peak, &s| peak.max(s.abs())))
            .reduce(|| 0.0, f32::max);

        let applied_gain = self.normalization_gain(peak_before);
        if applied_gain != 1.0 {
            channels.par_iter_mut().for_each(|c| {
                for sample in c.iter_mut() {
                    *sample *= applied_gain;
                }
            });
        }

        info!(
            clips = plan.clips().len(),
            duration_secs = plan.duration_secs(),
            peak_dbfs = gain_to_db(peak_before),
            applied_gain,
            "Mix complete"
        );

        let buffer = AudioBuffer::from_arcs(
            channels.into_iter().map(Arc::from).collect(),
            sample_rate,
        );

        Ok(MixOutput {
            buffer,
            peak_before,
            applied_gain,
        })
    }

    /// Scale factor bringing `peak` under the ceiling. Quiet mixes are
    /// only raised when `normalize_up` is set; silence is never scaled.
    fn normalization_gain(&self, peak: f32) -> f32 {
        let ceiling = self.config.peak_ceiling;
        if !(peak > ceiling || (self.config.normalize_up && peak > 0.0)) {
            return 1.0;
        }

        let mut gain = ceiling / peak;
        // The quotient can round up so that peak * gain lands one ulp over
        while gain > 0.0 && peak * gain > ceiling {
            gain = f32::from_bits(gain.to_bits() - 1);
        }
        gain
    }
}

fn check_formats(plan: &MixPlan) -> Result<(), MixError> {
    for (index, clip) in plan.clips().iter().enumerate() {
        let buffer = &clip.clip.buffer;
        if buffer.sample_rate() != plan.sample_rate() || buffer.channel_count() != plan.channels() {
            return Err(MixError::ClipFormat {
                index,
                kind: clip.kind(),
                sample_rate: buffer.sample_rate(),
                channels: buffer.channel_count(),
                expected_rate: plan.sample_rate(),
                expected_channels: plan.channels(),
            });
        }
    }
    Ok(())
}

/// Fail on the first stretch of output no clip covers.
///
/// Clips are ordered by start frame, so a single sweep tracking the
/// furthest end seen so far finds every gap.
fn check_coverage(plan: &MixPlan) -> Result<(), MixError> {
    let sample_rate = plan.sample_rate();
    let mut covered_to = 0usize;

    for clip in plan.clips().iter().filter(|c| c.frames() > 0) {
        if clip.start_frame > covered_to {
            return Err(MixError::Internal {
                start_secs: frames_to_secs(covered_to, sample_rate),
                end_secs: frames_to_secs(clip.start_frame, sample_rate),
            });
        }
        covered_to = covered_to.max(clip.end_frame());
    }

    if covered_to < plan.duration_frames() {
        return Err(MixError::Internal {
            start_secs: frames_to_secs(covered_to, sample_rate),
            end_secs: plan.duration_secs(),
        });
    }

    Ok(())
}

/// Per-frame multiplier for one clip: static gain, envelope, linear edge fades.
fn clip_gains(clip: &PlacedClip, envelope: &Envelope, sample_rate: u32) -> Vec<f32> {
    let frames = clip.frames();
    let mut gains = envelope.render(clip.start_frame, frames, sample_rate);
    for gain in gains.iter_mut() {
        *gain *= clip.gain;
    }

    let fade_in = ms_to_frames(clip.fade_in_ms, sample_rate).min(frames);
    for (i, gain) in gains.iter_mut().take(fade_in).enumerate() {
        *gain *= i as f32 / fade_in as f32;
    }

    let fade_out = ms_to_frames(clip.fade_out_ms, sample_rate).min(frames);
    if fade_out > 0 {
        let fade_start = frames - fade_out;
        for (i, gain) in gains.iter_mut().enumerate().skip(fade_start) {
            // Reaches exactly 0.0 on the last frame
            *gain *= (frames - 1 - i) as f32 / fade_out as f32;
        }
    }

    debug!(
        kind = %clip.kind(),
        frames,
        fade_in,
        fade_out,
        "Clip gains resolved"
    );
    gains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::envelope::Breakpoint;
    use crate::test_fixtures::{constant_buffer, constant_narration};
    use crate::timeline::{Clip, ClipKind, ResolvedAssets, TimelineBuilder};

    const RATE: u32 = 1000;

    fn placed(kind: ClipKind, value: f32, start: usize, frames: usize, gain: f32) -> PlacedClip {
        PlacedClip {
            clip: Clip {
                kind,
                buffer: Arc::new(constant_buffer(value, frames, 1, RATE)),
                label: None,
            },
            start_frame: start,
            gain,
            fade_in_ms: 0,
            fade_out_ms: 0,
        }
    }

    fn identity(plan: &MixPlan) -> Vec<Envelope> {
        vec![Envelope::identity(); plan.clips().len()]
    }

    #[test]
    fn test_narration_only_is_exact_concatenation() {
        let mut config = RenderConfig::default();
        config.audio.sample_rate = RATE;
        config.audio.channels = 1;
        let narration = vec![
            constant_narration(0.1, 1.0, 1, RATE, None),
            constant_narration(0.2, 0.5, 1, RATE, None),
            constant_narration(0.3, 0.25, 1, RATE, None),
        ];
        let (plan, _) = TimelineBuilder::new(&config)
            .build(&narration, &[], &ResolvedAssets::default())
            .unwrap();

        let output = Mixer::new(config.mixer).mix(&plan, &identity(&plan)).unwrap();

        let mut expected = vec![0.1f32; 1000];
        expected.extend(vec![0.2f32; 500]);
        expected.extend(vec![0.3f32; 250]);
        assert_eq!(output.buffer.channel(0), expected.as_slice());
        assert_eq!(output.applied_gain, 1.0);
    }

    #[test]
    fn test_overlapping_clips_sum() {
        let clips = vec![
            placed(ClipKind::Narration, 0.2, 0, 10, 1.0),
            placed(ClipKind::Intro, 0.4, 0, 10, 0.5),
        ];
        let plan = MixPlan::new(clips, RATE, 1);

        let output = Mixer::new(MixerConfig::default())
            .mix(&plan, &identity(&plan))
            .unwrap();
        for &sample in output.buffer.channel(0) {
            assert!((sample - 0.4).abs() < 1e-6);
        }
    }

    #[test]
    fn test_gap_is_internal_error() {
        let clips = vec![
            placed(ClipKind::Narration, 0.2, 0, 100, 1.0),
            placed(ClipKind::Narration, 0.2, 150, 100, 1.0),
        ];
        let plan = MixPlan::new(clips, RATE, 1);

        let result = Mixer::new(MixerConfig::default()).mix(&plan, &identity(&plan));
        match result {
            Err(MixError::Internal {
                start_secs,
                end_secs,
            }) => {
                assert!((start_secs - 0.1).abs() < 1e-9);
                assert!((end_secs - 0.15).abs() < 1e-9);
            }
            other => panic!("expected internal mix error, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_count_must_match() {
        let plan = MixPlan::new(vec![placed(ClipKind::Narration, 0.2, 0, 10, 1.0)], RATE, 1);
        let result = Mixer::new(MixerConfig::default()).mix(&plan, &[]);
        assert!(matches!(
            result,
            Err(MixError::EnvelopeMismatch {
                clips: 1,
                envelopes: 0
            })
        ));
    }

    #[test]
    fn test_peak_ceiling_scales_down() {
        let clips = vec![
            placed(ClipKind::Narration, 0.8, 0, 100, 1.0),
            placed(ClipKind::Intro, 0.8, 0, 100, 1.0),
        ];
        let plan = MixPlan::new(clips, RATE, 1);

        let output = Mixer::new(MixerConfig::default())
            .mix(&plan, &identity(&plan))
            .unwrap();

        assert!((output.peak_before - 1.6).abs() < 1e-6);
        assert!(output.buffer.peak() <= 0.98);
        assert!((output.buffer.peak() - 0.98).abs() < 1e-5);
    }

    #[test]
    fn test_normalized_peak_never_rounds_over_ceiling() {
        for step in 0..2000 {
            let level = 0.5 + step as f32 * 0.00073;
            let ceiling = 0.1 + (step % 90) as f32 * 0.01;
            let plan = MixPlan::new(vec![placed(ClipKind::Narration, level, 0, 8, 1.0)], RATE, 1);
            let config = MixerConfig {
                peak_ceiling: ceiling,
                normalize_up: true,
                ..MixerConfig::default()
            };

            let output = Mixer::new(config).mix(&plan, &identity(&plan)).unwrap();
            assert!(
                output.buffer.peak() <= ceiling,
                "level {level} ceiling {ceiling} peak {}",
                output.buffer.peak()
            );
        }
    }

    #[test]
    fn test_clip_format_mismatch_is_error() {
        let mono_intro = PlacedClip {
            clip: Clip {
                kind: ClipKind::Intro,
                buffer: Arc::new(constant_buffer(0.3, 100, 1, RATE)),
                label: None,
            },
            start_frame: 0,
            gain: 1.0,
            fade_in_ms: 0,
            fade_out_ms: 0,
        };
        let plan = MixPlan::new(vec![mono_intro], RATE, 2);

        let result = Mixer::new(MixerConfig::default()).mix(&plan, &identity(&plan));
        assert!(matches!(
            result,
            Err(MixError::ClipFormat {
                index: 0,
                channels: 1,
                expected_channels: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_quiet_mix_untouched_unless_normalize_up() {
        let plan = MixPlan::new(vec![placed(ClipKind::Narration, 0.25, 0, 100, 1.0)], RATE, 1);

        let output = Mixer::new(MixerConfig::default())
            .mix(&plan, &identity(&plan))
            .unwrap();
        assert_eq!(output.buffer.peak(), 0.25);

        let config = MixerConfig {
            normalize_up: true,
            ..MixerConfig::default()
        };
        let output = Mixer::new(config).mix(&plan, &identity(&plan)).unwrap();
        assert!(output.buffer.peak() <= 0.98);
        assert!((output.buffer.peak() - 0.98).abs() < 1e-6);
    }

    #[test]
    fn test_fades_are_linear() {
        let mut clip = placed(ClipKind::Outro, 1.0, 0, 1000, 0.5);
        clip.fade_in_ms = 100;
        clip.fade_out_ms = 200;
        let plan = MixPlan::new(vec![clip], RATE, 1);

        let output = Mixer::new(MixerConfig::default())
            .mix(&plan, &identity(&plan))
            .unwrap();
        let samples = output.buffer.channel(0);

        assert_eq!(samples[0], 0.0);
        assert!((samples[50] - 0.25).abs() < 1e-6);
        assert!((samples[100] - 0.5).abs() < 1e-6);
        assert!((samples[500] - 0.5).abs() < 1e-6);
        assert_eq!(samples[999], 0.0);
        assert!(samples[900] < 0.5 && samples[900] > 0.0);
    }

    #[test]
    fn test_envelope_applied_to_clip() {
        let clips = vec![
            placed(ClipKind::Narration, 0.0, 0, 100, 1.0),
            placed(ClipKind::Intro, 0.5, 0, 100, 1.0),
        ];
        let plan = MixPlan::new(clips, RATE, 1);
        let ducking = Envelope::new(vec![Breakpoint::new(0.0, 1.0), Breakpoint::new(0.05, 0.2)])
            .unwrap();
        let envelopes: Vec<Envelope> = plan
            .clips()
            .iter()
            .map(|c| {
                if c.kind() == ClipKind::Intro {
                    ducking.clone()
                } else {
                    Envelope::identity()
                }
            })
            .collect();

        let output = Mixer::new(MixerConfig::default())
            .mix(&plan, &envelopes)
            .unwrap();
        let samples = output.buffer.channel(0);
        assert!((samples[0] - 0.5).abs() < 1e-6);
        assert!((samples[80] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_stereo_mix_is_deterministic() {
        let stereo = |value: f32, start: usize| PlacedClip {
            clip: Clip {
                kind: ClipKind::Narration,
                buffer: Arc::new(constant_buffer(value, 500, 2, RATE)),
                label: None,
            },
            start_frame: start,
            gain: 1.0,
            fade_in_ms: 10,
            fade_out_ms: 10,
        };
        let plan = MixPlan::new(vec![stereo(0.3, 0), stereo(0.7, 250)], RATE, 2);
        let mixer = Mixer::new(MixerConfig::default());

        let first = mixer.mix(&plan, &identity(&plan)).unwrap();
        let second = mixer.mix(&plan, &identity(&plan)).unwrap();
        assert_eq!(first.buffer, second.buffer);
        assert_eq!(first.buffer.channel_count(), 2);
        assert_eq!(first.buffer.frames(), 750);
    }
}
