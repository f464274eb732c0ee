//! Gain envelopes and ducking.
//!
//! An [`Envelope`] is an inspectable list of `(time, gain)` breakpoints on
//! the output timeline, linearly interpolated between points and held flat
//! before the first and after the last. [`DuckingEnvelopeGenerator`]
//! derives one envelope per placed clip from where narration sits.

use crate::config::DuckingConfig;
use crate::error::MixError;
use crate::timeline::{ClipKind, MixPlan, PlacedClip};
use crate::utils::frames_to_secs;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    /// Seconds on the output timeline
    pub time_secs: f64,
    /// Gain in `[0, 1]`
    pub gain: f32,
}

impl Breakpoint {
    pub fn new(time_secs: f64, gain: f32) -> Self {
        Self { time_secs, gain }
    }
}

/// Piecewise-linear gain curve with strictly increasing breakpoint times.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    points: Vec<Breakpoint>,
}

impl Envelope {
    /// Constant gain of 1.0.
    pub fn identity() -> Self {
        Self { points: Vec::new() }
    }

    /// # Errors
    ///
    /// [`MixError::InvalidEnvelope`] when times are not finite and strictly
    /// increasing, or a gain lies outside `[0, 1]`.
    pub fn new(points: Vec<Breakpoint>) -> Result<Self, MixError> {
        for (i, point) in points.iter().enumerate() {
            if !point.time_secs.is_finite() {
                return Err(MixError::InvalidEnvelope {
                    reason: format!("breakpoint {i} has non-finite time"),
                });
            }
            if !(0.0..=1.0).contains(&point.gain) {
                return Err(MixError::InvalidEnvelope {
                    reason: format!("breakpoint {i} gain {} outside 0.0-1.0", point.gain),
                });
            }
            if i > 0 && point.time_secs <= points[i - 1].time_secs {
                return Err(MixError::InvalidEnvelope {
                    reason: format!(
                        "breakpoint {i} at {}s does not follow {}s",
                        point.time_secs,
                        points[i - 1].time_secs
                    ),
                });
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Breakpoint] {
        &self.points
    }

    pub fn is_identity(&self) -> bool {
        self.points.iter().all(|p| p.gain == 1.0)
    }

    /// Gain at `time_secs`.
    pub fn gain_at(&self, time_secs: f64) -> f32 {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return 1.0,
        };
        if time_secs <= first.time_secs {
            return first.gain;
        }
        if time_secs >= last.time_secs {
            return last.gain;
        }

        // First point strictly after `time_secs`; never 0 or len here
        let next = self.points.partition_point(|p| p.time_secs <= time_secs);
        interpolate(&self.points[next - 1], &self.points[next], time_secs)
    }

    /// Per-frame gains for `frames` frames starting at `start_frame`.
    ///
    /// Walks the breakpoints once instead of searching for every frame.
    pub fn render(&self, start_frame: usize, frames: usize, sample_rate: u32) -> Vec<f32> {
        if self.points.is_empty() {
            return vec![1.0; frames];
        }

        let mut out = Vec::with_capacity(frames);
        let mut next = 0usize;
        for i in 0..frames {
            let t = frames_to_secs(start_frame + i, sample_rate);
            while next < self.points.len() && self.points[next].time_secs <= t {
                next += 1;
            }
            let gain = if next == 0 {
                self.points[0].gain
            } else if next == self.points.len() {
                self.points[next - 1].gain
            } else {
                interpolate(&self.points[next - 1], &self.points[next], t)
            };
            out.push(gain);
        }
        out
    }
}

fn interpolate(a: &Breakpoint, b: &Breakpoint, t: f64) -> f32 {
    let span = b.time_secs - a.time_secs;
    let frac = ((t - a.time_secs) / span) as f32;
    a.gain + (b.gain - a.gain) * frac
}

/// Derives per-clip ducking envelopes from narration placement.
///
/// Background clips (intro, outro) overlapping narration ramp down to
/// `ducked_level` over `attack_ms` when narration starts, hold through it,
/// and ramp back to 1.0 over `release_ms` after it ends. Narration gaps
/// shorter than `merge_gap_ms` do not release. Narration, chimes and
/// background clips that never overlap narration get the identity envelope.
#[derive(Debug, Clone)]
pub struct DuckingEnvelopeGenerator {
    config: DuckingConfig,
}

impl DuckingEnvelopeGenerator {
    pub fn new(config: DuckingConfig) -> Self {
        Self { config }
    }

    /// One envelope per clip, index-aligned with `plan.clips()`.
    pub fn generate(&self, plan: &MixPlan) -> Result<Vec<Envelope>, MixError> {
        if !self.config.enabled {
            return Ok(vec![Envelope::identity(); plan.clips().len()]);
        }

        let regions = self.ducked_regions(plan);
        let ducking = self.envelope_for_regions(&regions, plan.sample_rate())?;

        let envelopes = plan
            .clips()
            .iter()
            .map(|clip| {
                if clip.kind().is_background() && overlaps_any(clip, &regions) {
                    debug!(kind = %clip.kind(), points = ducking.points().len(), "Ducking clip");
                    ducking.clone()
                } else {
                    Envelope::identity()
                }
            })
            .collect();

        Ok(envelopes)
    }

    /// Narration spans in seconds, with gaps below the merge threshold closed.
    pub fn ducked_regions(&self, plan: &MixPlan) -> Vec<(f64, f64)> {
        let merge_gap = self.config.merge_gap_ms as f64 / 1000.0;
        let mut regions: Vec<(f64, f64)> = Vec::new();

        for clip in plan.clips_of(ClipKind::Narration) {
            if clip.frames() == 0 {
                continue;
            }
            let (start, end) = (clip.start_secs(), clip.end_secs());
            match regions.last_mut() {
                Some(last) if start - last.1 < merge_gap => last.1 = last.1.max(end),
                _ => regions.push((start, end)),
            }
        }

        regions
    }

    /// Attack/hold/release envelope over the given regions.
    ///
    /// Ramps shorter than one frame are stretched to one frame so the
    /// breakpoint times stay strictly increasing. An attack longer than its
    /// region is cut at the region end; a release still running when the
    /// next region starts is cut there.
    pub fn envelope_for_regions(
        &self,
        regions: &[(f64, f64)],
        sample_rate: u32,
    ) -> Result<Envelope, MixError> {
        let min_ramp = 1.0 / sample_rate as f64;
        let attack = (self.config.attack_ms as f64 / 1000.0).max(min_ramp);
        let release = (self.config.release_ms as f64 / 1000.0).max(min_ramp);
        let ducked = self.config.ducked_level;

        let mut points: Vec<Breakpoint> = Vec::new();

        for &(start, end) in regions {
            let start_gain = if points.is_empty() {
                1.0
            } else {
                let so_far = Envelope {
                    points: points.clone(),
                };
                let gain = so_far.gain_at(start);
                points.retain(|p| p.time_secs < start);
                gain
            };
            points.push(Breakpoint::new(start, start_gain));

            let attack_end = start + attack;
            if attack_end < end {
                points.push(Breakpoint::new(attack_end, ducked));
                points.push(Breakpoint::new(end, ducked));
            } else if end > start {
                let frac = ((end - start) / attack) as f32;
                points.push(Breakpoint::new(end, start_gain + (ducked - start_gain) * frac));
            }

            points.push(Breakpoint::new(end + release, 1.0));
        }

        Envelope::new(points)
    }
}

fn overlaps_any(clip: &PlacedClip, regions: &[(f64, f64)]) -> bool {
    let (start, end) = (clip.start_secs(), clip.end_secs());
    regions.iter().any(|&(rs, re)| start < re && end > rs)
}
