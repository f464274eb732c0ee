//! Timeline resolution.
//!
//! [`TimelineBuilder`] turns narration segments, section markers and the
//! loaded music assets into a [`MixPlan`]: every clip bound to a start
//! frame, a static gain and edge fades. All placement rules live here;
//! clips themselves are plain tagged data.
//!
//! Positions are sample frames at the plan's sample rate, so back-to-back
//! narration is exact and never drifts.

use crate::audio::AudioBuffer;
use crate::config::{ChimeConfig, IntroConfig, OutroConfig, RenderConfig, VolumeScale};
use crate::error::{RenderWarning, TimelineError};
use crate::utils::{frames_to_secs, secs_to_frames, volume_to_gain};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipKind {
    Narration,
    Intro,
    Outro,
    Chime,
}

impl ClipKind {
    /// Music beds that get ducked under narration.
    pub fn is_background(self) -> bool {
        matches!(self, ClipKind::Intro | ClipKind::Outro)
    }

    /// Tie-break for clips starting on the same frame.
    fn placement_rank(self) -> u8 {
        match self {
            ClipKind::Intro => 0,
            ClipKind::Narration => 1,
            ClipKind::Chime => 2,
            ClipKind::Outro => 3,
        }
    }
}

impl fmt::Display for ClipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClipKind::Narration => "narration",
            ClipKind::Intro => "intro",
            ClipKind::Outro => "outro",
            ClipKind::Chime => "chime",
        };
        f.write_str(name)
    }
}

/// Decoded audio tagged with its source kind.
#[derive(Debug, Clone)]
pub struct Clip {
    pub kind: ClipKind,
    pub buffer: Arc<AudioBuffer>,
    pub label: Option<String>,
}

/// A clip bound to a position and level in the output timeline.
#[derive(Debug, Clone)]
pub struct PlacedClip {
    pub clip: Clip,
    /// Offset into the output timeline, in frames
    pub start_frame: usize,
    /// Static gain multiplier
    pub gain: f32,
    pub fade_in_ms: u32,
    pub fade_out_ms: u32,
}

impl PlacedClip {
    fn new(kind: ClipKind, buffer: Arc<AudioBuffer>, start_frame: usize, gain: f32) -> Self {
        Self {
            clip: Clip {
                kind,
                buffer,
                label: None,
            },
            start_frame,
            gain,
            fade_in_ms: 0,
            fade_out_ms: 0,
        }
    }

    fn with_label(mut self, label: Option<String>) -> Self {
        self.clip.label = label;
        self
    }

    fn with_fades(mut self, fade_in_ms: u32, fade_out_ms: u32) -> Self {
        self.fade_in_ms = fade_in_ms;
        self.fade_out_ms = fade_out_ms;
        self
    }

    pub fn kind(&self) -> ClipKind {
        self.clip.kind
    }

    pub fn frames(&self) -> usize {
        self.clip.buffer.frames()
    }

    /// First frame after the clip (exclusive end).
    pub fn end_frame(&self) -> usize {
        self.start_frame + self.frames()
    }

    pub fn sample_rate(&self) -> u32 {
        self.clip.buffer.sample_rate()
    }

    pub fn start_secs(&self) -> f64 {
        frames_to_secs(self.start_frame, self.sample_rate())
    }

    pub fn end_secs(&self) -> f64 {
        frames_to_secs(self.end_frame(), self.sample_rate())
    }

    /// Whether the clip's active window contains `frame`.
    pub fn covers(&self, frame: usize) -> bool {
        frame >= self.start_frame && frame < self.end_frame()
    }
}

/// A pre-rendered narration segment supplied by the speech producer.
#[derive(Debug, Clone)]
pub struct NarrationSegment {
    pub buffer: Arc<AudioBuffer>,
    /// Section heading this segment opens, if any
    pub label: Option<String>,
}

impl NarrationSegment {
    pub fn new(buffer: AudioBuffer) -> Self {
        Self {
            buffer: Arc::new(buffer),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer.duration_secs()
    }
}

/// A content-section boundary inside the narration.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionMarker {
    /// Seconds from the start of the first narration clip
    pub offset_secs: f64,
    pub label: Option<String>,
}

impl SectionMarker {
    pub fn new(offset_secs: f64, label: Option<String>) -> Self {
        Self { offset_secs, label }
    }

    /// One marker at the start of every labelled segment except the first.
    ///
    /// The opening segment never gets a chime: the intro music already
    /// announces it.
    ///
    /// Offsets accumulate each segment's own duration, so segments need not
    /// share a sample rate.
    pub fn from_segments(segments: &[NarrationSegment]) -> Vec<Self> {
        let mut markers = Vec::new();
        let mut offset_secs = 0.0;

        for (index, segment) in segments.iter().enumerate() {
            if index > 0 {
                if let Some(label) = &segment.label {
                    markers.push(Self::new(offset_secs, Some(label.clone())));
                }
            }
            offset_secs += segment.duration_secs();
        }

        markers
    }
}

/// Fully resolved, ordered set of placed clips for one episode.
///
/// Built once per render by [`TimelineBuilder`] and never modified.
#[derive(Debug, Clone)]
pub struct MixPlan {
    clips: Vec<PlacedClip>,
    sample_rate: u32,
    channels: u16,
    duration_frames: usize,
}

impl MixPlan {
    /// Order clips by start frame (ties: intro, narration, chime, outro)
    /// and derive the duration as the latest clip end.
    pub fn new(mut clips: Vec<PlacedClip>, sample_rate: u32, channels: u16) -> Self {
        clips.sort_by_key(|c| (c.start_frame, c.kind().placement_rank()));
        let duration_frames = clips.iter().map(PlacedClip::end_frame).max().unwrap_or(0);

        Self {
            clips,
            sample_rate,
            channels,
            duration_frames,
        }
    }

    pub fn clips(&self) -> &[PlacedClip] {
        &self.clips
    }

    pub fn clips_of(&self, kind: ClipKind) -> impl Iterator<Item = &PlacedClip> {
        self.clips.iter().filter(move |c| c.kind() == kind)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn duration_frames(&self) -> usize {
        self.duration_frames
    }

    pub fn duration_secs(&self) -> f64 {
        frames_to_secs(self.duration_frames, self.sample_rate)
    }

    /// `[first narration start, last narration end)` in frames.
    pub fn narration_span(&self) -> Option<(usize, usize)> {
        let mut narration = self.clips_of(ClipKind::Narration);
        let first = narration.next()?;
        let end = narration.fold(first.end_frame(), |end, c| end.max(c.end_frame()));
        Some((first.start_frame, end))
    }
}

/// Decoded music assets available to the builder. `None` means the asset
/// is not configured or was dropped as optional.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAssets {
    pub intro: Option<Arc<AudioBuffer>>,
    pub outro: Option<Arc<AudioBuffer>>,
    pub chime: Option<Arc<AudioBuffer>>,
}

/// Resolves narration + configuration + assets into a [`MixPlan`].
#[derive(Debug, Clone)]
pub struct TimelineBuilder {
    sample_rate: u32,
    channels: u16,
    intro: IntroConfig,
    outro: OutroConfig,
    chime: ChimeConfig,
    volume_scale: VolumeScale,
}

impl TimelineBuilder {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels,
            intro: config.intro.clone(),
            outro: config.outro.clone(),
            chime: config.chime.clone(),
            volume_scale: config.mixer.volume_scale,
        }
    }

    /// Place every clip.
    ///
    /// 1. Narration back-to-back from the lead-in offset (or 0 without intro).
    /// 2. Intro at 0: solo for the lead-in, then under narration until the
    ///    narration ends (looped only when `loop_music` is set).
    /// 3. A chime at every marker inside the narration span.
    /// 4. Outro at the narration end with its fades.
    ///
    /// # Errors
    ///
    /// [`TimelineError::EmptyTimeline`] without narration,
    /// [`TimelineError::FormatMismatch`] when a buffer was not conformed to
    /// the configured format.
    pub fn build(
        &self,
        narration: &[NarrationSegment],
        markers: &[SectionMarker],
        assets: &ResolvedAssets,
    ) -> Result<(MixPlan, Vec<RenderWarning>), TimelineError> {
        if narration.is_empty() {
            return Err(TimelineError::EmptyTimeline);
        }

        for segment in narration {
            self.check_format(ClipKind::Narration, &segment.buffer)?;
        }
        for (kind, asset) in [
            (ClipKind::Intro, &assets.intro),
            (ClipKind::Outro, &assets.outro),
            (ClipKind::Chime, &assets.chime),
        ] {
            if let Some(buffer) = asset {
                self.check_format(kind, buffer)?;
            }
        }

        let mut warnings = Vec::new();
        let mut clips = Vec::with_capacity(narration.len() + markers.len() + 2);

        let lead_in = match &assets.intro {
            Some(intro) => self.resolve_lead_in(intro, &mut warnings),
            None => 0,
        };

        // Narration: contiguous, in input order
        let narration_start = lead_in;
        let mut cursor = narration_start;
        for segment in narration {
            clips.push(
                PlacedClip::new(ClipKind::Narration, Arc::clone(&segment.buffer), cursor, 1.0)
                    .with_label(segment.label.clone()),
            );
            cursor += segment.buffer.frames();
        }
        let narration_end = cursor;

        if let Some(intro) = &assets.intro {
            let target = if self.intro.underlay {
                narration_end
            } else {
                narration_start
            };
            let body = if self.intro.loop_music && intro.frames() < target {
                Arc::new(intro.looped_to(target))
            } else if intro.frames() > target {
                Arc::new(intro.truncated(target))
            } else {
                Arc::clone(intro)
            };

            if !body.is_empty() {
                debug!(frames = body.frames(), "Placing intro");
                clips.push(
                    PlacedClip::new(ClipKind::Intro, body, 0, self.gain(self.intro.volume))
                        .with_fades(0, self.intro.fade_out_ms),
                );
            }
        }

        if let Some(chime) = &assets.chime {
            for marker in markers {
                let at = narration_start + secs_to_frames(marker.offset_secs, self.sample_rate);
                if marker.offset_secs < 0.0 || at >= narration_end {
                    let warning = RenderWarning::MarkerOutOfRange {
                        offset_secs: marker.offset_secs,
                        label: marker.label.clone(),
                    };
                    warn!("{}", warning);
                    warnings.push(warning);
                    continue;
                }

                debug!(label = ?marker.label, frame = at, "Placing chime");
                clips.push(
                    PlacedClip::new(ClipKind::Chime, Arc::clone(chime), at, self.gain(self.chime.volume))
                        .with_label(marker.label.clone()),
                );
            }
        } else if !markers.is_empty() {
            debug!(markers = markers.len(), "No chime asset; section markers ignored");
        }

        if let Some(outro) = &assets.outro {
            let max_frames = secs_to_frames(self.outro.duration_secs, self.sample_rate);
            let body = if outro.frames() > max_frames {
                Arc::new(outro.truncated(max_frames))
            } else {
                Arc::clone(outro)
            };

            if self.outro.start_offset_secs < 0.0 {
                let narration_end_secs = frames_to_secs(narration_end, self.sample_rate);
                let warning = RenderWarning::OutroShifted {
                    requested_secs: narration_end_secs + self.outro.start_offset_secs,
                    narration_end_secs,
                };
                warn!("{}", warning);
                warnings.push(warning);
            }

            clips.push(
                PlacedClip::new(ClipKind::Outro, body, narration_end, self.gain(self.outro.volume))
                    .with_fades(self.outro.fade_in_ms, self.outro.fade_out_ms),
            );
        }

        let plan = MixPlan::new(clips, self.sample_rate, self.channels);
        debug!(
            clips = plan.clips().len(),
            duration_secs = plan.duration_secs(),
            "Timeline resolved"
        );

        Ok((plan, warnings))
    }

    fn resolve_lead_in(&self, intro: &AudioBuffer, warnings: &mut Vec<RenderWarning>) -> usize {
        let configured = secs_to_frames(self.intro.lead_in_secs, self.sample_rate);
        if intro.frames() >= configured {
            return configured;
        }

        // Solo lead-in must stay covered by the intro itself
        let warning = RenderWarning::LeadInShortened {
            configured_secs: self.intro.lead_in_secs,
            actual_secs: intro.duration_secs(),
        };
        warn!("{}", warning);
        warnings.push(warning);
        intro.frames()
    }

    fn gain(&self, volume: f32) -> f32 {
        volume_to_gain(volume, self.volume_scale)
    }

    fn check_format(&self, kind: ClipKind, buffer: &AudioBuffer) -> Result<(), TimelineError> {
        if buffer.sample_rate() != self.sample_rate || buffer.channel_count() != self.channels {
            return Err(TimelineError::FormatMismatch {
                kind,
                sample_rate: buffer.sample_rate(),
                channels: buffer.channel_count(),
                expected_rate: self.sample_rate,
                expected_channels: self.channels,
            });
        }
        Ok(())
    }
}
