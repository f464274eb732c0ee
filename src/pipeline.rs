//! Render orchestration: AssetLoader -> TimelineBuilder ->
//! DuckingEnvelopeGenerator -> Mixer -> Exporter.
//!
//! Each call is self-contained and synchronous. Nothing is shared between
//! renders except the metrics collector, so a failed render leaves no
//! state behind and a repeated render produces identical output.

use crate::analysis::{self, LevelStats};
use crate::assets::{AssetLoader, CacheStats};
use crate::audio::AudioBuffer;
use crate::config::RenderConfig;
use crate::envelope::DuckingEnvelopeGenerator;
use crate::error::{RenderError, RenderWarning, Result, TimelineError};
use crate::export::{ExportStats, Exporter};
use crate::manifest::NarrationManifest;
use crate::metrics::{MetricsSummary, RenderMetrics, Stage};
use crate::mixer::Mixer;
use crate::services::resampler;
use crate::timeline::{MixPlan, NarrationSegment, SectionMarker, TimelineBuilder};
use rayon::prelude::*;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, info_span};

/// How long each stage of a render took.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    pub decode: Duration,
    pub mix: Duration,
    pub encode: Duration,
}

/// Everything a caller needs to know about a finished render.
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub duration_secs: f64,
    pub clip_count: usize,
    /// Peak of the raw sum, before normalization
    pub peak_before: f32,
    /// Normalization gain applied by the mixer
    pub applied_gain: f32,
    /// Levels of the final buffer
    pub levels: LevelStats,
    pub warnings: Vec<RenderWarning>,
    pub timings: StageTimings,
    pub cache: CacheStats,
}

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub buffer: AudioBuffer,
    pub plan: MixPlan,
    pub report: RenderReport,
}

pub struct RenderPipeline {
    config: RenderConfig,
    metrics: Mutex<RenderMetrics>,
}

impl RenderPipeline {
    pub fn new(config: RenderConfig) -> Self {
        let metrics = RenderMetrics::new(&config.metrics);
        Self {
            config,
            metrics: Mutex::new(metrics),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render narration, placing a chime at every labelled section after
    /// the first.
    pub fn render(&self, narration: &[NarrationSegment]) -> Result<RenderOutput> {
        let loader = AssetLoader::new(self.config.audio);
        let result = self.run(&loader, narration, None, Duration::ZERO);
        self.record(&result, &loader);
        result
    }

    /// Render narration with explicit section markers.
    pub fn render_with_markers(
        &self,
        narration: &[NarrationSegment],
        markers: &[SectionMarker],
    ) -> Result<RenderOutput> {
        let loader = AssetLoader::new(self.config.audio);
        let result = self.run(&loader, narration, Some(markers), Duration::ZERO);
        self.record(&result, &loader);
        result
    }

    /// Render and write the deliverable to `output`.
    pub fn render_to_file(
        &self,
        narration: &[NarrationSegment],
        output: &Path,
    ) -> Result<(RenderReport, ExportStats)> {
        let rendered = self.render(narration)?;
        self.export(rendered, output)
    }

    /// Decode the manifest's narration and render it to `output`.
    ///
    /// Narration and music share one loader, so a file used as both is
    /// decoded once.
    pub fn render_manifest(
        &self,
        manifest: &NarrationManifest,
        output: &Path,
    ) -> Result<(RenderReport, ExportStats)> {
        let loader = AssetLoader::new(self.config.audio);

        let started = Instant::now();
        let result = self
            .config
            .validate()
            .map_err(RenderError::from)
            .and_then(|()| manifest.load_segments(&loader).map_err(RenderError::from))
            .and_then(|narration| self.run(&loader, &narration, None, started.elapsed()));
        self.record(&result, &loader);
        self.export(result?, output)
    }

    /// Current metrics across every render made through this pipeline.
    pub fn metrics_summary(&self) -> MetricsSummary {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }

    /// `markers: None` places a chime at every labelled segment after the
    /// first, measured on the conformed narration.
    fn run(
        &self,
        loader: &AssetLoader,
        narration: &[NarrationSegment],
        markers: Option<&[SectionMarker]>,
        narration_decode: Duration,
    ) -> Result<RenderOutput> {
        let span = info_span!("render", segments = narration.len());
        let _guard = span.enter();

        self.config.validate()?;
        if narration.is_empty() {
            return Err(TimelineError::EmptyTimeline.into());
        }

        let decode_started = Instant::now();
        let narration = self.conform_narration(narration)?;
        let derived;
        let markers = match markers {
            Some(markers) => markers,
            None => {
                derived = SectionMarker::from_segments(&narration);
                &derived
            }
        };
        let narration_secs: f64 = narration.iter().map(NarrationSegment::duration_secs).sum();
        let (assets, mut warnings) = loader.load_assets(&self.config, narration_secs)?;
        let decode = narration_decode + decode_started.elapsed();

        let mix_started = Instant::now();
        let (plan, timeline_warnings) =
            TimelineBuilder::new(&self.config).build(&narration, markers, &assets)?;
        warnings.extend(timeline_warnings);

        let envelopes = DuckingEnvelopeGenerator::new(self.config.ducking).generate(&plan)?;
        let mixed = Mixer::new(self.config.mixer).mix(&plan, &envelopes)?;
        let mix = mix_started.elapsed();

        let report = RenderReport {
            duration_secs: plan.duration_secs(),
            clip_count: plan.clips().len(),
            peak_before: mixed.peak_before,
            applied_gain: mixed.applied_gain,
            levels: analysis::analyze(&mixed.buffer),
            warnings,
            timings: StageTimings {
                decode,
                mix,
                encode: Duration::ZERO,
            },
            cache: loader.cache_stats(),
        };

        info!(
            duration_secs = report.duration_secs,
            clips = report.clip_count,
            warnings = report.warnings.len(),
            peak_dbfs = report.levels.peak_dbfs,
            "Render complete"
        );

        Ok(RenderOutput {
            buffer: mixed.buffer,
            plan,
            report,
        })
    }

    /// Bring caller-supplied narration to the render format.
    fn conform_narration(&self, narration: &[NarrationSegment]) -> Result<Vec<NarrationSegment>> {
        let format = self.config.audio;
        narration
            .par_iter()
            .map(|segment| -> Result<NarrationSegment> {
                let buffer = if segment.buffer.sample_rate() == format.sample_rate
                    && segment.buffer.channel_count() == format.channels
                {
                    Arc::clone(&segment.buffer)
                } else {
                    Arc::new(resampler::conform(
                        &segment.buffer,
                        format.sample_rate,
                        format.channels,
                    )?)
                };
                Ok(NarrationSegment {
                    buffer,
                    label: segment.label.clone(),
                })
            })
            .collect()
    }

    fn export(&self, rendered: RenderOutput, output: &Path) -> Result<(RenderReport, ExportStats)> {
        let exporter = Exporter::new(self.config.export, self.config.audio);

        let started = Instant::now();
        let stats = exporter.export_to_file(&rendered.buffer, output)?;
        let encode = started.elapsed();

        if self.config.metrics.enabled {
            self.metrics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record_stage(Stage::Encode, encode);
        }

        let mut report = rendered.report;
        report.timings.encode = encode;
        Ok((report, stats))
    }

    fn record(&self, result: &Result<RenderOutput>, loader: &AssetLoader) {
        if !self.config.metrics.enabled {
            return;
        }

        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        let cache = loader.cache_stats();
        metrics.record_cache(cache.hits, cache.misses);

        match result {
            Ok(output) => {
                metrics.record_stage(Stage::Decode, output.report.timings.decode);
                metrics.record_stage(Stage::Mix, output.report.timings.mix);
                metrics.record_render(true, output.report.warnings.len(), output.report.duration_secs);
            }
            Err(_) => metrics.record_render(false, 0, 0.0),
        }
    }
}
