//! Render metrics collection and reporting.
//!
//! Uses HDR histograms for accurate stage latency percentiles.

use crate::config::MetricsConfig;
use hdrhistogram::Histogram;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Pipeline stage timed by [`RenderMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Asset and narration decoding
    Decode,
    /// Timeline, envelopes and summing
    Mix,
    /// WAV encoding
    Encode,
}

/// Render-wide metrics
#[derive(Debug)]
pub struct RenderMetrics {
    /// Decode stage latency histogram (milliseconds)
    decode_ms: Histogram<u64>,

    /// Mix stage latency histogram (milliseconds)
    mix_ms: Histogram<u64>,

    /// Encode stage latency histogram (milliseconds)
    encode_ms: Histogram<u64>,

    /// Total renders started
    total_renders: AtomicU64,

    /// Total renders that failed
    total_failures: AtomicU64,

    /// Warnings surfaced across all renders
    total_warnings: AtomicU64,

    /// Asset cache hits
    cache_hits: AtomicU64,

    /// Asset cache misses
    cache_misses: AtomicU64,

    /// Milliseconds of audio produced
    rendered_audio_ms: AtomicU64,

    /// Last reset timestamp
    last_reset: Instant,
}

/// Summary of key metrics for display
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub decode_p50_ms: f64,
    pub decode_p99_ms: f64,
    pub mix_p50_ms: f64,
    pub mix_p99_ms: f64,
    pub encode_p50_ms: f64,
    pub encode_p99_ms: f64,

    /// Total renders started
    pub total_renders: u64,

    /// Success rate (0.0-1.0)
    pub success_rate: f64,

    pub total_warnings: u64,

    /// Cache hit rate (0.0-1.0)
    pub cache_hit_rate: f64,

    /// Total audio rendered, in seconds
    pub rendered_audio_secs: f64,

    pub uptime_secs: f64,
}

impl Default for RenderMetrics {
    fn default() -> Self {
        Self::new(&MetricsConfig::default())
    }
}

impl RenderMetrics {
    /// Create new metrics collector
    pub fn new(config: &MetricsConfig) -> Self {
        let precision = config.histogram_precision.min(5);
        let max_ms = config.histogram_max_ms.max(2);
        let histogram = || {
            Histogram::new_with_bounds(1, max_ms, precision)
                .expect("Histogram bounds are clamped to a valid range")
        };

        Self {
            decode_ms: histogram(),
            mix_ms: histogram(),
            encode_ms: histogram(),
            total_renders: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_warnings: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            rendered_audio_ms: AtomicU64::new(0),
            last_reset: Instant::now(),
        }
    }

    /// Record how long a stage took
    pub fn record_stage(&mut self, stage: Stage, duration: Duration) {
        let ms = duration.as_millis() as u64;
        let histogram = match stage {
            Stage::Decode => &mut self.decode_ms,
            Stage::Mix => &mut self.mix_ms,
            Stage::Encode => &mut self.encode_ms,
        };

        if let Err(e) = histogram.record(ms) {
            tracing::warn!("Failed to record {:?} latency: {}", stage, e);
        }
    }

    /// Record the outcome of one render
    pub fn record_render(&self, success: bool, warnings: usize, audio_secs: f64) {
        self.total_renders.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.total_warnings
            .fetch_add(warnings as u64, Ordering::Relaxed);
        self.rendered_audio_ms
            .fetch_add((audio_secs * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn record_cache(&self, hits: u64, misses: u64) {
        self.cache_hits.fetch_add(hits, Ordering::Relaxed);
        self.cache_misses.fetch_add(misses, Ordering::Relaxed);
    }

    /// Get current metrics summary
    pub fn summary(&self) -> MetricsSummary {
        let total_renders = self.total_renders.load(Ordering::Relaxed);
        let failures = self.total_failures.load(Ordering::Relaxed);
        let success_rate = if total_renders > 0 {
            (total_renders - failures) as f64 / total_renders as f64
        } else {
            0.0
        };

        let hits = self.cache_hits.load(Ordering::Relaxed);
        let lookups = hits + self.cache_misses.load(Ordering::Relaxed);
        let cache_hit_rate = if lookups > 0 {
            hits as f64 / lookups as f64
        } else {
            0.0
        };

        MetricsSummary {
            decode_p50_ms: self.decode_ms.value_at_quantile(0.5) as f64,
            decode_p99_ms: self.decode_ms.value_at_quantile(0.99) as f64,
            mix_p50_ms: self.mix_ms.value_at_quantile(0.5) as f64,
            mix_p99_ms: self.mix_ms.value_at_quantile(0.99) as f64,
            encode_p50_ms: self.encode_ms.value_at_quantile(0.5) as f64,
            encode_p99_ms: self.encode_ms.value_at_quantile(0.99) as f64,
            total_renders,
            success_rate,
            total_warnings: self.total_warnings.load(Ordering::Relaxed),
            cache_hit_rate,
            rendered_audio_secs: self.rendered_audio_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            uptime_secs: self.last_reset.elapsed().as_secs_f64(),
        }
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        self.decode_ms.clear();
        self.mix_ms.clear();
        self.encode_ms.clear();
        self.total_renders.store(0, Ordering::Relaxed);
        self.total_failures.store(0, Ordering::Relaxed);
        self.total_warnings.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.rendered_audio_ms.store(0, Ordering::Relaxed);
        self.last_reset = Instant::now();
    }
}

impl MetricsSummary {
    /// Emit the summary as one structured log event
    pub fn log(&self) {
        tracing::info!(
            renders = self.total_renders,
            success_rate = self.success_rate,
            warnings = self.total_warnings,
            audio_secs = self.rendered_audio_secs,
            decode_p50_ms = self.decode_p50_ms,
            mix_p50_ms = self.mix_p50_ms,
            encode_p50_ms = self.encode_p50_ms,
            cache_hit_rate = self.cache_hit_rate,
            "Render metrics"
        );
    }
}
