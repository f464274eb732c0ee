//! Codec-facing helpers used by asset and narration loading, and export.

pub mod decoder;
pub mod resampler;
