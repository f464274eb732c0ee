// Library interface for the episode mixing engine

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod batch;
pub mod config;
pub mod envelope;
pub mod error;
pub mod export;
pub mod manifest;
pub mod metrics;
pub mod mixer;
pub mod pipeline;
pub mod presets;
pub mod services;
pub mod timeline;
pub mod utils;

// Test fixtures for synthetic audio generation
pub mod test_fixtures;

// Re-export commonly used types
pub use audio::AudioBuffer;
pub use config::RenderConfig;
pub use error::{RenderError, RenderWarning, Result};
pub use pipeline::{RenderOutput, RenderPipeline, RenderReport};
pub use timeline::{MixPlan, NarrationSegment, SectionMarker};
