//! Narration manifests.
//!
//! A manifest is a small TOML file listing the pre-rendered narration
//! files of one episode in play order:
//!
//! ```toml
//! title = "Weekly digest"
//!
//! [[segment]]
//! path = "narration/00-welcome.wav"
//!
//! [[segment]]
//! path = "narration/01-headlines.wav"
//! label = "Headlines"
//! ```
//!
//! Relative paths resolve against the manifest's own directory.

use crate::assets::AssetLoader;
use crate::error::{AssetError, ManifestError};
use crate::timeline::NarrationSegment;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(rename = "segment", default)]
    pub segments: Vec<SegmentEntry>,
}

impl NarrationManifest {
    /// Read a manifest and resolve its segment paths.
    ///
    /// # Errors
    ///
    /// [`ManifestError::NoSegments`] when the file lists nothing to play.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: Box::new(path.to_path_buf()),
            source,
        })?;

        let mut manifest: Self = toml::from_str(&contents).map_err(|source| ManifestError::Parse {
            path: Box::new(path.to_path_buf()),
            source,
        })?;

        if manifest.segments.is_empty() {
            return Err(ManifestError::NoSegments {
                path: Box::new(path.to_path_buf()),
            });
        }

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for segment in &mut manifest.segments {
            if segment.path.is_relative() {
                segment.path = base.join(&segment.path);
            }
        }

        Ok(manifest)
    }

    /// Decode every segment through `loader`, preserving manifest order.
    pub fn load_segments(&self, loader: &AssetLoader) -> Result<Vec<NarrationSegment>, AssetError> {
        let segments = self
            .segments
            .par_iter()
            .map(|entry| {
                loader.load(&entry.path).map(|buffer| NarrationSegment {
                    buffer,
                    label: entry.label.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            title = self.title.as_deref().unwrap_or("untitled"),
            segments = segments.len(),
            "Narration loaded"
        );
        Ok(segments)
    }
}
