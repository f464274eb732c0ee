//! Loading music and narration files into render-ready buffers.
//!
//! # Architecture Decision: per-render cache
//!
//! One [`AssetLoader`] lives for one render call. Decoded buffers are
//! cached by canonical path plus modification time, so a file edited
//! between renders is never served stale, and a chime placed many times
//! is decoded once. Decoding runs outside the lock; only the finished
//! buffer is inserted under the write lock.

use crate::audio::AudioBuffer;
use crate::config::{AudioFormatConfig, RenderConfig};
use crate::error::{AssetError, RenderWarning};
use crate::services::{decoder, resampler};
use crate::timeline::{ClipKind, ResolvedAssets};
use crate::utils::secs_to_frames;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AssetKey {
    path: PathBuf,
    modified: Option<SystemTime>,
}

/// Cache effectiveness for one loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Decodes audio files and conforms them to the render format.
#[derive(Debug)]
pub struct AssetLoader {
    format: AudioFormatConfig,
    cache: RwLock<HashMap<AssetKey, Arc<AudioBuffer>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AssetLoader {
    pub fn new(format: AudioFormatConfig) -> Self {
        Self {
            format,
            cache: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn format(&self) -> AudioFormatConfig {
        self.format
    }

    /// Decode `path`, resample and re-channel it to the render format.
    ///
    /// # Errors
    ///
    /// [`AssetError::NotFound`] when the file is absent,
    /// [`AssetError::Decode`] when it cannot be parsed or converted.
    pub fn load(&self, path: &Path) -> Result<Arc<AudioBuffer>, AssetError> {
        let key = asset_key(path)?;

        if let Some(buffer) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(path = %path.display(), "Asset cache hit");
            return Ok(Arc::clone(buffer));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let decoded = decoder::decode_file(&key.path)?;
        let (source_rate, source_channels) = (decoded.sample_rate, decoded.channels);
        let conversion_failed = |e: crate::error::AudioError| AssetError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let buffer = decoded.into_buffer().map_err(conversion_failed)?;
        let buffer = resampler::conform(&buffer, self.format.sample_rate, self.format.channels)
            .map_err(conversion_failed)?;

        info!(
            path = %path.display(),
            source_rate,
            source_channels,
            frames = buffer.frames(),
            "Asset loaded"
        );

        let buffer = Arc::new(buffer);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // A parallel load of the same file may have won the race
        let cached = cache.entry(key).or_insert(buffer);
        Ok(Arc::clone(cached))
    }

    /// [`load`](Self::load), then cut to at most `max_secs`.
    pub fn load_trimmed(&self, path: &Path, max_secs: f64) -> Result<Arc<AudioBuffer>, AssetError> {
        let buffer = self.load(path)?;
        let max_frames = secs_to_frames(max_secs, self.format.sample_rate);
        if buffer.frames() <= max_frames {
            return Ok(buffer);
        }
        debug!(path = %path.display(), max_secs, "Trimming asset");
        Ok(Arc::new(buffer.truncated(max_frames)))
    }

    /// Load the intro, outro and chime configured in `config`, in parallel.
    ///
    /// The intro is trimmed to the length it can play for given
    /// `narration_secs`; the outro to its configured duration. An asset
    /// marked optional that fails to load is left out with a
    /// [`RenderWarning::OptionalAssetDropped`]; any other failure aborts.
    pub fn load_assets(
        &self,
        config: &RenderConfig,
        narration_secs: f64,
    ) -> Result<(ResolvedAssets, Vec<RenderWarning>), AssetError> {
        let intro_secs = if config.intro.underlay {
            config.intro.lead_in_secs + narration_secs
        } else {
            config.intro.lead_in_secs
        };

        let jobs: Vec<(ClipKind, &Path, bool, Option<f64>)> = [
            (
                ClipKind::Intro,
                config.intro.path.as_deref(),
                config.intro.optional,
                Some(intro_secs),
            ),
            (
                ClipKind::Outro,
                config.outro.path.as_deref(),
                config.outro.optional,
                Some(config.outro.duration_secs),
            ),
            (
                ClipKind::Chime,
                config.chime.path.as_deref(),
                config.chime.optional,
                None,
            ),
        ]
        .into_iter()
        .filter_map(|(kind, path, optional, max)| path.map(|p| (kind, p, optional, max)))
        .collect();

        let results: Vec<_> = jobs
            .par_iter()
            .map(|&(kind, path, optional, max_secs)| {
                let loaded = match max_secs {
                    // Looping needs the whole body, never a trimmed copy
                    Some(secs) if !(kind == ClipKind::Intro && config.intro.loop_music) => {
                        self.load_trimmed(path, secs)
                    }
                    _ => self.load(path),
                };
                (kind, optional, loaded)
            })
            .collect();

        let mut assets = ResolvedAssets::default();
        let mut warnings = Vec::new();

        for (kind, optional, loaded) in results {
            let buffer = match loaded {
                Ok(buffer) => buffer,
                Err(e) if optional => {
                    let warning = RenderWarning::OptionalAssetDropped {
                        kind,
                        path: e.path().to_path_buf(),
                        reason: e.to_string(),
                    };
                    warn!("{}", warning);
                    warnings.push(warning);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match kind {
                ClipKind::Intro => assets.intro = Some(buffer),
                ClipKind::Outro => assets.outro = Some(buffer),
                ClipKind::Chime => assets.chime = Some(buffer),
                ClipKind::Narration => {}
            }
        }

        Ok((assets, warnings))
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self
                .cache
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

fn asset_key(path: &Path) -> Result<AssetKey, AssetError> {
    let canonical = path.canonicalize().map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => AssetError::NotFound {
            path: path.to_path_buf(),
        },
        _ => AssetError::Unreadable {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let modified = std::fs::metadata(&canonical)
        .and_then(|m| m.modified())
        .ok();

    Ok(AssetKey {
        path: canonical,
        modified,
    })
}
