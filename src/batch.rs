use crate::config::RenderConfig;
use crate::manifest::NarrationManifest;
use crate::pipeline::RenderPipeline;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BatchArgs {
    /// Glob matching narration manifests
    pub manifest_pattern: String,
    pub output_dir: PathBuf,
    pub config: RenderConfig,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub rendered: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub warnings: usize,
}

/// Render every manifest matching the pattern into `output_dir`.
///
/// A failing episode is logged and skipped; the batch itself only fails
/// when the pattern or output directory is unusable.
pub fn run_batch_rendering(args: BatchArgs) -> Result<BatchSummary> {
    tracing::info!("Starting batch rendering");
    tracing::info!("Manifest pattern: {}", args.manifest_pattern);
    tracing::info!("Output directory: {:?}", args.output_dir);

    args.config
        .validate()
        .context("Invalid render configuration")?;

    // Create output directory if it doesn't exist
    fs::create_dir_all(&args.output_dir).context("Failed to create output directory")?;

    let paths: Vec<PathBuf> = glob::glob(&args.manifest_pattern)
        .context("Failed to read glob pattern")?
        .filter_map(|entry| entry.ok())
        .collect();

    let mut summary = BatchSummary::default();

    if paths.is_empty() {
        tracing::warn!("No manifests found matching pattern: {}", args.manifest_pattern);
        return Ok(summary);
    }

    tracing::info!("Found {} manifests to render", paths.len());

    let pipeline = RenderPipeline::new(args.config);

    for path in paths {
        tracing::info!("Rendering manifest: {:?}", path);

        match render_manifest(&path, &args.output_dir, &pipeline) {
            Ok((output, warnings)) => {
                tracing::info!("Rendered {:?} -> {:?}", path, output);
                summary.warnings += warnings;
                summary.rendered.push(output);
            }
            Err(e) => {
                tracing::error!("Failed to render {:?}: {:#}", path, e);
                summary.failed.push((path, format!("{e:#}")));
            }
        }
    }

    pipeline.metrics_summary().log();
    tracing::info!(
        rendered = summary.rendered.len(),
        failed = summary.failed.len(),
        "Batch rendering complete"
    );
    Ok(summary)
}

fn render_manifest(
    manifest_path: &Path,
    output_dir: &Path,
    pipeline: &RenderPipeline,
) -> Result<(PathBuf, usize)> {
    let manifest = NarrationManifest::load(manifest_path).context("Failed to load manifest")?;

    let file_stem = manifest_path
        .file_stem()
        .ok_or_else(|| anyhow::anyhow!("Invalid filename: {:?} has no stem", manifest_path))?;

    // Ensure stem is not empty to prevent ".wav" overwrites
    if file_stem.is_empty() {
        anyhow::bail!("Invalid filename: {:?} has empty stem", manifest_path);
    }

    let output_path = output_dir.join(PathBuf::from(file_stem).with_extension("wav"));

    let (report, _) = pipeline
        .render_manifest(&manifest, &output_path)
        .context("Failed to render episode")?;

    for warning in &report.warnings {
        tracing::warn!("{:?}: {}", manifest_path, warning);
    }

    Ok((output_path, report.warnings.len()))
}
