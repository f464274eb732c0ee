use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use episode_mixer::batch::{run_batch_rendering, BatchArgs};
use episode_mixer::manifest::NarrationManifest;
use episode_mixer::presets::{find_preset, matches_preset, PRESETS};
use episode_mixer::utils::format_duration;
use episode_mixer::{RenderConfig, RenderError, RenderPipeline};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "episode-mixer",
    about = "Assemble narration, music beds and chimes into a finished episode"
)]
struct Cli {
    /// Render configuration (defaults to the user config file if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one episode from a narration manifest
    Render {
        /// Narration manifest (TOML)
        #[arg(short, long)]
        manifest: PathBuf,
        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,
        /// Named ducking preset overriding the config
        #[arg(long)]
        ducking_preset: Option<String>,
    },
    /// Render every manifest matching a glob pattern
    Batch {
        /// Glob pattern, e.g. "episodes/*.toml"
        #[arg(short, long)]
        pattern: String,
        /// Directory receiving one WAV per manifest
        #[arg(short, long)]
        output_dir: PathBuf,
        #[arg(long)]
        ducking_preset: Option<String>,
    },
    /// Validate the configuration and print the effective values
    CheckConfig,
    /// List the available ducking presets
    Presets,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let render = e.downcast_ref::<RenderError>();
            match render {
                Some(render) => eprintln!("Error: {}", render.user_message()),
                None => eprintln!("Error: {e:#}"),
            }
            if let Some(hint) = render.and_then(RenderError::recovery_hint) {
                eprintln!("Hint: {hint}");
            }
            tracing::debug!("{e:?}");

            let code = render.map_or(1, RenderError::exit_code);
            ExitCode::from(code.clamp(1, 255) as u8)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Render {
            manifest,
            output,
            ducking_preset,
        } => {
            let config = apply_preset(config, ducking_preset.as_deref())?;
            let manifest = NarrationManifest::load(&manifest)
                .map_err(RenderError::from)
                .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;

            let pipeline = RenderPipeline::new(config);
            let (report, stats) = pipeline.render_manifest(&manifest, &output)?;

            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            println!(
                "Rendered {} ({}, {} clips, peak {:.1} dBFS) to {}",
                format_duration(report.duration_secs as f32),
                if report.applied_gain < 1.0 {
                    "normalized"
                } else {
                    "unscaled"
                },
                report.clip_count,
                report.levels.peak_dbfs,
                output.display()
            );
            if stats.clipped_samples > 0 {
                println!("{} samples at full scale", stats.clipped_samples);
            }
            Ok(())
        }
        Commands::Batch {
            pattern,
            output_dir,
            ducking_preset,
        } => {
            let config = apply_preset(config, ducking_preset.as_deref())?;
            let summary = run_batch_rendering(BatchArgs {
                manifest_pattern: pattern,
                output_dir,
                config,
            })?;

            println!(
                "{} rendered, {} failed, {} warnings",
                summary.rendered.len(),
                summary.failed.len(),
                summary.warnings
            );
            if !summary.failed.is_empty() {
                anyhow::bail!("{} episodes failed to render", summary.failed.len());
            }
            Ok(())
        }
        Commands::CheckConfig => {
            config.validate().map_err(RenderError::from)?;
            let toml = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            println!("{toml}");
            if let Some(name) = matches_preset(&config.ducking) {
                println!("# ducking matches preset \"{name}\"");
            }
            Ok(())
        }
        Commands::Presets => {
            for preset in PRESETS {
                let ducking = &preset.config;
                if ducking.enabled {
                    println!(
                        "{:<16} level {:.2}, attack {} ms, release {} ms, merge gap {} ms",
                        preset.name,
                        ducking.ducked_level,
                        ducking.attack_ms,
                        ducking.release_ms,
                        ducking.merge_gap_ms
                    );
                } else {
                    println!("{:<16} ducking disabled", preset.name);
                }
            }
            Ok(())
        }
    }
}

/// Explicit `--config` must load; the default location falls back to defaults.
fn load_config(path: Option<&Path>) -> Result<RenderConfig> {
    match path {
        Some(path) => RenderConfig::load_from_file(path)
            .map_err(RenderError::from)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let default_path = RenderConfig::default_path();
            if default_path.exists() {
                Ok(RenderConfig::load_or_default(default_path))
            } else {
                Ok(RenderConfig::default())
            }
        }
    }
}

fn apply_preset(mut config: RenderConfig, name: Option<&str>) -> Result<RenderConfig> {
    if let Some(name) = name {
        let preset = find_preset(name).with_context(|| {
            let names: Vec<&str> = PRESETS.iter().map(|p| p.name).collect();
            format!("Unknown ducking preset '{name}' (available: {})", names.join(", "))
        })?;
        tracing::info!(preset = preset.name, "Using ducking preset");
        config.ducking = preset.config;
    }
    Ok(config)
}
