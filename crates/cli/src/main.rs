//! DreamCanvas Studio command-line entry point.
//!
//! Configuration comes from the environment (see [`config::StudioConfig`]);
//! flags override it per invocation.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dreamcanvas_comfyui::api::ComfyUiApi;
use dreamcanvas_comfyui::backend::ComfyUiBackend;
use dreamcanvas_core::backend::{DiffusionBackend, Precision};
use dreamcanvas_core::generation::{GenerationRequest, DEFAULT_GUIDANCE_SCALE, DEFAULT_STEPS};
use dreamcanvas_core::preset::InMemoryPresetCatalog;
use dreamcanvas_core::resolution::{allowed_resolution_labels, parse_resolution};
use dreamcanvas_pipeline::synthetic::SyntheticBackend;
use dreamcanvas_pipeline::{BackendRegistry, GenerationEngine, Studio};
use dreamcanvas_store::{GenerationRecord, ListFilter, RecordStore};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{BackendKind, StudioConfig};

#[derive(Parser)]
#[command(name = "dreamcanvas", about = "Text-to-image studio with reproducible records")]
struct Cli {
    /// Record store root (overrides DREAMCANVAS_OUTPUT_ROOT)
    #[arg(long, global = true)]
    output_root: Option<PathBuf>,

    /// Model weights precision: auto, fp16, fp32 (overrides DREAMCANVAS_PRECISION)
    #[arg(long, global = true)]
    precision: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one or more images and save them as records
    Generate {
        /// Base prompt (a style preset prefix is added in front)
        prompt: String,
        /// Negative prompt
        #[arg(long)]
        negative: Option<String>,
        /// Style preset id
        #[arg(long)]
        preset: Option<String>,
        /// Base seed; image i uses seed + i
        #[arg(long)]
        seed: Option<u64>,
        /// Number of images in the batch (1-4)
        #[arg(long, short = 'n', default_value_t = 1)]
        num_images: u32,
        /// Denoising steps
        #[arg(long, default_value_t = DEFAULT_STEPS)]
        steps: u32,
        /// Classifier-free guidance scale
        #[arg(long, default_value_t = DEFAULT_GUIDANCE_SCALE)]
        guidance: f64,
        /// Resolution as HxW: 512x512, 512x768 or 768x512
        #[arg(long, default_value = "512x512")]
        resolution: String,
        /// Model id (overrides DREAMCANVAS_MODEL_ID)
        #[arg(long)]
        model: Option<String>,
    },
    /// List records, newest first
    List {
        /// Exact preset id
        #[arg(long)]
        preset: Option<String>,
        /// Day partition, YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        /// Case-insensitive prompt substring
        #[arg(long)]
        keyword: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print a record's full sidecar
    Show {
        /// Record id
        id: String,
    },
    /// Re-run a record's parameters into a new record
    Reproduce {
        /// Record id
        id: String,
    },
    /// Compare records side by side
    Compare {
        /// Record ids (two or more)
        #[arg(required = true, num_args = 2..)]
        ids: Vec<String>,
        /// Include device and duration when diffing two records
        #[arg(long)]
        volatile: bool,
    },
    /// List style presets
    Presets,
    /// Copy a record's image and sidecar into a directory
    Export {
        /// Record id
        id: String,
        /// Destination directory
        #[arg(long, default_value = "export")]
        dest: PathBuf,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn print_records(records: &[GenerationRecord]) {
    println!(
        "{:<20} {:<10} {:>12} {:>6} {:>6}  {}",
        "ID", "PRESET", "SEED", "STEPS", "CFG", "PROMPT"
    );
    for r in records {
        println!(
            "{:<20} {:<10} {:>12} {:>6} {:>6.2}  {}",
            r.id,
            r.preset_id.as_deref().unwrap_or("-"),
            r.seed,
            r.steps,
            r.guidance_scale,
            truncate(&r.prompt, 60),
        );
    }
}

/// Truncate to `max` characters, appending "..." when cut.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn build_backend(config: &StudioConfig) -> Arc<dyn DiffusionBackend> {
    match config.backend {
        BackendKind::Synthetic => Arc::new(SyntheticBackend),
        BackendKind::ComfyUi => Arc::new(
            ComfyUiBackend::new(ComfyUiApi::new(config.comfyui_url.clone()))
                .with_poll_interval(config.comfyui_poll_interval),
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dreamcanvas=info,dreamcanvas_pipeline=info,dreamcanvas_store=info,dreamcanvas_comfyui=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = StudioConfig::from_env().context("Invalid configuration")?;
    if let Some(root) = cli.output_root {
        config.output_root = root;
    }
    if let Some(name) = cli.precision.as_deref() {
        config.precision = Precision::from_name(name)
            .with_context(|| format!("Unknown precision '{name}' (expected auto, fp16 or fp32)"))?;
    }
    tracing::debug!(
        output_root = %config.output_root.display(),
        backend = ?config.backend,
        precision = %config.precision,
        "Loaded studio configuration",
    );

    let registry = Arc::new(BackendRegistry::new(build_backend(&config)));
    let studio = Studio::new(
        GenerationEngine::new(registry, config.precision),
        RecordStore::new(&config.output_root),
        Arc::new(InMemoryPresetCatalog::builtin()),
    );

    match cli.command {
        Commands::Generate {
            prompt,
            negative,
            preset,
            seed,
            num_images,
            steps,
            guidance,
            resolution,
            model,
        } => {
            let (height, width) = parse_resolution(&resolution).with_context(|| {
                format!("Allowed resolutions: {}", allowed_resolution_labels().join(", "))
            })?;
            let request = GenerationRequest {
                negative_prompt: negative,
                base_seed: seed,
                num_images,
                num_inference_steps: steps,
                guidance_scale: guidance,
                height,
                width,
                model_id: model.unwrap_or_else(|| config.model_id.clone()),
                preset_id: preset,
                ..GenerationRequest::new(prompt)
            };
            let records = studio.generate(&request).await?;
            for r in &records {
                println!("{}  seed={}  {}", r.id, r.seed, r.image_path.display());
            }
        }
        Commands::List {
            preset,
            date,
            keyword,
            json,
        } => {
            let filter = ListFilter {
                preset_id: preset,
                date,
                keyword,
            };
            let listing = studio.list(&filter).await?;
            if json {
                let rows: Vec<serde_json::Value> = listing.iter().map(|r| r.to_dict()).collect();
                print_json(&rows)?;
            } else {
                print_records(&listing.records);
            }
            if listing.skipped > 0 {
                eprintln!("{} unreadable sidecar(s) skipped", listing.skipped);
            }
        }
        Commands::Show { id } => {
            let record = studio.get(&id).await?;
            let doc = studio.store().read_sidecar(&record).await?;
            print_json(&doc)?;
        }
        Commands::Reproduce { id } => {
            let record = studio.reproduce(&id).await?;
            println!("{}  seed={}  {}", record.id, record.seed, record.image_path.display());
        }
        Commands::Compare { ids, volatile } => {
            let rows = studio.compare(&ids).await?;
            print_json(&rows)?;
            if let [left, right] = ids.as_slice() {
                let diffs = studio.diff(left, right, volatile).await?;
                if diffs.is_empty() {
                    println!("No differing parameters");
                } else {
                    for d in diffs {
                        println!("{}: {} -> {}", d.field, d.left, d.right);
                    }
                }
            }
        }
        Commands::Presets => {
            print_json(&studio.presets())?;
        }
        Commands::Export { id, dest } => {
            let files = studio.export(&id, &dest).await?;
            println!("{}", files.image.display());
            println!("{}", files.sidecar.display());
        }
    }

    studio.shutdown().await;
    Ok(())
}
