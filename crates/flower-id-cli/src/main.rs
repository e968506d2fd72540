//! flower-id entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use flower_id::SnapshotCamera;
use flower_id_cli::config::{AppConfig, Overrides};
use flower_id_cli::render::{outcome_json, render_outcome};
use flower_id_cli::session::ClassifierSession;

#[derive(Parser)]
#[command(
    name = "flower-id",
    about = "Identify flowers in camera frames by nearest reference centroid",
    version
)]
struct Cli {
    /// Path to a flower-id.json config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Root directory of the reference sample images.
    #[arg(short, long, global = true)]
    dataset: Option<PathBuf>,

    /// Path to an ONNX feature extractor model.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Minimum confidence (0-100) required to report a flower.
    #[arg(short, long, global = true)]
    threshold: Option<f64>,

    /// Snapshot file kept up to date by a webcam capture tool.
    #[arg(long, global = true)]
    camera: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one or more image files.
    Classify {
        /// Image files to classify.
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Number of ranked categories to show.
        #[arg(long, default_value_t = 0)]
        top: usize,
    },

    /// Capture one frame from the snapshot camera and classify it.
    Capture {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Number of ranked categories to show.
        #[arg(long, default_value_t = 0)]
        top: usize,
    },

    /// Validate the configuration and dataset layout without embedding.
    Check,

    /// Build the reference centroids and print a summary.
    Centroids {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   flower-id completions bash > ~/.local/share/bash-completion/completions/flower-id
    ///   flower-id completions zsh > ~/.zfunc/_flower-id
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let overrides = Overrides {
        config: cli.config,
        dataset: cli.dataset,
        model: cli.model,
        threshold: cli.threshold,
        camera: cli.camera,
    };
    let resolve = || AppConfig::resolve(&overrides).context("Failed to resolve configuration");

    match cli.command {
        Commands::Classify { images, json, top } => {
            let config = resolve()?;
            let mut session =
                ClassifierSession::open(&config).context("Failed to load reference set")?;

            let mut failures = 0usize;
            for path in &images {
                match session.classify_file(path) {
                    Ok(outcome) if json => {
                        println!("{}", serde_json::to_string(&outcome_json(&outcome, top))?);
                    }
                    Ok(outcome) => {
                        if images.len() > 1 {
                            println!("{}:", path.display());
                        }
                        println!("{}", render_outcome(&outcome, top));
                    }
                    Err(e) => {
                        failures += 1;
                        eprintln!("{}: {e}", path.display());
                    }
                }
            }

            if failures > 0 {
                std::process::exit(1);
            }
        }

        Commands::Capture { json, top } => {
            let config = resolve()?;
            let camera_path = config.camera.clone().context(
                "No camera configured: pass --camera <snapshot file> or set FLOWER_ID_CAMERA",
            )?;
            let mut camera = SnapshotCamera::open(camera_path)?;
            let mut session =
                ClassifierSession::open(&config).context("Failed to load reference set")?;

            let outcome = session.capture_and_classify(&mut camera)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome, top))?);
            } else {
                println!("{}", render_outcome(&outcome, top));
            }
        }

        Commands::Check => {
            let config = resolve()?;
            let set = config.reference_set();
            let layout = config.layout();
            let missing = layout.missing_samples(&set);

            println!("Dataset: {}", layout.root.display());
            println!("  Pattern:    {}", layout.pattern);
            println!(
                "  Categories: {}",
                set.categories
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!("  Samples:    {} per category", set.samples_per_category);

            let mut ok = missing.is_empty();
            for (category, index, path) in &missing {
                eprintln!("  missing: {category} #{index} ({})", path.display());
            }

            match &config.model.path {
                Some(path) if !path.is_file() => {
                    ok = false;
                    eprintln!("  missing model: {}", path.display());
                }
                Some(path) => println!("  Model:      {}", path.display()),
                None => println!("  Model:      none (colour grid {0}x{0})", config.grid),
            }

            if !ok {
                eprintln!("Dataset check failed");
                std::process::exit(1);
            }
            println!("Dataset OK");
        }

        Commands::Centroids { json } => {
            let config = resolve()?;
            let session =
                ClassifierSession::open(&config).context("Failed to load reference set")?;
            let centroids = session.centroids();

            if json {
                let entries: Vec<_> = centroids
                    .iter()
                    .map(|(category, centroid)| {
                        serde_json::json!({
                            "category": category,
                            "samples": centroid.samples,
                            "dim": centroid.dim(),
                            "norm": centroid.norm(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!(
                    "{} centroids, {} dims, extractor '{}'",
                    centroids.len(),
                    centroids.dim().unwrap_or(0),
                    session.extractor_name()
                );
                for (category, centroid) in centroids.iter() {
                    println!(
                        "  {:<14} samples {:>3}  norm {:>10.4}",
                        category.as_str(),
                        centroid.samples,
                        centroid.norm()
                    );
                }
            }
        }

        Commands::Info => {
            let config = resolve()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "flower-id", &mut std::io::stdout());
        }

        Commands::Repl => {
            flower_id_cli::repl::run(&resolve()?)?;
        }
    }

    Ok(())
}
