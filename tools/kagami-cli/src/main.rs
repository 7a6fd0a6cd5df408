//! Kagami command-line tool
//!
//! Ingests labeled images into the feature database and classifies new
//! images against it.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kagami::{Context, EmbedderKind, IndexConfig, Settings};
use tracing::warn;

#[derive(Parser)]
#[command(name = "kagami")]
#[command(about = "Nearest-neighbor image classifier")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory with one sub-directory per class
    #[arg(long, env = "DATA_PATH", default_value = "./data")]
    data_path: PathBuf,

    /// Index file; labels are kept next to it
    #[arg(long, env = "DATABASE_PATH", default_value = "./database/features.kgm")]
    database_path: PathBuf,

    /// Max log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long, env = "LOGGING_LEVEL", default_value = "INFO")]
    logging_level: String,

    /// Embedding provider (color-histogram, resnet50)
    #[arg(long, env = "FEATURE_MODEL", default_value = "color-histogram")]
    feature_model: EmbedderKind,

    /// Weights for the resnet50 provider
    #[arg(long, env = "MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// Neighbors consulted per vote
    #[arg(short, long, env = "K_NEIGHBORS", default_value_t = 5)]
    k: usize,

    /// Index structure for a new database
    #[arg(long, env = "INDEX_KIND", value_enum, default_value_t = IndexKind::Flat)]
    index_kind: IndexKind,

    /// IVF cluster count
    #[arg(long, env = "IVF_NLIST", default_value_t = 100)]
    ivf_nlist: usize,

    /// IVF clusters scanned per query
    #[arg(long, env = "IVF_NPROBE", default_value_t = 8)]
    ivf_nprobe: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexKind {
    Flat,
    Ivf,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the database from the data directory
    Ingest,
    /// Re-cluster the IVF index on the stored vectors
    Retrain,
    /// Classify one or more images
    Classify {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create an empty class directory
    AddClass { name: String },
    /// Copy images into a class and add them to the database
    Upload {
        class: String,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List class directories
    Classes,
    /// Show database and model information
    Status {
        /// Print status as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn settings(&self) -> Settings {
        let index = match self.index_kind {
            IndexKind::Flat => IndexConfig::Flat,
            IndexKind::Ivf => IndexConfig::Ivf {
                nlist: self.ivf_nlist,
                nprobe: self.ivf_nprobe,
            },
        };
        let mut settings = Settings::new()
            .with_data_path(&self.data_path)
            .with_database_path(&self.database_path)
            .with_logging_level(&self.logging_level)
            .with_feature_model(self.feature_model)
            .with_k_neighbors(self.k)
            .with_index(index);
        if let Some(path) = &self.model_path {
            settings = settings.with_model_path(path);
        }
        settings
    }
}

fn init_logging(level: &str) {
    let max_level = level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.logging_level);

    let settings = cli.settings();
    settings.validate().context("Invalid settings")?;

    let ctx = if matches!(cli.command, Commands::Ingest) {
        Context::rebuild(settings)
            .await
            .context("Failed to rebuild feature database")?
    } else {
        Context::start(settings)
            .await
            .context("Failed to initialize classifier")?
    };

    match cli.command {
        Commands::Ingest => {
            let db = ctx.database();
            println!(
                "Ingested {} vectors into {}",
                db.len(),
                db.index_path().display()
            );
        }
        Commands::Retrain => {
            let stats = ctx.retrain().await.context("Failed to retrain index")?;
            println!("Retrained {} over {} vectors", stats.index, stats.vectors);
        }
        Commands::Classify { images, json } => {
            if let [image] = images.as_slice() {
                let prediction = ctx
                    .classify_image(image)
                    .await
                    .with_context(|| format!("Failed to classify {}", image.display()))?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&prediction)?);
                } else {
                    println!("{}: {prediction}", image.display());
                }
            } else {
                let results = ctx.classify_images(&images).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                } else {
                    for r in &results {
                        match (&r.prediction, &r.error) {
                            (Some(p), _) => println!("{}: {p}", r.path.display()),
                            (None, Some(e)) => println!("{}: error: {e}", r.path.display()),
                            (None, None) => println!("{}: no result", r.path.display()),
                        }
                    }
                }
            }
        }
        Commands::AddClass { name } => {
            let dir = ctx
                .add_class(&name)
                .with_context(|| format!("Failed to add class {name:?}"))?;
            println!("Created {}", dir.display());
        }
        Commands::Upload { class, files } => {
            let report = ctx
                .upload_images(&class, &files)
                .await
                .with_context(|| format!("Failed to upload to {class:?}"))?;
            for path in &report.skipped {
                warn!(path = %path.display(), "image not added");
            }
            println!(
                "Added {}/{} images to {class}",
                report.added, report.requested
            );
        }
        Commands::Classes => {
            for class in ctx.list_classes()? {
                println!("{class}");
            }
        }
        Commands::Status { json } => {
            let status = ctx.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Embedder:   {} ({} dims)", status.embedder, status.dim);
                println!("k:          {}", status.k_neighbors);
                println!("Data:       {}", status.data_path.display());
                println!("Index:      {}", status.database.index_path.display());
                println!("Structure:  {}", status.database.index);
                println!("Vectors:    {}", status.database.vectors);
                for (class, count) in &status.database.classes {
                    println!("  {class}: {count}");
                }
            }
        }
    }

    Ok(())
}
