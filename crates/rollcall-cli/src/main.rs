use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{Embedding, EmbeddingStore, Identity, LogNotifier};
use rollcall_engine::{
    spawn_extractor, spawn_sweeper, Config, Enroller, ExtractorHandle, Gateway, IdentityLocks,
    LectureMatcher, Sweeper,
};
use rollcall_store::SqliteStore;
use rollcall_vision::OnnxExtractor;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-embedding attendance from classroom photos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a face sample for an identity
    Enroll {
        /// Identity key (e.g. a roll number)
        identity: String,
        /// Photograph containing exactly one face
        #[arg(required_unless_present = "embedding")]
        photo: Option<PathBuf>,
        /// JSON array holding a precomputed embedding instead of a photo
        #[arg(long, conflicts_with = "photo")]
        embedding: Option<PathBuf>,
    },
    /// Match a classroom photograph against a roster
    Match {
        /// Classroom photograph
        photo: PathBuf,
        /// Comma-separated identity keys eligible for this session
        #[arg(short, long, value_delimiter = ',', required = true)]
        roster: Vec<String>,
    },
    /// Delete expired embeddings once
    Sweep {
        /// Skip low-coverage reminders
        #[arg(short, long)]
        quiet: bool,
    },
    /// List stored embeddings
    List {
        /// Only show this identity
        #[arg(short, long)]
        identity: Option<String>,
    },
    /// Remove every embedding of an identity
    Remove { identity: String },
    /// Sweep periodically until interrupted
    Watch,
    /// Print the effective configuration
    Config,
}

struct App {
    config: Config,
    gateway: Gateway,
    locks: IdentityLocks,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let store = SqliteStore::open(&config.db_path)
            .with_context(|| format!("opening {}", config.db_path.display()))?;
        let store: Arc<dyn EmbeddingStore> = Arc::new(store);
        Ok(Self {
            config,
            gateway: Gateway::new(store),
            locks: IdentityLocks::new(),
        })
    }

    fn extractor(&self) -> Result<ExtractorHandle> {
        let extractor = OnnxExtractor::load(&self.config.model_dir)
            .with_context(|| format!("loading models from {}", self.config.model_dir.display()))?
            .with_min_confidence(self.config.min_face_confidence);
        tracing::info!(dir = %self.config.model_dir.display(), "face models loaded");
        Ok(spawn_extractor(Box::new(extractor))?)
    }

    fn enroller(&self) -> Enroller {
        Enroller::new(self.gateway.clone(), self.locks.clone(), &self.config)
    }

    fn sweeper(&self) -> Arc<Sweeper> {
        Arc::new(Sweeper::new(
            self.gateway.clone(),
            self.locks.clone(),
            Arc::new(LogNotifier),
            &self.config,
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        // Printing the configuration must not create the database.
        Commands::Config => print_json(&config),
        command => run(App::open(config)?, command).await,
    }
}

async fn run(app: App, command: Commands) -> Result<()> {
    match command {
        Commands::Enroll {
            identity,
            photo,
            embedding,
        } => {
            let enroller = app.enroller();
            let identity = enroller.parse_identity(&identity)?;
            match (photo, embedding) {
                (_, Some(path)) => {
                    let embedding = read_embedding(&path)?;
                    print_json(&enroller.enroll(&identity, embedding).await?)?;
                }
                (Some(path), None) => {
                    let image = read_photo(&path)?;
                    let enroller = enroller.with_extractor(app.extractor()?);
                    print_json(&enroller.enroll_photo(&identity, image).await?)?;
                }
                (None, None) => bail!("either a photo or --embedding is required"),
            }
        }
        Commands::Match { photo, roster } => {
            let enroller = app.enroller();
            let roster = roster
                .iter()
                .map(|raw| enroller.parse_identity(raw))
                .collect::<Result<Vec<Identity>, _>>()?;
            let image = read_photo(&photo)?;

            let mut matcher = LectureMatcher::new(app.gateway.clone(), app.extractor()?, &app.config);
            if app.config.sweep_before_read {
                matcher = matcher.with_presweep(app.sweeper());
            }
            let report = matcher.match_photo(image, &roster).await?;
            if report.no_faces_detected() {
                tracing::warn!(photo = %photo.display(), "no faces detected");
            }
            print_json(&report)?;
        }
        Commands::Sweep { quiet } => {
            print_json(&app.sweeper().sweep(!quiet).await?)?;
        }
        Commands::List { identity } => {
            let enroller = app.enroller();
            let filter = identity
                .map(|raw| enroller.parse_identity(&raw))
                .transpose()?;
            print_json(&enroller.records(filter.as_ref()).await?)?;
        }
        Commands::Remove { identity } => {
            let enroller = app.enroller();
            let identity = enroller.parse_identity(&identity)?;
            print_json(&enroller.delete_identity(&identity).await?)?;
        }
        Commands::Watch => {
            let (tx, rx) = tokio::sync::watch::channel(false);
            let handle = spawn_sweeper(app.sweeper(), app.config.sweep_interval(), rx);
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
            let _ = tx.send(true);
            handle.await?;
        }
        Commands::Config => unreachable!("config is printed before the store is opened"),
    }

    Ok(())
}

fn read_photo(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn read_embedding(path: &Path) -> Result<Embedding> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let values: Vec<f32> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of numbers", path.display()))?;
    Ok(Embedding::new(values))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
