//! Match sponsor entities to ticker entities with a catalog embedding model
//!
//! Run with:
//!   cargo run --bin match_entities -- --left sponsors.json --right tickers.json
//!
//! Options:
//!   --model <key>      Catalog model (default: minilm)
//!   --config <path>    YAML match configuration
//!   --output <path>    Write the run as JSON (default: stdout)
//!   --list-models      Print the model catalog and exit

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use sponsor_match::{Entity, EntityMatcher, MatchConfig};
use sponsor_match_embedder::{model_catalog, SentenceEmbedder, DEFAULT_MODEL};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "match_entities")]
#[command(about = "Match sponsors to tickers with a sentence-embedding model")]
struct Args {
    /// Left entities (sponsors) as a JSON array of {id, text, attributes}
    #[arg(long, required_unless_present = "list_models")]
    left: Option<PathBuf>,

    /// Right entities (tickers) as a JSON array of {id, text, attributes}
    #[arg(long, required_unless_present = "list_models")]
    right: Option<PathBuf>,

    /// Catalog model key
    #[arg(short = 'm', long, default_value = DEFAULT_MODEL)]
    model: String,

    /// YAML match configuration
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Write the run as JSON here instead of stdout
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Print the model catalog and exit
    #[arg(long)]
    list_models: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sponsor_match=info,sponsor_match_embedder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if args.list_models {
        println!("Available models:");
        for model in model_catalog() {
            println!(
                "  {:18} {:28} {:5}d {:>5}MB  [{}] {}",
                model.key,
                model.display_name,
                model.dimension,
                model.size_mb,
                model.domain,
                model.description
            );
        }
        return Ok(());
    }

    let (Some(left_path), Some(right_path)) = (args.left.as_deref(), args.right.as_deref()) else {
        anyhow::bail!("--left and --right are required");
    };

    let config = match &args.config {
        Some(path) => MatchConfig::from_file(path)?,
        None => MatchConfig::default(),
    }
    .with_env_overrides()?;
    let matcher = EntityMatcher::new(config)?;

    let left: Vec<Entity> = read_json(left_path)?;
    let right: Vec<Entity> = read_json(right_path)?;
    info!(left = left.len(), right = right.len(), "Loaded entities");

    info!("Loading embedding model (this may download on first run)...");
    let embedder = SentenceEmbedder::from_key(&args.model).context("Failed to load embedder")?;

    let run = matcher.run(&left, &right, &embedder)?;
    eprintln!(
        "{} matches from {} candidate pairs ({} approved, {} pending, {} rejected)",
        run.matches.len(),
        run.blocking.candidate_pairs,
        run.status_counts.approved,
        run.status_counts.pending,
        run.status_counts.rejected
    );

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &run)?;
            writer.flush()?;
            info!(path = %path.display(), "Wrote match run");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &run)?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}
