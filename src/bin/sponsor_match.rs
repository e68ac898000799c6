//! CLI for sponsor ↔ ticker matching runs and evaluation
//!
//! Usage:
//!   sponsor_match run --left sponsors.json --right tickers.json
//!   sponsor_match evaluate --predictions matches.json --ground-truth labels.json
//!   sponsor_match evaluate ... --show fp --limit 20
//!   sponsor_match compare --scored scored.json
//!
//! All inputs and outputs are JSON. Logs go to stderr; set `RUST_LOG` to
//! change verbosity.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sponsor_match::{
    compare_matchers, confusion_examples, generate_evaluation_report, ConfusionCategory, Entity,
    EntityMatcher, GroundTruth, HashedTrigramEmbedder, MatchConfig, ScoredPair,
};

#[derive(Parser)]
#[command(name = "sponsor_match")]
#[command(about = "Match clinical-trial sponsors to ticker records and evaluate the result")]
struct Args {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(short = 'c', long, global = true, env = "SPONSOR_MATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run blocking, scoring and matching with the hashed trigram embedder
    Run {
        /// Left entities (sponsors) as a JSON array of {id, text, attributes}
        #[arg(long)]
        left: PathBuf,

        /// Right entities (tickers) as a JSON array of {id, text, attributes}
        #[arg(long)]
        right: PathBuf,

        /// Write the run as JSON here instead of stdout
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Evaluate predictions against ground-truth labels
    Evaluate {
        /// Scored or matched pairs as a JSON array
        #[arg(short = 'p', long)]
        predictions: PathBuf,

        /// Ground-truth rows as a JSON array of objects
        #[arg(short = 'g', long)]
        ground_truth: PathBuf,

        /// Write the report as JSON here instead of stdout
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Print examples of one confusion category (tp, fp, fn)
        #[arg(long)]
        show: Option<ConfusionCategory>,

        /// Maximum number of examples to print
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Compare greedy and optimal matching on the same scored pairs
    Compare {
        /// Scored pairs as a JSON array
        #[arg(short = 's', long)]
        scored: PathBuf,

        /// Minimum confidence (defaults to the configured matcher threshold)
        #[arg(long)]
        min_confidence: Option<f64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sponsor_match=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Run {
            left,
            right,
            output,
        } => {
            let left: Vec<Entity> = read_json(&left)?;
            let right: Vec<Entity> = read_json(&right)?;
            let matcher = EntityMatcher::new(config)?;
            let run = matcher.run(&left, &right, &HashedTrigramEmbedder::default())?;
            write_json(output.as_deref(), &run)?;
        }
        Command::Evaluate {
            predictions,
            ground_truth,
            output,
            show,
            limit,
        } => {
            let predictions: Vec<ScoredPair> = read_json(&predictions)?;
            let rows: Vec<BTreeMap<String, String>> = read_json(&ground_truth)?;
            let truth = GroundTruth::from_rows(&rows, &config.evaluation.columns)
                .context("Invalid ground truth")?;

            let report = generate_evaluation_report(&predictions, &truth, &config.evaluation)?;
            eprintln!("{}", report.overall_metrics);

            if let Some(category) = show {
                eprintln!("\n=== {category} - Top {limit} ===");
                for (i, example) in confusion_examples(&predictions, &truth, category, limit)
                    .iter()
                    .enumerate()
                {
                    eprintln!("{}. {}", i + 1, example);
                }
            }

            write_json(output.as_deref(), &report)?;
        }
        Command::Compare {
            scored,
            min_confidence,
        } => {
            let scored: Vec<ScoredPair> = read_json(&scored)?;
            let min_confidence = min_confidence.unwrap_or_else(|| config.min_match_confidence());
            let comparison = compare_matchers(&scored, min_confidence);
            eprintln!(
                "Greedy:  {} matches, total {:.4}, avg {:.4}",
                comparison.greedy_matches,
                comparison.greedy_total_score,
                comparison.greedy_avg_score
            );
            eprintln!(
                "Optimal: {} matches, total {:.4}, avg {:.4}",
                comparison.optimal_matches,
                comparison.optimal_total_score,
                comparison.optimal_avg_score
            );
            eprintln!(
                "Improvement: {:.4} ({:.2}%), {} pairs differ",
                comparison.improvement, comparison.improvement_pct, comparison.different_pairs
            );
            write_json(None, &comparison)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<MatchConfig> {
    let config = match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            MatchConfig::from_file(path)?
        }
        None => MatchConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            info!(path = %path.display(), "Wrote output");
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, value)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}
