//! Active Learning Eval CLI
//!
//! Diversity-aware uncertainty sampling with Monte Carlo validation

use active_learning_eval::{
    generate, BinaryEvaluator, Dataset, Example, ExperimentConfig, ExperimentRunner,
    LogisticRegressionTrainer, Metric, ReportBuilder, SyntheticConfig,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "active-learning-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Markdown,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the active-learning loop and validate it against random selection
    Run {
        /// Experiment configuration (YAML); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Labeled JSONL dataset, split into seed and test sets
        #[arg(long, required_unless_present = "synthetic")]
        labeled: Option<PathBuf>,

        /// Unlabeled pool JSONL (labels act as the oracle)
        #[arg(long, required_unless_present = "synthetic")]
        pool: Option<PathBuf>,

        /// Generate a Gaussian-mixture labeled set and pool instead of reading files
        #[arg(long, conflicts_with_all = ["labeled", "pool"])]
        synthetic: bool,

        /// Synthetic labeled-set size
        #[arg(long, default_value = "2000")]
        synthetic_labeled: usize,

        /// Synthetic pool size
        #[arg(long, default_value = "10000")]
        synthetic_pool: usize,

        /// Synthetic feature dimension
        #[arg(long, default_value = "2")]
        synthetic_dim: usize,

        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the configured number of iterations
        #[arg(long)]
        iterations: Option<usize>,

        /// Override the configured worker count
        #[arg(long)]
        workers: Option<usize>,

        /// Override the primary metric (accuracy, auc, precision, recall, f1)
        #[arg(long)]
        metric: Option<String>,

        /// Report title
        #[arg(long, default_value = "Active Learning Report")]
        title: String,

        /// Output report file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Report format
        #[arg(long, value_enum, default_value = "markdown")]
        format: Format,
    },

    /// Write a synthetic Gaussian-mixture dataset as JSONL
    Generate {
        /// Output JSONL file
        #[arg(long)]
        output: PathBuf,

        /// Number of examples
        #[arg(long, default_value = "1000")]
        examples: usize,

        /// Feature dimension
        #[arg(long, default_value = "2")]
        dim: usize,

        /// Gaussian clusters per class
        #[arg(long, default_value = "2")]
        clusters: usize,

        /// Distance between class centers
        #[arg(long, default_value = "4.0")]
        separation: f64,

        /// Per-coordinate standard deviation
        #[arg(long, default_value = "1.0")]
        noise: f64,

        /// First example id
        #[arg(long, default_value = "0")]
        id_offset: u64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Validate a configuration file and print it with defaults filled in
    CheckConfig {
        /// Configuration file (YAML)
        #[arg(long)]
        config: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(ExperimentConfig::default()),
    }
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    Dataset::load_jsonl(path).with_context(|| format!("Failed to load dataset {}", path.display()))
}

fn synthetic_inputs(
    seed: u64,
    labeled: usize,
    pool: usize,
    dim: usize,
) -> Result<(Dataset, Vec<Example>)> {
    let base = SyntheticConfig {
        dim,
        ..SyntheticConfig::default()
    };
    let labeled = generate(
        &SyntheticConfig {
            n_examples: labeled,
            ..base.clone()
        },
        seed,
    )?;
    let pool = generate(
        &SyntheticConfig {
            n_examples: pool,
            id_offset: labeled.len() as u64,
            ..base
        },
        seed.wrapping_add(1),
    )?;
    Ok((labeled, pool.examples().to_vec()))
}

fn write_output(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => println!("{content}"),
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Run {
            config,
            labeled,
            pool,
            synthetic,
            synthetic_labeled,
            synthetic_pool,
            synthetic_dim,
            seed,
            iterations,
            workers,
            metric,
            title,
            output,
            format,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(iterations) = iterations {
                config.num_iterations = iterations;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(metric) = metric {
                config.primary_metric = metric
                    .parse::<Metric>()
                    .context("Invalid --metric")?;
            }
            config.validate().context("Invalid configuration")?;

            let (labeled, pool) = if synthetic {
                synthetic_inputs(config.seed, synthetic_labeled, synthetic_pool, synthetic_dim)?
            } else {
                let (Some(labeled), Some(pool)) = (labeled, pool) else {
                    bail!("--labeled and --pool are required without --synthetic");
                };
                (load_dataset(&labeled)?, load_dataset(&pool)?.examples().to_vec())
            };

            tracing::info!(
                labeled = labeled.len(),
                pool = pool.len(),
                dim = labeled.dim(),
                "Inputs loaded"
            );

            let trainer = LogisticRegressionTrainer::new();
            let evaluator = BinaryEvaluator::default();
            let results = ExperimentRunner::new(&config, &trainer, &evaluator)
                .run(&labeled, &pool)
                .context("Experiment failed")?;

            let report = ReportBuilder::new(&title, &config).build(&results);
            let rendered = match format {
                Format::Json => report.to_json()?,
                Format::Markdown => report.to_markdown(),
                Format::Text => report.to_text(),
            };
            write_output(output.as_deref(), &rendered)?;
        }
        Commands::Generate {
            output,
            examples,
            dim,
            clusters,
            separation,
            noise,
            id_offset,
            seed,
        } => {
            let config = SyntheticConfig {
                n_examples: examples,
                dim,
                clusters_per_class: clusters,
                class_separation: separation,
                noise,
                id_offset,
                ..SyntheticConfig::default()
            };
            let dataset = generate(&config, seed)?;
            dataset
                .save_jsonl(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            let [negative, positive] = dataset.class_counts();
            println!(
                "Wrote {} examples ({negative} negative, {positive} positive) to {}",
                dataset.len(),
                output.display()
            );
        }
        Commands::CheckConfig { config } => {
            let config = load_config(Some(config.as_path()))?;
            println!("Configuration OK");
            println!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}
