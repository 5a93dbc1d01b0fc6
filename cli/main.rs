#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use bootfit::config::{EstimatorSpec, RunConfig};
use bootfit::data::load_dataset;
use bootfit::models::{LinearRegression, LogisticRegression};
use bootfit::progress::BatchProgressObserver;
use bootfit::summary::{CoefficientSummary, summarize, write_summary_tsv};
use bootfit::run_batch_with_progress;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, IsTerminal};
use std::panic;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(
    name = "bootfit",
    version,
    about = "Bootstrap the sampling distribution of regression coefficients",
    long_about = "Resamples the rows of a prepared TSV table with replacement, refits a linear or \
                  logistic regression on every replicate in parallel, and reports the \
                  per-replicate coefficients together with bootstrap standard errors and \
                  percentile confidence intervals."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a bootstrap batch on a TSV dataset
    #[command(about = "Run a bootstrap batch (outputs: coefficients and summary TSVs)")]
    Run(RunArgs),

    /// Write a config file holding the default settings
    #[command(about = "Write a default run config (.toml)")]
    InitConfig {
        /// Where to write the config file
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelCli {
    Linear,
    Logistic,
}

#[derive(Args)]
struct RunArgs {
    /// Path to a tab-separated data file with a header row
    #[arg(value_name = "DATA")]
    data: PathBuf,

    /// Name of the response column
    #[arg(long)]
    response: String,

    /// Comma-separated feature columns (default: every column except the response)
    #[arg(long, value_delimiter = ',')]
    features: Option<Vec<String>>,

    /// Run config (.toml); flags given on the command line take precedence
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Model family to fit on every replicate
    #[arg(long, value_enum)]
    model: Option<ModelCli>,

    /// Fit the model without an intercept
    #[arg(long)]
    no_intercept: bool,

    /// Ridge penalty for logistic regression
    #[arg(long, value_name = "LAMBDA")]
    l2_penalty: Option<f64>,

    /// Number of bootstrap replicates
    #[arg(long, value_name = "N")]
    replicates: Option<usize>,

    /// Number of worker threads (0 = all available cores)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Seed of the first replicate; replicate i uses seed + i
    #[arg(long)]
    seed: Option<u64>,

    /// Two-sided confidence level of the percentile intervals
    #[arg(long)]
    confidence: Option<f64>,

    /// Output path for the per-replicate coefficients
    #[arg(long, default_value = "bootstrap_coefficients.tsv")]
    out: PathBuf,

    /// Output path for the coefficient summary
    #[arg(long, default_value = "bootstrap_summary.tsv")]
    summary_out: PathBuf,
}

/// Reports batch progress on a terminal progress bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(None, draw_target);
        let style = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} replicates ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        Self { bar }
    }
}

impl BatchProgressObserver for BarProgress {
    fn on_batch_start(&self, total_replicates: usize) {
        self.bar.set_length(total_replicates as u64);
    }

    fn on_replicate_finish(&self, index: usize, succeeded: bool) {
        let _ = (index, succeeded);
        self.bar.inc(1);
    }

    fn on_batch_finish(&self, failures: usize) {
        self.bar
            .finish_with_message(format!("done, {failures} failed"));
    }
}

/// Runs `f` with a panic hook that sends panic messages to the debug log instead
/// of stderr, then puts the previous hook back. Panicking fits are already
/// recorded as failed replicates; printing them would tear up the progress bar.
fn with_quiet_panics<T>(f: impl FnOnce() -> T) -> T {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|info| {
        log::debug!("Panic inside a bootstrap replicate: {info}");
    }));
    let result = f();
    panic::set_hook(previous);
    result
}

fn resolve_config(args: &RunArgs) -> Result<RunConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading run config from: {}", path.display());
            RunConfig::load(path)?
        }
        None => RunConfig::default(),
    };

    if let Some(replicates) = args.replicates {
        config.bootstrap.replicates = replicates;
    }
    if let Some(workers) = args.workers {
        config.bootstrap.workers = workers;
    }
    if let Some(seed) = args.seed {
        config.bootstrap.base_seed = seed;
    }
    if let Some(confidence) = args.confidence {
        config.confidence = confidence;
    }

    // Switching family on the command line starts from that family's defaults.
    match (args.model, config.model) {
        (Some(ModelCli::Linear), EstimatorSpec::Logistic(_)) => {
            config.model = EstimatorSpec::Linear(LinearRegression::default());
        }
        (Some(ModelCli::Logistic), EstimatorSpec::Linear(_)) => {
            config.model = EstimatorSpec::Logistic(LogisticRegression::default());
        }
        _ => {}
    }
    match &mut config.model {
        EstimatorSpec::Linear(model) => {
            if args.no_intercept {
                model.fit_intercept = false;
            }
            if args.l2_penalty.is_some() {
                return Err("--l2-penalty only applies to the logistic model".into());
            }
        }
        EstimatorSpec::Logistic(model) => {
            if args.no_intercept {
                model.fit_intercept = false;
            }
            if let Some(l2_penalty) = args.l2_penalty {
                model.l2_penalty = l2_penalty;
            }
        }
    }

    config.validate()?;
    Ok(config)
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;

    println!("Loading data from: {}", args.data.display());
    let dataset = load_dataset(&args.data, &args.response, args.features.as_deref())?;
    println!(
        "Loaded {} rows with {} features: {}",
        dataset.row_count(),
        dataset.feature_count(),
        dataset.feature_names().join(", ")
    );
    println!("Model: {:?}", config.model);
    println!(
        "Running {} replicates (base seed {}) on {} workers",
        config.bootstrap.replicates,
        config.bootstrap.base_seed,
        config.bootstrap.resolved_workers()
    );

    let progress = BarProgress::new();
    let matrix = with_quiet_panics(|| {
        run_batch_with_progress(&dataset, &config.model, &config.bootstrap, &progress)
    })?;

    for (index, reason) in matrix.failures() {
        log::debug!("Replicate {index} failed: {reason}");
    }
    println!(
        "{} of {} replicates succeeded",
        matrix.success_count(),
        matrix.len()
    );

    matrix.write_tsv(BufWriter::new(File::create(&args.out)?))?;
    println!("Per-replicate coefficients saved to: {}", args.out.display());

    let summaries = summarize(&matrix, config.confidence)?;
    write_summary_tsv(&summaries, BufWriter::new(File::create(&args.summary_out)?))?;
    print_summary(&summaries, config.confidence);
    println!("Summary saved to: {}", args.summary_out.display());

    Ok(())
}

fn print_summary(summaries: &[CoefficientSummary], confidence: f64) {
    let width = summaries
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max("feature".len());
    let pct = confidence * 100.0;
    println!();
    println!(
        "{:<width$}  {:>12}  {:>12}  {:>12}  {:>12}",
        "feature",
        "mean",
        "std_error",
        format!("{:.1}% lo", 50.0 - pct / 2.0),
        format!("{:.1}% hi", 50.0 + pct / 2.0),
    );
    for s in summaries {
        println!(
            "{:<width$}  {:>12.6}  {:>12.6}  {:>12.6}  {:>12.6}",
            s.name, s.mean, s.std_error, s.ci_lower, s.ci_upper
        );
    }
    println!();
}

fn init_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    RunConfig::default().save(path)?;
    println!("Default run config written to: {}", path.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::InitConfig { path }) => init_config(&path),
        None => {
            let _ = Cli::command().print_help();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootfit::models::LinearRegression;
    use bootfit::{BootstrapConfig, Dataset, FailureReason, FitError, ModelFitter};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn quiet_hook_covers_the_batch_and_is_removed_afterwards() {
        let ds = Dataset::from_columns(
            vec![("x".to_string(), (0..10).map(|i| i as f64).collect())],
            vec![("y".to_string(), (0..10).map(|i| 2.0 * i as f64).collect())],
        )
        .unwrap();
        let model = LinearRegression::default();
        let flaky = |sample: &Dataset| -> Result<_, FitError> {
            if sample.features().iter().any(|&x| x == 0.0) {
                panic!("row 0 was drawn");
            }
            model.fit(sample)
        };

        // Stands in for whatever hook the process had before the batch.
        let outer_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&outer_calls);
        panic::set_hook(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let matrix = with_quiet_panics(|| {
            run_batch_with_progress(
                &ds,
                &flaky,
                &BootstrapConfig::new(40).with_workers(2),
                &bootfit::progress::NoopBatchProgress,
            )
        })
        .unwrap();
        let panicked = matrix
            .failures()
            .iter()
            .filter(|(_, reason)| matches!(reason, FailureReason::Panicked(_)))
            .count();
        assert!(panicked > 0);
        assert_eq!(outer_calls.load(Ordering::SeqCst), 0);

        let _ = panic::catch_unwind(|| panic!("after the batch"));
        assert_eq!(outer_calls.load(Ordering::SeqCst), 1);
        let _ = panic::take_hook();
    }
}
