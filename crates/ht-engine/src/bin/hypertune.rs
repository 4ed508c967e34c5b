use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ht_engine::{init_tracing, run_inference, CommandDetector, CommandEvaluator, Overrides, TuneConfig};
use ht_optimizer::{CheckpointStore, Objective, ResultWriter, SearchDriver};
use ht_report::ConvergencePlot;
use std::path::PathBuf;
use tracing::info;

/// Checkpointed hyperparameter search for detection training.
#[derive(Parser, Debug)]
#[command(name = "hypertune", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run (or resume) a hyperparameter search
    Tune(TuneArgs),

    /// Run a detection program over a directory of images
    Detect(DetectArgs),
}

#[derive(Args, Debug)]
struct TuneArgs {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Evaluations to run in this invocation
    #[arg(long)]
    calls: Option<usize>,

    /// Evaluations drawn at random before the model takes over
    #[arg(long)]
    random_starts: Option<usize>,

    /// Checkpoint file; resumed when present
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Search seed
    #[arg(long)]
    seed: Option<u64>,

    /// Final result file
    #[arg(long)]
    result: Option<PathBuf>,

    /// Convergence chart (PNG)
    #[arg(long)]
    chart: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Directory of images
    #[arg(long)]
    dir: PathBuf,

    /// Detection program; receives image paths as trailing arguments
    #[arg(long)]
    program: String,

    /// Argument passed to the program before the images (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Image file extension
    #[arg(long, default_value = "jpg")]
    ext: String,
}

impl TuneArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            calls: self.calls,
            random_starts: self.random_starts,
            seed: self.seed,
            checkpoint: self.checkpoint.clone(),
            result: self.result.clone(),
            chart: self.chart.clone(),
        }
    }
}

fn tune(args: TuneArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => TuneConfig::load(path)?,
        None => TuneConfig::default(),
    };
    config.apply_env()?;
    args.overrides().apply(&mut config);
    config.validate()?;

    let objective = Objective::new(
        CommandEvaluator::new(config.command.clone()),
        config.scoring.build(),
        config.trainer.clone(),
    );
    info!("objective: {}", objective.describe());

    let mut driver = SearchDriver::new(
        config.space.clone(),
        objective,
        config.search.clone(),
        CheckpointStore::new(&config.checkpoint_path),
    )?
    .with_reporter(Box::new(ResultWriter::new(&config.result_path)))
    .with_reporter(Box::new(ConvergencePlot::new(&config.chart_path)));

    let result = driver.run().with_context(|| {
        format!(
            "search stopped; completed evaluations are kept in {}",
            config.checkpoint_path.display()
        )
    })?;
    println!("{}", result.summary());
    Ok(())
}

fn detect(args: DetectArgs) -> Result<()> {
    let mut detector = CommandDetector::new(args.program, args.args);
    let results = run_inference(&mut detector, &args.dir, &args.ext)?;
    for result in &results {
        println!("{}", result.image.display());
        for d in &result.detections {
            println!(
                "  {} {:.2}% ({:.1}, {:.1}) - ({:.1}, {:.1})",
                d.label,
                d.confidence * 100.0,
                d.x1,
                d.y1,
                d.x2,
                d.y2
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::Tune(args) => tune(args),
        Command::Detect(args) => detect(args),
    }
}
