// ========================================================================================
//
//                     LOOKAHEAD-BOUND: COMMAND-LINE FRONT END
//
// ========================================================================================
//
// Evaluates the lookahead utility bound for an oracle given as a table of
// probability bounds indexed by the number of assumed positives. Evaluator
// settings come from an optional TOML file and are overridden by flags.

use clap::{Parser, ValueEnum};
use lookahead::{
    BoundEvaluator, Dataset, EvaluationStrategy, EvaluatorConfig, MonotonicityPolicy,
    SearchContext, TabulatedBound,
};
use std::path::PathBuf;
use std::process;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyCli {
    Recursive,
    Parallel,
    Table,
}

impl From<StrategyCli> for EvaluationStrategy {
    fn from(value: StrategyCli) -> Self {
        match value {
            StrategyCli::Recursive => EvaluationStrategy::Recursive,
            StrategyCli::Parallel => EvaluationStrategy::Parallel,
            StrategyCli::Table => EvaluationStrategy::Table,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MonotonicityCli {
    Enforce,
    Warn,
    Ignore,
}

impl From<MonotonicityCli> for MonotonicityPolicy {
    fn from(value: MonotonicityCli) -> Self {
        match value {
            MonotonicityCli::Enforce => MonotonicityPolicy::Enforce,
            MonotonicityCli::Warn => MonotonicityPolicy::Warn,
            MonotonicityCli::Ignore => MonotonicityPolicy::Ignore,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "lookahead-bound",
    version,
    about = "Upper-bound the expected number of positives found within a lookahead horizon"
)]
struct Args {
    /// Probability bounds for 0, 1, 2, ... assumed positives (comma separated); the last value repeats
    #[arg(long, value_delimiter = ',', num_args = 1.., required = true)]
    probabilities: Vec<f64>,

    /// Number of future observations to bound
    #[arg(long, default_value = "1")]
    lookahead: usize,

    /// Hypothetical positives already assumed before the first step
    #[arg(long, default_value = "0")]
    num_positives: usize,

    /// Evaluator settings file (.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    strategy: Option<StrategyCli>,

    #[arg(long, value_enum)]
    monotonicity: Option<MonotonicityCli>,

    /// Remaining lookahead from which the parallel strategy forks
    #[arg(long)]
    parallel_cutoff: Option<usize>,

    /// Abort the evaluation after this many milliseconds
    #[arg(long, value_name = "MS")]
    deadline_ms: Option<u64>,

    /// Write the effective evaluator settings to this file
    #[arg(long)]
    save_config: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => EvaluatorConfig::load(path)?,
        None => EvaluatorConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }
    if let Some(monotonicity) = args.monotonicity {
        config.monotonicity = monotonicity.into();
    }
    if let Some(cutoff) = args.parallel_cutoff {
        config.parallel_cutoff = cutoff;
    }
    if args.deadline_ms.is_some() {
        config.deadline_ms = args.deadline_ms;
    }
    config.validate()?;

    if let Some(path) = &args.save_config {
        config.save(path)?;
        log::info!("Wrote evaluator settings to {}", path.display());
    }

    let oracle = TabulatedBound::new(args.probabilities)?;
    // A tabulated oracle ignores the search state, so a single candidate suffices.
    let dataset = Dataset::unlabeled(1);
    let context = SearchContext::new(&dataset, &[], &[], &[0])?;

    let evaluator = BoundEvaluator::new(config);
    let estimate = evaluator.evaluate(&context, &oracle, args.lookahead, args.num_positives)?;

    println!("bound\t{}", estimate.bound);
    println!("oracle_calls\t{}", estimate.oracle_calls);
    Ok(())
}
