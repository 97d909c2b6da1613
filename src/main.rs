use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use pricing_forge::cli;
use pricing_forge::core::formula::{EngineLimits, DEFAULT_MAX_DEPTH, DEFAULT_MAX_VISITS};
use pricing_forge::core::{HarnessConfig, DEFAULT_EPSILON};
use pricing_forge::types::{FormulaId, SortBy, SortOrder, TestCaseId, TestStatus};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pricing-forge")]
#[command(about = "Sandboxed pricing formulas with a persistent test harness")]
#[command(long_about = "Pricing Forge - safe pricing formulas, tested

Formulas are small expressions over line-item inputs:
  base_price + 50
  ROUND(width * height / 10000 * rate, 2)
  IF(width > 500, base_price * 1.5, base_price)

Test cases live in a YAML suite file next to their formula. Every run
writes the outcome (status, actual result, timing) back to the suite.

COMMANDS:
  run    - Run test cases and record results
  stats  - Pass rate and variable coverage for a formula
  list   - List a formula's test cases
  add    - Add a test case to a formula
  check  - Validate a formula and list its variables
  eval   - Evaluate a formula with ad-hoc inputs
  watch  - Re-run the suite whenever it changes

EXAMPLES:
  pricing-forge run suite.yaml
  pricing-forge run suite.yaml --formula 2
  pricing-forge eval 'width * height / 10000' -i width=600 -i height=800
  pricing-forge list suite.yaml --formula 1 --status failed --sort-by name")]
#[command(version)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Engine limits and comparison tolerance
#[derive(Args, Clone, Copy)]
struct EngineArgs {
    /// Relative tolerance for numeric comparison
    #[arg(long, default_value_t = DEFAULT_EPSILON, env = "PRICING_FORGE_EPSILON")]
    epsilon: f64,

    /// Maximum formula nesting depth (1 to 256)
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_DEPTH,
        env = "PRICING_FORGE_MAX_DEPTH",
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=DEFAULT_MAX_DEPTH as u64)
    )]
    max_depth: usize,

    /// Maximum node visits per evaluation
    #[arg(long, default_value_t = DEFAULT_MAX_VISITS, env = "PRICING_FORGE_MAX_VISITS")]
    max_visits: usize,
}

impl From<EngineArgs> for HarnessConfig {
    fn from(args: EngineArgs) -> Self {
        HarnessConfig {
            limits: EngineLimits {
                max_depth: args.max_depth,
                max_visits: args.max_visits,
            },
            epsilon: args.epsilon,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Run test cases and record results.

Runs every test case of every formula in the suite (or one formula, or one
test case) and writes status, actual result and timing back to the file.

Exits non-zero when any test case failed or errored.")]
    /// Run test cases and record results
    Run {
        /// Path to the suite YAML file
        suite: PathBuf,

        /// Only run this formula's test cases
        #[arg(short, long, conflicts_with = "test")]
        formula: Option<FormulaId>,

        /// Only run this test case
        #[arg(short, long)]
        test: Option<TestCaseId>,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Show pass rate and variable coverage for a formula
    Stats {
        /// Path to the suite YAML file
        suite: PathBuf,

        /// Formula id
        #[arg(short, long)]
        formula: FormulaId,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// List a formula's test cases
    List {
        /// Path to the suite YAML file
        suite: PathBuf,

        /// Formula id
        #[arg(short, long)]
        formula: FormulaId,

        /// Only show test cases with this status (pending, passed, failed, error)
        #[arg(short, long)]
        status: Option<TestStatus>,

        /// Sort key: name, created_at, status, last_run_at, execution_time
        #[arg(long, default_value = "created_at")]
        sort_by: SortBy,

        /// Sort order: asc or desc
        #[arg(long, default_value = "asc")]
        order: SortOrder,
    },

    /// Add a test case to a formula
    Add {
        /// Path to the suite YAML file
        suite: PathBuf,

        /// Formula id
        #[arg(short, long)]
        formula: FormulaId,

        /// Test case name
        #[arg(short, long)]
        name: String,

        /// Input as key=value (value parsed as JSON, else text); repeatable
        #[arg(short, long = "input")]
        inputs: Vec<String>,

        /// Expected result (JSON, else text). Omit for no expectation.
        #[arg(short, long)]
        expected: Option<String>,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Validate a formula and list the variables it references
    Check {
        /// Formula source
        source: String,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Evaluate a formula with ad-hoc inputs
    Eval {
        /// Formula source
        source: String,

        /// Input as key=value (value parsed as JSON, else text); repeatable
        #[arg(short, long = "input")]
        inputs: Vec<String>,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Re-run the suite whenever the file changes
    Watch {
        /// Path to the suite YAML file
        suite: PathBuf,

        /// Only run this formula's test cases
        #[arg(short, long)]
        formula: Option<FormulaId>,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "pricing_forge=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            suite,
            formula,
            test,
            engine,
        } => cli::run(suite, formula, test, engine.into()),

        Commands::Stats {
            suite,
            formula,
            engine,
        } => cli::stats(suite, formula, engine.into()),

        Commands::List {
            suite,
            formula,
            status,
            sort_by,
            order,
        } => cli::list(suite, formula, status, sort_by, order),

        Commands::Add {
            suite,
            formula,
            name,
            inputs,
            expected,
            engine,
        } => cli::add(suite, formula, name, inputs, expected, engine.into()),

        Commands::Check { source, engine } => cli::check(source, engine.into()),

        Commands::Eval {
            source,
            inputs,
            engine,
        } => cli::eval(source, inputs, engine.into()),

        Commands::Watch {
            suite,
            formula,
            engine,
        } => cli::watch(suite, formula, engine.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".bold().red(), e);
            ExitCode::FAILURE
        }
    }
}
