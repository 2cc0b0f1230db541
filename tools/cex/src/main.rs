use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use itertools::Itertools;
use log::info;

use sketch_counterexample::AnnotatedChain;
use sketch_counterexample::CounterexampleConfig;
use sketch_counterexample::OracleFailurePolicy;
use sketch_counterexample::compute_waves;
use sketch_counterexample::construct_counterexample;
use sketch_counterexample::read_hole_annotations;
use sketch_io::LargeFormatter;
use sketch_markov::Dtmc;
use sketch_markov::MarkovChain;
use sketch_markov::ModelChecker;
use sketch_markov::Property;
use sketch_markov::ValueIterationChecker;
use sketch_markov::read_drn;
use sketch_tools::Version;
use sketch_tools::VersionFlag;
use sketch_tools::verbosity::VerbosityFlag;
use sketch_utilities::SketchError;
use sketch_utilities::Timing;

#[derive(clap::Parser, Debug)]
#[command(
    about = "A command line tool for critical hole counterexamples of resolved sketches",
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    version: VersionFlag,

    #[command(flatten)]
    verbosity: VerbosityFlag,

    #[command(subcommand)]
    commands: Option<Commands>,

    #[arg(long, global = true)]
    timings: bool,

    #[arg(long, global = true, help = "Append the timings as YAML to the given file")]
    timings_yaml: Option<PathBuf>,
}

/// Defines the subcommands for this tool.
#[derive(Debug, Subcommand)]
enum Commands {
    Counterexample(CounterexampleArgs),
    Waves(WavesArgs),
    Check(CheckArgs),
}

#[derive(clap::Args, Debug)]
#[command(about = "Computes the critical holes explaining why the chain violates the property")]
struct CounterexampleArgs {
    /// Specify the chain in the DRN format.
    chain: PathBuf,

    /// Specify the hole annotations of the chain.
    holes: PathBuf,

    #[arg(short, long, help = "The violated property, for example 'P<0.5 [F \"target\"]'")]
    property: Property,

    #[arg(long, default_value_t = 1, help = "The number of waves expanded between oracle calls")]
    batch_size: usize,

    #[arg(long, value_enum, default_value = "fail", help = "What to do when the oracle fails or the deadline expires")]
    oracle_failure: OracleFailurePolicy,

    #[arg(long, help = "Stop expanding waves after this many milliseconds")]
    deadline_ms: Option<u64>,

    #[arg(long, default_value_t = 1e-8, help = "The precision of value iteration")]
    precision: f64,
}

#[derive(clap::Args, Debug)]
#[command(about = "Prints the waves of the given chain and the holes registered in them")]
struct WavesArgs {
    /// Specify the chain in the DRN format.
    chain: PathBuf,

    /// Specify the hole annotations of the chain.
    holes: PathBuf,
}

#[derive(clap::Args, Debug)]
#[command(about = "Checks whether the initial state of the chain satisfies the property")]
struct CheckArgs {
    /// Specify the chain in the DRN format.
    chain: PathBuf,

    #[arg(short, long)]
    property: Property,

    #[arg(long, default_value_t = 1e-8, help = "The precision of value iteration")]
    precision: f64,
}

fn main() -> Result<ExitCode, SketchError> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbosity.log_level_filter())
        .parse_default_env()
        .init();

    if cli.version.into() {
        eprintln!("{}", Version);
        return Ok(ExitCode::SUCCESS);
    }

    let mut timing = Timing::new();

    if let Some(command) = &cli.commands {
        match command {
            Commands::Counterexample(args) => {
                handle_counterexample(args, &mut timing)?;
            }
            Commands::Waves(args) => {
                handle_waves(args, &mut timing)?;
            }
            Commands::Check(args) => {
                handle_check(args, &mut timing)?;
            }
        }
    }

    if cli.timings {
        timing.print();
    }

    if let Some(path) = &cli.timings_yaml {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        timing.print_yaml("sketch-cex", &mut file)?;
    }

    Ok(ExitCode::SUCCESS)
}

/// Reads the chain from the given DRN file.
fn read_chain(path: &Path, timing: &mut Timing) -> Result<Dtmc, SketchError> {
    let mut time_read = timing.start("read_chain");
    let dtmc = read_drn(BufReader::new(File::open(path)?))?;
    time_read.finish();

    info!(
        "Chain has {} states and {} transitions.",
        LargeFormatter(dtmc.num_of_states()),
        LargeFormatter(dtmc.num_of_transitions())
    );
    Ok(dtmc)
}

/// Reads the chain and its hole annotations.
fn read_annotated_chain(chain: &Path, holes: &Path, timing: &mut Timing) -> Result<AnnotatedChain, SketchError> {
    let dtmc = read_chain(chain, timing)?;

    let mut time_read = timing.start("read_holes");
    let annotated = read_hole_annotations(BufReader::new(File::open(holes)?), dtmc)?;
    time_read.finish();

    Ok(annotated)
}

/// Computes and prints the critical holes of the annotated chain.
fn handle_counterexample(args: &CounterexampleArgs, timing: &mut Timing) -> Result<(), SketchError> {
    if args.batch_size == 0 {
        return Err("The batch size must be positive".into());
    }

    let annotated = read_annotated_chain(&args.chain, &args.holes, timing)?;

    let mut config = CounterexampleConfig::default()
        .with_batch_size(args.batch_size)
        .with_oracle_failure(args.oracle_failure);
    if let Some(deadline) = args.deadline_ms {
        config = config.with_deadline(Duration::from_millis(deadline));
    }

    let checker = ValueIterationChecker {
        precision: args.precision,
        ..Default::default()
    };

    let result = construct_counterexample(
        &annotated.chain,
        &annotated.choice_holes,
        &annotated.bounds,
        &args.property,
        &checker,
        &config,
        timing,
    )?;

    println!("{{{}}}", result.critical_holes.iter().format(", "));
    info!(
        "Stopped at wave {} of {} after {} oracle calls{}",
        result.stopping_wave,
        result.num_of_waves,
        result.oracle_calls,
        if result.conservative { " (conservative)" } else { "" }
    );

    Ok(())
}

/// Prints the waves of the annotated chain.
fn handle_waves(args: &WavesArgs, timing: &mut Timing) -> Result<(), SketchError> {
    let annotated = read_annotated_chain(&args.chain, &args.holes, timing)?;

    let mut time_waves = timing.start("waves");
    let (hole_waves, partition) = compute_waves(&annotated.chain, &annotated.choice_holes)?;
    time_waves.finish();

    for wave in partition.iter_waves() {
        println!(
            "wave {wave}: holes {{{}}} states {{{}}}",
            hole_waves.registered_at(wave).format(", "),
            partition.states(wave).iter().format(", ")
        );
    }

    let unregistered = hole_waves
        .iter()
        .filter_map(|(hole, wave)| wave.is_none().then_some(hole))
        .collect::<Vec<_>>();
    if !unregistered.is_empty() {
        println!("unregistered holes {{{}}}", unregistered.iter().format(", "));
    }

    Ok(())
}

/// Checks the property on the chain and prints whether it holds initially.
fn handle_check(args: &CheckArgs, timing: &mut Timing) -> Result<(), SketchError> {
    let dtmc = read_chain(&args.chain, timing)?;

    let checker = ValueIterationChecker {
        precision: args.precision,
        ..Default::default()
    };

    let mut time_check = timing.start("check");
    let result = checker.check(&dtmc, &args.property)?;
    time_check.finish();

    if let Some(value) = result.value(dtmc.initial_state()) {
        info!("The initial state has value {value}");
    }

    if result.is_satisfied(dtmc.initial_state(), &args.property) {
        println!("true");
    } else {
        println!("false");
    }

    Ok(())
}
