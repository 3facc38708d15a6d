use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "frameplan", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run submit/consolidate/execute cycles from a cycle config.
    Run(RunArgs),
    /// Print the phase table of a cycle config.
    Phases(PhasesArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Input cycle config JSON.
    #[arg(long)]
    config: PathBuf,

    /// Number of cycles to run.
    #[arg(long, default_value_t = 1)]
    cycles: u32,

    /// Producer threads (defaults to rayon's choice).
    #[arg(long)]
    threads: Option<usize>,

    /// Print per-cycle statistics as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct PhasesArgs {
    /// Input cycle config JSON.
    #[arg(long)]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Phases(args) => cmd_phases(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_config(path: &Path) -> anyhow::Result<frameplan::CycleConfig> {
    let f = File::open(path).with_context(|| format!("open cycle config '{}'", path.display()))?;
    let cfg = frameplan::CycleConfig::from_reader(BufReader::new(f))
        .with_context(|| format!("load cycle config '{}'", path.display()))?;
    Ok(cfg)
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.cycles > 0, "--cycles must be >= 1");
    let cfg = read_config(&args.config)?;

    let pool = frameplan::SubmitThreading {
        threads: args.threads,
    }
    .build_pool()?;
    let mut scheduler = frameplan::Scheduler::new(cfg.scheduler)?;
    let mut aggregator = frameplan::Aggregator::new(&scheduler, cfg.aggregator)?;

    let mut all = Vec::with_capacity(args.cycles as usize);
    for cycle in 0..args.cycles {
        let stats = frameplan::run_cycle(&mut scheduler, &mut aggregator, &cfg, &pool)
            .with_context(|| format!("cycle {cycle}"))?;
        if !args.json {
            print_cycle(cycle, &stats);
        }
        all.push(stats);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&all)?);
    }
    Ok(())
}

fn print_cycle(cycle: u32, stats: &frameplan::CycleStats) {
    println!(
        "cycle {cycle}: submitted={} consolidated={} recoveries={} dropped_batches={} arena_bytes={}",
        stats.submitted,
        stats.consolidated,
        stats.overflow_recoveries,
        stats.dropped_batches,
        stats.arena_bytes_used
    );
    for p in &stats.phases {
        println!("  phase {:<16} tasks={:<8} runs={}", p.name, p.tasks, p.runs);
    }
    for t in &stats.techniques {
        println!("  technique {:<12} tasks={:<8} calls={}", t.name, t.tasks, t.calls);
    }
}

fn cmd_phases(args: PhasesArgs) -> anyhow::Result<()> {
    let cfg = read_config(&args.config)?;
    for (id, desc) in cfg.phases.iter() {
        let traits = if desc.traits.is_sorted() {
            "sorted"
        } else {
            "-"
        };
        println!("{:>3}  {:<16} {traits}", id.0, desc.name);
    }
    Ok(())
}
