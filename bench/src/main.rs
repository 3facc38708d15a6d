use std::{
    cell::Cell,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use serde_json::json;

use frameplan::{
    Aggregator, AggregatorConfig, PhaseDesc, PhaseTable, Scheduler, SchedulerConfig, Task,
    TechniqueTable, WorkItem, Workload,
};

#[derive(Clone, Debug)]
struct BenchArgs {
    producers: u32,
    tasks: u32,
    phases: u32,
    techniques: u32,
    warmup: u32,
    repeats: u32,
    threads: Option<usize>,
    batch_capacity: u32,
    parallel_sort_threshold: usize,
    json: bool,
}

#[derive(Clone, Debug, Default)]
struct RunMetrics {
    submit: Duration,
    consolidate: Duration,
    execute: Duration,
    reset: Duration,
    wall_total: Duration,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    let args = parse_args()?;

    if args.producers == 0 || args.phases == 0 || args.techniques == 0 {
        anyhow::bail!("--producers/--phases/--techniques must be > 0");
    }
    if args.repeats == 0 {
        anyhow::bail!("--repeats must be > 0");
    }

    // every other phase is sorted, starting with the second one
    let phases = PhaseTable::new(
        (0..args.phases)
            .map(|i| {
                let name = format!("phase{i}");
                if i % 2 == 1 {
                    PhaseDesc::sorted(name)
                } else {
                    PhaseDesc::unsorted(name)
                }
            })
            .collect(),
    )?;
    let workload = Workload {
        producers: args.producers,
        tasks_per_producer: args.tasks,
        ..Workload::default()
    };

    let task_bytes = workload.total_tasks() as usize * std::mem::size_of::<Task<WorkItem>>();
    let scheduler_cfg = SchedulerConfig {
        arena_bytes: (4 * task_bytes + (1 << 20)).next_multiple_of(frameplan::CACHE_LINE_SIZE),
        parallel_sort_threshold: args.parallel_sort_threshold,
        ..SchedulerConfig::default()
    };
    let flushes_per_producer = args.tasks.div_ceil(args.batch_capacity.max(1)) + args.phases;
    let aggregator_cfg = AggregatorConfig {
        capacity: args.producers.saturating_mul(flushes_per_producer),
        batch_capacity: args.batch_capacity,
        ..AggregatorConfig::default()
    };

    let pool = frameplan::build_thread_pool(args.threads)?;
    let mut scheduler = Scheduler::new(scheduler_cfg).context("create scheduler")?;
    let mut aggregator =
        Aggregator::new(&scheduler, aggregator_cfg).context("create aggregator")?;

    eprintln!(
        "bench: {repeats} run(s) ({profile} build), producers={producers}, tasks/producer={tasks}, phases={phases}, techniques={techniques}, batch={batch}, threads={threads}",
        repeats = args.repeats,
        profile = if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        producers = args.producers,
        tasks = args.tasks,
        phases = args.phases,
        techniques = args.techniques,
        batch = args.batch_capacity,
        threads = args
            .threads
            .map(|n| n.to_string())
            .unwrap_or_else(|| "auto".to_string()),
    );

    if args.warmup > 0 {
        eprintln!("warmup: {} run(s)", args.warmup);
        for _ in 0..args.warmup {
            let _ = run_once(&args, &mut scheduler, &mut aggregator, &phases, &workload, &pool)?;
        }
    }

    let mut runs = Vec::<RunMetrics>::with_capacity(args.repeats as usize);
    for _ in 0..args.repeats {
        runs.push(run_once(
            &args,
            &mut scheduler,
            &mut aggregator,
            &phases,
            &workload,
            &pool,
        )?);
    }

    report_percentiles(&runs, args.json)
}

fn run_once(
    args: &BenchArgs,
    scheduler: &mut Scheduler<WorkItem>,
    aggregator: &mut Aggregator<WorkItem>,
    phases: &PhaseTable,
    workload: &Workload,
    pool: &rayon::ThreadPool,
) -> anyhow::Result<RunMetrics> {
    let mut m = RunMetrics::default();
    let wall = Instant::now();

    let t0 = Instant::now();
    let submitted = frameplan::submit_workload(aggregator, phases, args.techniques, workload, pool);
    m.submit = t0.elapsed();

    let t1 = Instant::now();
    let consolidated = scheduler
        .consolidate(aggregator, phases, |_| {})
        .context("consolidate")?;
    m.consolidate = t1.elapsed();
    anyhow::ensure!(
        consolidated as u64 == submitted,
        "consolidated {consolidated} of {submitted} submitted tasks"
    );

    let dispatched = Cell::new(0usize);
    let t2 = Instant::now();
    {
        let mut table = TechniqueTable::new();
        for i in 0..args.techniques {
            let dispatched = &dispatched;
            table.register(format!("t{i}"), move |tasks: &[Task<WorkItem>]| {
                dispatched.set(dispatched.get() + std::hint::black_box(tasks).len());
            });
        }
        scheduler
            .execute_all(phases, &mut table)
            .context("execute")?;
    }
    m.execute = t2.elapsed();
    let dispatched = dispatched.get();
    anyhow::ensure!(dispatched == consolidated, "dispatched {dispatched} of {consolidated}");

    let t3 = Instant::now();
    scheduler.reset();
    m.reset = t3.elapsed();

    m.wall_total = wall.elapsed();
    Ok(m)
}

fn parse_args() -> anyhow::Result<BenchArgs> {
    let mut args = std::env::args().skip(1);

    let mut out = BenchArgs {
        producers: 4,
        tasks: 50_000,
        phases: 3,
        techniques: 4,
        warmup: 2,
        repeats: 50,
        threads: None,
        batch_capacity: 1024,
        parallel_sort_threshold: SchedulerConfig::default().parallel_sort_threshold,
        json: false,
    };

    while let Some(a) = args.next() {
        match a.as_str() {
            "--producers" => out.producers = parse_u32(args.next(), "--producers")?,
            "--tasks" => out.tasks = parse_u32(args.next(), "--tasks")?,
            "--phases" => out.phases = parse_u32(args.next(), "--phases")?,
            "--techniques" => out.techniques = parse_u32(args.next(), "--techniques")?,
            "--warmup" => out.warmup = parse_u32(args.next(), "--warmup")?,
            "--repeats" => out.repeats = parse_u32(args.next(), "--repeats")?,
            "--batch-capacity" => {
                out.batch_capacity = parse_u32(args.next(), "--batch-capacity")?
            }
            "--sort-threshold" => {
                out.parallel_sort_threshold = parse_usize(args.next(), "--sort-threshold")?
            }
            "--threads" => out.threads = Some(parse_usize(args.next(), "--threads")?),
            "--json" => out.json = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => anyhow::bail!("unknown arg '{a}' (try --help)"),
        }
    }

    Ok(out)
}

fn print_help() {
    eprintln!(
        r#"frameplan-bench

Runs submit/consolidate/execute cycles repeatedly and reports p50/p90/p99 for each stage.

Usage:
  cargo run -q --release
  cargo run -q --release -- --producers 8 --tasks 100000
  cargo run -q --release -- --threads 2 --json

Args:
  --producers N       (default 4)
  --tasks N           tasks per producer (default 50000)
  --phases N          (default 3; odd phases are sorted)
  --techniques N      (default 4)
  --warmup N          (default 2)
  --repeats N         (default 50)
  --batch-capacity N  tasks per batch (default 1024)
  --sort-threshold N  parallel sort threshold (default 16384)
  --threads N         producer threads (default auto)
  --json              print percentiles as JSON on stdout
"#
    );
}

fn parse_u32(v: Option<String>, flag: &str) -> anyhow::Result<u32> {
    let v = v.ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))?;
    v.parse::<u32>()
        .with_context(|| format!("parse {flag} value '{v}'"))
}

fn parse_usize(v: Option<String>, flag: &str) -> anyhow::Result<usize> {
    let v = v.ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))?;
    v.parse::<usize>()
        .with_context(|| format!("parse {flag} value '{v}'"))
}

fn report_percentiles(runs: &[RunMetrics], as_json: bool) -> anyhow::Result<()> {
    type Getter = fn(&RunMetrics) -> Duration;
    type Field = (&'static str, Getter);

    fn collect(runs: &[RunMetrics], f: Getter) -> Vec<Duration> {
        let mut v = runs.iter().map(f).collect::<Vec<_>>();
        v.sort_unstable();
        v
    }

    fn p(v: &[Duration], p: f64) -> Duration {
        if v.is_empty() {
            return Duration::ZERO;
        }
        let n = v.len();
        let rank = (p * (n as f64)).ceil().clamp(1.0, n as f64) as usize;
        v[rank - 1]
    }

    fn ms(d: Duration) -> f64 {
        d.as_secs_f64() * 1000.0
    }

    let fields: &[Field] = &[
        ("submit", |m| m.submit),
        ("consolidate", |m| m.consolidate),
        ("execute", |m| m.execute),
        ("reset", |m| m.reset),
        ("wall_total", |m| m.wall_total),
    ];

    if as_json {
        let mut report = serde_json::Map::new();
        for (name, getter) in fields {
            let v = collect(runs, *getter);
            report.insert(
                (*name).to_string(),
                json!({
                    "p50_ms": ms(p(&v, 0.50)),
                    "p90_ms": ms(p(&v, 0.90)),
                    "p99_ms": ms(p(&v, 0.99)),
                }),
            );
        }
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    eprintln!("\npercentiles across runs (p50/p90/p99):");
    for (name, getter) in fields {
        let v = collect(runs, *getter);
        eprintln!(
            "  {name:12} p50={p50:>10.3}ms  p90={p90:>10.3}ms  p99={p99:>10.3}ms",
            name = *name,
            p50 = ms(p(&v, 0.50)),
            p90 = ms(p(&v, 0.90)),
            p99 = ms(p(&v, 0.99)),
        );
    }
    Ok(())
}
