mod output;
mod summary;

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::info;

use wta_sim::{
    ConfigError, NativeTraceReader, PolicySet, Simulation, SimulationConfig,
};

use summary::Summary;

#[derive(Debug, Parser)]
#[clap(about = "Replays a workflow trace on a simulated cluster")]
struct Args {
    /// Simulation config in YAML.
    #[clap(short, long)]
    config: String,

    /// Native YAML trace. Overrides the trace path of the config.
    #[clap(short, long)]
    trace: Option<String>,

    /// Directory receiving tasks.tsv, workflows.tsv and summary.tsv.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Task placement policy: best_fit, fastest_machine or look_ahead.
    #[clap(long)]
    placement: Option<String>,

    /// Task order policy: fcfs, sjf or ewf.
    #[clap(long)]
    order: Option<String>,

    /// Log progress every N processed events.
    #[clap(long)]
    progress_interval: Option<u64>,
}

fn main() -> Result<()> {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();

    let mut config = SimulationConfig::from_file(&args.config)?;
    if let Some(placement) = args.placement {
        config.scheduler.task_placement_policy = placement;
    }
    if let Some(order) = args.order {
        config.scheduler.task_order_policy = order;
    }
    let trace_path = args
        .trace
        .or_else(|| config.trace.as_ref().map(|t| t.path.clone()))
        .ok_or(ConfigError::MissingTrace)?;

    let environment = config.build_environment()?;
    let trace = NativeTraceReader::from_file(&trace_path)?.read_trace()?;
    let policies = PolicySet::from_config(&config, &environment)?;
    info!(
        "replaying {} tasks of {} workflows on {} machines ({} cpus), placement {:?}, order {:?}",
        trace.tasks().len(),
        trace.workflows().len(),
        environment.machines().len(),
        environment.total_cpus(),
        policies.placement.kind(),
        policies.order
    );

    let mut sim = Simulation::new(environment, trace, policies.placement, policies.order);
    let progress_interval = args.progress_interval.or(config
        .monitoring
        .as_ref()
        .and_then(|m| m.progress_interval_events));
    if let Some(interval) = progress_interval {
        sim.add_progress_monitor(interval);
    }

    let report = sim.simulate()?;
    sim.task_stats().borrow().sanity_check()?;

    println!("SIMULATION FINISHED AT: {}", report.final_time);
    println!("Processed events: {}", report.processed_events);
    println!("Scheduler passes: {}", report.scheduler_passes);
    println!(
        "Completed {} tasks of {} workflows",
        report.completed_tasks, report.completed_workflows
    );
    println!("Energy consumed: {:.3} Wh", report.energy_consumed);
    println!();

    let trace = sim.trace();
    let trace = trace.borrow();
    let task_stats = sim.task_stats();
    let task_stats = task_stats.borrow();
    let workflow_stats = sim.workflow_stats();
    let workflow_stats = workflow_stats.borrow();

    let summary = Summary::new(&trace, &task_stats, &workflow_stats);
    summary.print();

    if let Some(dir) = args.output {
        std::fs::create_dir_all(&dir)?;
        output::write_tasks(&dir.join("tasks.tsv"), &trace, &task_stats)?;
        output::write_workflows(&dir.join("workflows.tsv"), &trace, &workflow_stats)?;
        summary.write_tsv(&dir.join("summary.tsv"))?;
        info!("results written to {}", dir.display());
    }
    Ok(())
}
