use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pose_graph_eval::config::AggregationConfig;
use pose_graph_eval::evaluation::{calculate_metrics, normalize_metrics, MetricsSink, TracingSink};
use pose_graph_eval::io;
use pose_graph_eval::optimizer::{Aggregator, GraphOptimizer};

const USAGE: &str = "usage: pose-graph-eval <measurements.csv>... --gt <ground_truth.csv> \
[--id <trajectory_id>] [--config <config.toml>] [--rpe full|<offsets>] [--out <trajectory.csv>]";

#[derive(Debug, Default)]
struct Args {
    measurements: Vec<PathBuf>,
    ground_truth: Option<PathBuf>,
    trajectory_id: Option<String>,
    config: Option<PathBuf>,
    rpe: Option<String>,
    output: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| it.next().ok_or_else(|| anyhow!("{flag} needs a value"));
        match arg.as_str() {
            "--gt" => args.ground_truth = Some(value("--gt")?.into()),
            "--id" => args.trajectory_id = Some(value("--id")?),
            "--config" => args.config = Some(value("--config")?.into()),
            "--rpe" => args.rpe = Some(value("--rpe")?),
            "--out" => args.output = Some(value("--out")?.into()),
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            path => args.measurements.push(path.into()),
        }
    }
    if args.measurements.is_empty() {
        bail!(USAGE);
    }
    Ok(args)
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("pose_graph_eval=info"))
        .map_err(|e| anyhow!("invalid log filter: {e}"))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => AggregationConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AggregationConfig::default(),
    };
    if let Some(rpe) = &args.rpe {
        config.evaluation.rpe_indices = rpe.parse().map_err(|e: String| anyhow!(e))?;
    }

    let mut optimizer = GraphOptimizer::new(config.optimizer.clone(), config.weights.clone());
    for path in &args.measurements {
        let measurements = io::read_measurements(path)?;
        info!(file = %path.display(), rows = measurements.len(), "Appending measurements");
        optimizer
            .append(&measurements)
            .with_context(|| format!("Rejected measurements from {}", path.display()))?;
    }

    let trajectory = optimizer.get_trajectory()?;
    if let Some(report) = optimizer.last_report() {
        println!(
            "Optimized {} poses over {} edges in {} component(s), cost {:.6e} -> {:.6e}",
            report.nodes,
            report.edges,
            report.component_count(),
            report.initial_cost(),
            report.final_cost()
        );
    }

    if let Some(path) = &args.output {
        io::write_trajectory(path, &trajectory)?;
        println!("Trajectory written to {}", path.display());
    }

    let Some(gt_path) = &args.ground_truth else {
        return Ok(());
    };
    let ground_truth = io::read_ground_truth(gt_path)?;
    let id = match &args.trajectory_id {
        Some(id) => id.clone(),
        None if ground_truth.len() == 1 => ground_truth
            .ids()
            .next()
            .map(str::to_string)
            .unwrap_or_default(),
        None => bail!(
            "{} holds {} trajectories, pick one with --id",
            gt_path.display(),
            ground_truth.len()
        ),
    };

    let reference = ground_truth.get(&id)?;
    let record = normalize_metrics(&calculate_metrics(
        reference,
        &trajectory,
        &config.evaluation,
    )?);
    println!("{id}: {record}");
    TracingSink.log_record(&format!("{id}/"), &record);

    Ok(())
}
