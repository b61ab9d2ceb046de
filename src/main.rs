use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::thread;
use uuid::Uuid;

use adaptivesampler::config::SystemConfig;
use adaptivesampler::interpolate::LinearInterpolator;
use adaptivesampler::policy::StrategyKind;
use adaptivesampler::sampler::{run_strategy, SamplingLoop};
use adaptivesampler::series::{ObservedSeries, TimestampedSample, UniformSeries};
use adaptivesampler::signals::Signal;
use adaptivesampler::summary::RunSummary;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Synthetic signals to replay (all of them when no input is given)
    #[arg(short, long, value_enum)]
    signal: Vec<Signal>,

    /// JSON files holding an array of {"timestamp", "value"} objects
    #[arg(short, long)]
    input: Vec<PathBuf>,

    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Strategies to compare (default: all)
    #[arg(long, value_enum, value_delimiter = ',')]
    strategy: Vec<StrategyKind>,

    /// Also sample all inputs jointly through the fused tracker
    #[arg(long, default_value_t = false)]
    fused: bool,

    /// Write a JSON report with summaries and observed series
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker threads (default: available logical CPUs)
    #[arg(long)]
    workers: Option<usize>,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Serialize)]
struct Report {
    run_id: String,
    started: DateTime<Utc>,
    config: SystemConfig,
    summaries: Vec<RunSummary>,
    series: Vec<ObservedSeries>,
}

type StreamResult = (RunSummary, ObservedSeries);

/// Logical CPUs available to this process (hyperthreads included). Stands
/// in for a physical core count when sizing the worker pool.
fn logical_core_count() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn load_series(path: &Path) -> Result<UniformSeries> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let samples: Vec<TimestampedSample> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("input").to_string();
    UniformSeries::from_irregular(name, &samples, &LinearInterpolator)
        .with_context(|| format!("regularizing {}", path.display()))
}

/// Runs every strategy on one stream. A failed strategy is logged and
/// skipped; the others still report.
fn run_stream(series: &UniformSeries, config: &SystemConfig, strategies: &[StrategyKind]) -> Vec<StreamResult> {
    strategies.iter().filter_map(|&kind| {
        match run_strategy(series, config, kind) {
            Ok(observed) => Some((RunSummary::from_run(series, &observed), observed)),
            Err(e) => {
                warn!("[{}] {} failed: {}", series.name(), kind.name(), e);
                None
            }
        }
    }).collect()
}

/// Fans streams out over scoped worker threads. Each stream builds its own
/// controllers, nothing mutable is shared.
fn run_all(streams: &[UniformSeries], config: &SystemConfig, strategies: &[StrategyKind], workers: usize) -> Vec<StreamResult> {
    let workers = workers.clamp(1, streams.len().max(1));
    let chunk = streams.len().div_ceil(workers).max(1);
    info!("Running {} streams x {} strategies on {} workers", streams.len(), strategies.len(), workers);

    thread::scope(|scope| {
        let handles: Vec<_> = streams.chunks(chunk)
            .map(|part| scope.spawn(move || {
                part.iter().flat_map(|s| run_stream(s, config, strategies)).collect::<Vec<_>>()
            }))
            .collect();
        handles.into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|_| {
                warn!("Worker panicked, its streams are skipped");
                Vec::new()
            }))
            .collect()
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(level)
        .parse_default_env()
        .init();

    let started = Utc::now();
    let run_id = Uuid::new_v4().to_string();
    info!("=== Adaptive Sampler {} ===", env!("CARGO_PKG_VERSION"));
    info!("Run: {}", run_id);

    let config = match &args.config {
        Some(path) => SystemConfig::from_json_file(path)?,
        None => SystemConfig::default(),
    };
    info!("Controller: mode={:?}, initial={}ms, window={}, nyquist_window={}",
          config.controller.mode(), config.controller.initial_interval_ms,
          config.controller.window_size, config.controller.nyquist_window);

    let mut streams = Vec::new();
    for path in &args.input {
        streams.push(load_series(path)?);
    }
    let signals = if args.signal.is_empty() && args.input.is_empty() {
        <Signal as clap::ValueEnum>::value_variants().to_vec()
    } else {
        args.signal.clone()
    };
    for signal in signals {
        streams.push(signal.series()?);
    }
    if streams.is_empty() {
        bail!("no input streams");
    }

    let strategies = if args.strategy.is_empty() {
        vec![StrategyKind::Fixed, StrategyKind::Baseline, StrategyKind::Chameleon]
    } else {
        args.strategy.clone()
    };

    let workers = args.workers.unwrap_or_else(logical_core_count);
    let mut results = run_all(&streams, &config, &strategies, workers);

    if args.fused {
        let sampler = SamplingLoop::new(config.sampling.artificial_cutoff);
        match sampler.run_fused(&streams, &config) {
            Ok(observed) => {
                let longest = streams.iter().max_by_key(|s| s.len()).unwrap_or(&streams[0]);
                let mut summary = RunSummary::from_run(longest, &observed);
                summary.source = streams.iter().map(|s| s.name()).collect::<Vec<_>>().join("+");
                results.push((summary, observed));
            }
            Err(e) => warn!("Fused run failed: {}", e),
        }
    }

    for (summary, _) in &results {
        info!("{}", summary);
    }

    if let Some(path) = &args.output {
        let (summaries, series): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        let report = Report { run_id, started, config, summaries, series };
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    info!("Done in {}ms.", (Utc::now() - started).num_milliseconds());
    Ok(())
}
