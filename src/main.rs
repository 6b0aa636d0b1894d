use pipesim::metrics::analyzer::{self, RunReport};
use pipesim::metrics::logger::RunExporter;
use pipesim::prelude::*;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tracing::{Level, info};

use tracing_subscriber;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(short, long, default_value = "pipeline")]
        name: String,
        #[arg(short, long, default_value = "stream")]
        mode: String,
        #[arg(short, long, default_value = "basic-etl")]
        archetype: String,
        #[arg(long, default_value_t = 50.0)]
        volume: f64,
        #[arg(short, long, default_value_t = 2)]
        parallelism: u32,
        #[arg(long, default_value_t = 4)]
        partitions: u32,
        #[arg(short, long, default_value_t = 10.0)]
        window: f64,
        #[arg(short, long, default_value_t = 70.0)]
        backpressure: f64,
        #[arg(short, long, default_value_t = 3)]
        compression: u32,
        #[arg(long)]
        no_cache: bool,
        #[arg(short, long)]
        errors: bool,
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        #[arg(long, default_value_t = 500)]
        tick_ms: u64,
        #[arg(long, default_value_t = 300)]
        max_ticks: u64,
        #[arg(long)]
        seed: Option<u64>,
        /// Load the full configuration from a JSON file instead of flags.
        #[arg(long)]
        config: Option<String>,
    },

    /// Re-runs one configuration across a list of backpressure limits and
    /// prints a comparison table.
    Sweep {
        #[arg(short, long, default_value = "20,40,70,90")]
        backpressure: String,
        #[arg(short, long, default_value = "stream")]
        mode: String,
        #[arg(long, default_value_t = 50.0)]
        volume: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    Analyze {
        #[arg(default_value = "results")]
        path: String,
    },

    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let program_start = Instant::now();

    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            name,
            mode,
            archetype,
            volume,
            parallelism,
            partitions,
            window,
            backpressure,
            compression,
            no_cache,
            errors,
            speed,
            tick_ms,
            max_ticks,
            seed,
            config,
        } => {
            let config = match config {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(&path)?)?,
                None => SimConfig {
                    name,
                    mode: parse_mode(&mode)?,
                    archetype: parse_archetype(&archetype)?,
                    data_volume: volume,
                    parallelism,
                    partitions,
                    window_size: window,
                    backpressure_limit: backpressure,
                    compression_level: compression,
                    caching_enabled: !no_cache,
                    error_simulation: errors,
                    speed_multiplier: speed,
                    tick_interval: Duration::from_millis(tick_ms),
                    max_ticks,
                    seed,
                    ..SimConfig::default()
                },
            };
            run_single(config).await?;
        }

        Commands::Sweep {
            backpressure,
            mode,
            volume,
            seed,
        } => {
            sweep_backpressure(&backpressure, &mode, volume, seed, program_start)?;
        }

        Commands::Analyze { path } => {
            analyze_results(&path)?;
        }

        Commands::List => {
            println!("\nAvailable load profiles");

            for profile in ProfileRegistry::global().list() {
                println!("  - {}", profile);
            }

            println!("\nArchetypes: basic-etl, batch-processing, realtime-analytics, predictive-analytics");
            println!("\nUsage: cargo run -- run --mode <profile>");
            println!("Example: cargo run -- run --mode batch --archetype batch-processing\n");
        }
    }

    let total_time = program_start.elapsed();
    info!("Total runtime: {:.2}s", total_time.as_secs_f64());

    Ok(())
}

async fn run_single(config: SimConfig) -> Result<()> {
    info!("PipeSim: Single Run");

    let max_ticks = config.max_ticks;
    let handle = create_run(config)?;

    let bar = ProgressBar::new(max_ticks);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} tick {pos}/{len} {msg}")?,
    );
    let tick_bar = bar.clone();
    handle.subscribe(move |snapshot| {
        tick_bar.set_position(snapshot.tick);
        if let Some(metrics) = &snapshot.metrics {
            tick_bar.set_message(format!(
                "thrpt {:.0} MB/s, load {:.0}%",
                metrics.throughput, metrics.system_load
            ));
        }
        if snapshot.status.is_terminal() {
            tick_bar.finish_with_message("done");
        }
    });

    handle.start();
    while handle.is_running() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if !bar.is_finished() {
        bar.finish();
    }

    save_results(&handle)?;
    Ok(())
}

fn save_results(handle: &RunHandle) -> Result<()> {
    let snapshot = handle.snapshot();
    let metrics = handle.metrics();
    let config = handle.config();

    info!(
        "Run finished: {:?} after {} ticks",
        snapshot.status, snapshot.tick
    );

    let history = metrics.history();
    let logs = metrics.logs();

    let report = analyzer::analyze(
        &config.name,
        config.mode.profile_name(),
        &history,
        &logs,
        snapshot.status == RunStatus::Complete,
    );

    let exporter = RunExporter::new("results", &config.name);
    let paths = exporter.export(&history, &logs, &report)?;
    info!("Metrics saved to: {}", paths.metrics.display());
    info!("Logs saved to: {}", paths.logs.display());
    info!("Report saved to: {}", paths.report.display());

    info!(
        "Processed {:.1} GB, avg throughput {:.1} MB/s, avg latency {:.1} ms",
        report.data_processed, report.avg_throughput, report.avg_latency
    );
    for entry in &logs {
        info!("[tick {:>3}] {:?}: {}", entry.tick, entry.severity, entry.message);
    }

    Ok(())
}

fn sweep_backpressure(
    limits_str: &str,
    mode: &str,
    volume: f64,
    seed: u64,
    global_start: Instant,
) -> Result<()> {
    let limits: Vec<f64> = limits_str
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()?;

    info!("PipeSim: Backpressure Sweep");
    info!("");
    info!("Limits: {}", limits_str);
    info!("Mode: {}", mode);
    info!("");

    let mut reports = Vec::new();

    for limit in limits {
        let elapsed = global_start.elapsed();
        info!(
            "  [{}] Running at limit {} - Elapsed: {:.1}s",
            format_time(elapsed),
            limit,
            elapsed.as_secs_f64()
        );

        let config = SimConfig::default()
            .with_name(format!("limit_{}", limit as u64))
            .with_mode(parse_mode(mode)?)
            .with_volume(volume)
            .with_backpressure(limit)
            .with_seed(seed);
        let name = config.name.clone();
        let mode_name = config.mode.profile_name().to_string();

        let mut run = Run::new(config)?;
        while !run.tick()?.is_terminal() {}

        let report = analyzer::analyze(
            &name,
            &mode_name,
            &run.metrics().history(),
            &run.metrics().logs(),
            run.status() == RunStatus::Complete,
        );
        reports.push(report);
    }

    analyzer::comparison_table(&reports);

    std::fs::create_dir_all("results")?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let comparison_path = format!("results/sweep_{}.json", timestamp);
    std::fs::write(&comparison_path, serde_json::to_string_pretty(&reports)?)?;
    info!("Sweep saved to: {}", comparison_path);

    Ok(())
}

fn analyze_results(path: &str) -> Result<()> {
    use std::fs;

    info!("Analyzing results in: {}", path);

    let mut reports = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let file_path = entry.path();

        if file_path.extension().and_then(|s| s.to_str()) == Some("json") {
            let content = fs::read_to_string(&file_path)?;
            if let Ok(report) = serde_json::from_str::<RunReport>(&content) {
                reports.push(report);
            } else if let Ok(mut batch) = serde_json::from_str::<Vec<RunReport>>(&content) {
                reports.append(&mut batch);
            }
        }
    }

    if reports.is_empty() {
        bail!("No run reports found in {}", path);
    }

    reports.sort_by(|a, b| {
        b.avg_throughput
            .partial_cmp(&a.avg_throughput)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    analyzer::comparison_table(&reports);

    Ok(())
}

fn parse_mode(name: &str) -> Result<Mode> {
    match name.to_lowercase().as_str() {
        "stream" | "streaming" => Ok(Mode::Stream),
        "batch" => Ok(Mode::Batch),
        other => bail!("Unknown mode: {}. Use stream or batch", other),
    }
}

fn parse_archetype(name: &str) -> Result<Archetype> {
    match name.to_lowercase().as_str() {
        "basic-etl" | "etl" => Ok(Archetype::BasicEtl),
        "batch-processing" => Ok(Archetype::BatchProcessing),
        "realtime-analytics" => Ok(Archetype::RealtimeAnalytics),
        "predictive-analytics" => Ok(Archetype::PredictiveAnalytics),
        other => bail!(
            "Unknown archetype: {}. Use basic-etl, batch-processing, realtime-analytics or predictive-analytics",
            other
        ),
    }
}

fn format_time(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
