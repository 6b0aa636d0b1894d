use super::MetricSnapshot;
use crate::history::{LogEntry, Severity};
use serde::{Deserialize, Serialize};

/// Summary of one completed run, suitable for JSON export and tabular
/// comparison across configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub name: String,
    pub mode: String,
    pub ticks: u64,
    pub avg_throughput: f64,
    pub avg_latency: f64,
    pub avg_system_load: f64,
    pub peak_system_load: f64,
    pub data_processed: f64,
    pub failures: u32,
    pub recoveries: u32,
    pub completed: bool,
}

pub fn analyze(
    name: &str,
    mode: &str,
    snapshots: &[MetricSnapshot],
    logs: &[LogEntry],
    completed: bool,
) -> RunReport {
    let n = snapshots.len().max(1) as f64;
    let avg = |f: fn(&MetricSnapshot) -> f64| snapshots.iter().map(f).sum::<f64>() / n;

    RunReport {
        name: name.to_string(),
        mode: mode.to_string(),
        ticks: snapshots.last().map(|s| s.tick).unwrap_or(0),
        avg_throughput: avg(|s| s.throughput),
        avg_latency: avg(|s| s.latency),
        avg_system_load: avg(|s| s.system_load),
        peak_system_load: snapshots
            .iter()
            .map(|s| s.system_load)
            .fold(0.0, f64::max),
        data_processed: snapshots.last().map(|s| s.data_processed).unwrap_or(0.0),
        failures: logs
            .iter()
            .filter(|l| l.severity == Severity::Error)
            .count() as u32,
        recoveries: logs
            .iter()
            .filter(|l| l.severity == Severity::Success && l.message.contains("Recovery"))
            .count() as u32,
        completed,
    }
}

pub fn comparison_table(reports: &[RunReport]) {
    println!();
    println!(
        "{:<22} {:>12} {:>12} {:>10} {:>10} {:>6}",
        "Run", "Thrpt", "Latency", "Load", "Peak", "Done"
    );
    println!("{}", "-".repeat(76));
    for report in reports {
        println!(
            "{:<22} {:>12.1} {:>12.1} {:>9.1}% {:>9.1}% {:>6}",
            report.name,
            report.avg_throughput,
            report.avg_latency,
            report.avg_system_load,
            report.peak_system_load,
            if report.completed { "yes" } else { "no" },
        );
    }
    println!();

    if let Some(best) = reports.iter().max_by(|a, b| {
        a.avg_throughput
            .partial_cmp(&b.avg_throughput)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        println!("Top throughput: {} ({:.1})", best.name, best.avg_throughput);
    }
    if let Some(best) = reports.iter().min_by(|a, b| {
        a.avg_latency
            .partial_cmp(&b.avg_latency)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        println!("Lowest latency: {} ({:.1} ms)", best.name, best.avg_latency);
    }
    println!();
}
