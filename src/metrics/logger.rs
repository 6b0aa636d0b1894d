use super::MetricSnapshot;
use super::analyzer::RunReport;
use crate::history::LogEntry;
use anyhow::Result;
use std::fs;
use std::path::PathBuf;

/// Everything one run leaves on disk, keyed by run name and timestamp.
pub struct ExportedPaths {
    pub metrics: PathBuf,
    pub logs: PathBuf,
    pub report: PathBuf,
}

/// Writes a finished run's artifacts under a results directory: the metric
/// history and the log buffer as CSV, the analyzed report as JSON. One
/// exporter per run; the timestamp is fixed at construction so the three
/// files share a prefix.
pub struct RunExporter {
    dir: PathBuf,
    prefix: String,
}

impl RunExporter {
    pub fn new(dir: impl Into<PathBuf>, run_name: &str) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        Self {
            dir: dir.into(),
            prefix: format!("{run_name}_{stamp}"),
        }
    }

    pub fn export(
        &self,
        history: &[MetricSnapshot],
        logs: &[LogEntry],
        report: &RunReport,
    ) -> Result<ExportedPaths> {
        fs::create_dir_all(&self.dir)?;

        let metrics = self.dir.join(format!("{}.csv", self.prefix));
        let mut writer = csv::Writer::from_path(&metrics)?;
        for snapshot in history {
            writer.serialize(snapshot)?;
        }
        writer.flush()?;

        let logs_path = self.dir.join(format!("{}_logs.csv", self.prefix));
        let mut writer = csv::Writer::from_path(&logs_path)?;
        for entry in logs {
            writer.serialize(entry)?;
        }
        writer.flush()?;

        let report_path = self.dir.join(format!("{}_report.json", self.prefix));
        fs::write(&report_path, serde_json::to_string_pretty(report)?)?;

        Ok(ExportedPaths {
            metrics,
            logs: logs_path,
            report: report_path,
        })
    }
}
