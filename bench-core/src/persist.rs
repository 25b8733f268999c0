//! Result persistence
//!
//! Three sinks, all under the results directory:
//! - `run_{timestamp}_{model}.json`: summary plus every result of one model run
//! - `benchmark_log.csv`: append-only log, one row per model run
//! - `comparison_{timestamp}.json`: cross-model comparison report
//!
//! JSON files are written to a temp file and renamed into place, so an
//! interrupted run never leaves a truncated file behind.

use crate::analysis::ComparisonReport;
use crate::benchmark::record::InferenceResult;
use crate::benchmark::summary::ModelSummary;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Header of the CSV run log.
pub const CSV_HEADER: &str =
    "timestamp,model,avg_tps,avg_ttft,avg_decode_tps,success_rate,total_items";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Contents of a per-run result file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFile {
    pub summary: ModelSummary,
    pub results: Vec<InferenceResult>,
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let content = std::fs::read_to_string(path).map_err(io_err(path))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Deterministic result-file name for a model run.
///
/// `:` in model tags (`gemma:2b`) is not portable in file names.
pub fn result_file_name(timestamp: i64, model: &str) -> String {
    format!("run_{}_{}.json", timestamp, model.replace([':', '/'], "_"))
}

/// Serialize `value` as pretty JSON to `path` atomically.
///
/// Strategy:
/// 1. Write to `<path>.tmp` and sync it
/// 2. Rename over the final path (atomic on the same filesystem)
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let content = serde_json::to_string_pretty(value)?;
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let write_temp = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()
    };
    if let Err(e) = write_temp() {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_err(&temp_path)(e));
    }

    std::fs::rename(&temp_path, path).map_err(io_err(path))
}

/// Write the result file for one model run; returns its path.
pub fn save_model_run(
    results_dir: &Path,
    summary: &ModelSummary,
    results: &[InferenceResult],
) -> Result<PathBuf, PersistError> {
    let path = results_dir.join(result_file_name(summary.timestamp, &summary.model));

    #[derive(Serialize)]
    struct RunFileRef<'a> {
        summary: &'a ModelSummary,
        results: &'a [InferenceResult],
    }

    write_json_atomic(&path, &RunFileRef { summary, results })?;
    tracing::info!(path = %path.display(), model = %summary.model, "Saved run results");
    Ok(path)
}

/// Write a comparison report; returns its path.
pub fn save_comparison(
    results_dir: &Path,
    report: &ComparisonReport,
) -> Result<PathBuf, PersistError> {
    let path = results_dir.join(format!("comparison_{}.json", report.meta.timestamp));
    write_json_atomic(&path, report)?;
    tracing::info!(path = %path.display(), "Saved comparison report");
    Ok(path)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// CSV row for a summary; `None` when the run produced no performance data.
pub fn csv_row(summary: &ModelSummary) -> Option<String> {
    let perf = summary.performance.as_ref()?;
    Some(format!(
        "{},{},{:.2},{:.3},{:.2},{:.2}%,{}",
        summary.timestamp,
        csv_field(&summary.model),
        perf.avg_tokens_per_second,
        perf.avg_ttft,
        perf.avg_decode_tps,
        summary.success_rate * 100.0,
        summary.total_items
    ))
}

/// Append a summary row to the CSV log, writing the header if the log is new.
///
/// The log is created even for runs without successful items, which have no
/// row. Returns whether a row was written.
pub fn append_csv_row(csv_path: &Path, summary: &ModelSummary) -> Result<bool, PersistError> {
    if let Some(parent) = csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let is_new = !csv_path.exists();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)
        .map_err(io_err(csv_path))?;

    let mut chunk = String::new();
    if is_new {
        chunk.push_str(CSV_HEADER);
        chunk.push('\n');
    }
    let row = csv_row(summary);
    match &row {
        Some(row) => {
            chunk.push_str(row);
            chunk.push('\n');
        }
        None => tracing::debug!(model = %summary.model, "No performance data, skipping CSV row"),
    }

    if !chunk.is_empty() {
        file.write_all(chunk.as_bytes()).map_err(io_err(csv_path))?;
    }
    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::dataset::DatasetItem;
    use crate::benchmark::metrics::Metrics;
    use crate::benchmark::summary::{summarize_at, RunConfig};

    fn sample_results() -> Vec<InferenceResult> {
        let ok = InferenceResult::success(
            "gemma:2b",
            &DatasetItem::new("a", "hi").with_category("chat"),
            "Hello there".into(),
            Metrics::from_timings(0.5, 0.1, "Hello there", 3),
        );
        let failed = InferenceResult::failure(
            "gemma:2b",
            &DatasetItem::new("b", "bye"),
            Metrics::failure("timeout"),
        );
        vec![ok, failed]
    }

    #[test]
    fn test_result_file_name() {
        assert_eq!(result_file_name(1700, "gemma:2b"), "run_1700_gemma_2b.json");
        assert_eq!(result_file_name(1700, "phi3"), "run_1700_phi3.json");
        assert_eq!(
            result_file_name(1, "library/llama3:8b"),
            "run_1_library_llama3_8b.json"
        );
    }

    #[test]
    fn test_save_model_run_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let results = sample_results();
        let (summary, _) = summarize_at("gemma:2b", &results, RunConfig::default(), 1700);

        let path = save_model_run(&dir.path().join("results"), &summary, &results).unwrap();
        assert!(path.ends_with("run_1700_gemma_2b.json"));

        let loaded = RunFile::load(&path).unwrap();
        assert_eq!(loaded.summary, summary);
        assert_eq!(loaded.results, results);

        // no temp file left behind
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_json_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "stale").unwrap();

        write_json_atomic(&path, &serde_json::json!({"fresh": true})).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["fresh"], true);
    }

    #[test]
    fn test_csv_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("results").join("benchmark_log.csv");
        let results = sample_results();
        let (summary, _) = summarize_at("gemma:2b", &results, RunConfig::default(), 1700);

        assert!(append_csv_row(&csv, &summary).unwrap());
        assert!(append_csv_row(&csv, &summary).unwrap());

        let content = std::fs::read_to_string(&csv).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "1700,gemma:2b,6.00,0.100,5.00,50.00%,2");
        assert_eq!(lines[1], lines[2]);
    }

    #[test]
    fn test_run_without_performance_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("benchmark_log.csv");
        let failed = vec![sample_results().remove(1)];
        let (summary, _) = summarize_at("phi3", &failed, RunConfig::default(), 1);

        assert!(!append_csv_row(&csv, &summary).unwrap());
        assert_eq!(std::fs::read_to_string(&csv).unwrap(), format!("{CSV_HEADER}\n"));

        assert!(!append_csv_row(&csv, &summary).unwrap());
        assert_eq!(std::fs::read_to_string(&csv).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("phi3"), "phi3");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_save_comparison() {
        let dir = tempfile::tempdir().unwrap();
        let (summary, _) = summarize_at("phi3", &[], RunConfig::default(), 1);
        let report = ComparisonReport::degraded(vec![summary], "deepseek", "unreachable", 1234);

        let path = save_comparison(dir.path(), &report).unwrap();
        assert!(path.ends_with("comparison_1234.json"));

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: ComparisonReport = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, report);
    }
}
