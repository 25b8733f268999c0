//! Benchmark session orchestration.
//!
//! ```text
//! check_connection()            service down → BenchError::ServiceUnavailable
//! for model in models:
//!   runner.run_model()          unavailable → skipped
//!   summarize()
//!   save_model_run()            result file first,
//!   append_csv_row()            then the CSV row
//!   print report
//! if ≥2 summaries:
//!   analysis::compare() → save_comparison()
//! print final tally
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use bench_core::{
    append_csv_row, save_comparison, save_model_run, summarize, DatasetItem, ModelSummary,
    RunConfig,
};
use tokio_util::sync::CancellationToken;

use crate::analysis;
use crate::client::ChatBackend;
use crate::config::BenchConfig;
use crate::errors::{BenchError, Cancelled};
use crate::executor::Executor;
use crate::runner::{BenchmarkRunner, ModelRun};

/// What a finished session produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// Models requested, in order
    pub models_requested: Vec<String>,
    /// Models skipped by verification
    pub skipped: Vec<String>,
    /// One summary per completed model, in run order
    pub summaries: Vec<ModelSummary>,
    /// Inference results across all completed models
    pub total_runs: usize,
    pub result_files: Vec<PathBuf>,
    pub csv_path: PathBuf,
    pub comparison_path: Option<PathBuf>,
}

impl SessionOutcome {
    /// Console tally printed at the end of a session.
    pub fn format_tally(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = format!(
            "\n{rule}\n✅ All Benchmarks Complete!\n{rule}\n\
             Models Tested:   {}\n\
             Total Runs:      {}\n",
            self.models_requested.len(),
            self.total_runs
        );
        if !self.skipped.is_empty() {
            out.push_str(&format!("Skipped:         {}\n", self.skipped.join(", ")));
        }
        out.push_str(&format!("\n📊 Summary log:  {}\n", self.csv_path.display()));
        if let Some(path) = &self.comparison_path {
            out.push_str(&format!("🤖 Comparison:   {}\n", path.display()));
        }
        out
    }
}

/// Runs every selected model over one dataset and persists the outcome.
pub struct BenchmarkSession {
    backend: Arc<dyn ChatBackend>,
    runner: BenchmarkRunner,
    config: BenchConfig,
    run_config: RunConfig,
    models: Vec<String>,
    cancel: CancellationToken,
}

impl BenchmarkSession {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        config: BenchConfig,
        run_config: RunConfig,
        models: Vec<String>,
        cancel: CancellationToken,
    ) -> Self {
        let executor =
            Executor::new(backend.clone(), cancel.clone()).with_backoff(config.retry_backoff());
        let runner = BenchmarkRunner::new(backend.clone(), executor, cancel.clone());
        Self {
            backend,
            runner,
            config,
            run_config,
            models,
            cancel,
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Fail fast when the inference service cannot be reached at all.
    pub async fn check_connection(&self) -> Result<(), BenchError> {
        if self.cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        let listed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Cancelled.into()),
            listed = self.backend.list_models() => listed,
        };
        match listed {
            Ok(models) => {
                tracing::debug!(installed = models.len(), "Inference service reachable");
                Ok(())
            }
            Err(e) => {
                tracing::error!(host = %self.config.host, error = %e, "❌ Cannot connect to inference service, is `ollama serve` running?");
                Err(BenchError::ServiceUnavailable(e))
            }
        }
    }

    /// Benchmark every model over `dataset`.
    pub async fn run(&self, dataset: &[DatasetItem]) -> Result<SessionOutcome, BenchError> {
        self.check_connection().await?;

        if self.models.len() > 1 {
            tracing::info!(models = %self.models.join(", "), "🔬 Testing {} models", self.models.len());
        }

        let csv_path = self.config.csv_path();
        let mut outcome = SessionOutcome {
            models_requested: self.models.clone(),
            skipped: Vec::new(),
            summaries: Vec::new(),
            total_runs: 0,
            result_files: Vec::new(),
            csv_path: csv_path.clone(),
            comparison_path: None,
        };

        for model in &self.models {
            let results = match self.runner.run_model(model, dataset, &self.run_config).await? {
                ModelRun::Completed(results) => results,
                ModelRun::Unavailable { .. } => {
                    outcome.skipped.push(model.clone());
                    continue;
                }
            };

            let (summary, failed_items) = summarize(model, &results, self.run_config);
            let result_file = save_model_run(&self.config.results_dir, &summary, &results)?;
            append_csv_row(&csv_path, &summary)?;

            println!("\n{}", summary.format_report(&failed_items));
            println!("📁 Results saved: {}", result_file.display());

            outcome.total_runs += results.len();
            outcome.result_files.push(result_file);
            outcome.summaries.push(summary);
        }

        if outcome.summaries.len() > 1 {
            let report = analysis::compare(
                self.backend.as_ref(),
                outcome.summaries.clone(),
                &self.config.analysis_model,
                &self.cancel,
            )
            .await?;
            let path = save_comparison(&self.config.results_dir, &report)?;
            if report.is_degraded() {
                println!("📁 Raw summaries saved: {}", path.display());
            } else {
                println!("✅ Analysis saved: {}", path.display());
            }
            outcome.comparison_path = Some(path);
        }

        println!("{}", outcome.format_tally());
        Ok(outcome)
    }
}
