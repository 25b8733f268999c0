//! LLM-backed comparison of model summaries.
//!
//! One non-streaming call to the analysis model; if it fails, one retry
//! against the first benchmarked model; if that fails too, a degraded report
//! holding only the raw summaries. Nothing here aborts the benchmark except
//! user cancellation.

use bench_core::analysis::ANALYSIS_TEMPERATURE;
use bench_core::{build_analysis_prompt, ComparisonReport, ModelSummary};
use tokio_util::sync::CancellationToken;

use crate::client::{ChatBackend, ChatRequest};
use crate::errors::{Cancelled, ChatError};

/// Model asked for the comparison when none is configured.
pub const DEFAULT_ANALYSIS_MODEL: &str = "deepseek-v3.1:671b-cloud";

/// Build the comparison report for `summaries`.
pub async fn compare(
    backend: &dyn ChatBackend,
    summaries: Vec<ModelSummary>,
    analysis_model: &str,
    cancel: &CancellationToken,
) -> Result<ComparisonReport, Cancelled> {
    let timestamp = chrono::Utc::now().timestamp();
    tracing::info!(analysis_model, models = summaries.len(), "🤖 Generating LLM-based analysis");

    let prompt = match build_analysis_prompt(&summaries) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::warn!(error = %e, "⚠️ Analysis prompt could not be built");
            return Ok(ComparisonReport::degraded(
                summaries,
                analysis_model,
                e.to_string(),
                timestamp,
            ));
        }
    };

    let mut answered_by = analysis_model.to_string();
    let mut outcome = ask(backend, analysis_model, &prompt, cancel).await?;

    if let Err(e) = &outcome {
        if let Some(fallback) = summaries.first().map(|s| s.model.clone()) {
            tracing::warn!(analysis_model, error = %e, %fallback, "⚠️ Analysis model failed, falling back");
            outcome = ask(backend, &fallback, &prompt, cancel).await?;
            answered_by = fallback;
        }
    }

    let report = match outcome {
        Ok(response) => ComparisonReport::analyzed(summaries, &answered_by, response, timestamp),
        Err(e) => {
            tracing::warn!(error = %e, "⚠️ Analysis generation failed, saving raw summaries");
            return Ok(ComparisonReport::degraded(
                summaries,
                analysis_model,
                e.to_string(),
                timestamp,
            ));
        }
    };

    log_quick_insights(&report);
    Ok(report)
}

/// One analysis call; `Err(Cancelled)` only on user interrupt.
async fn ask(
    backend: &dyn ChatBackend,
    model: &str,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<Result<String, ChatError>, Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    tracing::info!(model, "Using analysis model");

    let request = ChatRequest::user_prompt(model, prompt).with_temperature(ANALYSIS_TEMPERATURE);
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Cancelled),
        response = backend.chat(request) => response,
    };

    match response {
        Err(ChatError::Cancelled) => Err(Cancelled),
        other => Ok(other),
    }
}

fn log_quick_insights(report: &ComparisonReport) {
    match report.analysis.structured_field("ranking") {
        Some(ranking) => {
            tracing::info!(%ranking, "📊 Quick insights");
            if let Some(winner) = report.analysis.structured_field("winner") {
                tracing::info!(%winner, "📊 Winner");
            }
        }
        None => tracing::info!("📊 Analysis generated (see 'readable' field in comparison file)"),
    }
}
