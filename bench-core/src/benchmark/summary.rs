//! Per-model summary aggregation
//!
//! Reduces a model's [`InferenceResult`]s into a [`ModelSummary`]: counts,
//! success rate, throughput/latency statistics over successful items and a
//! per-category breakdown.

use crate::benchmark::metrics::round_to;
use crate::benchmark::record::InferenceResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket for results whose dataset item had no category.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Generation settings a run was performed with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_tokens: 100,
            temperature: 0.7,
            max_retries: 2,
        }
    }
}

/// Statistics over the successful results of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub avg_tokens_per_second: f64,
    pub min_tokens_per_second: f64,
    pub max_tokens_per_second: f64,
    pub avg_ttft: f64,
    pub min_ttft: f64,
    pub max_ttft: f64,
    pub avg_decode_tps: f64,
    pub avg_duration: f64,
    pub avg_output_tokens: f64,
    pub total_tokens_generated: u64,
    pub total_time_spent: f64,
}

/// Successful results within one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub count: usize,
    pub avg_tps: f64,
}

/// Aggregated view of one model's benchmark run.
///
/// `performance` and `category_breakdown` are both absent when no item
/// succeeded: that means "no data", not "zero throughput".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model: String,
    /// Unix seconds at which the summary was computed
    pub timestamp: i64,
    pub config: RunConfig,
    pub total_items: usize,
    pub successful: usize,
    pub failed: usize,
    /// `successful / total_items`, 0 for an empty run
    pub success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_breakdown: Option<BTreeMap<String, CategoryStats>>,
}

/// Summarize a model's results, stamped with the current time.
///
/// Returns the summary and the ids of the failed items, in dataset order.
pub fn summarize(
    model: &str,
    results: &[InferenceResult],
    config: RunConfig,
) -> (ModelSummary, Vec<String>) {
    summarize_at(model, results, config, chrono::Utc::now().timestamp())
}

/// [`summarize`] with an explicit timestamp.
pub fn summarize_at(
    model: &str,
    results: &[InferenceResult],
    config: RunConfig,
    timestamp: i64,
) -> (ModelSummary, Vec<String>) {
    let (successful, failed): (Vec<&InferenceResult>, Vec<&InferenceResult>) =
        results.iter().partition(|r| r.succeeded());

    let failed_items: Vec<String> = failed.iter().map(|r| r.id.clone()).collect();

    let success_rate = if results.is_empty() {
        0.0
    } else {
        successful.len() as f64 / results.len() as f64
    };

    let (performance, category_breakdown) = if successful.is_empty() {
        (None, None)
    } else {
        (
            Some(performance_stats(&successful)),
            Some(category_breakdown(&successful)),
        )
    };

    let summary = ModelSummary {
        model: model.to_string(),
        timestamp,
        config,
        total_items: results.len(),
        successful: successful.len(),
        failed: failed_items.len(),
        success_rate,
        performance,
        category_breakdown,
    };

    (summary, failed_items)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Caller guarantees `successful` is non-empty.
fn performance_stats(successful: &[&InferenceResult]) -> PerformanceStats {
    let tps: Vec<f64> = successful
        .iter()
        .map(|r| r.metrics.tokens_per_second)
        .collect();
    let ttft: Vec<f64> = successful.iter().map(|r| r.metrics.ttft).collect();
    let decode: Vec<f64> = successful.iter().map(|r| r.metrics.decode_tps).collect();
    let durations: Vec<f64> = successful.iter().map(|r| r.metrics.duration).collect();
    let tokens: Vec<f64> = successful
        .iter()
        .map(|r| r.metrics.output_tokens as f64)
        .collect();

    PerformanceStats {
        avg_tokens_per_second: round_to(mean(&tps), 2),
        min_tokens_per_second: round_to(min(&tps), 2),
        max_tokens_per_second: round_to(max(&tps), 2),
        avg_ttft: round_to(mean(&ttft), 3),
        min_ttft: round_to(min(&ttft), 3),
        max_ttft: round_to(max(&ttft), 3),
        avg_decode_tps: round_to(mean(&decode), 2),
        avg_duration: round_to(mean(&durations), 3),
        avg_output_tokens: round_to(mean(&tokens), 1),
        total_tokens_generated: successful.iter().map(|r| r.metrics.output_tokens).sum(),
        total_time_spent: round_to(durations.iter().sum(), 2),
    }
}

fn category_breakdown(successful: &[&InferenceResult]) -> BTreeMap<String, CategoryStats> {
    let mut buckets: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for result in successful {
        buckets
            .entry(result.category_or_unknown().to_string())
            .or_default()
            .push(result.metrics.tokens_per_second);
    }

    buckets
        .into_iter()
        .map(|(category, tps)| {
            let stats = CategoryStats {
                count: tps.len(),
                avg_tps: round_to(mean(&tps), 2),
            };
            (category, stats)
        })
        .collect()
}

impl ModelSummary {
    /// Format as a console report.
    pub fn format_report(&self, failed_items: &[String]) -> String {
        let rule = "─".repeat(60);
        let mut report = String::new();

        report.push_str(&format!("{rule}\nSummary for {}:\n{rule}\n", self.model));
        report.push_str(&format!(
            "Total Items:     {}\n\
             Successful:      {}\n\
             Failed:          {}\n",
            self.total_items, self.successful, self.failed
        ));

        if let Some(perf) = &self.performance {
            report.push_str(&format!(
                "Avg TPS:         {:.2} tokens/sec\n\
                 \x20 Range:         {:.2} - {:.2}\n\
                 Avg Decode TPS:  {:.2} tokens/sec\n\
                 Avg TTFT:        {:.3} sec\n\
                 \x20 Range:         {:.3} - {:.3}\n\
                 Success Rate:    {:.1}%\n\
                 Total Tokens:    {}\n",
                perf.avg_tokens_per_second,
                perf.min_tokens_per_second,
                perf.max_tokens_per_second,
                perf.avg_decode_tps,
                perf.avg_ttft,
                perf.min_ttft,
                perf.max_ttft,
                self.success_rate * 100.0,
                perf.total_tokens_generated
            ));
        }

        if let Some(categories) = &self.category_breakdown {
            report.push_str("\n| Category | Count | Avg TPS |\n|----------|-------|---------|\n");
            for (category, stats) in categories {
                report.push_str(&format!(
                    "| {} | {} | {:.2} |\n",
                    category, stats.count, stats.avg_tps
                ));
            }
        }

        if !failed_items.is_empty() {
            report.push_str(&format!("\nFailed items: {}\n", failed_items.join(", ")));
        }

        report
    }

    /// Get the summary as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
