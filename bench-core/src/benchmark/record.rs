//! Result record for one (model, dataset item) pair

use crate::benchmark::dataset::DatasetItem;
use crate::benchmark::metrics::Metrics;
use serde::{Deserialize, Serialize};

/// Outcome of benchmarking one dataset item against one model.
///
/// Created once by the executor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub id: String,
    pub model: String,
    pub prompt: String,
    /// Generated text; `None` when every attempt failed
    pub output: Option<String>,
    pub category: Option<String>,
    pub metrics: Metrics,
}

impl InferenceResult {
    /// Record a successful generation for `item`.
    pub fn success(model: &str, item: &DatasetItem, output: String, metrics: Metrics) -> Self {
        Self {
            id: item.id.clone(),
            model: model.to_string(),
            prompt: item.prompt.clone(),
            output: Some(output),
            category: item.category.clone(),
            metrics,
        }
    }

    /// Record a failed item; the metrics must describe the failure.
    pub fn failure(model: &str, item: &DatasetItem, metrics: Metrics) -> Self {
        Self {
            id: item.id.clone(),
            model: model.to_string(),
            prompt: item.prompt.clone(),
            output: None,
            category: item.category.clone(),
            metrics,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.metrics.is_success()
    }

    /// Category used for grouping; see [`crate::benchmark::UNKNOWN_CATEGORY`].
    pub fn category_or_unknown(&self) -> &str {
        self.category
            .as_deref()
            .unwrap_or(crate::benchmark::summary::UNKNOWN_CATEGORY)
    }
}
