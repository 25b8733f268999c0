//! Benchmark Module
//!
//! Types and pure computations for a single benchmark run.
//!
//! # Workflow
//!
//! 1. Load the dataset ([`dataset`])
//! 2. For each model and item, the executor feeds streamed chunks into a
//!    [`MetricsCollector`] and wraps the outcome in an [`InferenceResult`]
//! 3. [`summarize`] reduces a model's results into a [`ModelSummary`]

pub mod dataset;
pub mod metrics;
pub mod record;
pub mod summary;

pub use dataset::{load_dataset, parse_dataset, DatasetError, DatasetFormat, DatasetItem};
pub use metrics::{estimate_tokens, InferenceStatus, Metrics, MetricsCollector, TOKENS_PER_WORD};
pub use record::InferenceResult;
pub use summary::{
    summarize, summarize_at, CategoryStats, ModelSummary, PerformanceStats, RunConfig,
    UNKNOWN_CATEGORY,
};
