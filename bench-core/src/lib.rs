//! SLM Bench core library
//!
//! Deterministic building blocks of the efficiency benchmark. Nothing in this
//! crate talks to the network; the inference service lives in `slm-bench`.
//!
//! # Modules
//!
//! - [`benchmark`]: dataset items, per-request metrics, result records and
//!   per-model summaries
//! - [`analysis`]: comparison report types, the analysis prompt and
//!   best-effort structured extraction from free text
//! - [`persist`]: result files, the CSV run log and comparison files
//!
//! # Data flow
//!
//! ```text
//! dataset → (executor) → MetricsCollector → InferenceResult
//!                                               ↓
//!                                          summarize()
//!                                               ↓
//!                     ModelSummary → persist / ComparisonReport
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod analysis;
pub mod benchmark;
pub mod persist;

pub use analysis::{
    build_analysis_prompt, extract_structured, AnalysisSection, ComparisonMeta, ComparisonReport,
    ExtractionChain, ExtractionStrategy,
};
pub use benchmark::{
    estimate_tokens, load_dataset, summarize, summarize_at, CategoryStats, DatasetError,
    DatasetItem, InferenceResult, InferenceStatus, Metrics, MetricsCollector, ModelSummary,
    PerformanceStats, RunConfig, TOKENS_PER_WORD,
};
pub use persist::{
    append_csv_row, result_file_name, save_comparison, save_model_run, write_json_atomic,
    PersistError, RunFile, CSV_HEADER,
};
