//! Comparison analysis
//!
//! Types for the cross-model comparison file plus the two pure halves of the
//! analysis step: building the prompt sent to the analysis model, and
//! pulling structured JSON back out of its free-text answer.
//!
//! ```text
//! [ModelSummary] → build_analysis_prompt → (analysis model) → text
//!                                                              ↓
//!                                    ExtractionChain: json fence → any fence → whole text
//!                                                              ↓
//!                                   ComparisonReport { readable, structured }
//! ```

pub mod extract;
pub mod report;

pub use extract::{extract_structured, ExtractionChain, ExtractionStrategy};
pub use report::{
    build_analysis_prompt, AnalysisSection, ComparisonMeta, ComparisonReport,
    ANALYSIS_FAILED_TEXT, ANALYSIS_TEMPERATURE,
};
