//! Comparison report types and the analysis prompt

use crate::analysis::extract::extract_structured;
use crate::benchmark::summary::ModelSummary;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sampling temperature for the analysis call; kept low for focused output.
pub const ANALYSIS_TEMPERATURE: f32 = 0.3;

/// `readable` text of a report whose analysis call failed.
pub const ANALYSIS_FAILED_TEXT: &str = "Analysis generation failed. See meta.error for details.";

const PROMPT_PREAMBLE: &str = "You are an AI performance analyst. Analyze the following benchmark results and provide insights.

Benchmark Data:
";

const PROMPT_INSTRUCTIONS: &str = "
Please provide:
1. Performance Ranking: Rank models by overall efficiency (consider TPS, TTFT, and consistency)
2. Strengths & Weaknesses: For each model, identify what it does best and worst
3. Use Case Recommendations: Which model is best for which scenario?
4. Key Insights: Any notable patterns or surprising findings
5. Winner: Overall best model and why

Format your response as structured JSON with these keys: ranking, strengths_weaknesses, recommendations, insights, winner
";

/// Build the analysis prompt embedding every summary as pretty JSON.
pub fn build_analysis_prompt(summaries: &[ModelSummary]) -> Result<String, serde_json::Error> {
    let mut prompt = String::from(PROMPT_PREAMBLE);
    for summary in summaries {
        prompt.push('\n');
        prompt.push_str(&serde_json::to_string_pretty(summary)?);
        prompt.push('\n');
    }
    prompt.push_str(PROMPT_INSTRUCTIONS);
    Ok(prompt)
}

/// Provenance of a comparison report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMeta {
    /// Unix seconds
    pub timestamp: i64,
    pub models_compared: Vec<String>,
    /// Model that produced the analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_model: Option<String>,
    /// Model requested for the analysis, set on degraded reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_model_attempted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Analysis text and whatever structure could be recovered from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSection {
    /// Raw analysis response, verbatim
    pub readable: String,
    /// Parsed JSON, `null` when nothing parsed
    pub structured: Option<Value>,
}

impl AnalysisSection {
    /// Keep `text` verbatim and attempt extraction.
    pub fn from_response(text: impl Into<String>) -> Self {
        let readable = text.into();
        let structured = extract_structured(&readable);
        Self {
            readable,
            structured,
        }
    }

    /// Look up a top-level key of the structured analysis.
    pub fn structured_field(&self, key: &str) -> Option<&Value> {
        self.structured.as_ref().and_then(|v| v.as_object()?.get(key))
    }
}

/// Contents of a comparison file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub meta: ComparisonMeta,
    pub summaries: Vec<ModelSummary>,
    pub analysis: AnalysisSection,
}

fn model_names(summaries: &[ModelSummary]) -> Vec<String> {
    summaries.iter().map(|s| s.model.clone()).collect()
}

impl ComparisonReport {
    /// Report for an analysis answered by `analysis_model`.
    pub fn analyzed(
        summaries: Vec<ModelSummary>,
        analysis_model: &str,
        response: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            meta: ComparisonMeta {
                timestamp,
                models_compared: model_names(&summaries),
                analysis_model: Some(analysis_model.to_string()),
                analysis_model_attempted: None,
                error: None,
                note: None,
            },
            summaries,
            analysis: AnalysisSection::from_response(response),
        }
    }

    /// Raw-summaries report used when no analysis could be produced.
    pub fn degraded(
        summaries: Vec<ModelSummary>,
        attempted_model: &str,
        error: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            meta: ComparisonMeta {
                timestamp,
                models_compared: model_names(&summaries),
                analysis_model: None,
                analysis_model_attempted: Some(attempted_model.to_string()),
                error: Some(error.into()),
                note: Some("LLM analysis failed, raw summaries only".to_string()),
            },
            summaries,
            analysis: AnalysisSection {
                readable: ANALYSIS_FAILED_TEXT.to_string(),
                structured: None,
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.meta.error.is_some()
    }
}
