//! Best-effort structured extraction from free-text model output
//!
//! The analysis model is asked for JSON but answers in whatever shape it
//! likes: a ```` ```json ```` block, an untagged fence, bare JSON, or prose.
//! An [`ExtractionChain`] tries each [`ExtractionStrategy`] in order and
//! returns the first value that parses. Finding nothing is a normal outcome.
//!
//! ```text
//! text
//!   ├─ fenced block tagged `json` parses → Some(value)
//!   ├─ any fenced block parses          → Some(value)
//!   ├─ whole text parses                → Some(value)
//!   └─ nothing parses                   → None
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// A fenced block: optional info string on the opening line, then the body.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());

/// Leading info string of a fence body (`json`, `JSON`, `js`, ...).
///
/// The tag ends at whitespace or directly at an opening `{` or `[`, which
/// stays in the content.
static INFO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9_+.-]*)(?:[ \t]*\r?\n|[ \t]+|[{\[])").unwrap()
});

/// One way of locating a JSON document inside text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// A fenced block whose info string is `json`
    TaggedFence,
    /// Any fenced block, with its info string (if any) dropped
    AnyFence,
    /// The whole response as one document
    WholeText,
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaggedFence => write!(f, "tagged_fence"),
            Self::AnyFence => write!(f, "any_fence"),
            Self::WholeText => write!(f, "whole_text"),
        }
    }
}

/// A fenced block split into its info string and content.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FencedBlock<'a> {
    tag: Option<&'a str>,
    content: &'a str,
    raw: &'a str,
}

fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    FENCE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            let raw = m.as_str();
            match INFO_RE.captures(raw) {
                Some(info) => {
                    let tag_end = info.get(1).map_or(0, |t| t.end());
                    let whole = info.get(0).map_or(0, |w| w.end());
                    // keep a `{` or `[` that ended the tag
                    let whole = if raw[tag_end..whole].trim().is_empty() {
                        whole
                    } else {
                        tag_end
                    };
                    FencedBlock {
                        tag: info.get(1).map(|t| t.as_str()),
                        content: &raw[whole..],
                        raw,
                    }
                }
                None => FencedBlock {
                    tag: None,
                    content: raw,
                    raw,
                },
            }
        })
        .collect()
}

fn parse_json(candidate: &str) -> Option<Value> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

impl ExtractionStrategy {
    /// Try this strategy alone.
    pub fn apply(self, text: &str) -> Option<Value> {
        match self {
            Self::TaggedFence => fenced_blocks(text)
                .into_iter()
                .filter(|b| b.tag.is_some_and(|t| t.eq_ignore_ascii_case("json")))
                .find_map(|b| parse_json(b.content)),
            Self::AnyFence => fenced_blocks(text)
                .into_iter()
                .find_map(|b| parse_json(b.content).or_else(|| parse_json(b.raw))),
            Self::WholeText => parse_json(text),
        }
    }
}

/// Ordered list of extraction strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionChain {
    pub strategies: Vec<ExtractionStrategy>,
}

impl Default for ExtractionChain {
    fn default() -> Self {
        Self::new()
            .add_strategy(ExtractionStrategy::TaggedFence)
            .add_strategy(ExtractionStrategy::AnyFence)
            .add_strategy(ExtractionStrategy::WholeText)
    }
}

impl ExtractionChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn add_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Run the strategies in order; the first successful parse wins.
    pub fn execute(&self, text: &str) -> Option<(ExtractionStrategy, Value)> {
        for strategy in &self.strategies {
            match strategy.apply(text) {
                Some(value) => {
                    tracing::debug!(%strategy, "extracted structured analysis");
                    return Some((*strategy, value));
                }
                None => tracing::debug!(%strategy, "no structured analysis found"),
            }
        }
        None
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }
}

/// Extract structured JSON from `text` with the default chain.
pub fn extract_structured(text: &str) -> Option<Value> {
    ExtractionChain::default()
        .execute(text)
        .map(|(_, value)| value)
}
