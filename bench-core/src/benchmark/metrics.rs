//! Per-request inference metrics
//!
//! [`MetricsCollector`] observes the chunks of one streamed completion and
//! turns their arrival times into a [`Metrics`] record: time to first token,
//! total duration, estimated token count and throughput.
//!
//! The collector reads the tokio clock, so tests running under a paused
//! runtime get exact, repeatable timings.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Words-to-tokens ratio used to estimate output tokens.
///
/// The chat stream does not report token counts, so the output length is
/// approximated as `round(words * 1.3)`, a common ratio for English text.
/// This is a heuristic, not a tokenizer count: models may split words
/// differently. It is applied identically to every model, which keeps TPS
/// figures comparable across a run.
pub const TOKENS_PER_WORD: f64 = 1.3;

/// Terminal status of one inference request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceStatus {
    Success,
    Error,
}

impl std::fmt::Display for InferenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Timing and throughput statistics for a single inference request.
///
/// `error` is set exactly when `status` is [`InferenceStatus::Error`]; use
/// [`Metrics::failure`] to build failure records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Wall-clock seconds from request start to end of stream
    pub duration: f64,
    /// Seconds until the first chunk arrived (0 when none did)
    pub ttft: f64,
    /// Estimated output tokens, see [`TOKENS_PER_WORD`]
    pub output_tokens: u64,
    /// Whitespace-separated words in the output
    #[serde(default)]
    pub output_words: u64,
    /// Number of streamed fragments received
    #[serde(default)]
    pub chunk_count: u64,
    /// Estimated tokens over total duration
    pub tokens_per_second: f64,
    /// Tokens after the first over the time spent decoding them
    #[serde(default)]
    pub decode_tps: f64,
    /// Peak resident memory of the harness process during the request, in MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_memory_mb: Option<f64>,
    /// Resident memory change across the request, in MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_delta_mb: Option<f64>,
    pub status: InferenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Metrics {
    /// Build a success record from raw timings.
    ///
    /// Durations are rounded to milliseconds and rates to two decimals, the
    /// precision used in result files and reports.
    pub fn from_timings(duration: f64, ttft: f64, output: &str, chunk_count: u64) -> Self {
        let output_words = output.split_whitespace().count() as u64;
        let output_tokens = estimate_tokens(output_words);
        let duration = round_to(duration, 3);
        let ttft = round_to(ttft, 3);

        Self {
            duration,
            ttft,
            output_tokens,
            output_words,
            chunk_count,
            tokens_per_second: round_to(tokens_per_second(output_tokens, duration), 2),
            decode_tps: round_to(decode_tokens_per_second(output_tokens, duration, ttft), 2),
            peak_memory_mb: None,
            memory_delta_mb: None,
            status: InferenceStatus::Success,
            error: None,
        }
    }

    /// Build a failure record carrying a human-readable error.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            duration: 0.0,
            ttft: 0.0,
            output_tokens: 0,
            output_words: 0,
            chunk_count: 0,
            tokens_per_second: 0.0,
            decode_tps: 0.0,
            peak_memory_mb: None,
            memory_delta_mb: None,
            status: InferenceStatus::Error,
            error: Some(error.into()),
        }
    }

    /// Attach memory readings (either may be unavailable on this platform).
    pub fn with_memory(mut self, peak_mb: Option<f64>, delta_mb: Option<f64>) -> Self {
        self.peak_memory_mb = peak_mb.map(|v| round_to(v, 2));
        self.memory_delta_mb = delta_mb.map(|v| round_to(v, 2));
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == InferenceStatus::Success
    }
}

/// Estimate output tokens from a word count, see [`TOKENS_PER_WORD`].
pub fn estimate_tokens(words: u64) -> u64 {
    (words as f64 * TOKENS_PER_WORD).round() as u64
}

/// Overall throughput; 0 when `duration` is not positive.
pub fn tokens_per_second(tokens: u64, duration: f64) -> f64 {
    if duration > 0.0 {
        tokens as f64 / duration
    } else {
        0.0
    }
}

/// Throughput of the decode phase, excluding the first-token delay.
///
/// 0 when fewer than two tokens were produced or no time was spent after
/// the first token.
pub fn decode_tokens_per_second(tokens: u64, duration: f64, ttft: f64) -> f64 {
    let decode_duration = duration - ttft;
    if tokens > 1 && decode_duration > 0.0 {
        (tokens - 1) as f64 / decode_duration
    } else {
        0.0
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Accumulates the chunks of one streamed response.
#[derive(Debug)]
pub struct MetricsCollector {
    started: Instant,
    first_chunk: Option<Instant>,
    output: String,
    chunk_count: u64,
}

impl MetricsCollector {
    /// Start measuring now.
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self {
            started,
            first_chunk: None,
            output: String::new(),
            chunk_count: 0,
        }
    }

    /// Record a fragment received now.
    pub fn record_chunk(&mut self, fragment: &str) {
        self.record_chunk_at(fragment, Instant::now());
    }

    pub fn record_chunk_at(&mut self, fragment: &str, at: Instant) {
        if self.first_chunk.is_none() {
            self.first_chunk = Some(at);
        }
        self.output.push_str(fragment);
        self.chunk_count += 1;
    }

    /// Text accumulated so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    /// Seconds from start to the first chunk, if one arrived.
    pub fn ttft(&self) -> Option<f64> {
        self.first_chunk
            .map(|t| t.duration_since(self.started).as_secs_f64())
    }

    /// Stop measuring now; returns the full output and its metrics.
    pub fn finish(self) -> (String, Metrics) {
        self.finish_at(Instant::now())
    }

    pub fn finish_at(self, ended: Instant) -> (String, Metrics) {
        let duration = ended.duration_since(self.started).as_secs_f64();
        let ttft = self.ttft().unwrap_or(0.0);
        let metrics = Metrics::from_timings(duration, ttft, &self.output, self.chunk_count);
        (self.output, metrics)
    }
}
