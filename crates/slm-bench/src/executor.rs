//! Retrying inference executor.
//!
//! Runs one dataset item against one model, streaming the response through a
//! [`MetricsCollector`]. Each attempt resolves to an [`AttemptOutcome`]; the
//! retry loop branches on that value rather than on unwound errors.
//!
//! ```text
//! execute()
//!   └─ for attempt in 1..=max_retries+1:
//!        ├─ cancelled?        → Err(Cancelled)
//!        ├─ attempt()
//!        │    ├─ Success      → InferenceResult::success
//!        │    ├─ Fatal        → InferenceResult::failure (no retry)
//!        │    └─ Retryable    → backoff (cancellable), next attempt
//!        └─ exhausted         → InferenceResult::failure with the last error
//! ```

use std::sync::Arc;
use std::time::Duration;

use bench_core::{DatasetItem, InferenceResult, Metrics, MetricsCollector, RunConfig};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::client::{ChatBackend, ChatRequest};
use crate::errors::{Cancelled, ChatError, RetryCategory};
use crate::memory::MemorySample;

/// Wait between a retryable failure and the next attempt.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Result of a single inference attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Success { output: String, metrics: Metrics },
    /// Transient failure; another attempt may succeed.
    Retryable(ChatError),
    /// The request itself is unacceptable; retrying cannot help.
    Fatal(ChatError),
}

impl AttemptOutcome {
    fn from_error(error: ChatError) -> Result<Self, Cancelled> {
        match error.retry_category() {
            RetryCategory::Transient => Ok(Self::Retryable(error)),
            RetryCategory::Fatal => Ok(Self::Fatal(error)),
            RetryCategory::Cancelled => Err(Cancelled),
        }
    }
}

/// Executes inference requests with retry and cancellation.
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn ChatBackend>,
    cancel: CancellationToken,
    backoff: Duration,
}

impl Executor {
    pub fn new(backend: Arc<dyn ChatBackend>, cancel: CancellationToken) -> Self {
        Self {
            backend,
            cancel,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run one streamed inference attempt.
    ///
    /// Cancellation is observed before the request and at every chunk boundary.
    pub async fn attempt(
        &self,
        model: &str,
        item: &DatasetItem,
        config: &RunConfig,
    ) -> Result<AttemptOutcome, Cancelled> {
        if self.cancel.is_cancelled() {
            return Err(Cancelled);
        }

        MemorySample::reset_peak();
        let memory_before = MemorySample::now();
        let mut collector = MetricsCollector::start();
        let request = ChatRequest::user_prompt(model, item.prompt.clone())
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature);

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Cancelled),
            opened = self.backend.chat_stream(request) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return AttemptOutcome::from_error(e),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(fragment)) => collector.record_chunk(&fragment),
                Some(Err(e)) => return AttemptOutcome::from_error(e),
                None => break,
            }
        }

        let (output, metrics) = collector.finish();
        let memory_after = MemorySample::now();
        let metrics = metrics.with_memory(
            memory_after.peak_mb,
            memory_after.delta_since(&memory_before),
        );

        Ok(AttemptOutcome::Success { output, metrics })
    }

    /// Run `item` against `model` with up to `max_retries + 1` attempts.
    ///
    /// Item failures come back as `Ok` with an error record; only user
    /// cancellation is an `Err`.
    pub async fn execute(
        &self,
        model: &str,
        item: &DatasetItem,
        config: &RunConfig,
    ) -> Result<InferenceResult, Cancelled> {
        let attempts = config.max_retries.saturating_add(1);
        let mut last_error: Option<ChatError> = None;

        for attempt in 1..=attempts {
            match self.attempt(model, item, config).await? {
                AttemptOutcome::Success { output, metrics } => {
                    tracing::info!(
                        model,
                        item = %item.id,
                        tokens = metrics.output_tokens,
                        tps = metrics.tokens_per_second,
                        ttft = metrics.ttft,
                        "✓ Inference complete"
                    );
                    return Ok(InferenceResult::success(model, item, output, metrics));
                }
                AttemptOutcome::Fatal(e) => {
                    tracing::warn!(model, item = %item.id, error = %e, "✗ Inference rejected, not retrying");
                    return Ok(InferenceResult::failure(
                        model,
                        item,
                        Metrics::failure(e.to_string()),
                    ));
                }
                AttemptOutcome::Retryable(e) => {
                    tracing::warn!(
                        model,
                        item = %item.id,
                        attempt,
                        attempts,
                        error = %e,
                        "Attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        self.wait_backoff().await?;
                    }
                }
            }
        }

        let error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        tracing::warn!(model, item = %item.id, attempts, error = %error, "✗ Inference failed");
        Ok(InferenceResult::failure(model, item, Metrics::failure(error)))
    }

    async fn wait_backoff(&self) -> Result<(), Cancelled> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(self.backoff) => Ok(()),
        }
    }
}
