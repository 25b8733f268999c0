//! Per-model benchmark runner.
//!
//! Verifies a model is installed and warm, then runs the dataset through the
//! [`Executor`] strictly in order, one item at a time. A model that fails
//! verification is skipped without a single inference call.

use std::sync::Arc;

use bench_core::{DatasetItem, InferenceResult, RunConfig};
use tokio_util::sync::CancellationToken;

use crate::client::{ChatBackend, ChatRequest};
use crate::errors::{Cancelled, ChatError};
use crate::executor::Executor;

/// Prompt sent to load a model into memory before measuring it.
const WARMUP_PROMPT: &str = "test";

/// Outcome of verifying a model before benchmarking it.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Ready,
    Unavailable {
        reason: String,
        available: Vec<String>,
    },
}

/// Outcome of benchmarking one model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelRun {
    /// One result per dataset item, in dataset order.
    Completed(Vec<InferenceResult>),
    /// Verification failed; nothing was run.
    Unavailable {
        reason: String,
        available_models: Vec<String>,
    },
}

/// Whether installed model id `installed` satisfies a request for `requested`.
///
/// Substring or prefix match, so `gemma:2b` accepts `gemma:2b-instruct` and
/// `phi3` accepts `phi3:latest`.
pub fn model_matches(requested: &str, installed: &str) -> bool {
    installed.contains(requested) || installed.starts_with(requested)
}

/// Runs whole datasets against single models.
pub struct BenchmarkRunner {
    backend: Arc<dyn ChatBackend>,
    executor: Executor,
    cancel: CancellationToken,
}

impl BenchmarkRunner {
    pub fn new(backend: Arc<dyn ChatBackend>, executor: Executor, cancel: CancellationToken) -> Self {
        Self {
            backend,
            executor,
            cancel,
        }
    }

    /// Check the model is installed, then warm it up with a one-token chat.
    pub async fn verify_model(&self, model: &str) -> Result<Verification, Cancelled> {
        if self.cancel.is_cancelled() {
            return Err(Cancelled);
        }
        tracing::info!(model, "⏳ Verifying model");
        let started = tokio::time::Instant::now();

        let listed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Cancelled),
            listed = self.backend.list_models() => listed,
        };
        let available = match listed {
            Ok(models) => models,
            Err(e) => return unavailable(e, Vec::new()),
        };

        if !available.iter().any(|m| model_matches(model, m)) {
            tracing::warn!(
                model,
                available = %available.join(", "),
                "❌ Model not found, pull it with `ollama pull {model}`"
            );
            return Ok(Verification::Unavailable {
                reason: format!("Model '{model}' not found"),
                available,
            });
        }

        tracing::debug!(model, "Warming up model");
        let warmup = ChatRequest::user_prompt(model, WARMUP_PROMPT).with_max_tokens(1);
        let warmed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Cancelled),
            warmed = self.backend.chat(warmup) => warmed,
        };
        if let Err(e) = warmed {
            return unavailable(e, available);
        }

        tracing::info!(
            model,
            load_secs = started.elapsed().as_secs_f64(),
            "✅ Model ready"
        );
        Ok(Verification::Ready)
    }

    /// Verify `model`, then run every item of `dataset` against it.
    pub async fn run_model(
        &self,
        model: &str,
        dataset: &[DatasetItem],
        config: &RunConfig,
    ) -> Result<ModelRun, Cancelled> {
        tracing::info!(model, "Testing model");

        if let Verification::Unavailable { reason, available } = self.verify_model(model).await? {
            tracing::warn!(model, %reason, "⚠️ Skipping model, not available");
            return Ok(ModelRun::Unavailable {
                reason,
                available_models: available,
            });
        }

        tracing::info!(model, items = dataset.len(), "🚀 Starting benchmark");
        let total = dataset.len();
        let mut results = Vec::with_capacity(total);

        for (idx, item) in dataset.iter().enumerate() {
            tracing::info!(
                model,
                "[{}/{}] Processing: {}...",
                idx + 1,
                total,
                prompt_preview(&item.prompt)
            );
            results.push(self.executor.execute(model, item, config).await?);
        }

        Ok(ModelRun::Completed(results))
    }
}

fn unavailable(error: ChatError, available: Vec<String>) -> Result<Verification, Cancelled> {
    if matches!(error, ChatError::Cancelled) {
        return Err(Cancelled);
    }
    tracing::warn!(error = %error, "❌ Model verification failed");
    Ok(Verification::Unavailable {
        reason: error.to_string(),
        available,
    })
}

/// First 50 characters of a prompt for progress lines.
fn prompt_preview(prompt: &str) -> String {
    prompt.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockChatBackend;
    use futures::{stream, StreamExt};

    fn runner(backend: MockChatBackend) -> BenchmarkRunner {
        let backend: Arc<dyn ChatBackend> = Arc::new(backend);
        let cancel = CancellationToken::new();
        let executor = Executor::new(backend.clone(), cancel.clone());
        BenchmarkRunner::new(backend, executor, cancel)
    }

    fn dataset() -> Vec<DatasetItem> {
        vec![
            DatasetItem::new("a", "first prompt"),
            DatasetItem::new("b", "second prompt").with_category("qa"),
        ]
    }

    #[test]
    fn test_model_matching() {
        assert!(model_matches("gemma:2b", "gemma:2b-instruct"));
        assert!(model_matches("phi3", "phi3:latest"));
        assert!(model_matches("llama3", "llama3"));
        assert!(!model_matches("llama3", "llama2:7b"));
        assert!(!model_matches("gemma:7b", "gemma:2b"));
    }

    #[test]
    fn test_prompt_preview_is_char_safe() {
        let prompt = "é".repeat(80);
        assert_eq!(prompt_preview(&prompt).chars().count(), 50);
        assert_eq!(prompt_preview("short"), "short");
    }

    #[tokio::test]
    async fn test_unavailable_model_makes_no_inference_calls() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_list_models()
            .times(1)
            .returning(|| Ok(vec!["llama3:8b".to_string()]));
        backend.expect_chat().times(0);
        backend.expect_chat_stream().times(0);

        let run = runner(backend)
            .run_model("phi3", &dataset(), &RunConfig::default())
            .await
            .unwrap();

        assert_eq!(
            run,
            ModelRun::Unavailable {
                reason: "Model 'phi3' not found".to_string(),
                available_models: vec!["llama3:8b".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_failed_warmup_skips_model() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_list_models()
            .returning(|| Ok(vec!["phi3:latest".to_string()]));
        backend
            .expect_chat()
            .times(1)
            .returning(|_| Err(ChatError::Rejected {
                status: 500,
                message: "failed to load model".into(),
            }));
        backend.expect_chat_stream().times(0);

        let run = runner(backend)
            .run_model("phi3", &dataset(), &RunConfig::default())
            .await
            .unwrap();

        match run {
            ModelRun::Unavailable {
                reason,
                available_models,
            } => {
                assert!(reason.contains("failed to load model"));
                assert_eq!(available_models, vec!["phi3:latest"]);
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_warmup_requests_one_token() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_list_models()
            .returning(|| Ok(vec!["phi3:latest".to_string()]));
        backend
            .expect_chat()
            .withf(|req| {
                req.model == "phi3"
                    && req.messages[0].content == WARMUP_PROMPT
                    && req.options.num_predict == Some(1)
            })
            .times(1)
            .returning(|_| Ok("ok".to_string()));

        let verification = runner(backend).verify_model("phi3").await.unwrap();
        assert_eq!(verification, Verification::Ready);
    }

    #[tokio::test]
    async fn test_items_run_in_dataset_order() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_list_models()
            .returning(|| Ok(vec!["phi3:latest".to_string()]));
        backend.expect_chat().returning(|_| Ok("ok".to_string()));
        backend.expect_chat_stream().times(2).returning(|req| {
            let echo = format!("echo {}", req.messages[0].content);
            Ok(stream::iter(vec![Ok::<_, ChatError>(echo)]).boxed())
        });

        let run = runner(backend)
            .run_model("phi3", &dataset(), &RunConfig::default())
            .await
            .unwrap();

        let ModelRun::Completed(results) = run else {
            panic!("expected Completed");
        };
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(results[0].output.as_deref(), Some("echo first prompt"));
        assert_eq!(results[1].category.as_deref(), Some("qa"));
        assert!(results.iter().all(|r| r.model == "phi3"));
    }

    #[tokio::test]
    async fn test_cancelled_before_verification() {
        let mut backend = MockChatBackend::new();
        backend.expect_list_models().times(0);

        let backend: Arc<dyn ChatBackend> = Arc::new(backend);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = BenchmarkRunner::new(
            backend.clone(),
            Executor::new(backend, cancel.clone()),
            cancel,
        );

        let err = runner.verify_model("phi3").await.unwrap_err();
        assert_eq!(err, Cancelled);
    }
}
