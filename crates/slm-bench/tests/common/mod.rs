//! Scripted in-process chat backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use slm_bench::client::{ChatBackend, ChatRequest, ChunkStream};
use slm_bench::ChatError;
use tokio::time::Instant;

/// Route harness logs through the test writer, filtered by `RUST_LOG`.
///
/// Output shows up only for failing tests, or with `--nocapture`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("slm_bench=debug,bench_core=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// One scripted streaming attempt.
#[derive(Debug, Clone)]
pub enum Attempt {
    /// Fragments, each delivered after its delay.
    Chunks(Vec<(Duration, String)>),
    /// The request fails before any chunk.
    Fail(ChatError),
}

impl Attempt {
    pub fn chunks(chunks: &[(u64, &str)]) -> Self {
        Self::Chunks(
            chunks
                .iter()
                .map(|(ms, text)| (Duration::from_millis(*ms), text.to_string()))
                .collect(),
        )
    }

    pub fn transport(message: &str) -> Self {
        Self::Fail(ChatError::Transport(message.to_string()))
    }
}

#[derive(Default)]
struct State {
    scripts: HashMap<String, VecDeque<Attempt>>,
    fallback: HashMap<String, Attempt>,
    analysis: HashMap<String, Result<String, ChatError>>,
    stream_calls: Vec<(String, Instant)>,
    chat_calls: Vec<String>,
}

/// Backend whose behaviour is scripted per model.
///
/// Streaming attempts are consumed from the model's queue in order; once the
/// queue is empty the model's fallback attempt repeats. Chat calls with
/// `num_predict == 1` are warm-ups and always succeed; other chat calls are
/// analysis requests answered from the analysis table.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    installed: Vec<String>,
    state: Arc<Mutex<State>>,
}

impl ScriptedBackend {
    pub fn new(installed: &[&str]) -> Self {
        init_tracing();
        Self {
            installed: installed.iter().map(|m| m.to_string()).collect(),
            state: Arc::default(),
        }
    }

    pub fn script(self, model: &str, attempts: Vec<Attempt>) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(model.to_string(), attempts.into());
        self
    }

    pub fn always(self, model: &str, attempt: Attempt) -> Self {
        self.state
            .lock()
            .unwrap()
            .fallback
            .insert(model.to_string(), attempt);
        self
    }

    pub fn analysis(self, model: &str, response: Result<&str, ChatError>) -> Self {
        self.state
            .lock()
            .unwrap()
            .analysis
            .insert(model.to_string(), response.map(str::to_string));
        self
    }

    /// Instants at which streaming calls were made for `model`.
    pub fn stream_calls(&self, model: &str) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .stream_calls
            .iter()
            .filter(|(m, _)| m == model)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn total_stream_calls(&self) -> usize {
        self.state.lock().unwrap().stream_calls.len()
    }

    /// Models asked for an analysis, in order.
    pub fn analysis_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().chat_calls.clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        Ok(self.installed.clone())
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ChatError> {
        if request.options.num_predict == Some(1) {
            return Ok("ok".to_string());
        }
        let mut state = self.state.lock().unwrap();
        state.chat_calls.push(request.model.clone());
        state
            .analysis
            .get(&request.model)
            .cloned()
            .unwrap_or_else(|| Err(ChatError::ModelNotFound(request.model.clone())))
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream, ChatError> {
        let attempt = {
            let mut state = self.state.lock().unwrap();
            state
                .stream_calls
                .push((request.model.clone(), Instant::now()));
            let scripted = state
                .scripts
                .get_mut(&request.model)
                .and_then(|queue| queue.pop_front());
            scripted
                .or_else(|| state.fallback.get(&request.model).cloned())
                .unwrap_or_else(|| Attempt::Fail(ChatError::ModelNotFound(request.model.clone())))
        };

        match attempt {
            Attempt::Fail(e) => Err(e),
            Attempt::Chunks(chunks) => Ok(stream::unfold(
                VecDeque::from(chunks),
                |mut pending| async move {
                    let (delay, text) = pending.pop_front()?;
                    tokio::time::sleep(delay).await;
                    Some((Ok::<_, ChatError>(text), pending))
                },
            )
            .boxed()),
        }
    }
}
