//! Chat completion service client.
//!
//! [`ChatBackend`] is the seam between the benchmark and the inference
//! daemon. [`OllamaClient`] implements it over Ollama's HTTP API:
//!
//! - `GET  {host}/api/tags`: installed models
//! - `POST {host}/api/chat`: chat completion, either a single JSON object or,
//!   with `stream: true`, newline-delimited JSON chunks
//!
//! Tests substitute in-process backends that script chunk timings and failures.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::errors::ChatError;

/// Stream of content fragments from a streaming chat call.
pub type ChunkStream = BoxStream<'static, Result<String, ChatError>>;

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Generation options understood by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatOptions {
    /// Maximum output tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Request body for `/api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: ChatOptions,
}

impl ChatRequest {
    /// Single-turn request carrying one user prompt.
    pub fn user_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::user(prompt)],
            stream: false,
            options: ChatOptions::default(),
        }
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.num_predict = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }
}

/// Chat completion service used by the benchmark.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Ids of the models installed on the service.
    async fn list_models(&self) -> Result<Vec<String>, ChatError>;

    /// Non-streaming completion; returns the full response text.
    async fn chat(&self, request: ChatRequest) -> Result<String, ChatError>;

    /// Streaming completion; yields content fragments as they arrive.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream, ChatError>;
}

// ── Ollama wire format ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// One response object; a whole body when not streaming, one line when streaming.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Decode one NDJSON line of a streaming response.
///
/// Returns `Ok(None)` for blank lines and for the closing `done` object when
/// it carries no content.
pub fn parse_stream_line(line: &str) -> Result<Option<String>, ChatError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| ChatError::Malformed(format!("{e}: {line}")))?;

    if let Some(error) = chunk.error {
        return Err(ChatError::Stream(error));
    }

    let content = chunk.message.map(|m| m.content).unwrap_or_default();
    if chunk.done && content.is_empty() {
        return Ok(None);
    }
    Ok(Some(content))
}

/// Split complete lines off the front of `buffer`.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    lines
}

/// HTTP client for an Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl OllamaClient {
    /// Build a client for `base_url` (e.g. `http://localhost:11434`).
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChatError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            timeout: request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_transport(&self, err: reqwest::Error) -> ChatError {
        // connect timeouts report both; they mean the daemon is unreachable
        if err.is_connect() {
            ChatError::Unreachable {
                url: self.base_url.clone(),
                message: err.to_string(),
            }
        } else if err.is_timeout() {
            ChatError::Timeout(self.timeout)
        } else if err.is_decode() {
            ChatError::Malformed(err.to_string())
        } else {
            ChatError::Transport(err.to_string())
        }
    }

    /// Send a chat request and map non-success statuses to errors.
    async fn post_chat(&self, request: &ChatRequest) -> Result<reqwest::Response, ChatError> {
        tracing::debug!(model = %request.model, stream = request.stream, "POST /api/chat");

        let response = self
            .http
            .post(self.endpoint("/api/chat"))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ChatChunk>(&body)
            .ok()
            .and_then(|c| c.error)
            .unwrap_or(body);

        if status == reqwest::StatusCode::NOT_FOUND {
            Err(ChatError::ModelNotFound(request.model.clone()))
        } else {
            Err(ChatError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let response = self
            .http
            .get(self.endpoint("/api/tags"))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ChatError::Rejected { status, message });
        }

        let tags: TagsResponse = response.json().await.map_err(|e| self.map_transport(e))?;
        Ok(tags
            .models
            .into_iter()
            .filter_map(|entry| entry.model.or(entry.name))
            .collect())
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ChatError> {
        let request = request.streaming(false);
        let response = self.post_chat(&request).await?;
        let body: ChatChunk = response.json().await.map_err(|e| self.map_transport(e))?;

        if let Some(error) = body.error {
            return Err(ChatError::Stream(error));
        }
        Ok(body.message.map(|m| m.content).unwrap_or_default())
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream, ChatError> {
        let request = request.streaming(true);
        let response = self.post_chat(&request).await?;

        let client = self.clone();
        let bytes = response.bytes_stream().boxed();

        // state: (byte stream, partial line buffer, decoded fragments not yet yielded, finished)
        let fragments = stream::unfold(
            (bytes, Vec::new(), std::collections::VecDeque::new(), false),
            move |(mut bytes, mut buffer, mut pending, mut finished)| {
                let client = client.clone();
                async move {
                    loop {
                        if let Some(item) = pending.pop_front() {
                            return Some((item, (bytes, buffer, pending, finished)));
                        }
                        if finished {
                            return None;
                        }

                        match bytes.next().await {
                            Some(Ok(chunk)) => {
                                buffer.extend_from_slice(&chunk);
                                for line in drain_lines(&mut buffer) {
                                    match parse_stream_line(&line) {
                                        Ok(Some(fragment)) => pending.push_back(Ok(fragment)),
                                        Ok(None) => {}
                                        Err(e) => {
                                            pending.push_back(Err(e));
                                            finished = true;
                                            break;
                                        }
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                pending.push_back(Err(client.map_transport(e)));
                                finished = true;
                            }
                            None => {
                                finished = true;
                                let rest = String::from_utf8_lossy(&buffer).into_owned();
                                buffer.clear();
                                match parse_stream_line(&rest) {
                                    Ok(Some(fragment)) => pending.push_back(Ok(fragment)),
                                    Ok(None) => {}
                                    Err(e) => pending.push_back(Err(e)),
                                }
                            }
                        }
                    }
                }
            },
        );

        Ok(fragments.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest::user_prompt("phi3", "hi")
            .streaming(true)
            .with_max_tokens(100)
            .with_temperature(0.5);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "phi3");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["options"]["num_predict"], 100);
        assert_eq!(json["options"]["temperature"], 0.5);
    }

    #[test]
    fn test_unset_options_are_omitted() {
        let json = serde_json::to_value(ChatRequest::user_prompt("phi3", "hi")).unwrap();
        assert_eq!(json["options"], serde_json::json!({}));
    }

    #[test]
    fn test_parse_stream_line_content() {
        let line = r#"{"model":"phi3","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        assert_eq!(parse_stream_line(line).unwrap(), Some("Hel".to_string()));
    }

    #[test]
    fn test_parse_stream_line_done_marker() {
        let line = r#"{"model":"phi3","message":{"role":"assistant","content":""},"done":true,"eval_count":12}"#;
        assert_eq!(parse_stream_line(line).unwrap(), None);
        assert_eq!(parse_stream_line("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_stream_line_error() {
        let err = parse_stream_line(r#"{"error":"model crashed"}"#).unwrap_err();
        assert!(matches!(err, ChatError::Stream(ref m) if m == "model crashed"));

        let err = parse_stream_line("{not json").unwrap_err();
        assert!(matches!(err, ChatError::Malformed(_)));
    }

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut buffer = b"{\"a\":1}\n{\"b\":2}\n{\"c\"".to_vec();
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines, vec!["{\"a\":1}\n", "{\"b\":2}\n"]);
        assert_eq!(buffer, b"{\"c\"".to_vec());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = OllamaClient::new(
            "http://localhost:11434/",
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.endpoint("/api/tags"), "http://localhost:11434/api/tags");
    }
}
