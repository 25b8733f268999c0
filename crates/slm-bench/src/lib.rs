//! SLM Bench
//!
//! Drives a local Ollama daemon through a prompt dataset, one model at a
//! time, and records time-to-first-token and throughput per prompt.
//!
//! - [`client`]: `ChatBackend` trait and the Ollama HTTP client
//! - [`executor`]: one item, with retries and cancellation
//! - [`runner`]: one model, verification then every item in order
//! - [`analysis`]: LLM comparison across models, with fallback
//! - [`session`]: every model, persistence and console output
//! - [`config`] / [`cli`]: layered configuration

#![allow(clippy::uninlined_format_args)]

pub mod analysis;
pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod executor;
pub mod memory;
pub mod runner;
pub mod session;

pub use client::{ChatBackend, ChatRequest, ChunkStream, OllamaClient};
pub use config::BenchConfig;
pub use errors::{BenchError, Cancelled, ChatError, RetryCategory};
pub use executor::{AttemptOutcome, Executor};
pub use runner::{BenchmarkRunner, ModelRun, Verification};
pub use session::{BenchmarkSession, SessionOutcome};
