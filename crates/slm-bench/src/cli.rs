//! Command-line arguments.

use std::path::PathBuf;

use bench_core::RunConfig;
use clap::Parser;

use crate::config::{normalize_host, BenchConfig};

const AFTER_HELP: &str = "\
Supported Models: phi3, llama3, gemma:2b

Examples:
  # Run benchmark on a single model
  slm-bench --model phi3

  # Run on all supported models
  slm-bench --model all

  # Custom settings
  slm-bench --model llama3 --max-tokens 200 --temperature 0.8

  # Custom dataset
  slm-bench --model gemma:2b --data-path data/custom_dataset.json

Prerequisites:
  1. Install Ollama: https://ollama.ai
  2. Pull models: ollama pull phi3 && ollama pull llama3 && ollama pull gemma:2b
  3. Start Ollama: ollama serve";

/// Run the SLM efficiency benchmark against a local Ollama daemon
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(author, version, about, long_about = None, after_help = AFTER_HELP)]
pub struct Args {
    /// Model name, or `all` to test every supported model
    #[arg(long, default_value = "phi3")]
    pub model: String,

    /// Max tokens to generate per inference
    #[arg(long, default_value_t = 100)]
    pub max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,

    /// Path to benchmark dataset (JSON, or YAML by extension)
    #[arg(long, default_value = "data/sample_subset.json")]
    pub data_path: PathBuf,

    /// Max retries for failed inferences
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Model used for the cross-model comparison (overrides the config file)
    #[arg(long)]
    pub analysis_model: Option<String>,

    /// Enable verbose logging
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Inference service URL (overrides OLLAMA_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Output directory (overrides SLM_BENCH_RESULTS_DIR)
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
}

impl Args {
    /// Generation settings recorded in every summary.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            max_retries: self.max_retries,
        }
    }

    /// Overlay explicit flags onto a loaded config.
    pub fn apply_to(&self, mut config: BenchConfig) -> BenchConfig {
        if let Some(host) = &self.host {
            config.host = normalize_host(host);
        }
        if let Some(dir) = &self.results_dir {
            config.results_dir = dir.clone();
        }
        if let Some(model) = &self.analysis_model {
            config.analysis_model = model.clone();
        }
        config
    }
}
