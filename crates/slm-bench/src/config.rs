use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::DEFAULT_ANALYSIS_MODEL;

/// Models benchmarked by `--model all`.
pub const SUPPORTED_MODELS: &[&str] = &["phi3", "llama3", "gemma:2b"];

/// Default address of a local Ollama daemon.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Harness configuration.
///
/// Layered lowest to highest: built-in defaults, an optional TOML file,
/// environment (`OLLAMA_HOST`, `SLM_BENCH_RESULTS_DIR`), then CLI flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Base URL of the inference service
    pub host: String,
    /// Per-request timeout; generous because cold models load on first use
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Wait between retry attempts
    pub retry_backoff_ms: u64,
    pub results_dir: PathBuf,
    /// CSV log file name, relative to `results_dir`
    pub csv_log: String,
    /// Models run by `--model all`, in order
    pub supported_models: Vec<String>,
    pub analysis_model: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            request_timeout_secs: 300,
            connect_timeout_secs: 5,
            retry_backoff_ms: 1000,
            results_dir: PathBuf::from("results"),
            csv_log: "benchmark_log.csv".to_string(),
            supported_models: SUPPORTED_MODELS.iter().map(|m| m.to_string()).collect(),
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
        }
    }
}

impl BenchConfig {
    /// Parse a TOML config file; unset keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        let config: BenchConfig =
            toml::from_str(&content).context("Failed to parse benchmark config TOML")?;
        Ok(config)
    }

    /// Defaults, overlaid by `path` if given, overlaid by the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.apply_env_from(|key| std::env::var(key).ok()))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("OLLAMA_HOST").filter(|h| !h.trim().is_empty()) {
            self.host = normalize_host(&host);
        }
        if let Some(dir) = lookup("SLM_BENCH_RESULTS_DIR").filter(|d| !d.trim().is_empty()) {
            self.results_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.results_dir.join(&self.csv_log)
    }

    /// Resolve a `--model` selector: `all` (any case) expands to the
    /// supported list, anything else is a single model id.
    pub fn models_to_test(&self, selector: &str) -> Vec<String> {
        if selector.eq_ignore_ascii_case("all") {
            self.supported_models.clone()
        } else {
            vec![selector.to_string()]
        }
    }
}

/// Accept `host:port` as well as full URLs, as the Ollama CLI does.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.host, "http://localhost:11434");
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.csv_path(), PathBuf::from("results/benchmark_log.csv"));
        assert_eq!(config.supported_models, vec!["phi3", "llama3", "gemma:2b"]);
        assert_eq!(config.analysis_model, "deepseek-v3.1:671b-cloud");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: BenchConfig = toml::from_str(
            r#"
host = "http://gpu-box:11434"
retry_backoff_ms = 250
supported_models = ["qwen2:0.5b", "phi3"]
"#,
        )
        .unwrap();

        assert_eq!(config.host, "http://gpu-box:11434");
        assert_eq!(config.retry_backoff(), Duration::from_millis(250));
        assert_eq!(config.supported_models, vec!["qwen2:0.5b", "phi3"]);
        assert_eq!(config.results_dir, PathBuf::from("results"));
        assert_eq!(config.request_timeout_secs, 300);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        std::fs::write(&path, "results_dir = \"out\"\ncsv_log = \"runs.csv\"\n").unwrap();

        let config = BenchConfig::from_file(&path).unwrap();
        assert_eq!(config.csv_path(), PathBuf::from("out/runs.csv"));
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = BenchConfig::from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "host = [").unwrap();
        let err = BenchConfig::from_file(&bad).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OLLAMA_HOST", "127.0.0.1:11500"),
            ("SLM_BENCH_RESULTS_DIR", "/tmp/bench"),
        ]
        .into_iter()
        .collect();

        let config =
            BenchConfig::default().apply_env_from(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.host, "http://127.0.0.1:11500");
        assert_eq!(config.results_dir, PathBuf::from("/tmp/bench"));
    }

    #[test]
    fn test_empty_env_is_ignored() {
        let config = BenchConfig::default().apply_env_from(|_| Some("  ".to_string()));
        assert_eq!(config, BenchConfig::default());
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("localhost:11434"), "http://localhost:11434");
        assert_eq!(normalize_host("https://ollama.lan/"), "https://ollama.lan");
        assert_eq!(normalize_host("http://a:1"), "http://a:1");
    }

    #[test]
    fn test_models_to_test() {
        let config = BenchConfig::default();
        assert_eq!(config.models_to_test("ALL"), vec!["phi3", "llama3", "gemma:2b"]);
        assert_eq!(config.models_to_test("all"), config.supported_models);
        assert_eq!(config.models_to_test("mistral"), vec!["mistral"]);
    }
}
