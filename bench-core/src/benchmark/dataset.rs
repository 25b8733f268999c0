//! Benchmark dataset loading
//!
//! A dataset is an ordered list of prompts, stored as a JSON (or YAML) array
//! of `{id?, prompt, category?}` records. Order is preserved so that logs and
//! result files are reproducible between runs.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading a dataset. All of them are fatal to a run.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read dataset {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in dataset: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML in dataset: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("dataset item {index} has an empty prompt")]
    EmptyPrompt { index: usize },
}

/// On-disk encoding of a dataset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Json,
    Yaml,
}

impl DatasetFormat {
    /// Pick the format from the file extension; anything unknown is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// One prompt of the benchmark dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetItem {
    /// Stable identifier; synthesized as `item_{n}` (1-based) when the file omits it
    pub id: String,
    /// Prompt text sent to the model
    pub prompt: String,
    /// Optional grouping used by the category breakdown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl DatasetItem {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Id synthesized for the item at 1-based `position` when none is given.
    pub fn synthesized_id(position: usize) -> String {
        format!("item_{}", position)
    }
}

/// Record as written in the dataset file.
#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default, deserialize_with = "id_string_or_number")]
    id: Option<String>,
    prompt: String,
    #[serde(default)]
    category: Option<String>,
}

/// Dataset ids are usually strings, but hand-written files often use integers.
fn id_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(
        Option::<IdRepr>::deserialize(deserializer)?.map(|repr| match repr {
            IdRepr::Text(s) => s,
            IdRepr::Int(n) => n.to_string(),
            IdRepr::Float(n) => n.to_string(),
        }),
    )
}

/// Parse dataset text in the given format.
pub fn parse_dataset(content: &str, format: DatasetFormat) -> Result<Vec<DatasetItem>, DatasetError> {
    let raw: Vec<RawItem> = match format {
        DatasetFormat::Json => serde_json::from_str(content)?,
        DatasetFormat::Yaml => serde_yaml::from_str(content)?,
    };

    raw.into_iter()
        .enumerate()
        .map(|(idx, item)| {
            if item.prompt.trim().is_empty() {
                return Err(DatasetError::EmptyPrompt { index: idx + 1 });
            }
            Ok(DatasetItem {
                id: item
                    .id
                    .unwrap_or_else(|| DatasetItem::synthesized_id(idx + 1)),
                prompt: item.prompt,
                category: item.category,
            })
        })
        .collect()
}

/// Load the benchmark dataset from disk.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Vec<DatasetItem>, DatasetError> {
    let path = path.as_ref();
    tracing::info!(path = %path.display(), "Loading dataset");

    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            DatasetError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            DatasetError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let items = parse_dataset(&content, DatasetFormat::from_path(path))?;
    if items.is_empty() {
        tracing::warn!(path = %path.display(), "Dataset is empty");
    }
    Ok(items)
}
