use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub working_dir: String,
    pub uploads_dir: String,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Tunables for extraction, linking and backfill. Every field is optional
/// in the YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cosine similarity at or above which the later node is merged away.
    pub duplicate_threshold: f64,
    /// Cosine similarity strictly above which a pair is classified.
    pub candidate_threshold: f64,
    pub batch_size: usize,
    pub min_edge_confidence: f64,
    pub stale_timeout_secs: u64,
    pub max_ideas_per_document: usize,
    pub excerpt_min_chars: usize,
    pub excerpt_max_chars: usize,
    pub locate_inline: bool,
    pub scheduler_capacity: usize,
    pub backfill_fetch_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.88,
            candidate_threshold: 0.4,
            batch_size: 20,
            min_edge_confidence: 0.5,
            stale_timeout_secs: 15 * 60,
            max_ideas_per_document: 30,
            excerpt_min_chars: 40,
            excerpt_max_chars: 500,
            locate_inline: false,
            scheduler_capacity: 100,
            backfill_fetch_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub extraction_model: String,
    pub classification_model: String,
    pub embedding_model: String,
    pub reasoning_effort: Option<String>,
    pub api_base: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            extraction_model: "gpt-5.2".into(),
            classification_model: "gpt-5.2".into(),
            embedding_model: "text-embedding-3-large".into(),
            reasoning_effort: None,
            api_base: None,
        }
    }
}

impl AppConfig {
    /// `WORKSPACE` from the environment wins over the file.
    pub fn effective_workspace(&self) -> Option<String> {
        env::var("WORKSPACE")
            .ok()
            .or_else(|| self.workspace.clone())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

pub async fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()).await
}

pub async fn load_config_from(path: &Path) -> Result<AppConfig> {
    let contents = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: AppConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    info!(path = %path.display(), "Configuration loaded from disk");
    Ok(config)
}

fn config_path() -> PathBuf {
    env::var("APP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_section_is_optional() {
        let config: AppConfig = serde_yaml::from_str(
            "server:\n  host: 127.0.0.1\n  port: 8080\nworking_dir: ./data\nuploads_dir: ./uploads\n",
        )
        .unwrap();
        assert_eq!(config.pipeline.batch_size, 20);
        assert_eq!(config.pipeline.duplicate_threshold, 0.88);
        assert_eq!(config.pipeline.stale_timeout(), Duration::from_secs(900));
        assert_eq!(config.models.embedding_model, "text-embedding-3-large");
    }

    #[test]
    fn partial_pipeline_overrides_keep_defaults() {
        let config: AppConfig = serde_yaml::from_str(
            "server:\n  host: 0.0.0.0\n  port: 1\nworking_dir: d\nuploads_dir: u\npipeline:\n  batch_size: 5\n  locate_inline: true\n",
        )
        .unwrap();
        assert_eq!(config.pipeline.batch_size, 5);
        assert!(config.pipeline.locate_inline);
        assert_eq!(config.pipeline.min_edge_confidence, 0.5);
    }
}
