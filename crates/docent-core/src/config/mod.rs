mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use docent_ingest::ExtractOptions;

/// Config file used when neither `--config` nor `DOCENT_CONFIG` names one.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!("config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Explicit path first, then `DOCENT_CONFIG`, then [`DEFAULT_CONFIG_PATH`].
    #[must_use]
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        std::env::var("DOCENT_CONFIG").map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }

    /// # Errors
    ///
    /// Returns an error naming the first setting that cannot work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ingest.chunk_size == 0 {
            bail!("ingest.chunk_size must be positive");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be positive");
        }
        if self.llm.model.trim().is_empty() {
            bail!("llm.model must not be empty");
        }
        if self.llm.embedding_model.trim().is_empty() {
            bail!("llm.embedding_model must not be empty");
        }
        if self.llm.base_url.trim().is_empty() {
            bail!("llm.base_url must not be empty");
        }
        if self.storage.persist && self.storage.data_dir.as_os_str().is_empty() {
            bail!("storage.data_dir must not be empty when storage.persist is on");
        }
        Ok(())
    }

    /// Extraction options for ingestion; the overlap is clamped below the
    /// chunk size.
    #[must_use]
    pub fn extract_options(&self) -> ExtractOptions {
        let chunk_size = self.ingest.chunk_size.max(1);
        let overlap = self.ingest.chunk_overlap.min(chunk_size - 1);
        if overlap != self.ingest.chunk_overlap {
            tracing::warn!(
                "chunk_overlap {} clamped to {overlap} for chunk_size {chunk_size}",
                self.ingest.chunk_overlap
            );
        }
        ExtractOptions {
            chunk_size,
            chunk_overlap: overlap,
            preserve_structure: self.ingest.preserve_structure,
            encoding: None,
        }
    }
}
