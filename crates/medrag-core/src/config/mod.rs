mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use medrag_memory::document::SplitterConfig;

use crate::orchestrator::CompletionConfig;
use crate::retriever::RetrievalConfig;

/// Config file used when neither `--config` nor `MEDRAG_CONFIG` is given.
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
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rag.chunk_size == 0 {
            bail!("rag.chunk_size must be greater than zero");
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            bail!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                self.rag.chunk_overlap,
                self.rag.chunk_size
            );
        }
        if !(0.0..=1.0).contains(&self.rag.similarity_threshold) {
            bail!(
                "rag.similarity_threshold must be within [0, 1], got {}",
                self.rag.similarity_threshold
            );
        }
        if self.rag.max_results == 0 {
            bail!("rag.max_results must be at least 1");
        }
        if self.rag.max_context_tokens == 0 {
            bail!("rag.max_context_tokens must be greater than zero");
        }
        if self.llm.embedding_dimensions == 0 {
            bail!("llm.embedding_dimensions must be greater than zero");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be within [0, 2]");
        }
        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_empty() {
            bail!("store.database_url is required for the postgres backend");
        }
        Ok(())
    }

    #[must_use]
    pub fn splitter_config(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.rag.chunk_size,
            chunk_overlap: self.rag.chunk_overlap,
            max_chunk_tokens: self.llm.max_input_tokens,
        }
    }

    #[must_use]
    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            similarity_threshold: self.rag.similarity_threshold,
            max_results: self.rag.max_results,
            max_context_tokens: self.rag.max_context_tokens,
            embedding_dimensions: self.llm.embedding_dimensions,
            max_input_tokens: self.llm.max_input_tokens,
            embed_timeout: self.timeouts.embedding(),
        }
    }

    #[must_use]
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            timeout: self.timeouts.completion(),
        }
    }
}

/// Resolve the config path: explicit argument, then `MEDRAG_CONFIG`, then the default.
#[must_use]
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_owned();
    }
    if let Ok(path) = std::env::var("MEDRAG_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}
