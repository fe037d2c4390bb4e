use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub chat_model: String,
    pub embedding_model: String,
}

#[derive(Clone, Debug)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub index_dir: PathBuf,
    pub api_base_url: String,
    pub api_key: String,
    pub models: ModelConfig,
    pub chunks: ChunkConfig,
    pub retrieve_top_k: usize,
    pub source_label: String,
    pub stage_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY is not set; export it or add it to a local .env file")?;

        let config = Self {
            bind_addr: env::var("POLICYCHAT_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            index_dir: env::var("POLICYCHAT_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("hr_policy_index")),
            api_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key,
            models: ModelConfig {
                chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                embedding_model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            },
            chunks: ChunkConfig {
                chunk_size: env::var("CHUNK_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(800),
                chunk_overlap: env::var("CHUNK_OVERLAP")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(150),
            },
            retrieve_top_k: env::var("RETRIEVE_TOP_K")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            source_label: env::var("SOURCE_LABEL")
                .unwrap_or_else(|_| "Nestlé HR Policy (2012)".to_string()),
            stage_timeout_secs: env::var("STAGE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunks.chunk_size == 0 {
            anyhow::bail!("chunk size must be positive");
        }
        if self.chunks.chunk_overlap >= self.chunks.chunk_size {
            anyhow::bail!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunks.chunk_overlap,
                self.chunks.chunk_size
            );
        }
        if self.retrieve_top_k == 0 {
            anyhow::bail!("retrieve_top_k must be positive");
        }
        if self.source_label.trim().is_empty() {
            anyhow::bail!("source label must not be empty");
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}
