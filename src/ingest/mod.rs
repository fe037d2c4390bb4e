pub mod pdf;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::index::{IndexEntry, IndexManifest, VectorIndex};
use crate::models::Chunk;
use crate::openai::OpenAiClient;
use crate::splitter::split_text;
use self::pdf::PageText;

pub struct Ingestor {
    config: AppConfig,
    client: OpenAiClient,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub page_count: usize,
    pub chunk_count: usize,
    pub index_dir: PathBuf,
}

impl Ingestor {
    pub fn new(config: AppConfig, client: OpenAiClient) -> Self {
        Self { config, client }
    }

    /// Rebuilds the vector index from the given PDF, replacing any index
    /// already present at the configured directory. `progress` is called
    /// after each chunk is embedded with (embedded, total).
    pub async fn ingest<F>(&self, pdf_path: &Path, mut progress: F) -> Result<IngestReport>
    where
        F: FnMut(usize, usize),
    {
        if !pdf_path.exists() {
            anyhow::bail!("PDF not found at {}", pdf_path.display());
        }

        let pdf_sha256 = file_sha256(pdf_path).await?;
        let pages = pdf::extract_pages(pdf_path).await?;
        let page_count = pages.len();
        tracing::info!("extracted text from {} page(s)", page_count);

        let chunks = build_chunks(
            pages,
            &self.config.source_label,
            self.config.chunks.chunk_size,
            self.config.chunks.chunk_overlap,
        );
        if chunks.is_empty() {
            anyhow::bail!("no chunks generated from the PDF text");
        }

        let total = chunks.len();
        let mut entries = Vec::with_capacity(total);
        for (done, chunk) in chunks.into_iter().enumerate() {
            let embedding = self
                .client
                .embed(&self.config.models.embedding_model, &chunk.content)
                .await
                .with_context(|| format!("failed embedding for chunk {}", chunk.id))?;

            entries.push(IndexEntry { chunk, embedding });
            progress(done + 1, total);
        }

        let dimension = entries.first().map(|e| e.embedding.len()).unwrap_or(0);
        let manifest = IndexManifest {
            embedding_model: self.config.models.embedding_model.clone(),
            dimension,
            chunk_count: entries.len(),
            source_label: self.config.source_label.clone(),
            pdf_sha256,
            created_at: Utc::now(),
        };

        let index = VectorIndex::new(manifest, entries)?;
        index.save(&self.config.index_dir).with_context(|| {
            format!(
                "failed to persist index to {}",
                self.config.index_dir.display()
            )
        })?;

        Ok(IngestReport {
            page_count,
            chunk_count: index.len(),
            index_dir: self.config.index_dir.clone(),
        })
    }
}

pub fn build_chunks(
    pages: Vec<PageText>,
    source_label: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for page in pages {
        for piece in split_text(&page.text, chunk_size, chunk_overlap) {
            chunks.push(Chunk {
                id: Uuid::new_v4().to_string(),
                content: piece,
                page: page.page,
                source: source_label.to_string(),
                chunk_index: chunks.len(),
            });
        }
    }
    chunks
}

async fn file_sha256(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed reading file for hash: {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: &str = "Nestlé HR Policy (2012)";

    fn page(number: i64, words: usize) -> PageText {
        PageText {
            page: Some(number),
            text: (1..=words)
                .map(|n| format!("word{n:04}"))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    #[test]
    fn every_chunk_carries_the_source_label_and_its_page() {
        let chunks = build_chunks(vec![page(1, 120), page(2, 120)], LABEL, 200, 40);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.source, LABEL);
            let page = chunk.page.expect("page must be present");
            assert!((1..=2).contains(&page));
        }
    }

    #[test]
    fn chunk_count_scales_with_text_length() {
        let words = 600usize;
        let chunks = build_chunks(vec![page(1, words)], LABEL, 200, 40);

        // Each word is 9 bytes with its separator; the splitter advances by
        // roughly (chunk_size - overlap) bytes per chunk.
        let total_len = words * 9;
        let expected = total_len.div_ceil(200 - 40);
        assert!(chunks.len() >= expected / 2);
        assert!(chunks.len() <= expected * 2);
    }

    #[test]
    fn chunk_indexes_are_sequential_across_pages() {
        let chunks = build_chunks(vec![page(1, 120), page(2, 120)], LABEL, 200, 40);
        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, expected);
        }
    }

    #[test]
    fn fallback_page_stays_unset() {
        let pages = vec![PageText {
            page: None,
            text: "whole document fallback text".to_string(),
        }];
        let chunks = build_chunks(pages, LABEL, 200, 40);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, None);
    }

    #[tokio::test]
    async fn missing_pdf_aborts_ingestion() {
        let config = crate::config::AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            index_dir: std::env::temp_dir().join("policychat-missing-pdf"),
            api_base_url: "http://127.0.0.1:1".to_string(),
            api_key: "test".to_string(),
            models: crate::config::ModelConfig {
                chat_model: "gpt-4o-mini".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
            },
            chunks: crate::config::ChunkConfig {
                chunk_size: 800,
                chunk_overlap: 150,
            },
            retrieve_top_k: 5,
            source_label: LABEL.to_string(),
            stage_timeout_secs: 5,
        };
        let client = OpenAiClient::new(
            config.api_base_url.clone(),
            config.api_key.clone(),
        );
        let ingestor = Ingestor::new(config, client);

        let err = ingestor
            .ingest(Path::new("/nonexistent/policy.pdf"), |_, _| {})
            .await
            .expect_err("missing PDF must fail");
        assert!(err.to_string().contains("PDF not found"));
    }
}
