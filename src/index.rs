use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Chunk, RetrievedChunk};

const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_FILE: &str = "entries.json";

/// Provenance record persisted beside the entries. The serving process
/// refuses to load an index whose embedding model does not match its own
/// configuration, since similarity scores across models are meaningless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub source_label: String,
    pub pdf_sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug)]
pub struct VectorIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(manifest: IndexManifest, entries: Vec<IndexEntry>) -> Result<Self> {
        if entries.is_empty() {
            anyhow::bail!("vector index contains no entries");
        }
        if manifest.chunk_count != entries.len() {
            anyhow::bail!(
                "manifest chunk count ({}) does not match entry count ({})",
                manifest.chunk_count,
                entries.len()
            );
        }
        for entry in &entries {
            if entry.embedding.len() != manifest.dimension {
                anyhow::bail!(
                    "chunk {} has embedding dimension {} but the index dimension is {}",
                    entry.chunk.id,
                    entry.embedding.len(),
                    manifest.dimension
                );
            }
        }

        Ok(Self { manifest, entries })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persists the index, replacing any prior index at the same path.
    pub fn save(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            fs::remove_dir_all(dir)
                .with_context(|| format!("failed to clear index directory {}", dir.display()))?;
        }
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create index directory {}", dir.display()))?;

        let manifest = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(dir.join(MANIFEST_FILE), manifest)
            .with_context(|| format!("failed to write {}", MANIFEST_FILE))?;

        let entries = serde_json::to_string(&self.entries)?;
        fs::write(dir.join(ENTRIES_FILE), entries)
            .with_context(|| format!("failed to write {}", ENTRIES_FILE))?;

        Ok(())
    }

    pub fn load(dir: &Path, expected_model: &str) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = fs::read_to_string(&manifest_path).with_context(|| {
            format!(
                "failed to read {}; run the ingest binary to build the index",
                manifest_path.display()
            )
        })?;
        let manifest: IndexManifest =
            serde_json::from_str(&manifest).context("failed to parse index manifest")?;

        if manifest.embedding_model != expected_model {
            anyhow::bail!(
                "index at {} was built with embedding model '{}' but the configured model is '{}'; \
                 re-run ingestion with the configured model",
                dir.display(),
                manifest.embedding_model,
                expected_model
            );
        }

        let entries_path = dir.join(ENTRIES_FILE);
        let entries = fs::read_to_string(&entries_path)
            .with_context(|| format!("failed to read {}", entries_path.display()))?;
        let entries: Vec<IndexEntry> =
            serde_json::from_str(&entries).context("failed to parse index entries")?;

        Self::new(manifest, entries)
    }

    /// Exact nearest-neighbor search: cosine similarity against every entry,
    /// most similar first. Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<RetrievedChunk> {
        let mut scored: Vec<RetrievedChunk> = self
            .entries
            .iter()
            .map(|entry| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn chunk(id: &str, content: &str, page: i64, chunk_index: usize) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            page: Some(page),
            source: "Nestlé HR Policy (2012)".to_string(),
            chunk_index,
        }
    }

    fn manifest(dimension: usize, chunk_count: usize) -> IndexManifest {
        IndexManifest {
            embedding_model: "text-embedding-3-small".to_string(),
            dimension,
            chunk_count,
            source_label: "Nestlé HR Policy (2012)".to_string(),
            pdf_sha256: "abc123".to_string(),
            created_at: Utc::now(),
        }
    }

    fn sample_index() -> VectorIndex {
        let entries = vec![
            IndexEntry {
                chunk: chunk("a", "Vacation accrues at two days per month.", 4, 0),
                embedding: vec![1.0, 0.0, 0.0],
            },
            IndexEntry {
                chunk: chunk("b", "Sick leave requires a doctor's note.", 7, 1),
                embedding: vec![0.0, 1.0, 0.0],
            },
            IndexEntry {
                chunk: chunk("c", "Parental leave spans fourteen weeks.", 9, 2),
                embedding: vec![0.0, 0.0, 1.0],
            },
        ];
        VectorIndex::new(manifest(3, 3), entries).expect("index should build")
    }

    fn temp_index_dir() -> PathBuf {
        std::env::temp_dir().join(format!("policychat-index-{}", Uuid::new_v4()))
    }

    #[test]
    fn own_vector_ranks_its_chunk_first() {
        let index = sample_index();
        let results = index.search(&[0.0, 1.0, 0.0], 3);
        assert_eq!(results[0].chunk.id, "b");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn search_truncates_to_k() {
        let index = sample_index();
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 2).len(), 2);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).len(), 3);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let entries = vec![
            IndexEntry {
                chunk: chunk("first", "one", 1, 0),
                embedding: vec![1.0, 0.0],
            },
            IndexEntry {
                chunk: chunk("second", "two", 2, 1),
                embedding: vec![1.0, 0.0],
            },
        ];
        let index = VectorIndex::new(manifest(2, 2), entries).expect("index should build");

        let results = index.search(&[1.0, 0.0], 2);
        assert_eq!(results[0].chunk.id, "first");
        assert_eq!(results[1].chunk.id, "second");
    }

    #[test]
    fn save_then_load_preserves_entries() {
        let dir = temp_index_dir();
        let index = sample_index();
        index.save(&dir).expect("save should succeed");

        let loaded =
            VectorIndex::load(&dir, "text-embedding-3-small").expect("load should succeed");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.manifest().dimension, 3);

        let results = loaded.search(&[0.0, 0.0, 1.0], 1);
        assert_eq!(results[0].chunk.id, "c");
        assert_eq!(results[0].chunk.page, Some(9));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_rejects_mismatched_embedding_model() {
        let dir = temp_index_dir();
        sample_index().save(&dir).expect("save should succeed");

        let err = VectorIndex::load(&dir, "text-embedding-3-large")
            .expect_err("mismatched model must fail");
        assert!(err.to_string().contains("text-embedding-3-small"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn save_overwrites_previous_index() {
        let dir = temp_index_dir();
        sample_index().save(&dir).expect("first save");

        let entries = vec![IndexEntry {
            chunk: chunk("only", "Replacement content.", 1, 0),
            embedding: vec![1.0, 0.0],
        }];
        VectorIndex::new(manifest(2, 1), entries)
            .expect("index should build")
            .save(&dir)
            .expect("second save");

        let loaded = VectorIndex::load(&dir, "text-embedding-3-small").expect("load");
        assert_eq!(loaded.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn dimension_mismatch_is_rejected_at_build() {
        let entries = vec![IndexEntry {
            chunk: chunk("a", "one", 1, 0),
            embedding: vec![1.0, 0.0, 0.0],
        }];
        assert!(VectorIndex::new(manifest(2, 1), entries).is_err());
    }

    #[test]
    fn mismatched_query_length_scores_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }
}
