//! SQLite-backed vector index.
//!
//! Chunk text and metadata live in SQLite, with serialized embeddings for
//! brute-force Euclidean-distance search. No external server required;
//! suitable for a moderate-scale private corpus.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{StoredChunk, VectorIndex};
use crate::core::errors::RetrievalError;
use crate::llm::provider::LlmProvider;
use crate::retrieval::types::Candidate;

/// On-disk vector index keyed by a database path.
///
/// Query embeddings are computed through the injected provider; stored
/// embeddings are brute-force scanned. Distances are Euclidean, so lower
/// means more similar and the controller's distance cutoff applies on the
/// usual scale.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    provider: Arc<dyn LlmProvider>,
    embedding_model: String,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorIndex")
            .field("embedding_model", &self.embedding_model)
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteVectorIndex {
    /// Open an existing index.
    ///
    /// Fails with `RetrievalError::IndexNotFound` when no index exists at
    /// `db_path`, distinct from any in-process storage error.
    pub async fn open(
        db_path: PathBuf,
        provider: Arc<dyn LlmProvider>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, RetrievalError> {
        if !db_path.exists() {
            return Err(RetrievalError::IndexNotFound(db_path));
        }
        Self::connect(db_path, provider, embedding_model.into(), false).await
    }

    /// Create a fresh index (or open an existing one), for the offline
    /// ingestion job and for tests.
    pub async fn create(
        db_path: PathBuf,
        provider: Arc<dyn LlmProvider>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, RetrievalError> {
        Self::connect(db_path, provider, embedding_model.into(), true).await
    }

    async fn connect(
        db_path: PathBuf,
        provider: Arc<dyn LlmProvider>,
        embedding_model: String,
        create_if_missing: bool,
    ) -> Result<Self, RetrievalError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RetrievalError::storage)?;

        let index = Self {
            pool,
            provider,
            embedding_model,
            db_path,
        };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), RetrievalError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RetrievalError::storage)?;

        Ok(())
    }

    /// Embed and insert chunks in one batch transaction.
    pub async fn insert_batch(&self, chunks: Vec<StoredChunk>) -> Result<(), RetrievalError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self
            .provider
            .embed(&contents, &self.embedding_model)
            .await?;
        if embeddings.len() != chunks.len() {
            return Err(RetrievalError::Provider(format!(
                "embedding count mismatch: {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut tx = self.pool.begin().await.map_err(RetrievalError::storage)?;

        for (chunk, embedding) in chunks.iter().zip(&embeddings) {
            let blob = serialize_embedding(embedding);
            sqlx::query(
                "INSERT OR REPLACE INTO chunks (chunk_id, content, source, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(RetrievalError::storage)?;
        }

        tx.commit().await.map_err(RetrievalError::storage)?;
        tracing::debug!("Inserted {} chunks into vector index", chunks.len());
        Ok(())
    }

    /// Total number of stored chunks.
    pub async fn count(&self) -> Result<usize, RetrievalError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(RetrievalError::storage)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>, RetrievalError> {
        let query_embedding = self
            .provider
            .embed(&[query.to_string()], &self.embedding_model)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RetrievalError::Provider("provider returned no query embedding".to_string())
            })?;

        let rows = sqlx::query("SELECT content, source, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await
            .map_err(RetrievalError::storage)?;

        let mut scored: Vec<Candidate> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = deserialize_embedding(&embedding_bytes);
                let distance = l2_distance(&query_embedding, &stored)?;

                Some(Candidate {
                    content: row.get("content"),
                    source: row.get("source"),
                    distance: Some(distance),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }
}

/// Serialize embedding to bytes (little-endian f32).
fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize embedding from bytes.
fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Euclidean distance; `None` on dimension mismatch.
fn l2_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let sum: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
    Some(sum.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatRequest;

    /// Deterministic embedder: maps known words onto fixed axes.
    struct StubEmbedder;

    #[async_trait]
    impl LlmProvider for StubEmbedder {
        fn name(&self) -> &str {
            "stub"
        }

        async fn health_check(&self) -> Result<bool, RetrievalError> {
            Ok(true)
        }

        async fn chat(&self, _: ChatRequest, _: &str) -> Result<String, RetrievalError> {
            Err(RetrievalError::Provider("stub has no chat".to_string()))
        }

        async fn embed(
            &self,
            inputs: &[String],
            _: &str,
        ) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    let text = text.to_lowercase();
                    vec![
                        if text.contains("congé") { 1.0 } else { 0.0 },
                        if text.contains("préavis") { 1.0 } else { 0.0 },
                        if text.contains("salaire") { 1.0 } else { 0.0 },
                    ]
                })
                .collect())
        }
    }

    fn temp_db(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("index.db")
    }

    #[tokio::test]
    async fn open_missing_index_is_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteVectorIndex::open(temp_db(&dir), Arc::new(StubEmbedder), "emb")
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::IndexNotFound(_)));
    }

    #[tokio::test]
    async fn search_orders_by_ascending_distance() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteVectorIndex::create(temp_db(&dir), Arc::new(StubEmbedder), "emb")
            .await
            .unwrap();

        index
            .insert_batch(vec![
                StoredChunk::new("Le préavis de licenciement", "preavis.pdf"),
                StoredChunk::new("Le congé annuel payé", "conges.pdf"),
                StoredChunk::new("Le salaire minimum garanti", "salaire.pdf"),
            ])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 3);

        let results = index.search("durée du congé", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, "conges.pdf");
        assert_eq!(results[0].distance, Some(0.0));
        assert!(results[1].distance.unwrap() > results[0].distance.unwrap());
    }

    #[tokio::test]
    async fn create_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_db(&dir);

        {
            let index = SqliteVectorIndex::create(path.clone(), Arc::new(StubEmbedder), "emb")
                .await
                .unwrap();
            index
                .insert_batch(vec![StoredChunk::new("Le congé parental", "conges.pdf")])
                .await
                .unwrap();
        }

        let reopened = SqliteVectorIndex::open(path, Arc::new(StubEmbedder), "emb")
            .await
            .unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[test]
    fn embedding_blob_round_trip() {
        let embedding = vec![0.25_f32, -1.5, 3.75];
        let blob = serialize_embedding(&embedding);
        assert_eq!(deserialize_embedding(&blob), embedding);
    }
}
