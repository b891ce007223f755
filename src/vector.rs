//! Vector index over micro fragment embeddings.
//!
//! Embeddings are stored as little-endian f32 BLOBs next to the
//! metadata needed for filtering. Similarity runs in Rust: candidate
//! rows are fetched with plain WHERE filters and scored with cosine
//! similarity, which keeps SQLite free of vector extensions at the
//! corpus sizes this serves.
//!
//! Deletion is strictly metadata-filtered. `document_id` is written on
//! every row at insert time, so removal is one DELETE and never an
//! enumeration of fragment ids.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::MicroFragment;

/// One vector candidate. `score` is cosine similarity in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub fragment_id: String,
    pub document_id: String,
    pub score: f64,
}

#[derive(Clone)]
pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert one embedding, keyed by fragment id.
    pub async fn upsert(
        &self,
        fragment: &MicroFragment,
        model: &str,
        embedding: &[f32],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO micro_vectors
                (fragment_id, document_id, jurisdiction, kind, model, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(fragment_id) DO UPDATE SET
                document_id = excluded.document_id,
                jurisdiction = excluded.jurisdiction,
                kind = excluded.kind,
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(&fragment.id)
        .bind(&fragment.document_id)
        .bind(&fragment.jurisdiction)
        .bind(fragment.kind.as_str())
        .bind(model)
        .bind(embedding.len() as i64)
        .bind(vec_to_blob(embedding))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Nearest fragments to `query_vec` by cosine similarity, best
    /// first. Rows with a dimensionality other than the query's are
    /// skipped; they belong to a previous embedding model.
    pub async fn query(
        &self,
        query_vec: &[f32],
        jurisdiction: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        if query_vec.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let sql = match jurisdiction {
            Some(_) => {
                "SELECT fragment_id, document_id, embedding FROM micro_vectors WHERE jurisdiction = ?"
            }
            None => "SELECT fragment_id, document_id, embedding FROM micro_vectors",
        };
        let mut q = sqlx::query(sql);
        if let Some(j) = jurisdiction {
            q = q.bind(j);
        }
        let rows = q.fetch_all(&self.pool).await?;

        let mut hits: Vec<VectorHit> = rows
            .into_iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                if vec.len() != query_vec.len() {
                    return None;
                }
                Some(VectorHit {
                    fragment_id: row.get("fragment_id"),
                    document_id: row.get("document_id"),
                    score: cosine_similarity(query_vec, &vec) as f64,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Remove every vector of a document through the stored metadata.
    pub async fn delete_for_document(&self, document_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM micro_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    pub async fn row_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM micro_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_for_document(&self, document_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM micro_vectors WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::text_hash;
    use crate::migrate::run_migrations;
    use crate::models::DocumentKind;

    fn fragment(id: &str, doc: &str, juris: &str) -> MicroFragment {
        MicroFragment {
            id: id.into(),
            parent_id: id.rsplit_once(':').unwrap().0.into(),
            document_id: doc.into(),
            ordinal: 0,
            text: "texto".into(),
            context: String::new(),
            jurisdiction: juris.into(),
            kind: DocumentKind::Generic,
            hash: text_hash("texto"),
            extra: serde_json::Value::Null,
        }
    }

    async fn index() -> VectorIndex {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        VectorIndex::new(pool)
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let idx = index().await;
        idx.upsert(&fragment("a:0:0", "doc-a", "municipal"), "m", &[1.0, 0.0, 0.0])
            .await
            .unwrap();
        idx.upsert(&fragment("a:0:1", "doc-a", "municipal"), "m", &[0.7, 0.7, 0.0])
            .await
            .unwrap();
        idx.upsert(&fragment("a:0:2", "doc-a", "municipal"), "m", &[0.0, 1.0, 0.0])
            .await
            .unwrap();

        let hits = idx.query(&[1.0, 0.0, 0.0], None, 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].fragment_id, "a:0:0");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].fragment_id, "a:0:1");
    }

    #[tokio::test]
    async fn test_jurisdiction_filter() {
        let idx = index().await;
        idx.upsert(&fragment("a:0:0", "doc-a", "municipal"), "m", &[1.0, 0.0])
            .await
            .unwrap();
        idx.upsert(&fragment("b:0:0", "doc-b", "estadual"), "m", &[1.0, 0.0])
            .await
            .unwrap();

        let hits = idx.query(&[1.0, 0.0], Some("estadual"), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "doc-b");
    }

    #[tokio::test]
    async fn test_mismatched_dims_are_skipped() {
        let idx = index().await;
        idx.upsert(&fragment("a:0:0", "doc-a", "municipal"), "old", &[1.0, 0.0, 0.0])
            .await
            .unwrap();
        idx.upsert(&fragment("a:0:1", "doc-a", "municipal"), "new", &[1.0, 0.0])
            .await
            .unwrap();

        let hits = idx.query(&[1.0, 0.0], None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fragment_id, "a:0:1");
    }

    #[tokio::test]
    async fn test_upsert_replaces_embedding() {
        let idx = index().await;
        let f = fragment("a:0:0", "doc-a", "municipal");
        idx.upsert(&f, "m", &[1.0, 0.0]).await.unwrap();
        idx.upsert(&f, "m", &[0.0, 1.0]).await.unwrap();

        assert_eq!(idx.row_count().await.unwrap(), 1);
        let hits = idx.query(&[0.0, 1.0], None, 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_delete_by_document_metadata() {
        let idx = index().await;
        idx.upsert(&fragment("a:0:0", "doc-a", "municipal"), "m", &[1.0])
            .await
            .unwrap();
        idx.upsert(&fragment("a:0:1", "doc-a", "municipal"), "m", &[1.0])
            .await
            .unwrap();
        idx.upsert(&fragment("b:0:0", "doc-b", "municipal"), "m", &[1.0])
            .await
            .unwrap();

        assert_eq!(idx.delete_for_document("doc-a").await.unwrap(), 2);
        assert_eq!(idx.row_count().await.unwrap(), 1);
        assert_eq!(idx.count_for_document("doc-b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_query_vec() {
        let idx = index().await;
        assert!(idx.query(&[], None, 10).await.unwrap().is_empty());
    }
}
