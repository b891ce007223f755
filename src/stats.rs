//! Corpus statistics for the operator.
//!
//! Besides the plain counts, the report compares indexed micro
//! fragments of active documents against vector rows. A mismatch means
//! some activation ran degraded and those documents answer from the
//! lexical branch only.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Default)]
pub struct CorpusStats {
    pub documents_total: i64,
    pub by_status: Vec<(String, i64)>,
    pub by_kind: Vec<(String, i64)>,
    pub by_source: Vec<(String, i64)>,
    pub macro_fragments: i64,
    pub micro_fragments: i64,
    pub lexical_rows: i64,
    pub vector_rows: i64,
    /// Micro fragments of active documents, the population both
    /// indexes should cover.
    pub active_micro_fragments: i64,
    pub last_ingested_at: Option<i64>,
}

impl CorpusStats {
    /// Active fragments missing from the vector index. Only meaningful
    /// when embeddings are enabled.
    pub fn vector_gap(&self) -> i64 {
        self.active_micro_fragments - self.vector_rows
    }
}

pub async fn corpus_stats(pool: &SqlitePool) -> Result<CorpusStats> {
    let mut stats = CorpusStats {
        documents_total: scalar(pool, "SELECT COUNT(*) FROM documents").await?,
        macro_fragments: scalar(pool, "SELECT COUNT(*) FROM macro_fragments").await?,
        micro_fragments: scalar(pool, "SELECT COUNT(*) FROM micro_fragments").await?,
        lexical_rows: scalar(pool, "SELECT COUNT(*) FROM micro_fts").await?,
        vector_rows: scalar(pool, "SELECT COUNT(*) FROM micro_vectors").await?,
        active_micro_fragments: scalar(
            pool,
            r#"
            SELECT COUNT(*) FROM micro_fragments m
            JOIN documents d ON d.id = m.document_id
            WHERE d.status = 'active'
            "#,
        )
        .await?,
        last_ingested_at: sqlx::query_scalar("SELECT MAX(created_at) FROM documents")
            .fetch_one(pool)
            .await?,
        ..CorpusStats::default()
    };

    stats.by_status = grouped(pool, "status").await?;
    stats.by_kind = grouped(pool, "kind").await?;
    stats.by_source = grouped(pool, "source").await?;
    Ok(stats)
}

async fn scalar(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

async fn grouped(pool: &SqlitePool, column: &str) -> Result<Vec<(String, i64)>> {
    // Column names come from the three call sites above, never input.
    let sql = format!(
        "SELECT {column} AS k, COUNT(*) AS n FROM documents GROUP BY {column} ORDER BY n DESC"
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("k"), row.get::<i64, _>("n")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::DisabledProvider;
    use crate::ingest::{ingest, IngestParams};
    use crate::lifecycle::{activate, approve, Corrections};
    use crate::migrate::run_migrations;
    use crate::models::DocumentKind;

    #[tokio::test]
    async fn test_corpus_stats_counts_and_gap() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let config = Config::default();

        let empty = corpus_stats(&pool).await.unwrap();
        assert_eq!(empty.documents_total, 0);
        assert!(empty.last_ingested_at.is_none());

        let a = ingest(
            &pool,
            &config,
            IngestParams {
                filename: "a.txt".into(),
                source: "upload".into(),
                text: "Texto de teste sobre posturas municipais.".into(),
                extraction_method: "direct".into(),
                document_id: None,
                kind: Some(DocumentKind::Generic),
                jurisdiction: Some("municipal".into()),
                publication_date: None,
            },
        )
        .await
        .unwrap();
        approve(&pool, &config, &a.document_id, Corrections::default()).await.unwrap();
        activate(&pool, &config, &DisabledProvider, &a.document_id).await.unwrap();

        let stats = corpus_stats(&pool).await.unwrap();
        assert_eq!(stats.documents_total, 1);
        assert_eq!(stats.by_status, vec![("active".to_string(), 1)]);
        assert_eq!(stats.micro_fragments, stats.lexical_rows);
        assert!(stats.last_ingested_at.is_some());
        // No embeddings configured, so every active fragment is a gap.
        assert_eq!(stats.vector_gap(), stats.active_micro_fragments);
    }
}
