//! Lexical index over micro fragments, backed by SQLite FTS5.
//!
//! Rows exist only while the owning document is active: activation
//! writes them, deletion and deactivation remove them. Status gating
//! is therefore structural and queries never need a status join.
//!
//! User queries go through [`sanitize_query`] before reaching MATCH.
//! FTS5 query syntax errors on stray quotes and operators, and a
//! retrieval branch must degrade, not error, on hostile input.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::MicroFragment;

/// One lexical candidate. `score` is higher-is-better (negated bm25
/// rank); callers normalize before merging with other branches.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub fragment_id: String,
    pub document_id: String,
    pub score: f64,
}

#[derive(Clone)]
pub struct LexicalIndex {
    pool: SqlitePool,
}

impl LexicalIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Index a batch of fragments. `texts` must be parallel to
    /// `fragments` and carries the banner-prefixed index text. Existing
    /// rows for the same fragment ids are replaced.
    pub async fn insert_batch(
        &self,
        fragments: &[MicroFragment],
        texts: &[String],
    ) -> Result<()> {
        assert_eq!(fragments.len(), texts.len());
        let mut tx = self.pool.begin().await?;
        for (f, text) in fragments.iter().zip(texts) {
            sqlx::query("DELETE FROM micro_fts WHERE fragment_id = ?")
                .bind(&f.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO micro_fts (fragment_id, document_id, jurisdiction, text) VALUES (?, ?, ?, ?)",
            )
            .bind(&f.id)
            .bind(&f.document_id)
            .bind(&f.jurisdiction)
            .bind(text)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Keyword search, best rank first. An optional jurisdiction
    /// narrows through the UNINDEXED column. Queries that sanitize to
    /// nothing return no hits.
    pub async fn query(
        &self,
        query: &str,
        jurisdiction: Option<&str>,
        limit: i64,
    ) -> Result<Vec<LexicalHit>> {
        let match_expr = sanitize_query(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let sql = match jurisdiction {
            Some(_) => {
                r#"
                SELECT fragment_id, document_id, rank
                FROM micro_fts
                WHERE micro_fts MATCH ? AND jurisdiction = ?
                ORDER BY rank
                LIMIT ?
                "#
            }
            None => {
                r#"
                SELECT fragment_id, document_id, rank
                FROM micro_fts
                WHERE micro_fts MATCH ?
                ORDER BY rank
                LIMIT ?
                "#
            }
        };

        let mut q = sqlx::query(sql).bind(&match_expr);
        if let Some(j) = jurisdiction {
            q = q.bind(j);
        }
        let rows = q.bind(limit).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                LexicalHit {
                    fragment_id: row.get("fragment_id"),
                    document_id: row.get("document_id"),
                    // FTS5 rank is negative bm25, lower is better.
                    score: -rank,
                }
            })
            .collect())
    }

    pub async fn delete_for_document(&self, document_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM micro_fts WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    pub async fn row_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM micro_fts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Reduce a raw user query to a safe FTS5 MATCH expression: each
/// alphanumeric token individually quoted, joined with OR. Everything
/// else (quotes, operators, punctuation) is dropped.
pub fn sanitize_query(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::text_hash;
    use crate::migrate::run_migrations;
    use crate::models::DocumentKind;

    #[test]
    fn test_sanitize_plain_words() {
        assert_eq!(
            sanitize_query("horário farmácias"),
            "\"horário\" OR \"farmácias\""
        );
    }

    #[test]
    fn test_sanitize_strips_fts_syntax() {
        assert_eq!(sanitize_query("\"unbalanced AND (NOT"), "\"unbalanced\" OR \"AND\" OR \"NOT\"");
        assert_eq!(sanitize_query("!!! ???"), "");
        assert_eq!(sanitize_query(""), "");
    }

    async fn index_with_rows() -> LexicalIndex {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let index = LexicalIndex::new(pool);

        let rows = [
            ("m1:0:0", "doc-a", "municipal", "horário de funcionamento das farmácias"),
            ("m1:0:1", "doc-a", "municipal", "alvará de construção residencial"),
            ("m2:0:0", "doc-b", "estadual", "horário de atendimento estadual"),
        ];
        for (id, doc, juris, text) in rows {
            let f = MicroFragment {
                id: id.into(),
                parent_id: id.rsplit_once(':').unwrap().0.into(),
                document_id: doc.into(),
                ordinal: 0,
                text: text.into(),
                context: String::new(),
                jurisdiction: juris.into(),
                kind: DocumentKind::Generic,
                hash: text_hash(text),
                extra: serde_json::Value::Null,
            };
            index.insert_batch(&[f], &[text.to_string()]).await.unwrap();
        }
        index
    }

    #[tokio::test]
    async fn test_query_matches_and_ranks() {
        let index = index_with_rows().await;
        let hits = index.query("horário farmácias", None, 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        // Both terms hit the first row, so it ranks above the
        // single-term match.
        assert_eq!(hits[0].fragment_id, "m1:0:0");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_jurisdiction_filter() {
        let index = index_with_rows().await;
        let hits = index
            .query("horário", Some("estadual"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "doc-b");
    }

    #[tokio::test]
    async fn test_hostile_query_degrades_to_empty() {
        let index = index_with_rows().await;
        let hits = index.query("\"((", None, 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_reindex_replaces_row() {
        let index = index_with_rows().await;
        let f = MicroFragment {
            id: "m1:0:0".into(),
            parent_id: "m1:0".into(),
            document_id: "doc-a".into(),
            ordinal: 0,
            text: "texto novo sobre licitação".into(),
            context: String::new(),
            jurisdiction: "municipal".into(),
            kind: DocumentKind::Generic,
            hash: text_hash("texto novo sobre licitação"),
            extra: serde_json::Value::Null,
        };
        index
            .insert_batch(std::slice::from_ref(&f), &[f.text.clone()])
            .await
            .unwrap();

        assert!(index.query("farmácias", None, 10).await.unwrap().is_empty());
        assert_eq!(index.query("licitação", None, 10).await.unwrap().len(), 1);
        assert_eq!(index.row_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_for_document() {
        let index = index_with_rows().await;
        let deleted = index.delete_for_document("doc-a").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(index.query("farmácias", None, 10).await.unwrap().is_empty());
        assert_eq!(index.row_count().await.unwrap(), 1);
    }
}
