//! Fragment store: the parent/child document store behind retrieval.
//!
//! Macro fragments are the expansion targets handed back to callers;
//! micro fragments are the indexed units. Both are keyed by their
//! deterministic ids, so writes are upserts and re-ingestion replaces
//! rows in place. Reads of page-kind macros append a short peek into
//! the next page, because answers in gazettes routinely straddle a
//! page break.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{
    macro_fragment_id, DocumentKind, MacroFragment, MacroKind, MicroFragment,
};

#[derive(Clone)]
pub struct FragmentStore {
    pool: SqlitePool,
}

impl FragmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert macro fragments by id. Deterministic ids make this the
    /// whole idempotency story for re-ingestion.
    pub async fn upsert_macros(&self, fragments: &[MacroFragment]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for f in fragments {
            sqlx::query(
                r#"
                INSERT INTO macro_fragments (id, document_id, ordinal, kind, text)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    text = excluded.text
                "#,
            )
            .bind(&f.id)
            .bind(&f.document_id)
            .bind(f.ordinal)
            .bind(f.kind.as_str())
            .bind(&f.text)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_micros(&self, fragments: &[MicroFragment]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for f in fragments {
            sqlx::query(
                r#"
                INSERT INTO micro_fragments
                    (id, parent_id, document_id, ordinal, text, context,
                     jurisdiction, kind, hash, extra_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    context = excluded.context,
                    jurisdiction = excluded.jurisdiction,
                    kind = excluded.kind,
                    hash = excluded.hash,
                    extra_json = excluded.extra_json
                "#,
            )
            .bind(&f.id)
            .bind(&f.parent_id)
            .bind(&f.document_id)
            .bind(f.ordinal)
            .bind(&f.text)
            .bind(&f.context)
            .bind(&f.jurisdiction)
            .bind(f.kind.as_str())
            .bind(&f.hash)
            .bind(f.extra.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_macro(&self, id: &str) -> Result<Option<MacroFragment>> {
        let row = sqlx::query(
            "SELECT id, document_id, ordinal, kind, text FROM macro_fragments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(macro_from_row).transpose()?)
    }

    /// Macro text for presentation: page-kind fragments get the first
    /// `peek_chars` characters of the next page appended. The peek is
    /// read-time only and never stored or indexed.
    pub async fn expanded_text(&self, fragment: &MacroFragment, peek_chars: usize) -> Result<String> {
        if fragment.kind != MacroKind::Page || peek_chars == 0 {
            return Ok(fragment.text.clone());
        }
        let next_id = macro_fragment_id(&fragment.document_id, fragment.ordinal + 1);
        let next: Option<String> =
            sqlx::query_scalar("SELECT text FROM macro_fragments WHERE id = ? AND kind = ?")
                .bind(&next_id)
                .bind(MacroKind::Page.as_str())
                .fetch_optional(&self.pool)
                .await?;
        match next {
            Some(next_text) => {
                let peek: String = next_text.chars().take(peek_chars).collect();
                Ok(format!("{}\n{}", fragment.text, peek.trim_end()))
            }
            None => Ok(fragment.text.clone()),
        }
    }

    pub async fn get_micro(&self, id: &str) -> Result<Option<MicroFragment>> {
        let row = sqlx::query(
            r#"
            SELECT id, parent_id, document_id, ordinal, text, context,
                   jurisdiction, kind, hash, extra_json
            FROM micro_fragments WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(micro_from_row).transpose()?)
    }

    /// The fragment plus its ordinal neighbors under the same parent.
    /// Used when the parent macro cannot be fetched.
    pub async fn micro_with_siblings(
        &self,
        parent_id: &str,
        ordinal: i64,
    ) -> Result<Vec<MicroFragment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, parent_id, document_id, ordinal, text, context,
                   jurisdiction, kind, hash, extra_json
            FROM micro_fragments
            WHERE parent_id = ? AND ordinal BETWEEN ? AND ?
            ORDER BY ordinal
            "#,
        )
        .bind(parent_id)
        .bind(ordinal - 1)
        .bind(ordinal + 1)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(micro_from_row).collect()
    }

    pub async fn macros_for_document(&self, document_id: &str) -> Result<Vec<MacroFragment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, ordinal, kind, text
            FROM macro_fragments WHERE document_id = ? ORDER BY ordinal
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(macro_from_row).collect()
    }

    pub async fn micros_for_document(&self, document_id: &str) -> Result<Vec<MicroFragment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, parent_id, document_id, ordinal, text, context,
                   jurisdiction, kind, hash, extra_json
            FROM micro_fragments
            WHERE document_id = ? ORDER BY parent_id, ordinal
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(micro_from_row).collect()
    }

    /// Delete every fragment of a document, children first. Returns
    /// (micro, macro) rows removed.
    pub async fn delete_for_document(&self, document_id: &str) -> Result<(u64, u64)> {
        let mut tx = self.pool.begin().await?;
        let micros = sqlx::query("DELETE FROM micro_fragments WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let macros = sqlx::query("DELETE FROM macro_fragments WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok((micros, macros))
    }

    pub async fn micro_count(&self, document_id: &str) -> Result<i64> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM micro_fragments WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn macro_from_row(row: sqlx::sqlite::SqliteRow) -> Result<MacroFragment> {
    let kind_str: String = row.get("kind");
    Ok(MacroFragment {
        id: row.get("id"),
        document_id: row.get("document_id"),
        ordinal: row.get("ordinal"),
        kind: MacroKind::parse(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("Unknown macro fragment kind: {}", kind_str))?,
        text: row.get("text"),
    })
}

fn micro_from_row(row: sqlx::sqlite::SqliteRow) -> Result<MicroFragment> {
    let kind_str: String = row.get("kind");
    let extra_json: String = row.get("extra_json");
    Ok(MicroFragment {
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        document_id: row.get("document_id"),
        ordinal: row.get("ordinal"),
        text: row.get("text"),
        context: row.get("context"),
        jurisdiction: row.get("jurisdiction"),
        kind: DocumentKind::parse(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("Unknown document kind: {}", kind_str))?,
        hash: row.get("hash"),
        extra: serde_json::from_str(&extra_json).unwrap_or(serde_json::Value::Null),
    })
}
