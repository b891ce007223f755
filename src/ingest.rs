//! Document ingestion: metadata inference, macro chunking, storage.
//!
//! Ingestion stops at the parent store. Micro fragments and index rows
//! are derived at activation, so a freshly ingested document is
//! invisible to retrieval until a reviewer approves and activates it.
//!
//! Re-ingesting an id replaces the document in place: macro fragments
//! are upserted by their deterministic ids, stale tails are pruned,
//! derived rows are dropped, and the status falls back to pending so
//! the new content goes through review again.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::config::Config;
use crate::fragments::FragmentStore;
use crate::lexical::LexicalIndex;
use crate::models::{Document, DocumentKind, DocumentStatus};
use crate::vector::VectorIndex;

/// Inputs for one ingestion. Unset metadata is inferred from the
/// filename and text.
pub struct IngestParams {
    pub filename: String,
    pub source: String,
    pub text: String,
    pub extraction_method: String,
    pub document_id: Option<String>,
    pub kind: Option<DocumentKind>,
    pub jurisdiction: Option<String>,
    pub publication_date: Option<String>,
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub document_id: String,
    pub kind: DocumentKind,
    pub jurisdiction: String,
    pub macro_count: usize,
    pub replaced: bool,
}

pub async fn ingest(
    pool: &SqlitePool,
    config: &Config,
    params: IngestParams,
) -> Result<IngestOutcome> {
    let id = params
        .document_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let kind = params
        .kind
        .unwrap_or_else(|| infer_kind(&params.filename, &params.text));
    let jurisdiction = params
        .jurisdiction
        .unwrap_or_else(|| infer_jurisdiction(&params.text));

    let replaced = get_document(pool, &id).await?.is_some();

    let doc = Document {
        id: id.clone(),
        filename: params.filename,
        source: params.source,
        kind,
        jurisdiction: jurisdiction.clone(),
        publication_date: params.publication_date,
        status: DocumentStatus::Pending,
        extraction_method: params.extraction_method,
        text: params.text,
        created_at: Utc::now().timestamp(),
    };

    sqlx::query(
        r#"
        INSERT INTO documents
            (id, filename, source, kind, jurisdiction, publication_date,
             status, extraction_method, text_content, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            filename = excluded.filename,
            source = excluded.source,
            kind = excluded.kind,
            jurisdiction = excluded.jurisdiction,
            publication_date = excluded.publication_date,
            status = excluded.status,
            extraction_method = excluded.extraction_method,
            text_content = excluded.text_content
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.filename)
    .bind(&doc.source)
    .bind(doc.kind.as_str())
    .bind(&doc.jurisdiction)
    .bind(&doc.publication_date)
    .bind(doc.status.as_str())
    .bind(&doc.extraction_method)
    .bind(&doc.text)
    .bind(doc.created_at)
    .execute(pool)
    .await?;

    // Derived rows from a previous version are stale the moment the
    // text changes. Drop them; activation rebuilds.
    if replaced {
        LexicalIndex::new(pool.clone()).delete_for_document(&id).await?;
        VectorIndex::new(pool.clone()).delete_for_document(&id).await?;
        sqlx::query("DELETE FROM micro_fragments WHERE document_id = ?")
            .bind(&id)
            .execute(pool)
            .await?;
    }

    let chunker = Chunker::new(config.chunking.clone());
    let macros = chunker.macro_fragments(&doc);
    let store = FragmentStore::new(pool.clone());
    store.upsert_macros(&macros).await?;

    // A shorter re-ingest leaves fragments past the new tail behind.
    sqlx::query("DELETE FROM macro_fragments WHERE document_id = ? AND ordinal >= ?")
        .bind(&id)
        .bind(macros.len() as i64)
        .execute(pool)
        .await?;

    info!(
        document_id = %id,
        kind = kind.as_str(),
        macros = macros.len(),
        replaced,
        "document ingested"
    );

    Ok(IngestOutcome {
        document_id: id,
        kind,
        jurisdiction,
        macro_count: macros.len(),
        replaced,
    })
}

pub async fn get_document(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
    let row = sqlx::query(
        r#"
        SELECT id, filename, source, kind, jurisdiction, publication_date,
               status, extraction_method, text_content, created_at
        FROM documents WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(document_from_row).transpose()
}

/// List documents, optionally filtered by status, newest first.
pub async fn list_documents(
    pool: &SqlitePool,
    status: Option<DocumentStatus>,
) -> Result<Vec<Document>> {
    let sql_all = r#"
        SELECT id, filename, source, kind, jurisdiction, publication_date,
               status, extraction_method, text_content, created_at
        FROM documents ORDER BY created_at DESC
    "#;
    let sql_filtered = r#"
        SELECT id, filename, source, kind, jurisdiction, publication_date,
               status, extraction_method, text_content, created_at
        FROM documents WHERE status = ? ORDER BY created_at DESC
    "#;

    let rows = match status {
        Some(s) => {
            sqlx::query(sql_filtered)
                .bind(s.as_str())
                .fetch_all(pool)
                .await?
        }
        None => sqlx::query(sql_all).fetch_all(pool).await?,
    };
    rows.into_iter().map(document_from_row).collect()
}

pub(crate) fn document_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Document> {
    let kind_str: String = row.get("kind");
    let status_str: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        filename: row.get("filename"),
        source: row.get("source"),
        kind: DocumentKind::parse(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("Unknown document kind: {}", kind_str))?,
        jurisdiction: row.get("jurisdiction"),
        publication_date: row.get("publication_date"),
        status: DocumentStatus::parse(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Unknown document status: {}", status_str))?,
        extraction_method: row.get("extraction_method"),
        text: row.get("text_content"),
        created_at: row.get("created_at"),
    })
}

/// Guess the document kind from filename and content.
///
/// Gazette mastheads and act headers dominate; a table separator line
/// marks tabular payroll or schedule documents; a run of article
/// markers marks legislation. Everything else is generic.
pub fn infer_kind(filename: &str, text: &str) -> DocumentKind {
    let name = filename.to_lowercase();
    let head: String = text.chars().take(4000).collect();
    let head_upper = head.to_uppercase();

    if name.contains("diario") || name.contains("diário") || head_upper.contains("DIÁRIO OFICIAL")
        || head_upper.contains("DIARIO OFICIAL")
    {
        return DocumentKind::Gazette;
    }

    let looks_tabular = head
        .lines()
        .nth(1)
        .map(|l| l.contains('|') && l.contains('-'))
        .unwrap_or(false);
    if looks_tabular {
        return DocumentKind::Table;
    }

    let article_markers = text.matches("Art.").count() + text.matches("Art ").count();
    if article_markers >= 3
        || name.contains("lei")
        || name.contains("estatuto")
        || name.contains("codigo")
        || name.contains("código")
    {
        return DocumentKind::Statute;
    }

    DocumentKind::Generic
}

/// Guess the jurisdiction from the document head. Falls back to
/// `"unknown"` so the column is never null and filters stay exact.
pub fn infer_jurisdiction(text: &str) -> String {
    let head: String = text.chars().take(4000).collect::<String>().to_uppercase();

    if head.contains("PREFEITURA") || head.contains("MUNICÍPIO") || head.contains("MUNICIPIO")
        || head.contains("CÂMARA MUNICIPAL") || head.contains("CAMARA MUNICIPAL")
    {
        "municipal".to_string()
    } else if head.contains("GOVERNO DO ESTADO")
        || head.contains("ASSEMBLEIA LEGISLATIVA")
        || head.contains("ESTADO D")
    {
        "estadual".to_string()
    } else if head.contains("PRESIDÊNCIA DA REPÚBLICA")
        || head.contains("PRESIDENCIA DA REPUBLICA")
        || head.contains("CONGRESSO NACIONAL")
    {
        "federal".to_string()
    } else {
        "unknown".to_string()
    }
}
