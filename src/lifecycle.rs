//! Document lifecycle: pending, queued, active.
//!
//! Ingestion leaves documents pending. A reviewer approves them into
//! the queue, optionally correcting metadata the inference got wrong.
//! Activation derives the micro fragments and writes the index rows,
//! which is the single point where a document becomes retrievable.
//! There is no path back to pending; fixing an active document means
//! deleting it and ingesting again.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::chunker::{indexed_text, Chunker};
use crate::config::Config;
use crate::embedding::{embed_texts, EmbeddingProvider};
use crate::fragments::FragmentStore;
use crate::ingest::get_document;
use crate::lexical::LexicalIndex;
use crate::models::{Document, DocumentKind, DocumentStatus, MicroFragment};
use crate::vector::VectorIndex;

/// Index writes go out in batches this size; a failed batch is logged
/// and skipped so one bad row cannot block activation.
const INDEX_BATCH: usize = 50;

/// Reviewer corrections applied at approval.
#[derive(Debug, Default)]
pub struct Corrections {
    pub kind: Option<DocumentKind>,
    pub jurisdiction: Option<String>,
    pub publication_date: Option<String>,
}

#[derive(Debug)]
pub struct ActivateOutcome {
    pub micro_count: usize,
    pub lexical_rows: usize,
    pub vector_rows: usize,
}

/// Per-store deletion report. Counts are rows actually removed; `None`
/// means that store's delete failed and its rows may remain, so a
/// half-indexed or half-broken document still shows exactly what each
/// store did.
#[derive(Debug, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub document_deleted: bool,
    pub macro_fragments: Option<u64>,
    pub micro_fragments: Option<u64>,
    pub lexical_rows: Option<u64>,
    pub vector_rows: Option<u64>,
}

/// Move a pending document into the queue, applying any reviewer
/// corrections first. A kind correction re-cuts the macro fragments,
/// since the first pass dispatches on kind.
pub async fn approve(
    pool: &SqlitePool,
    config: &Config,
    document_id: &str,
    corrections: Corrections,
) -> Result<Document> {
    let Some(mut doc) = get_document(pool, document_id).await? else {
        bail!("Document not found: {}", document_id);
    };
    if doc.status != DocumentStatus::Pending {
        bail!(
            "Document {} is {}, only pending documents can be approved",
            document_id,
            doc.status.as_str()
        );
    }

    let kind_changed = corrections
        .kind
        .map(|k| k != doc.kind)
        .unwrap_or(false);
    if let Some(kind) = corrections.kind {
        doc.kind = kind;
    }
    if let Some(jurisdiction) = corrections.jurisdiction {
        doc.jurisdiction = jurisdiction;
    }
    if let Some(date) = corrections.publication_date {
        doc.publication_date = Some(date);
    }
    doc.status = DocumentStatus::Queued;

    sqlx::query(
        r#"
        UPDATE documents
        SET kind = ?, jurisdiction = ?, publication_date = ?, status = ?
        WHERE id = ?
        "#,
    )
    .bind(doc.kind.as_str())
    .bind(&doc.jurisdiction)
    .bind(&doc.publication_date)
    .bind(doc.status.as_str())
    .bind(&doc.id)
    .execute(pool)
    .await?;

    if kind_changed {
        let chunker = Chunker::new(config.chunking.clone());
        let macros = chunker.macro_fragments(&doc);
        let store = FragmentStore::new(pool.clone());
        store.upsert_macros(&macros).await?;
        sqlx::query("DELETE FROM macro_fragments WHERE document_id = ? AND ordinal >= ?")
            .bind(&doc.id)
            .bind(macros.len() as i64)
            .execute(pool)
            .await?;
        info!(document_id = %doc.id, kind = doc.kind.as_str(), "re-cut after kind correction");
    }

    info!(document_id = %doc.id, "document approved");
    Ok(doc)
}

/// Derive micro fragments and populate the indexes, then mark the
/// document active. Re-activating an active document rebuilds its
/// derived rows from scratch, so the operation is idempotent.
pub async fn activate(
    pool: &SqlitePool,
    config: &Config,
    provider: &dyn EmbeddingProvider,
    document_id: &str,
) -> Result<ActivateOutcome> {
    let Some(doc) = get_document(pool, document_id).await? else {
        bail!("Document not found: {}", document_id);
    };
    match doc.status {
        DocumentStatus::Queued | DocumentStatus::Active => {}
        DocumentStatus::Pending => {
            bail!("Document {} is pending, approve it first", document_id)
        }
    }

    let store = FragmentStore::new(pool.clone());
    let lexical = LexicalIndex::new(pool.clone());
    let vector = VectorIndex::new(pool.clone());

    // Start clean; stale derived rows from an earlier activation would
    // otherwise survive with ids the new cut no longer produces.
    lexical.delete_for_document(document_id).await?;
    vector.delete_for_document(document_id).await?;
    sqlx::query("DELETE FROM micro_fragments WHERE document_id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;

    let chunker = Chunker::new(config.chunking.clone());
    let macros = store.macros_for_document(document_id).await?;
    let mut micros: Vec<MicroFragment> = Vec::new();
    for parent in &macros {
        micros.extend(
            chunker
                .micro_fragments(&doc, parent, provider, &config.embedding)
                .await,
        );
    }
    store.upsert_micros(&micros).await?;

    let texts: Vec<String> = micros.iter().map(indexed_text).collect();

    let mut lexical_rows = 0usize;
    for (batch, batch_texts) in micros.chunks(INDEX_BATCH).zip(texts.chunks(INDEX_BATCH)) {
        match lexical.insert_batch(batch, batch_texts).await {
            Ok(()) => lexical_rows += batch.len(),
            Err(e) => {
                error!(document_id, error = %e, "lexical index batch failed, skipping");
            }
        }
    }

    let mut vector_rows = 0usize;
    if config.embedding.is_enabled() {
        let model = provider.model_name().to_string();
        for (batch, batch_texts) in micros.chunks(INDEX_BATCH).zip(texts.chunks(INDEX_BATCH)) {
            match embed_texts(provider, &config.embedding, batch_texts).await {
                Ok(embeddings) => {
                    for (fragment, embedding) in batch.iter().zip(&embeddings) {
                        match vector.upsert(fragment, &model, embedding).await {
                            Ok(()) => vector_rows += 1,
                            Err(e) => {
                                error!(fragment_id = %fragment.id, error = %e, "vector upsert failed");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(document_id, error = %e, "embedding batch failed, fragments stay lexical-only");
                }
            }
        }
    }

    sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
        .bind(DocumentStatus::Active.as_str())
        .bind(document_id)
        .execute(pool)
        .await?;

    info!(
        document_id,
        micros = micros.len(),
        lexical_rows,
        vector_rows,
        "document activated"
    );

    Ok(ActivateOutcome {
        micro_count: micros.len(),
        lexical_rows,
        vector_rows,
    })
}

/// Remove a document from every store. Each store's delete is
/// attempted regardless of what the others did, so a failure in one
/// index cannot leave the rest of the cascade untried; the outcome
/// reports per store what was removed or that the store failed.
pub async fn delete_document(pool: &SqlitePool, document_id: &str) -> Result<DeleteOutcome> {
    let lexical_rows = match LexicalIndex::new(pool.clone())
        .delete_for_document(document_id)
        .await
    {
        Ok(rows) => Some(rows),
        Err(e) => {
            error!(document_id, error = %e, "lexical delete failed, rows may remain");
            None
        }
    };
    let vector_rows = match VectorIndex::new(pool.clone())
        .delete_for_document(document_id)
        .await
    {
        Ok(rows) => Some(rows),
        Err(e) => {
            error!(document_id, error = %e, "vector delete failed, rows may remain");
            None
        }
    };
    let (micro_fragments, macro_fragments) = match FragmentStore::new(pool.clone())
        .delete_for_document(document_id)
        .await
    {
        Ok((micros, macros)) => (Some(micros), Some(macros)),
        Err(e) => {
            error!(document_id, error = %e, "fragment delete failed, rows may remain");
            (None, None)
        }
    };
    let document_deleted = match sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document_id)
        .execute(pool)
        .await
    {
        Ok(result) => result.rows_affected() > 0,
        Err(e) => {
            error!(document_id, error = %e, "document row delete failed");
            false
        }
    };

    info!(
        document_id,
        document_deleted,
        macro_fragments = ?macro_fragments,
        micro_fragments = ?micro_fragments,
        lexical_rows = ?lexical_rows,
        vector_rows = ?vector_rows,
        "document deleted"
    );

    Ok(DeleteOutcome {
        document_deleted,
        macro_fragments,
        micro_fragments,
        lexical_rows,
        vector_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;
    use crate::ingest::{ingest, IngestParams};
    use crate::migrate::run_migrations;

    async fn setup() -> (SqlitePool, Config, String) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let config = Config::default();
        let outcome = ingest(
            &pool,
            &config,
            IngestParams {
                filename: "lei.txt".into(),
                source: "upload".into(),
                text: "CAPÍTULO I\nGeral\nArt. 1º Primeira regra municipal.\nArt. 2º Segunda regra municipal.".into(),
                extraction_method: "direct".into(),
                document_id: None,
                kind: Some(DocumentKind::Statute),
                jurisdiction: Some("municipal".into()),
                publication_date: None,
            },
        )
        .await
        .unwrap();
        (pool, config, outcome.document_id)
    }

    #[tokio::test]
    async fn test_approve_moves_pending_to_queued() {
        let (pool, config, id) = setup().await;
        let doc = approve(&pool, &config, &id, Corrections::default()).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Queued);

        // Approving twice is a state error.
        assert!(approve(&pool, &config, &id, Corrections::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_approve_applies_corrections() {
        let (pool, config, id) = setup().await;
        let doc = approve(
            &pool,
            &config,
            &id,
            Corrections {
                kind: None,
                jurisdiction: Some("estadual".into()),
                publication_date: Some("2024-01-15".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(doc.jurisdiction, "estadual");
        assert_eq!(doc.publication_date.as_deref(), Some("2024-01-15"));
    }

    #[tokio::test]
    async fn test_kind_correction_recuts_macros() {
        let (pool, config, id) = setup().await;
        let before = FragmentStore::new(pool.clone())
            .macros_for_document(&id)
            .await
            .unwrap();
        assert!(before.len() >= 2);

        approve(
            &pool,
            &config,
            &id,
            Corrections {
                kind: Some(DocumentKind::Generic),
                ..Corrections::default()
            },
        )
        .await
        .unwrap();

        let after = FragmentStore::new(pool.clone())
            .macros_for_document(&id)
            .await
            .unwrap();
        // Generic text in one page collapses to a single fragment.
        assert_eq!(after.len(), 1);
    }

    #[tokio::test]
    async fn test_activate_requires_approval() {
        let (pool, config, id) = setup().await;
        let err = activate(&pool, &config, &DisabledProvider, &id).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_activate_populates_lexical_index() {
        let (pool, config, id) = setup().await;
        approve(&pool, &config, &id, Corrections::default()).await.unwrap();

        let lexical = LexicalIndex::new(pool.clone());
        assert_eq!(lexical.row_count().await.unwrap(), 0);

        let outcome = activate(&pool, &config, &DisabledProvider, &id).await.unwrap();
        assert!(outcome.micro_count >= 2);
        assert_eq!(outcome.lexical_rows, outcome.micro_count);
        // Embedding disabled, so no vectors.
        assert_eq!(outcome.vector_rows, 0);
        assert_eq!(lexical.row_count().await.unwrap() as usize, outcome.micro_count);

        let doc = get_document(&pool, &id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Active);
    }

    #[tokio::test]
    async fn test_activate_is_idempotent() {
        let (pool, config, id) = setup().await;
        approve(&pool, &config, &id, Corrections::default()).await.unwrap();
        let first = activate(&pool, &config, &DisabledProvider, &id).await.unwrap();
        let second = activate(&pool, &config, &DisabledProvider, &id).await.unwrap();

        assert_eq!(first.micro_count, second.micro_count);
        let lexical = LexicalIndex::new(pool.clone());
        assert_eq!(lexical.row_count().await.unwrap() as usize, second.micro_count);
    }

    #[tokio::test]
    async fn test_delete_reports_per_store_counts() {
        let (pool, config, id) = setup().await;
        approve(&pool, &config, &id, Corrections::default()).await.unwrap();
        let activated = activate(&pool, &config, &DisabledProvider, &id).await.unwrap();

        let outcome = delete_document(&pool, &id).await.unwrap();
        assert!(outcome.document_deleted);
        assert_eq!(outcome.micro_fragments, Some(activated.micro_count as u64));
        assert_eq!(outcome.lexical_rows, Some(activated.lexical_rows as u64));
        assert_eq!(outcome.vector_rows, Some(0));
        assert!(outcome.macro_fragments.unwrap() >= 2);

        assert!(get_document(&pool, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_document_reports_zeroes() {
        let (pool, _, _) = setup().await;
        let outcome = delete_document(&pool, "no-such-id").await.unwrap();
        assert_eq!(
            outcome,
            DeleteOutcome {
                document_deleted: false,
                macro_fragments: Some(0),
                micro_fragments: Some(0),
                lexical_rows: Some(0),
                vector_rows: Some(0),
            }
        );
    }

    #[tokio::test]
    async fn test_delete_sweeps_remaining_stores_when_one_fails() {
        let (pool, config, id) = setup().await;
        approve(&pool, &config, &id, Corrections::default()).await.unwrap();
        activate(&pool, &config, &DisabledProvider, &id).await.unwrap();

        // Break the lexical store; the other deletions must still run.
        sqlx::query("DROP TABLE micro_fts")
            .execute(&pool)
            .await
            .unwrap();

        let outcome = delete_document(&pool, &id).await.unwrap();
        assert!(outcome.lexical_rows.is_none());
        assert!(outcome.micro_fragments.unwrap() > 0);
        assert!(outcome.macro_fragments.unwrap() > 0);
        assert_eq!(outcome.vector_rows, Some(0));
        assert!(outcome.document_deleted);
        assert!(get_document(&pool, &id).await.unwrap().is_none());
    }
}
