use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent — safe to run on every startup.
///
/// Four logical stores share the one SQLite file:
/// - `documents` — document metadata and lifecycle status
/// - `macro_fragments` — the parent store for context expansion
/// - `micro_fragments` — indexed units, with the mandatory parent link
/// - `micro_fts` (FTS5) + `micro_vectors` — lexical and vector indexes,
///   populated only while the owning document is active
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            source TEXT NOT NULL,
            kind TEXT NOT NULL,
            jurisdiction TEXT NOT NULL DEFAULT 'unknown',
            publication_date TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            extraction_method TEXT NOT NULL DEFAULT 'direct',
            text_content TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS macro_fragments (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            kind TEXT NOT NULL,
            text TEXT NOT NULL,
            UNIQUE(document_id, ordinal),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS micro_fragments (
            id TEXT PRIMARY KEY,
            parent_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            text TEXT NOT NULL,
            context TEXT NOT NULL DEFAULT '',
            jurisdiction TEXT NOT NULL DEFAULT 'unknown',
            kind TEXT NOT NULL,
            hash TEXT NOT NULL,
            extra_json TEXT NOT NULL DEFAULT '{}',
            UNIQUE(parent_id, ordinal),
            FOREIGN KEY (parent_id) REFERENCES macro_fragments(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS micro_vectors (
            fragment_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            jurisdiction TEXT NOT NULL,
            kind TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='micro_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE micro_fts USING fts5(
                fragment_id UNINDEXED,
                document_id UNINDEXED,
                jurisdiction UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_macro_fragments_document ON macro_fragments(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_micro_fragments_document ON micro_fragments(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_micro_fragments_parent ON micro_fragments(parent_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_micro_vectors_document ON micro_vectors(document_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
