//! # Cividex CLI
//!
//! The `cividex` binary drives the whole pipeline: database setup,
//! document ingestion, the review lifecycle, retrieval, and corpus
//! statistics.
//!
//! ## Usage
//!
//! ```bash
//! cividex --config ./cividex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cividex init` | Create the SQLite database and run schema migrations |
//! | `cividex ingest <file>` | Extract, chunk, and stage a document for review |
//! | `cividex queue` | List documents awaiting review |
//! | `cividex approve <id>` | Approve a pending document, correcting metadata |
//! | `cividex activate <id>` | Index an approved document, making it retrievable |
//! | `cividex retrieve "<query>"` | Hybrid retrieval over active documents |
//! | `cividex documents` | List documents, optionally by status |
//! | `cividex inspect <id>` | Show a document and its fragments |
//! | `cividex delete <id>` | Remove a document from every store |
//! | `cividex stats` | Corpus statistics and index coverage |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cividex::config::{self, Config};
use cividex::db;
use cividex::embedding::create_provider;
use cividex::extract::extract_text;
use cividex::fragments::FragmentStore;
use cividex::ingest::{self, IngestParams};
use cividex::lifecycle::{self, Corrections};
use cividex::migrate;
use cividex::models::{DocumentKind, DocumentStatus};
use cividex::rerank::create_scorer;
use cividex::retrieve::{retrieve, RetrieveRequest};
use cividex::stats::corpus_stats;

/// Cividex — ingestion and hybrid retrieval for municipal documents.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. Missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "cividex",
    about = "Cividex — ingestion and hybrid retrieval for municipal documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./cividex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and all tables (documents, fragments,
    /// indexes). Idempotent — safe to run repeatedly.
    Init,

    /// Extract, chunk, and stage a document for review.
    ///
    /// The document lands in `pending` status and is invisible to
    /// retrieval until approved and activated. Kind and jurisdiction
    /// are inferred from the content when not given.
    Ingest {
        /// Path to a PDF or plain text file.
        file: PathBuf,

        /// Document kind: statute, gazette, table, or generic.
        #[arg(long)]
        kind: Option<String>,

        /// Jurisdiction label used as a retrieval filter (e.g. municipal).
        #[arg(long)]
        jurisdiction: Option<String>,

        /// Publication date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,

        /// Re-ingest under an existing document id, replacing its content.
        #[arg(long)]
        id: Option<String>,

        /// Where the document came from (upload, crawler, ...).
        #[arg(long, default_value = "upload")]
        source: String,
    },

    /// List documents awaiting review.
    Queue,

    /// Approve a pending document, optionally correcting metadata.
    ///
    /// A corrected kind re-cuts the document's macro fragments.
    Approve {
        /// Document id.
        id: String,

        /// Corrected kind: statute, gazette, table, or generic.
        #[arg(long)]
        kind: Option<String>,

        /// Corrected jurisdiction.
        #[arg(long)]
        jurisdiction: Option<String>,

        /// Corrected publication date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,
    },

    /// Derive micro fragments and populate the indexes.
    ///
    /// The single point where a document becomes retrievable.
    /// Re-running rebuilds the derived rows from scratch.
    Activate {
        /// Document id.
        id: String,
    },

    /// Hybrid retrieval over active documents.
    Retrieve {
        /// The query string.
        query: String,

        /// Restrict results to one jurisdiction.
        #[arg(long)]
        jurisdiction: Option<String>,

        /// Maximum number of passages to return.
        #[arg(long)]
        top_n: Option<usize>,

        /// Replacement text for the vector branch only (e.g. a
        /// hypothetical answer); the lexical branch keeps the query.
        #[arg(long)]
        vector_query: Option<String>,
    },

    /// List documents, optionally filtered by status.
    Documents {
        /// Filter: pending, queued, or active.
        #[arg(long)]
        status: Option<String>,
    },

    /// Show a document's metadata and fragment breakdown.
    Inspect {
        /// Document id.
        id: String,
    },

    /// Remove a document from every store and report what each held.
    Delete {
        /// Document id.
        id: String,
    },

    /// Corpus statistics and index coverage.
    Stats,
}

fn parse_kind(s: &str) -> Result<DocumentKind> {
    DocumentKind::parse(s)
        .ok_or_else(|| anyhow::anyhow!("Unknown kind '{}', expected statute|gazette|table|generic", s))
}

fn parse_status(s: &str) -> Result<DocumentStatus> {
    DocumentStatus::parse(s)
        .ok_or_else(|| anyhow::anyhow!("Unknown status '{}', expected pending|queued|active", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::default()
    };

    let pool = db::connect(&cfg).await?;
    migrate::run_migrations(&pool).await?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest {
            file,
            kind,
            jurisdiction,
            date,
            id,
            source,
        } => {
            let (text, method) = extract_text(&file)?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let kind = kind.as_deref().map(parse_kind).transpose()?;
            let outcome = ingest::ingest(
                &pool,
                &cfg,
                IngestParams {
                    filename,
                    source,
                    text,
                    extraction_method: method.to_string(),
                    document_id: id,
                    kind,
                    jurisdiction,
                    publication_date: date,
                },
            )
            .await?;
            let verb = if outcome.replaced { "Replaced" } else { "Staged" };
            println!(
                "{verb} document {} ({}, {}) with {} macro fragments — pending review",
                outcome.document_id,
                outcome.kind.as_str(),
                outcome.jurisdiction,
                outcome.macro_count
            );
        }
        Commands::Queue => {
            let docs = ingest::list_documents(&pool, Some(DocumentStatus::Pending)).await?;
            if docs.is_empty() {
                println!("Review queue is empty.");
            }
            for d in docs {
                println!(
                    "{}  {}  kind={}  jurisdiction={}  date={}",
                    d.id,
                    d.filename,
                    d.kind.as_str(),
                    d.jurisdiction,
                    d.publication_date.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Approve {
            id,
            kind,
            jurisdiction,
            date,
        } => {
            let corrections = Corrections {
                kind: kind.as_deref().map(parse_kind).transpose()?,
                jurisdiction,
                publication_date: date,
            };
            let doc = lifecycle::approve(&pool, &cfg, &id, corrections).await?;
            println!(
                "Approved {} ({}, {}) — queued for activation",
                doc.id,
                doc.kind.as_str(),
                doc.jurisdiction
            );
        }
        Commands::Activate { id } => {
            let provider = create_provider(&cfg.embedding)?;
            let outcome = lifecycle::activate(&pool, &cfg, provider.as_ref(), &id).await?;
            println!(
                "Activated {id}: {} micro fragments, {} lexical rows, {} vectors",
                outcome.micro_count, outcome.lexical_rows, outcome.vector_rows
            );
            if cfg.embedding.is_enabled() && outcome.vector_rows < outcome.micro_count {
                println!(
                    "Warning: {} fragments are lexical-only",
                    outcome.micro_count - outcome.vector_rows
                );
            }
        }
        Commands::Retrieve {
            query,
            jurisdiction,
            top_n,
            vector_query,
        } => {
            let provider = create_provider(&cfg.embedding)?;
            let scorer = create_scorer(&cfg.reranker)?;
            let request = RetrieveRequest {
                query,
                vector_query,
                jurisdiction,
                top_n,
            };
            let passages =
                retrieve(&pool, &cfg, provider.as_ref(), scorer.as_ref(), &request).await?;
            if passages.is_empty() {
                println!("No results.");
            }
            for (i, p) in passages.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} ({}, {}{})",
                    i + 1,
                    p.score,
                    p.filename,
                    p.kind,
                    p.jurisdiction,
                    p.publication_date
                        .as_deref()
                        .map(|d| format!(", {d}"))
                        .unwrap_or_default()
                );
                println!("   fragment: {}", p.fragment_id);
                for line in p.content.lines().take(6) {
                    println!("   {line}");
                }
                println!();
            }
        }
        Commands::Documents { status } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let docs = ingest::list_documents(&pool, status).await?;
            for d in docs {
                println!(
                    "{}  {}  status={}  kind={}  jurisdiction={}",
                    d.id,
                    d.filename,
                    d.status.as_str(),
                    d.kind.as_str(),
                    d.jurisdiction
                );
            }
        }
        Commands::Inspect { id } => {
            let Some(doc) = ingest::get_document(&pool, &id).await? else {
                anyhow::bail!("Document not found: {}", id);
            };
            println!("id:           {}", doc.id);
            println!("filename:     {}", doc.filename);
            println!("source:       {}", doc.source);
            println!("status:       {}", doc.status.as_str());
            println!("kind:         {}", doc.kind.as_str());
            println!("jurisdiction: {}", doc.jurisdiction);
            println!(
                "date:         {}",
                doc.publication_date.as_deref().unwrap_or("-")
            );
            println!("extraction:   {}", doc.extraction_method);
            println!("text:         {} chars", doc.text.chars().count());

            let store = FragmentStore::new(pool.clone());
            let macros = store.macros_for_document(&id).await?;
            let micro_count = store.micro_count(&id).await?;
            println!("fragments:    {} macro, {} micro", macros.len(), micro_count);
            for m in macros {
                let preview: String = m.text.chars().take(80).collect();
                println!(
                    "  {} [{}] {}",
                    m.id,
                    m.kind.as_str(),
                    preview.replace('\n', " ")
                );
            }
        }
        Commands::Delete { id } => {
            let outcome = lifecycle::delete_document(&pool, &id).await?;
            if !outcome.document_deleted {
                println!("Document {id} was not present.");
            }
            let count = |rows: Option<u64>| match rows {
                Some(n) => n.to_string(),
                None => "FAILED".to_string(),
            };
            println!(
                "Removed: {} macro fragments, {} micro fragments, {} lexical rows, {} vectors",
                count(outcome.macro_fragments),
                count(outcome.micro_fragments),
                count(outcome.lexical_rows),
                count(outcome.vector_rows)
            );
        }
        Commands::Stats => {
            let stats = corpus_stats(&pool).await?;
            println!("documents:       {}", stats.documents_total);
            for (status, n) in &stats.by_status {
                println!("  {status}: {n}");
            }
            println!("kinds:");
            for (kind, n) in &stats.by_kind {
                println!("  {kind}: {n}");
            }
            println!("sources:");
            for (source, n) in &stats.by_source {
                println!("  {source}: {n}");
            }
            println!("macro fragments: {}", stats.macro_fragments);
            println!("micro fragments: {}", stats.micro_fragments);
            println!("lexical rows:    {}", stats.lexical_rows);
            println!("vector rows:     {}", stats.vector_rows);
            if stats.vector_gap() > 0 && stats.vector_rows > 0 {
                println!(
                    "Warning: {} active fragments have no embedding",
                    stats.vector_gap()
                );
            }
            if let Some(ts) = stats.last_ingested_at {
                println!("last ingestion:  {ts} (unix)");
            }
        }
    }

    Ok(())
}
