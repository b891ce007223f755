//! # Cividex
//!
//! An ingestion and hybrid retrieval pipeline for municipal documents.
//!
//! Cividex takes statutes, official gazettes, tabular annexes, and
//! general civic documents, cuts them into a two-level fragment
//! hierarchy, and serves retrieval over a lexical (FTS5) and a vector
//! index with optional cross-encoder reranking. Documents move through
//! a review lifecycle and only become retrievable once activated.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────────┐
//! │ Extract  │──▶│   Chunker    │──▶│    SQLite      │
//! │ PDF/text │   │ macro/micro │   │ FTS5 + vectors │
//! └──────────┘   └─────────────┘   └──────┬────────┘
//!                       ▲                 │
//!                 ┌─────┴─────┐           ▼
//!                 │ Lifecycle │    ┌─────────────┐
//!                 │ review    │    │  Retriever   │
//!                 └───────────┘    │ merge+rerank │
//!                                  └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cividex init                          # create database
//! cividex ingest lei_organica.pdf      # extract, chunk, stage
//! cividex queue                        # list pending documents
//! cividex approve <id> --kind statute  # review + correct metadata
//! cividex activate <id>                # index, make retrievable
//! cividex retrieve "horário das farmácias"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF and plain text extraction |
//! | [`chunker`] | Two-level structural and semantic chunking |
//! | [`fragments`] | Parent/child fragment store |
//! | [`lexical`] | FTS5 keyword index |
//! | [`vector`] | Embedding index with cosine scoring |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`rerank`] | Cross-encoder relevance scoring |
//! | [`ingest`] | Document ingestion and metadata inference |
//! | [`lifecycle`] | Pending/queued/active state machine |
//! | [`retrieve`] | Hybrid retrieval with context expansion |
//! | [`stats`] | Corpus statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod fragments;
pub mod ingest;
pub mod lexical;
pub mod lifecycle;
pub mod migrate;
pub mod models;
pub mod rerank;
pub mod retrieve;
pub mod stats;
pub mod vector;
