//! Core data models for the ingestion and retrieval pipeline.
//!
//! A [`Document`] is one ingested source file. Chunking splits it into
//! ordered [`MacroFragment`]s (pages, statute articles, administrative
//! acts) which are the unit of context expansion, and each macro fragment
//! into [`MicroFragment`]s, which are the unit actually indexed for
//! lexical and semantic search.
//!
//! Fragment identity is deterministic: `"{document_id}:{ordinal}"` for
//! macro fragments and `"{parent_id}:{ordinal}"` for micro fragments, so
//! re-ingesting a document overwrites its fragments instead of
//! duplicating them.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a document.
///
/// Transitions move forward only: `Pending → Queued → Active`. A document
/// in `Pending` or `Queued` has macro fragments in the fragment store but
/// nothing in the lexical or vector index; only activation writes index
/// entries. There is no transition out of `Active` — visibility is
/// revoked by deleting the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Uploaded but unreviewed; invisible to retrieval.
    Pending,
    /// Metadata confirmed by a reviewer, awaiting indexing.
    Queued,
    /// Fragments present in both indexes, visible to retrieval.
    Active,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Queued => "queued",
            DocumentStatus::Active => "active",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "queued" => Some(DocumentStatus::Queued),
            "active" => Some(DocumentStatus::Active),
            _ => None,
        }
    }
}

/// Declared kind of a document, selecting the chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Legislation: split on article markers with a hierarchy stack.
    Statute,
    /// Official gazette: split on administrative-act headers.
    Gazette,
    /// Tabular data: split into row blocks re-emitting the header.
    Table,
    /// Anything else (scans, reports): page split + semantic micro split.
    Generic,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Statute => "statute",
            DocumentKind::Gazette => "gazette",
            DocumentKind::Table => "table",
            DocumentKind::Generic => "generic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "statute" | "legislation" | "law" => Some(DocumentKind::Statute),
            "gazette" | "official_gazette" => Some(DocumentKind::Gazette),
            "table" | "tabular" => Some(DocumentKind::Table),
            "generic" | "general" => Some(DocumentKind::Generic),
            _ => None,
        }
    }
}

/// One ingested source file, stored in the `documents` table.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: String,
    /// Source channel the document arrived through (`upload`, `scan`, …).
    pub source: String,
    pub kind: DocumentKind,
    /// Jurisdiction tag (`federal`, `state`, `municipal`) or `unknown`.
    pub jurisdiction: String,
    /// Official publication date, ISO `YYYY-MM-DD`, when known.
    pub publication_date: Option<String>,
    pub status: DocumentStatus,
    /// How the raw text was produced (`direct`, `pdf`, `ocr`, …).
    pub extraction_method: String,
    pub text: String,
    pub created_at: i64,
}

/// A structurally coherent slice of a document (one page, one article,
/// one administrative act). Owned by its document; deleted with it.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroFragment {
    /// Deterministic id: `"{document_id}:{ordinal}"`.
    pub id: String,
    pub document_id: String,
    pub ordinal: i64,
    pub kind: MacroKind,
    pub text: String,
}

/// Structural kind of a macro fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    Page,
    Article,
    Act,
    TableBlock,
    Window,
}

impl MacroKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MacroKind::Page => "page",
            MacroKind::Article => "article",
            MacroKind::Act => "act",
            MacroKind::TableBlock => "table_block",
            MacroKind::Window => "window",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "page" => Some(MacroKind::Page),
            "article" => Some(MacroKind::Article),
            "act" => Some(MacroKind::Act),
            "table_block" => Some(MacroKind::TableBlock),
            "window" => Some(MacroKind::Window),
            _ => None,
        }
    }
}

/// An embedding-sized slice of a macro fragment — the unit indexed for
/// search. The parent back-reference is mandatory: context expansion
/// resolves `parent_id` to fetch readable surroundings, so a micro
/// fragment without one cannot be repaired after retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct MicroFragment {
    /// Deterministic id: `"{parent_id}:{ordinal}"`.
    pub id: String,
    /// Id of the owning [`MacroFragment`].
    pub parent_id: String,
    /// Denormalized document id for fast metadata-filtered operations.
    pub document_id: String,
    pub ordinal: i64,
    pub text: String,
    /// Document banner prepended at index time
    /// (`[DOCUMENTO:…][TIPO:…][DATA:…]`). Statute hierarchy context is
    /// carried inline in `text` instead.
    pub context: String,
    pub jurisdiction: String,
    pub kind: DocumentKind,
    /// SHA-256 of `text`, used for merge-time deduplication.
    pub hash: String,
    /// Open extension map for genuinely dynamic tags.
    pub extra: serde_json::Value,
}

/// Deterministic macro fragment id.
pub fn macro_fragment_id(document_id: &str, ordinal: i64) -> String {
    format!("{document_id}:{ordinal}")
}

/// Deterministic micro fragment id.
pub fn micro_fragment_id(parent_id: &str, ordinal: i64) -> String {
    format!("{parent_id}:{ordinal}")
}

/// One retrieval result: an expanded passage plus provenance and score.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedPassage {
    /// Expanded content (parent fragment, sibling window, or raw fragment).
    pub content: String,
    /// Id of the micro fragment that won retrieval.
    pub fragment_id: String,
    pub document_id: String,
    pub filename: String,
    pub jurisdiction: String,
    pub kind: String,
    pub publication_date: Option<String>,
    /// Final relevance score (re-ranker score, or the merged-order rank
    /// score when the re-ranker is unavailable).
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            DocumentStatus::Pending,
            DocumentStatus::Queued,
            DocumentStatus::Active,
        ] {
            assert_eq!(DocumentStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(DocumentStatus::parse("archived"), None);
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!(
            DocumentKind::parse("legislation"),
            Some(DocumentKind::Statute)
        );
        assert_eq!(
            DocumentKind::parse("official_gazette"),
            Some(DocumentKind::Gazette)
        );
        assert_eq!(DocumentKind::parse("general"), Some(DocumentKind::Generic));
        assert_eq!(DocumentKind::parse("spreadsheet"), None);
    }

    #[test]
    fn test_deterministic_ids() {
        let m = macro_fragment_id("doc1", 3);
        assert_eq!(m, "doc1:3");
        assert_eq!(micro_fragment_id(&m, 0), "doc1:3:0");
        assert_eq!(macro_fragment_id("doc1", 3), m);
    }
}
