//! Two-level chunking pipeline.
//!
//! Documents are cut twice. The first pass produces macro fragments,
//! the structural units used for context expansion: statute articles,
//! gazette acts, table row blocks, or pages. The second pass cuts each
//! macro fragment into the micro fragments that actually get indexed,
//! preferring semantic valleys when an embedding provider is available
//! and falling back to structural separators otherwise.
//!
//! Both passes are deterministic for a given input, so re-ingesting the
//! same document overwrites fragments in place instead of duplicating
//! them.

pub mod gazette;
pub mod semantic;
pub mod statute;
pub mod table;
pub mod window;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::{ChunkingConfig, EmbeddingConfig};
use crate::embedding::{embed_texts, EmbeddingProvider};
use crate::models::{
    macro_fragment_id, micro_fragment_id, Document, DocumentKind, MacroFragment, MacroKind,
    MicroFragment,
};

/// Pages longer than this get windowed instead of kept whole.
const PAGE_CEILING: usize = 10_000;

/// Document chunker. Holds the size knobs; all methods are
/// deterministic except the semantic micro path, which degrades to a
/// deterministic separator split on any embedding failure.
pub struct Chunker {
    cfg: ChunkingConfig,
}

impl Chunker {
    pub fn new(cfg: ChunkingConfig) -> Self {
        Self { cfg }
    }

    /// First-pass cut: document text into ordered macro fragments.
    ///
    /// Dispatch is on document kind. Every fragment id is
    /// `{document_id}:{ordinal}` with ordinals dense from 0, so the
    /// same text always produces the same fragments.
    pub fn macro_fragments(&self, doc: &Document) -> Vec<MacroFragment> {
        let pieces: Vec<(MacroKind, String)> = match doc.kind {
            DocumentKind::Statute => self.cut_statute(&doc.text),
            DocumentKind::Gazette => self.cut_gazette(&doc.text),
            DocumentKind::Table => self.cut_table(&doc.text),
            DocumentKind::Generic => self.cut_pages(&doc.text),
        };

        pieces
            .into_iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .enumerate()
            .map(|(i, (kind, text))| MacroFragment {
                id: macro_fragment_id(&doc.id, i as i64),
                document_id: doc.id.clone(),
                ordinal: i as i64,
                kind,
                text,
            })
            .collect()
    }

    fn cut_statute(&self, text: &str) -> Vec<(MacroKind, String)> {
        let (preamble, articles) = statute::split_articles(text);
        if articles.is_empty() {
            // No article markers; treat as plain pages.
            return self.cut_pages(text);
        }
        let mut pieces = Vec::with_capacity(articles.len() + 1);
        if let Some(p) = preamble {
            pieces.push((MacroKind::Page, p));
        }
        for article in &articles {
            pieces.push((MacroKind::Article, statute::render_article(article)));
        }
        pieces
    }

    fn cut_gazette(&self, text: &str) -> Vec<(MacroKind, String)> {
        let (preamble, acts) = gazette::split_acts(text);
        if acts.is_empty() {
            // No act headers; window the whole thing so nothing is lost.
            return preamble
                .map(|p| {
                    window::sliding_window(&p, self.cfg.window_chars, self.cfg.window_overlap)
                        .into_iter()
                        .map(|w| (MacroKind::Window, w))
                        .collect()
                })
                .unwrap_or_default();
        }
        let mut pieces = Vec::with_capacity(acts.len() + 1);
        if let Some(p) = preamble {
            pieces.push((MacroKind::Page, p));
        }
        for act in acts {
            pieces.push((MacroKind::Act, act.text));
        }
        pieces
    }

    fn cut_table(&self, text: &str) -> Vec<(MacroKind, String)> {
        let parsed = table::parse_table(text);
        table::row_blocks(&parsed, self.cfg.table_rows_macro)
            .into_iter()
            .map(|b| (MacroKind::TableBlock, b))
            .collect()
    }

    fn cut_pages(&self, text: &str) -> Vec<(MacroKind, String)> {
        let mut pieces = Vec::new();
        for page in text.split('\u{c}') {
            let healed = heal_line_wraps(page);
            let healed = healed.trim();
            if healed.is_empty() {
                continue;
            }
            if healed.chars().count() > PAGE_CEILING {
                for w in
                    window::sliding_window(healed, self.cfg.window_chars, self.cfg.window_overlap)
                {
                    pieces.push((MacroKind::Window, w));
                }
            } else {
                pieces.push((MacroKind::Page, healed.to_string()));
            }
        }
        pieces
    }

    /// Second-pass cut: one macro fragment into indexed micro fragments.
    ///
    /// Micro ids are `{parent_id}:{ordinal}`. Every micro carries the
    /// document banner in `context`, the parent reference, and a
    /// sha256 hash of its text. Never returns an empty-text fragment.
    pub async fn micro_fragments(
        &self,
        doc: &Document,
        parent: &MacroFragment,
        provider: &dyn EmbeddingProvider,
        embed_cfg: &EmbeddingConfig,
    ) -> Vec<MicroFragment> {
        let pieces = match parent.kind {
            MacroKind::Article => self.split_article_micro(&parent.text),
            MacroKind::TableBlock => {
                let parsed = table::parse_table(&parent.text);
                table::row_blocks(&parsed, self.cfg.table_rows_micro)
            }
            MacroKind::Page | MacroKind::Act | MacroKind::Window => {
                self.split_prose_micro(&parent.text, provider, embed_cfg)
                    .await
            }
        };

        let banner = banner(doc);
        pieces
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .enumerate()
            .map(|(i, text)| {
                let text = text.trim().to_string();
                MicroFragment {
                    id: micro_fragment_id(&parent.id, i as i64),
                    parent_id: parent.id.clone(),
                    document_id: doc.id.clone(),
                    ordinal: i as i64,
                    hash: text_hash(&text),
                    text,
                    context: banner.clone(),
                    jurisdiction: doc.jurisdiction.clone(),
                    kind: doc.kind,
                    extra: serde_json::json!({ "parent_kind": parent.kind.as_str() }),
                }
            })
            .collect()
    }

    /// Articles within the ceiling stay whole. Oversized ones split on
    /// `§` markers, each piece repeating the article header.
    fn split_article_micro(&self, rendered: &str) -> Vec<String> {
        if rendered.chars().count() <= self.cfg.article_ceiling {
            return vec![rendered.to_string()];
        }
        match statute::parse_rendered(rendered) {
            Some(article) => statute::subsplit_article(&article, self.cfg.max_chunk_chars),
            None => window::split_by_separators(rendered, self.cfg.max_chunk_chars),
        }
    }

    async fn split_prose_micro(
        &self,
        text: &str,
        provider: &dyn EmbeddingProvider,
        embed_cfg: &EmbeddingConfig,
    ) -> Vec<String> {
        if text.chars().count() <= self.cfg.max_chunk_chars {
            return vec![text.to_string()];
        }

        if embed_cfg.is_enabled() {
            let sentences = semantic::split_sentences(text);
            if sentences.len() >= 3 {
                match embed_texts(provider, embed_cfg, &sentences).await {
                    Ok(embeddings) => {
                        let pieces = semantic::split_at_valleys(
                            &sentences,
                            &embeddings,
                            self.cfg.semantic_window,
                            self.cfg.min_chunk_chars,
                        );
                        // Valleys bound piece count, not piece size.
                        return pieces
                            .into_iter()
                            .flat_map(|p| {
                                window::split_by_separators(&p, self.cfg.max_chunk_chars)
                            })
                            .collect();
                    }
                    Err(e) => {
                        warn!(error = %e, "semantic split failed, using separator split");
                    }
                }
            }
        }

        window::split_by_separators(text, self.cfg.max_chunk_chars)
    }
}

/// Document banner prepended to indexed text so lexical matches on
/// filename, kind, and date land on every fragment of the document.
pub fn banner(doc: &Document) -> String {
    let mut b = format!("[DOCUMENTO:{}][TIPO:{}]", doc.filename, doc.kind.as_str());
    if let Some(date) = &doc.publication_date {
        b.push_str(&format!("[DATA:{date}]"));
    }
    b
}

/// Text a micro fragment exposes to the indexes: banner plus body.
pub fn indexed_text(fragment: &MicroFragment) -> String {
    if fragment.context.is_empty() {
        fragment.text.clone()
    } else {
        format!("{}\n{}", fragment.context, fragment.text)
    }
}

/// Sha256 of the fragment text, hex-encoded. Used for dedup across
/// retrieval branches.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Re-join lines broken by PDF extraction. A newline is healed when
/// the previous line does not end a sentence and the next line starts
/// in lowercase.
pub fn heal_line_wraps(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        out.push_str(line);
        let ends_sentence = line
            .trim_end()
            .chars()
            .last()
            .map(|c| matches!(c, '.' | '!' | '?' | ':' | ';'))
            .unwrap_or(true);
        let next_continues = lines
            .peek()
            .and_then(|n| n.trim_start().chars().next())
            .map(|c| c.is_lowercase())
            .unwrap_or(false);
        if lines.peek().is_some() {
            if !ends_sentence && next_continues {
                out.push(' ');
            } else {
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::embedding::DisabledProvider;
    use crate::models::DocumentStatus;

    fn doc(kind: DocumentKind, text: &str) -> Document {
        Document {
            id: "doc-1".into(),
            filename: "lei_organica.pdf".into(),
            source: "upload".into(),
            kind,
            jurisdiction: "municipal".into(),
            publication_date: Some("2024-03-01".into()),
            status: DocumentStatus::Pending,
            extraction_method: "text".into(),
            text: text.into(),
            created_at: 0,
        }
    }

    fn chunker() -> Chunker {
        Chunker::new(ChunkingConfig::default())
    }

    fn disabled_embed() -> EmbeddingConfig {
        EmbeddingConfig::default()
    }

    #[test]
    fn test_statute_macro_cuts_on_articles() {
        let d = doc(
            DocumentKind::Statute,
            "CAPÍTULO I\nGeral\nArt. 1º Regra um.\nCAPÍTULO II\nEspecial\nArt. 2º Regra dois.",
        );
        let macros = chunker().macro_fragments(&d);
        // Preamble plus two articles.
        assert_eq!(macros.len(), 3);
        assert_eq!(macros[0].kind, MacroKind::Page);
        assert_eq!(macros[1].kind, MacroKind::Article);
        assert!(macros[1].text.contains("[CAPÍTULO I]"));
        assert!(macros[2].text.contains("[CAPÍTULO II]"));
        assert!(!macros[2].text.contains("CAPÍTULO I]"));
    }

    #[test]
    fn test_macro_ids_are_deterministic() {
        let d = doc(DocumentKind::Generic, "Página um.\u{c}Página dois.");
        let a = chunker().macro_fragments(&d);
        let b = chunker().macro_fragments(&d);
        assert_eq!(a, b);
        assert_eq!(a[0].id, "doc-1:0");
        assert_eq!(a[1].id, "doc-1:1");
    }

    #[test]
    fn test_gazette_without_headers_falls_back_to_windows() {
        let long = "palavra ".repeat(800);
        let d = doc(DocumentKind::Gazette, &long);
        let macros = chunker().macro_fragments(&d);
        assert!(macros.len() >= 2);
        assert!(macros.iter().all(|m| m.kind == MacroKind::Window));
    }

    #[test]
    fn test_blank_pages_are_skipped() {
        let d = doc(DocumentKind::Generic, "Primeira.\u{c}   \u{c}Terceira.");
        let macros = chunker().macro_fragments(&d);
        assert_eq!(macros.len(), 2);
        // Ordinals stay dense after the skip.
        assert_eq!(macros[1].ordinal, 1);
    }

    #[test]
    fn test_oversized_page_gets_windowed() {
        let d = doc(DocumentKind::Generic, &"a ".repeat(6000));
        let macros = chunker().macro_fragments(&d);
        assert!(macros.len() > 1);
        assert!(macros.iter().all(|m| m.kind == MacroKind::Window));
    }

    #[test]
    fn test_empty_document_yields_no_fragments() {
        let d = doc(DocumentKind::Statute, "   ");
        assert!(chunker().macro_fragments(&d).is_empty());
    }

    #[tokio::test]
    async fn test_small_macro_becomes_single_micro() {
        let d = doc(DocumentKind::Generic, "Página curta.");
        let c = chunker();
        let macros = c.macro_fragments(&d);
        let micros = c
            .micro_fragments(&d, &macros[0], &DisabledProvider, &disabled_embed())
            .await;
        assert_eq!(micros.len(), 1);
        assert_eq!(micros[0].id, "doc-1:0:0");
        assert_eq!(micros[0].parent_id, "doc-1:0");
        assert_eq!(micros[0].text, "Página curta.");
        assert!(micros[0].context.contains("[DOCUMENTO:lei_organica.pdf]"));
        assert!(micros[0].context.contains("[DATA:2024-03-01]"));
        assert_eq!(micros[0].hash, text_hash("Página curta."));
    }

    #[tokio::test]
    async fn test_oversized_article_splits_on_paragraph_markers() {
        let body = format!(
            "Caput com texto. {} § 1º Primeiro parágrafo. {} § 2º Segundo parágrafo. {}",
            "detalhe ".repeat(150),
            "mais ".repeat(150),
            "fim ".repeat(150)
        );
        let text = format!("CAPÍTULO I\nGeral\nArt. 7º {body}");
        let d = doc(DocumentKind::Statute, &text);
        let c = chunker();
        let macros = c.macro_fragments(&d);
        let article = macros
            .iter()
            .find(|m| m.kind == MacroKind::Article)
            .unwrap();
        let micros = c
            .micro_fragments(&d, article, &DisabledProvider, &disabled_embed())
            .await;
        assert!(micros.len() >= 3);
        for m in &micros {
            assert!(m.text.contains("Art. 7º"), "header missing: {}", m.text);
        }
    }

    #[tokio::test]
    async fn test_table_micro_blocks_repeat_header() {
        let mut text = String::from("| Cargo | Valor |\n|---|---|\n");
        for i in 0..12 {
            text.push_str(&format!("| C{i} | {i} |\n"));
        }
        let d = doc(DocumentKind::Table, &text);
        let c = chunker();
        let macros = c.macro_fragments(&d);
        assert_eq!(macros.len(), 1);
        let micros = c
            .micro_fragments(&d, &macros[0], &DisabledProvider, &disabled_embed())
            .await;
        assert_eq!(micros.len(), 3);
        assert!(micros.iter().all(|m| m.text.starts_with("| Cargo | Valor |")));
    }

    #[tokio::test]
    async fn test_disabled_provider_falls_back_to_separator_split() {
        let long = format!("{}\n\n{}", "Primeira parte. ".repeat(200), "Segunda parte. ".repeat(200));
        let d = doc(DocumentKind::Generic, &long);
        let c = chunker();
        let macros = c.macro_fragments(&d);
        let mut all = Vec::new();
        for m in &macros {
            all.extend(c.micro_fragments(&d, m, &DisabledProvider, &disabled_embed()).await);
        }
        assert!(!all.is_empty());
        let max = c.cfg.max_chunk_chars;
        assert!(all.iter().all(|m| m.text.chars().count() <= max));
        assert!(all.iter().all(|m| !m.text.trim().is_empty()));
    }

    #[test]
    fn test_heal_line_wraps() {
        let healed = heal_line_wraps("O prefeito municipal\ndecreta a seguinte norma.\nNova frase.");
        assert!(healed.contains("municipal decreta"));
        assert!(healed.contains("norma.\nNova frase."));
    }

    #[test]
    fn test_indexed_text_prefixes_banner() {
        let d = doc(DocumentKind::Generic, "Texto.");
        let fragment = MicroFragment {
            id: "x:0:0".into(),
            parent_id: "x:0".into(),
            document_id: "x".into(),
            ordinal: 0,
            text: "Texto.".into(),
            context: banner(&d),
            jurisdiction: "municipal".into(),
            kind: DocumentKind::Generic,
            hash: text_hash("Texto."),
            extra: serde_json::Value::Null,
        };
        let indexed = indexed_text(&fragment);
        assert!(indexed.starts_with("[DOCUMENTO:"));
        assert!(indexed.ends_with("Texto."));
    }
}
