//! Legislation chunking: article split with a running hierarchy stack.
//!
//! Legal meaning is article-scoped, so the macro split cuts on `Art. N`
//! markers and never merges two articles. Structural headings (LIVRO,
//! TÍTULO, CAPÍTULO, SEÇÃO, SUBSEÇÃO) form a small finite-state
//! accumulator: seeing a heading pushes it at its level and pops every
//! deeper level, and the current stack is prefixed onto every article
//! processed afterward. Oversized articles are sub-split on paragraph
//! (`§`) markers, each piece repeating the article header so it stays
//! readable on its own.

use regex::Regex;
use std::sync::OnceLock;

use super::window::split_by_separators;

/// One statute article with the hierarchy context active at its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    /// The article marker, e.g. `"Art. 12"`.
    pub header: String,
    /// Article text, without the marker.
    pub body: String,
    /// Hierarchy context string, e.g. `"TÍTULO I > CAPÍTULO II"`.
    pub context: String,
}

/// Heading levels, outermost first. A heading at level N clears all
/// entries deeper than N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HeadingLevel {
    Book = 0,
    Title = 1,
    Chapter = 2,
    Section = 3,
    Subsection = 4,
}

impl HeadingLevel {
    fn from_keyword(kw: &str) -> Option<Self> {
        // Accent-insensitive: OCR output often loses diacritics.
        match kw.to_uppercase().as_str() {
            "LIVRO" => Some(HeadingLevel::Book),
            "TÍTULO" | "TITULO" => Some(HeadingLevel::Title),
            "CAPÍTULO" | "CAPITULO" => Some(HeadingLevel::Chapter),
            "SEÇÃO" | "SECAO" => Some(HeadingLevel::Section),
            "SUBSEÇÃO" | "SUBSECAO" => Some(HeadingLevel::Subsection),
            _ => None,
        }
    }
}

/// Stack of active headings, one slot per level.
#[derive(Debug, Default, Clone)]
pub struct HierarchyStack {
    slots: [Option<String>; 5],
}

impl HierarchyStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heading: set its level and clear every deeper level.
    pub fn push(&mut self, level: HeadingLevel, heading: String) {
        let idx = level as usize;
        self.slots[idx] = Some(heading);
        for slot in self.slots[idx + 1..].iter_mut() {
            *slot = None;
        }
    }

    /// Scan `text` for heading lines and apply each in order.
    pub fn observe(&mut self, text: &str) {
        for caps in heading_re().captures_iter(text) {
            let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if let Some(level) = HeadingLevel::from_keyword(keyword) {
                let heading = caps
                    .get(0)
                    .map(|m| m.as_str().trim().replace('\n', " "))
                    .unwrap_or_default();
                self.push(level, heading);
            }
        }
    }

    /// Current context string, outermost level first.
    pub fn context(&self) -> String {
        self.slots
            .iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(" > ")
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^\s*(LIVRO|T[ÍI]TULO|CAP[ÍI]TULO|SE[ÇC][ÃA]O|SUBSE[ÇC][ÃA]O)\s+([IVXLCDM\d]+)[^\n]{0,100}",
        )
        .expect("heading regex")
    })
}

fn article_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*Art\.?\s*\d+[ºo°]?\.?").expect("article regex"))
}

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"§\s*\d+[ºo°]?\.?").expect("paragraph regex"))
}

/// Split statute text into articles, tracking hierarchy as it goes.
///
/// Returns the preamble (text before the first article marker, if any)
/// and the ordered articles. Headings in the preamble and between
/// articles update the stack for every *subsequent* article. The
/// heading lines themselves stay out of the preceding article's body:
/// they belong to the structure that follows, not to the article they
/// happen to trail.
pub fn split_articles(text: &str) -> (Option<String>, Vec<Article>) {
    let matches: Vec<_> = article_re().find_iter(text).collect();

    if matches.is_empty() {
        let trimmed = text.trim();
        let preamble = (!trimmed.is_empty()).then(|| trimmed.to_string());
        return (preamble, Vec::new());
    }

    let mut stack = HierarchyStack::new();

    let preamble_text = text[..matches[0].start()].trim();
    stack.observe(preamble_text);
    let preamble = (!preamble_text.is_empty()).then(|| preamble_text.to_string());

    let mut articles = Vec::with_capacity(matches.len());
    for (i, m) in matches.iter().enumerate() {
        let body_end = matches
            .get(i + 1)
            .map(|next| next.start())
            .unwrap_or(text.len());
        let header = m.as_str().trim().to_string();
        let raw = &text[m.end()..body_end];

        // Headings only ever sit between articles, so everything from
        // the first heading line onward (the heading and its subtitle)
        // belongs to the next article's context, not to this body.
        let body = match heading_re().find(raw) {
            Some(h) => raw[..h.start()].trim().to_string(),
            None => raw.trim().to_string(),
        };

        articles.push(Article {
            header,
            context: stack.context(),
            body,
        });

        // Headings in this slice take effect from the next article on.
        stack.observe(raw);
    }

    (preamble, articles)
}

/// Sub-split an oversized article on `§` paragraph markers, repeating
/// the article header on every piece. A caput or paragraph still over
/// `max_chars` gets a further separator split, and an article with no
/// paragraph markers falls back to a separator split directly.
pub fn subsplit_article(article: &Article, max_chars: usize) -> Vec<String> {
    let prefix = if article.context.is_empty() {
        String::new()
    } else {
        format!("[{}] ", article.context)
    };

    let marks: Vec<_> = paragraph_re().find_iter(&article.body).collect();

    if marks.is_empty() {
        return split_by_separators(&article.body, max_chars)
            .into_iter()
            .map(|p| format!("{prefix}{} (cont.) {}", article.header, p.trim()))
            .collect();
    }

    let mut pieces = Vec::new();

    // Caput: everything before the first paragraph marker.
    let caput = article.body[..marks[0].start()].trim();
    if !caput.is_empty() {
        let full = format!("{prefix}{} {caput}", article.header);
        if full.chars().count() <= max_chars {
            pieces.push(full);
        } else {
            for part in split_by_separators(caput, max_chars) {
                pieces.push(format!("{prefix}{} (cont.) {}", article.header, part.trim()));
            }
        }
    }

    for (i, m) in marks.iter().enumerate() {
        let end = marks
            .get(i + 1)
            .map(|next| next.start())
            .unwrap_or(article.body.len());
        let para_header = m.as_str().trim();
        let para_body = article.body[m.end()..end].trim();
        let full = format!("{prefix}{} > {para_header} {para_body}", article.header);
        if full.chars().count() <= max_chars {
            pieces.push(full);
        } else {
            for part in split_by_separators(para_body, max_chars) {
                pieces.push(format!(
                    "{prefix}{} > {para_header} (cont.) {}",
                    article.header,
                    part.trim()
                ));
            }
        }
    }

    pieces
}

/// Parse a string produced by [`render_article`] back into an
/// [`Article`]. Returns `None` when no article marker is found.
pub fn parse_rendered(text: &str) -> Option<Article> {
    let (context, rest) = match text.strip_prefix('[') {
        Some(after) => match after.split_once("] ") {
            Some((ctx, rest)) => (ctx.to_string(), rest),
            None => (String::new(), text),
        },
        None => (String::new(), text),
    };

    let m = article_re().find(rest)?;
    if m.start() != 0 {
        return None;
    }
    Some(Article {
        header: m.as_str().trim().to_string(),
        body: rest[m.end()..].trim().to_string(),
        context,
    })
}

/// Render an article as a standalone string: `[context] header body`.
pub fn render_article(article: &Article) -> String {
    let combined = format!("{} {}", article.header, article.body);
    if article.context.is_empty() {
        combined.trim().to_string()
    } else {
        format!("[{}] {}", article.context, combined.trim())
    }
}
