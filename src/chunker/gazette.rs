//! Official gazette chunking: one fragment per administrative act.
//!
//! Gazettes concatenate many unrelated acts in a single page flow, so
//! the macro cut happens at act headers (DECRETO Nº 123, PORTARIA Nº 45
//! and so on). When a gazette carries no recognizable headers the text
//! falls through to the sliding window so no content is lost.

use regex::Regex;
use std::sync::OnceLock;

/// One administrative act as cut from the gazette text.
#[derive(Debug, Clone, PartialEq)]
pub struct Act {
    /// The act header line, e.g. `"DECRETO Nº 123/2024"`.
    pub header: String,
    /// Full act text including the header.
    pub text: String,
}

fn act_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^\s*(DECRETO|PORTARIA|RESOLU[ÇC][ÃA]O|LEI|ATA|EXTRATO|EDITAL)\s+(N[ºo°.]?\s*)?[\d/.-]+[^\n]*",
        )
        .expect("act regex")
    })
}

/// Split gazette text on act headers. Returns the preamble (masthead
/// and expedient text before the first act) and the ordered acts. An
/// empty act list means no headers were found and the caller should
/// fall back to windowing.
pub fn split_acts(text: &str) -> (Option<String>, Vec<Act>) {
    let matches: Vec<_> = act_re().find_iter(text).collect();

    if matches.is_empty() {
        let trimmed = text.trim();
        let preamble = (!trimmed.is_empty()).then(|| trimmed.to_string());
        return (preamble, Vec::new());
    }

    let preamble_text = text[..matches[0].start()].trim();
    let preamble = (!preamble_text.is_empty()).then(|| preamble_text.to_string());

    let mut acts = Vec::with_capacity(matches.len());
    for (i, m) in matches.iter().enumerate() {
        let end = matches
            .get(i + 1)
            .map(|next| next.start())
            .unwrap_or(text.len());
        let body = text[m.start()..end].trim();
        if body.is_empty() {
            continue;
        }
        acts.push(Act {
            header: m.as_str().trim().to_string(),
            text: body.to_string(),
        });
    }

    (preamble, acts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_act_headers() {
        let text = "DIÁRIO OFICIAL DO MUNICÍPIO\nEdição 42\n\
                    DECRETO Nº 123/2024\nDispõe sobre o horário de funcionamento.\n\
                    PORTARIA Nº 45/2024\nNomeia servidor para o cargo.\n\
                    EXTRATO 10/2024\nContrato de prestação de serviços.";
        let (preamble, acts) = split_acts(text);
        assert!(preamble.unwrap().contains("DIÁRIO OFICIAL"));
        assert_eq!(acts.len(), 3);
        assert!(acts[0].header.starts_with("DECRETO"));
        assert!(acts[0].text.contains("horário de funcionamento"));
        assert!(acts[1].header.starts_with("PORTARIA"));
        assert!(acts[2].header.starts_with("EXTRATO"));
    }

    #[test]
    fn test_act_text_includes_header_line() {
        let text = "LEI Nº 9.999/2023\nInstitui o programa municipal.";
        let (_, acts) = split_acts(text);
        assert_eq!(acts.len(), 1);
        assert!(acts[0].text.starts_with("LEI Nº 9.999/2023"));
    }

    #[test]
    fn test_accentless_resolucao_is_recognized() {
        let text = "RESOLUCAO N. 7/2022\nAprova o regimento interno.";
        let (_, acts) = split_acts(text);
        assert_eq!(acts.len(), 1);
    }

    #[test]
    fn test_no_headers_returns_text_as_preamble() {
        let (preamble, acts) = split_acts("Comunicado geral sem estrutura de atos.");
        assert!(acts.is_empty());
        assert_eq!(preamble.unwrap(), "Comunicado geral sem estrutura de atos.");
    }

    #[test]
    fn test_empty_input() {
        let (preamble, acts) = split_acts("   \n  ");
        assert!(preamble.is_none());
        assert!(acts.is_empty());
    }
}
