//! Text extraction from uploaded files.
//!
//! PDFs go through `pdf-extract`; anything else is read as UTF-8 text.
//! The returned method string is recorded on the document so a bad
//! extraction can be traced back to its path.

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Extraction method recorded on the document row.
pub const METHOD_PDF: &str = "pdf";
pub const METHOD_DIRECT: &str = "direct";

/// Extract text from a file. Returns the text and the method used.
pub fn extract_text(path: &Path) -> Result<(String, &'static str)> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => {
            let text = pdf_extract::extract_text(path)
                .with_context(|| format!("Failed to extract PDF text from {}", path.display()))?;
            if text.trim().is_empty() {
                bail!(
                    "No text extracted from {} (scanned PDF without OCR?)",
                    path.display()
                );
            }
            Ok((text, METHOD_PDF))
        }
        _ => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if text.trim().is_empty() {
                bail!("File {} is empty", path.display());
            }
            Ok((text, METHOD_DIRECT))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aviso.txt");
        std::fs::write(&path, "Conteúdo do aviso.").unwrap();
        let (text, method) = extract_text(&path).unwrap();
        assert_eq!(text, "Conteúdo do aviso.");
        assert_eq!(method, METHOD_DIRECT);
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vazio.txt");
        std::fs::write(&path, "   \n").unwrap();
        assert!(extract_text(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(extract_text(Path::new("/nonexistent/arquivo.txt")).is_err());
    }
}
