use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("cividex.db")
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size (chars) for continuous texts without structure.
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    /// Overlap (chars) between consecutive windows.
    #[serde(default = "default_window_overlap")]
    pub window_overlap: usize,
    /// Articles larger than this are sub-split on paragraph markers.
    #[serde(default = "default_article_ceiling")]
    pub article_ceiling: usize,
    /// Hard cap: any chunk above this is window-split, never truncated.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    /// Micro fragments below this floor are merged into a neighbor.
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    /// Rows per macro table block (header re-emitted per block).
    #[serde(default = "default_table_rows_macro")]
    pub table_rows_macro: usize,
    /// Rows per micro table block.
    #[serde(default = "default_table_rows_micro")]
    pub table_rows_micro: usize,
    /// Sentence-window width for semantic boundary scoring.
    #[serde(default = "default_semantic_window")]
    pub semantic_window: usize,
}

fn default_window_chars() -> usize {
    3000
}
fn default_window_overlap() -> usize {
    500
}
fn default_article_ceiling() -> usize {
    2500
}
fn default_max_chunk_chars() -> usize {
    4000
}
fn default_min_chunk_chars() -> usize {
    100
}
fn default_table_rows_macro() -> usize {
    50
}
fn default_table_rows_micro() -> usize {
    5
}
fn default_semantic_window() -> usize {
    3
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            window_overlap: default_window_overlap(),
            article_ceiling: default_article_ceiling(),
            max_chunk_chars: default_max_chunk_chars(),
            min_chunk_chars: default_min_chunk_chars(),
            table_rows_macro: default_table_rows_macro(),
            table_rows_micro: default_table_rows_micro(),
            semantic_window: default_semantic_window(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidates fetched per branch before merge.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: i64,
    /// Results returned after re-ranking.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Per-branch timeout; a timed-out branch contributes zero candidates.
    #[serde(default = "default_branch_timeout_secs")]
    pub branch_timeout_secs: u64,
    /// Chars of the next page appended when expanding page fragments.
    #[serde(default = "default_page_peek_chars")]
    pub page_peek_chars: usize,
}

fn default_candidate_k() -> i64 {
    20
}
fn default_top_n() -> usize {
    5
}
fn default_branch_timeout_secs() -> u64 {
    10
}
fn default_page_peek_chars() -> usize {
    250
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            top_n: default_top_n(),
            branch_timeout_secs: default_branch_timeout_secs(),
            page_peek_chars: default_page_peek_chars(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    /// `"disabled"` or `"http"` (cross-encoder scoring endpoint).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_rerank_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_rerank_timeout_secs() -> u64 {
    15
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            endpoint: None,
            model: None,
            timeout_secs: default_rerank_timeout_secs(),
        }
    }
}

impl RerankerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.window_chars == 0 {
        anyhow::bail!("chunking.window_chars must be > 0");
    }
    if config.chunking.window_overlap >= config.chunking.window_chars {
        anyhow::bail!("chunking.window_overlap must be < chunking.window_chars");
    }
    if config.chunking.max_chunk_chars < config.chunking.window_chars {
        anyhow::bail!("chunking.max_chunk_chars must be >= chunking.window_chars");
    }
    if config.retrieval.top_n == 0 {
        anyhow::bail!("retrieval.top_n must be >= 1");
    }
    if config.retrieval.candidate_k < 1 {
        anyhow::bail!("retrieval.candidate_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.reranker.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.reranker.endpoint.is_none() {
                anyhow::bail!("reranker.endpoint required when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown reranker provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse("[db]\npath = \"/tmp/cividex.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.window_chars, 3000);
        assert_eq!(config.chunking.window_overlap, 500);
        assert_eq!(config.retrieval.top_n, 5);
        assert_eq!(config.retrieval.page_peek_chars, 250);
        assert!(!config.embedding.is_enabled());
        assert!(!config.reranker.is_enabled());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let err = parse(
            "[db]\npath = \"/tmp/x.sqlite\"\n[chunking]\nwindow_chars = 100\nwindow_overlap = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("window_overlap"));
    }

    #[test]
    fn test_embedding_requires_model_and_dims() {
        let err = parse(
            "[db]\npath = \"/tmp/x.sqlite\"\n[embedding]\nprovider = \"openai\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_http_reranker_requires_endpoint() {
        let err = parse(
            "[db]\npath = \"/tmp/x.sqlite\"\n[reranker]\nprovider = \"http\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("reranker.endpoint"));
    }
}
