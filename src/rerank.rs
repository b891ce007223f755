//! Relevance rescoring of merged candidates.
//!
//! A cross-encoder sees the query and passage together, which beats
//! the first-stage scores at putting the actual answer on top. The
//! scorer sits behind a trait so retrieval can treat it as optional:
//! when it is disabled or fails, candidates keep their merged order.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::RerankerConfig;

/// Scores passages against a query, higher is more relevant.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// One score per passage, in input order.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

/// Used when `reranker.provider = "disabled"`. Retrieval checks the
/// config before calling, so this erroring is a programming error
/// surfaced loudly rather than a silent no-op.
pub struct DisabledScorer;

#[async_trait]
impl RelevanceScorer for DisabledScorer {
    async fn score(&self, _query: &str, _passages: &[String]) -> Result<Vec<f32>> {
        bail!("Reranker is disabled")
    }
}

/// Scorer backed by an HTTP cross-encoder service.
///
/// Sends `POST {endpoint}` with `{"model", "query", "passages"}` and
/// expects `{"scores": [..]}` back, one float per passage.
pub struct HttpScorer {
    endpoint: String,
    model: Option<String>,
    client: reqwest::Client,
}

impl HttpScorer {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("reranker.endpoint required for http provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint,
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl RelevanceScorer for HttpScorer {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "passages": passages,
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Reranker error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        let scores = json
            .get("scores")
            .and_then(|s| s.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid reranker response: missing scores"))?;

        if scores.len() != passages.len() {
            bail!(
                "Reranker returned {} scores for {} passages",
                scores.len(),
                passages.len()
            );
        }

        Ok(scores
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect())
    }
}

/// Create the scorer named by the configuration.
pub fn create_scorer(config: &RerankerConfig) -> Result<Box<dyn RelevanceScorer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledScorer)),
        "http" => Ok(Box::new(HttpScorer::new(config)?)),
        other => bail!("Unknown reranker provider: {}", other),
    }
}
