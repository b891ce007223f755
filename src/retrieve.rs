//! Hybrid retrieval: lexical and vector branches, merge, rerank,
//! context expansion.
//!
//! The two branches run concurrently, each under its own timeout, and
//! each degrades to an empty contribution on failure. A query against
//! a half-broken deployment returns what the healthy branch found
//! instead of an error.
//!
//! Candidates merge lexical-first with content-hash dedup, the
//! optional cross-encoder rescores them, and the survivors are
//! expanded to their parent fragment so the caller gets enough
//! surrounding text to actually answer from.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use tokio::time::{timeout, Duration};
use tracing::warn;

use crate::config::Config;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::fragments::FragmentStore;
use crate::ingest::get_document;
use crate::lexical::LexicalIndex;
use crate::models::{Document, MicroFragment, RetrievedPassage};
use crate::rerank::RelevanceScorer;
use crate::vector::VectorIndex;

/// One retrieval request.
#[derive(Debug, Default, Clone)]
pub struct RetrieveRequest {
    pub query: String,
    /// Optional replacement text for the vector branch, e.g. a
    /// hypothetical answer. The lexical branch always sees the raw
    /// query; keyword matching against generated prose only hurts.
    pub vector_query: Option<String>,
    pub jurisdiction: Option<String>,
    /// Overrides `retrieval.top_n` when set.
    pub top_n: Option<usize>,
}

pub async fn retrieve(
    pool: &SqlitePool,
    config: &Config,
    provider: &dyn EmbeddingProvider,
    scorer: &dyn RelevanceScorer,
    request: &RetrieveRequest,
) -> Result<Vec<RetrievedPassage>> {
    let query = request.query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let candidate_k = config.retrieval.candidate_k;
    let branch_timeout = Duration::from_secs(config.retrieval.branch_timeout_secs);
    let jurisdiction = request.jurisdiction.as_deref();

    let lexical = LexicalIndex::new(pool.clone());
    let vector = VectorIndex::new(pool.clone());

    let lexical_branch = async {
        match timeout(branch_timeout, lexical.query(query, jurisdiction, candidate_k)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(error = %e, "lexical branch failed");
                Vec::new()
            }
            Err(_) => {
                warn!("lexical branch timed out");
                Vec::new()
            }
        }
    };

    let vector_branch = async {
        if !config.embedding.is_enabled() {
            return Vec::new();
        }
        let vector_text = request.vector_query.as_deref().unwrap_or(query);
        let work = async {
            let query_vec = embed_query(provider, &config.embedding, vector_text).await?;
            vector
                .query(&query_vec, jurisdiction, candidate_k as usize)
                .await
        };
        match timeout(branch_timeout, work).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(error = %e, "vector branch failed");
                Vec::new()
            }
            Err(_) => {
                warn!("vector branch timed out");
                Vec::new()
            }
        }
    };

    let (lexical_hits, vector_hits) = tokio::join!(lexical_branch, vector_branch);

    // Merge lexical-first. Scores are min-max normalized per branch so
    // bm25 ranks and cosine similarities land on the same scale.
    let lexical_scores = normalize_scores(&lexical_hits.iter().map(|h| h.score).collect::<Vec<_>>());
    let vector_scores = normalize_scores(&vector_hits.iter().map(|h| h.score).collect::<Vec<_>>());

    let mut ordered: Vec<(String, f64)> = Vec::new();
    let mut seen_ids = HashSet::new();
    for (hit, score) in lexical_hits.iter().zip(&lexical_scores) {
        if seen_ids.insert(hit.fragment_id.clone()) {
            ordered.push((hit.fragment_id.clone(), *score));
        }
    }
    for (hit, score) in vector_hits.iter().zip(&vector_scores) {
        if seen_ids.insert(hit.fragment_id.clone()) {
            ordered.push((hit.fragment_id.clone(), *score));
        }
    }

    let store = FragmentStore::new(pool.clone());

    // Resolve fragments, dropping index rows with no backing fragment
    // and duplicate contents picked up by both branches.
    let mut candidates: Vec<(MicroFragment, f64)> = Vec::new();
    let mut seen_hashes = HashSet::new();
    for (fragment_id, score) in ordered {
        match store.get_micro(&fragment_id).await? {
            Some(fragment) => {
                if seen_hashes.insert(fragment.hash.clone()) {
                    candidates.push((fragment, score));
                }
            }
            None => {
                warn!(fragment_id, "index row without backing fragment, skipping");
            }
        }
    }

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    // Optional cross-encoder pass. Failure keeps the merged order.
    if config.reranker.is_enabled() {
        let passages: Vec<String> = candidates.iter().map(|(f, _)| f.text.clone()).collect();
        match scorer.score(query, &passages).await {
            Ok(scores) if scores.len() == candidates.len() => {
                for ((_, s), new) in candidates.iter_mut().zip(&scores) {
                    *s = *new as f64;
                }
            }
            Ok(_) | Err(_) => {
                warn!("reranker unavailable, keeping merged order");
            }
        }
    }

    // Stable sort: ties keep the lexical-first merge order.
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(request.top_n.unwrap_or(config.retrieval.top_n));

    let mut documents: HashMap<String, Document> = HashMap::new();
    let mut passages = Vec::with_capacity(candidates.len());
    for (fragment, score) in candidates {
        let content = expand(&store, &fragment, config.retrieval.page_peek_chars).await?;
        if !documents.contains_key(&fragment.document_id) {
            match get_document(pool, &fragment.document_id).await? {
                Some(d) => {
                    documents.insert(fragment.document_id.clone(), d);
                }
                None => {
                    warn!(document_id = %fragment.document_id, "fragment without document, skipping");
                    continue;
                }
            }
        }
        let doc = &documents[&fragment.document_id];
        passages.push(RetrievedPassage {
            content,
            fragment_id: fragment.id,
            document_id: doc.id.clone(),
            filename: doc.filename.clone(),
            jurisdiction: doc.jurisdiction.clone(),
            kind: doc.kind.as_str().to_string(),
            publication_date: doc.publication_date.clone(),
            score,
        });
    }

    Ok(passages)
}

/// Context expansion: prefer the parent macro (with page peek), then
/// the ordinal neighbors, then the fragment's own text.
async fn expand(
    store: &FragmentStore,
    fragment: &MicroFragment,
    peek_chars: usize,
) -> Result<String> {
    if let Some(parent) = store.get_macro(&fragment.parent_id).await? {
        return store.expanded_text(&parent, peek_chars).await;
    }

    let siblings = store
        .micro_with_siblings(&fragment.parent_id, fragment.ordinal)
        .await?;
    if siblings.len() > 1 {
        return Ok(siblings
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"));
    }

    Ok(fragment.text.clone())
}

/// Min-max normalize to [0, 1]. A constant slice maps to all ones so
/// a single-hit branch still outranks nothing.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    let Some(&max) = scores
        .iter()
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    else {
        return Vec::new();
    };
    let min = scores
        .iter()
        .copied()
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or(max);

    if (max - min).abs() < f64::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}
