//! Hybrid retrieval: BM25 over keywords plus KNN in both embedding spaces,
//! merged with Reciprocal Rank Fusion.
//!
//! score = 1/(K + lexical_rank) + 1/(K + min(latin_rank, cjk_rank)).
//! Ranks are 1-based; a list that does not contain a chunk contributes the
//! penalty rank `CANDIDATE_FACTOR * top_k + 1` (saturating).

use std::collections::HashMap;

use chunk_model::{ChunkId, ChunkRecord};
use chunking_store::fts5_index::{fts_match_expression, Fts5Index};
use chunking_store::sqlite_repo::SqliteRepo;
use chunking_store::vec_index::VecIndex;
use chunking_store::{SearchHit, StoreError, VectorSpace};
use embedding_provider::embedder::DualEmbedding;
use serde::Serialize;

use crate::{HybridService, ServiceError};

pub const RRF_K: f64 = 60.0;
/// Each ranked list is fetched `CANDIDATE_FACTOR * top_k` deep.
pub const CANDIDATE_FACTOR: usize = 3;
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub source_type: String,
    pub source_path: String,
    pub section: String,
    pub content: String,
    pub score: f64,
    pub line_range: [u32; 2],
}

impl SearchResult {
    fn from_record(record: &ChunkRecord, score: f64) -> Self {
        Self {
            source_type: record.source_type.clone(),
            source_path: record.source_path.clone(),
            section: record.section.clone(),
            content: record.content.clone(),
            score: round6(score),
            line_range: record.line_range(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    /// Empty means every source type.
    pub source_types: Vec<String>,
    pub top_k: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), source_types: Vec::new(), top_k: DEFAULT_TOP_K }
    }

    pub fn with_source_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.source_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    fn accepts(&self, source_type: &str) -> bool {
        self.source_types.is_empty() || self.source_types.iter().any(|t| t == source_type)
    }
}

pub fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

/// Candidates fetched from each ranked list for a request of `top_k`.
pub fn candidate_limit(top_k: usize) -> usize {
    CANDIDATE_FACTOR.saturating_mul(top_k)
}

fn rrf(rank: usize) -> f64 {
    1.0 / (RRF_K + rank as f64)
}

/// Fuse three ranked id lists (best first). Returns every candidate, best
/// first; equal scores keep first-seen order across lexical, latin, cjk.
pub fn fuse_rankings(lexical: &[ChunkId], latin: &[ChunkId], cjk: &[ChunkId], top_k: usize) -> Vec<(ChunkId, f64)> {
    let missing = candidate_limit(top_k).saturating_add(1);
    let mut order: Vec<ChunkId> = Vec::new();
    let mut ranks: HashMap<ChunkId, [usize; 3]> = HashMap::new();

    for (list_idx, list) in [lexical, latin, cjk].into_iter().enumerate() {
        for (pos, id) in list.iter().enumerate() {
            let entry = ranks.entry(id.clone()).or_insert_with(|| {
                order.push(id.clone());
                [missing; 3]
            });
            // first occurrence wins within a list
            if entry[list_idx] == missing {
                entry[list_idx] = (pos + 1).min(missing);
            }
        }
    }

    let mut scored: Vec<(ChunkId, f64)> = order
        .into_iter()
        .map(|id| {
            let [lex, lat, cj] = ranks[&id];
            let score = rrf(lex) + rrf(lat.min(cj));
            (id, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}

fn ids(hits: &[SearchHit]) -> Vec<ChunkId> {
    hits.iter().map(|h| h.chunk.chunk_id.clone()).collect()
}

fn knn_both(repo: &SqliteRepo, pair: &DualEmbedding, k: usize) -> Result<(Vec<SearchHit>, Vec<SearchHit>), StoreError> {
    let knn = VecIndex::new();
    let latin = knn.knn_search(repo, VectorSpace::Latin, &pair.latin, k)?;
    let cjk = knn.knn_search(repo, VectorSpace::Cjk, &pair.cjk, k)?;
    Ok((latin, cjk))
}

impl HybridService {
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, ServiceError> {
        if request.query.trim().is_empty() || request.top_k == 0 {
            return Ok(Vec::new());
        }
        let repo = self.open_existing_repo()?;
        let limit = candidate_limit(request.top_k);

        let tokens = self.tokenizer.tokenize(&request.query);
        let expr = fts_match_expression(&tokens);
        let lexical = match Fts5Index::new().search(&repo, &expr, limit) {
            Ok(hits) => hits,
            Err(StoreError::Query(msg)) => {
                tracing::warn!(error = %msg, "lexical query rejected; using vector ranking only");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut latin = Vec::new();
        let mut cjk = Vec::new();
        if repo.vector_available() {
            match self.embedder.embed(&request.query) {
                Ok(Some(pair)) => match knn_both(&repo, &pair, limit) {
                    Ok((l, c)) => {
                        latin = l;
                        cjk = c;
                    }
                    Err(e) => tracing::warn!(error = %e, "vector search failed; using lexical ranking only"),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "embedder unavailable; using lexical ranking only"),
            }
        }
        tracing::debug!(
            query = %request.query,
            lexical = lexical.len(),
            latin = latin.len(),
            cjk = cjk.len(),
            "collected candidates"
        );

        let fused = fuse_rankings(&ids(&lexical), &ids(&latin), &ids(&cjk), request.top_k);

        let mut records: HashMap<ChunkId, ChunkRecord> = HashMap::new();
        for hit in lexical.into_iter().chain(latin).chain(cjk) {
            records.entry(hit.chunk.chunk_id.clone()).or_insert(hit.chunk);
        }

        Ok(fused
            .into_iter()
            .filter_map(|(id, score)| records.get(&id).map(|rec| (rec, score)))
            .filter(|(rec, _)| request.accepts(&rec.source_type))
            .take(request.top_k)
            .map(|(rec, score)| SearchResult::from_record(rec, score))
            .collect())
    }
}
