pub mod sqlite_repo;
pub mod fts5_index;
pub mod vec_index;
pub mod vector_ext;
pub mod keywords;

use std::path::PathBuf;

use chunk_model::{ChunkId, ChunkRecord};

/// Primary storage seam used by the indexing side.
pub trait ChunkPrimaryStore {
    /// Upsert a batch of chunks atomically within the store.
    fn upsert_chunks(&mut self, chunks: Vec<IndexedChunk>) -> Result<(), StoreError>;
    fn delete_by_ids(&mut self, ids: &[ChunkId]) -> Result<usize, StoreError>;
}

/// One ranked hit. `score` is whatever the index ranks by: BM25 for
/// lexical search (lower is better), cosine distance for KNN (lower is better).
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    pub score: f64,
}

/// The two embedding spaces kept side by side for every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorSpace {
    Latin,
    Cjk,
}

impl VectorSpace {
    pub const ALL: [VectorSpace; 2] = [VectorSpace::Latin, VectorSpace::Cjk];

    pub fn table(self) -> &'static str {
        match self {
            VectorSpace::Latin => "chunks_vec_latin",
            VectorSpace::Cjk => "chunks_vec_cjk",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkVectors {
    pub latin: Vec<f32>,
    pub cjk: Vec<f32>,
}

impl ChunkVectors {
    pub fn get(&self, space: VectorSpace) -> &[f32] {
        match space {
            VectorSpace::Latin => &self.latin,
            VectorSpace::Cjk => &self.cjk,
        }
    }
}

/// A chunk ready to be written, with its vectors when they were produced.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub record: ChunkRecord,
    pub vectors: Option<ChunkVectors>,
}

/// Counts from rewriting one source path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceReport {
    pub stale_deleted: usize,
    pub written: usize,
}

/// How the `vec0` module is made available to connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorMode {
    /// Use the statically linked extension when compiled in.
    Auto,
    /// Never touch vector tables.
    Disabled,
    /// Load a shared library from this path.
    Dynamic(PathBuf),
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub dimension: usize,
    pub vector: VectorMode,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions { dimension: 512, vector: VectorMode::Auto }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("lexical query rejected: {0}")]
    Query(String),
    #[error("vector extension error: {0}")]
    VectorExtension(String),
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("invalid chunk: {0}")]
    InvalidChunk(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}
