use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

mod process;

pub use process::{parse_dual_output, resolve_executable, ProcessEmbedder, ProcessEmbedderConfig};

/// Identifies the backing implementation that powers an embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// External executable that prints both vectors on stdout.
    ExternalProcess,
    /// Hash-derived vectors, stable across runs. Offline use and tests.
    Deterministic,
    /// Any caller-supplied implementation.
    Custom,
}

/// Static metadata describing a particular embedder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub provider: ProviderKind,
    /// Human-readable model descriptor, persisted with the index.
    pub embedding_model_id: String,
    /// Length of each of the two vectors.
    pub dimension: usize,
}

/// Vectors for one text: one tuned for Latin script, one for CJK.
#[derive(Debug, Clone, PartialEq)]
pub struct DualEmbedding {
    pub latin: Vec<f32>,
    pub cjk: Vec<f32>,
}

/// Errors that can be produced by embedder operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmbedderError {
    #[error("invalid embedder configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("embedder executable `{}` not found", path.display())]
    MissingExecutable { path: PathBuf },
    #[error("embedder timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("embedder exited unsuccessfully (status code {code:?})")]
    ProcessFailed { code: Option<i32> },
    #[error("failed to run embedder: {message}")]
    Spawn { message: String },
    #[error("malformed embedder output: {message}")]
    MalformedOutput { message: String },
    #[error("expected two {expected}-dim vectors, got {latin} and {cjk}")]
    DimensionMismatch { expected: usize, latin: usize, cjk: usize },
}

impl EmbedderError {
    /// Transient failures affect one text; the rest are configuration problems.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            EmbedderError::InvalidConfiguration { .. } | EmbedderError::MissingExecutable { .. }
        )
    }
}

/// Core interface for all embedder implementations.
pub trait DualEmbedder: Send + Sync {
    fn embed_pair(&self, text: &str) -> Result<DualEmbedding, EmbedderError>;

    fn info(&self) -> &EmbedderInfo;

    /// Fails when the embedder cannot run at all (e.g. executable missing).
    fn ensure_available(&self) -> Result<(), EmbedderError> {
        Ok(())
    }

    /// Like [`DualEmbedder::embed_pair`] but transient failures collapse to `None`.
    fn embed(&self, text: &str) -> Result<Option<DualEmbedding>, EmbedderError> {
        match self.embed_pair(text) {
            Ok(pair) => Ok(Some(pair)),
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, "embedding unavailable for text");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl<T: DualEmbedder + ?Sized> DualEmbedder for Box<T> {
    fn embed_pair(&self, text: &str) -> Result<DualEmbedding, EmbedderError> { (**self).embed_pair(text) }
    fn info(&self) -> &EmbedderInfo { (**self).info() }
    fn ensure_available(&self) -> Result<(), EmbedderError> { (**self).ensure_available() }
}

/// Deterministic pseudo embedder. Equal texts map to equal vectors; nothing
/// about semantic closeness is implied.
#[derive(Debug, Clone)]
pub struct DeterministicEmbedder {
    info: EmbedderInfo,
    base_seed: u64,
}

impl DeterministicEmbedder {
    pub fn new(dimension: usize, embedding_model_id: impl Into<String>) -> Result<Self, EmbedderError> {
        if dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        let embedding_model_id = embedding_model_id.into();
        let mut hasher = DefaultHasher::new();
        ProviderKind::Deterministic.hash(&mut hasher);
        embedding_model_id.hash(&mut hasher);
        Ok(Self {
            info: EmbedderInfo {
                provider: ProviderKind::Deterministic,
                embedding_model_id,
                dimension,
            },
            base_seed: hasher.finish(),
        })
    }

    fn generate(&self, space: u8, text: &str) -> Vec<f32> {
        let mut output = Vec::with_capacity(self.info.dimension);
        for index in 0..self.info.dimension {
            let mut hasher = DefaultHasher::new();
            self.base_seed.hash(&mut hasher);
            space.hash(&mut hasher);
            index.hash(&mut hasher);
            text.hash(&mut hasher);
            output.push(normalize_hash(hasher.finish()));
        }
        output
    }
}

impl DualEmbedder for DeterministicEmbedder {
    fn embed_pair(&self, text: &str) -> Result<DualEmbedding, EmbedderError> {
        Ok(DualEmbedding { latin: self.generate(0, text), cjk: self.generate(1, text) })
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

fn normalize_hash(value: u64) -> f32 {
    const SCALE: f64 = 2.0;
    let normalized = (value as f64) / (u64::MAX as f64);
    (normalized * SCALE - 1.0) as f32
}
