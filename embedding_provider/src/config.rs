use std::path::PathBuf;
use std::time::Duration;

use crate::embedder::ProcessEmbedderConfig;

/// Default settings for the external dual-vector embedder.
#[derive(Debug, Clone, Copy)]
pub struct EmbedDefaults {
    /// Environment variable that overrides the executable location.
    pub executable_env: &'static str,
    /// Candidate locations relative to the running binary's directory, in lookup order.
    pub executable_candidates: &'static [&'static str],
    pub embedding_dimension: usize,
    pub timeout_secs: u64,
    pub embedding_model_id: &'static str,
}

/// Shared defaults so CLI, service and tests stay in sync.
pub const EMBED_DEFAULTS: EmbedDefaults = EmbedDefaults {
    executable_env: "RAG_EMBED_BIN",
    executable_candidates: &["embed/embed", "embed"],
    embedding_dimension: 512,
    timeout_secs: 60,
    embedding_model_id: "NLContextualEmbedding (Latin + CJK, 512-dim, macOS 14+)",
};

/// Locate the embedder executable.
///
/// `RAG_EMBED_BIN` wins when set. Otherwise the first existing candidate next
/// to the running binary; if none exists, the first candidate is returned so
/// error messages point at the expected location.
pub fn resolve_executable() -> PathBuf {
    if let Some(path) = std::env::var_os(EMBED_DEFAULTS.executable_env).filter(|v| !v.is_empty()) {
        return PathBuf::from(path);
    }
    let base = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_default();
    let candidates: Vec<PathBuf> = EMBED_DEFAULTS
        .executable_candidates
        .iter()
        .map(|rel| base.join(rel))
        .collect();
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .unwrap_or_else(|| candidates[0].clone())
}

/// Convenience helper to build a [`ProcessEmbedderConfig`] from the shared defaults.
pub fn default_process_config() -> ProcessEmbedderConfig {
    ProcessEmbedderConfig {
        executable: resolve_executable(),
        dimension: EMBED_DEFAULTS.embedding_dimension,
        timeout: Duration::from_secs(EMBED_DEFAULTS.timeout_secs),
        embedding_model_id: EMBED_DEFAULTS.embedding_model_id.into(),
    }
}
