use std::path::{Path, PathBuf};

use chunking_store::{StoreOptions, VectorMode};
use embedding_provider::config::default_process_config;
use embedding_provider::embedder::ProcessEmbedderConfig;
use md_chunker::SegmentParams;

use crate::dirty::RefreshMode;

/// Project used when a call names none.
pub const DEFAULT_PROJECT_ENV: &str = "RAG_DEFAULT_PROJECT";
/// Shared library providing `vec0`, loaded instead of the bundled module.
pub const SQLITE_VEC_PATH_ENV: &str = "RAG_SQLITE_VEC_PATH";

/// Directory, under the project root (or the home directory), holding the index.
pub const INDEX_DIR_NAME: &str = ".rag";
pub const DB_FILE_NAME: &str = "index.db";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DIRTY_FLAG_NAME: &str = ".dirty";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// `None` selects the user-level index under the home directory.
    pub project_root: Option<PathBuf>,
    /// Document root, relative to the project root. Only `*.md` below it is indexed.
    pub doc_root: String,
    pub segment: SegmentParams,
    pub embedder: ProcessEmbedderConfig,
    pub vector: VectorMode,
    pub refresh: RefreshMode,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            project_root: None,
            doc_root: "docs".into(),
            segment: SegmentParams::default(),
            embedder: default_process_config(),
            vector: VectorMode::Auto,
            refresh: RefreshMode::Inline,
        }
    }
}

impl ServiceConfig {
    pub fn for_project(root: impl Into<PathBuf>) -> Self {
        Self { project_root: Some(root.into()), ..Self::default() }
    }

    /// Defaults with environment overrides applied. `project` wins over `RAG_DEFAULT_PROJECT`.
    pub fn from_env(project: Option<PathBuf>) -> Self {
        let mut cfg = Self { project_root: project.or_else(default_project_from_env), ..Self::default() };
        if let Some(path) = std::env::var_os(SQLITE_VEC_PATH_ENV).filter(|v| !v.is_empty()) {
            cfg.vector = VectorMode::Dynamic(PathBuf::from(path));
        }
        cfg
    }

    /// Same settings, pointed at another project (or the user-level index).
    pub fn with_project_root(&self, root: Option<PathBuf>) -> Self {
        Self { project_root: root, ..self.clone() }
    }

    /// Directory that source paths are stored relative to.
    pub fn base_dir(&self) -> PathBuf {
        match &self.project_root {
            Some(root) => root.clone(),
            None => home_dir(),
        }
    }

    pub fn index_dir(&self) -> PathBuf { self.base_dir().join(INDEX_DIR_NAME) }

    pub fn db_path(&self) -> PathBuf { self.index_dir().join(DB_FILE_NAME) }

    pub fn config_path(&self) -> PathBuf { self.index_dir().join(CONFIG_FILE_NAME) }

    pub fn dirty_flag_path(&self) -> PathBuf { self.index_dir().join(DIRTY_FLAG_NAME) }

    pub fn doc_dir(&self) -> PathBuf { self.base_dir().join(&self.doc_root) }

    /// Whether a root-relative path names an indexable document.
    pub fn is_document_path(&self, rel: &str) -> bool {
        let prefix = format!("{}/", self.doc_root.trim_end_matches('/'));
        rel.starts_with(&prefix) && rel.ends_with(".md")
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions { dimension: self.embedder.dimension, vector: self.vector.clone() }
    }
}

pub fn default_project_from_env() -> Option<PathBuf> {
    std::env::var_os(DEFAULT_PROJECT_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| Path::new(".").to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_paths_live_under_index_dir() {
        let cfg = ServiceConfig::for_project("/work/proj");
        assert_eq!(cfg.db_path(), PathBuf::from("/work/proj/.rag/index.db"));
        assert_eq!(cfg.config_path(), PathBuf::from("/work/proj/.rag/config.json"));
        assert_eq!(cfg.dirty_flag_path(), PathBuf::from("/work/proj/.rag/.dirty"));
        assert_eq!(cfg.doc_dir(), PathBuf::from("/work/proj/docs"));
    }

    #[test]
    fn document_paths_are_markdown_under_doc_root() {
        let cfg = ServiceConfig::for_project("/p");
        assert!(cfg.is_document_path("docs/a.md"));
        assert!(cfg.is_document_path("docs/deep/b.md"));
        assert!(!cfg.is_document_path("docs/a.txt"));
        assert!(!cfg.is_document_path("src/a.md"));
        assert!(!cfg.is_document_path("docsx/a.md"));
    }
}
