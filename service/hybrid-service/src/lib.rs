pub mod config;
pub mod project_config;
pub mod vcs;
pub mod pipeline;
pub mod reindex;
pub mod search;
pub mod dirty;
pub mod hooks;
pub mod tools;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chunking_store::keywords::KeywordTokenizer;
use chunking_store::sqlite_repo::SqliteRepo;
use chunking_store::StoreError;
use embedding_provider::embedder::{DualEmbedder, EmbedderError, ProcessEmbedder};

pub use config::ServiceConfig;
pub use dirty::{RefreshMode, RefreshOutcome};
pub use pipeline::{ChunkOutcome, FileIndexReport, FullScanReport};
pub use reindex::{ReindexMode, ReindexReport, ReindexRequest};
pub use search::{SearchRequest, SearchResult};
pub use vcs::{GitCli, RevisionSource, VcsError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("repo error: {0}")]
    Repo(String),
    #[error("embedder executable not found at {}", .0.display())]
    EmbedderMissing(PathBuf),
    #[error("embedder error: {0}")]
    Embed(String),
    #[error("sqlite-vec extension not available")]
    VectorUnavailable,
    #[error("project_root is required")]
    ProjectRootRequired,
    #[error("index not found at {} (index has not been built yet)", .0.display())]
    IndexMissing(PathBuf),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ServiceError {
    /// Operator-facing next step for this error.
    pub fn remediation(&self) -> String {
        match self {
            ServiceError::Repo(_) => {
                "The index database could not be used; close other writers or delete .rag/index.db and run: rag build"
                    .into()
            }
            ServiceError::EmbedderMissing(path) => format!(
                "Build the embedding generator so that {} exists, or set {} to its path",
                path.display(),
                embedding_provider::config::EMBED_DEFAULTS.executable_env,
            ),
            ServiceError::Embed(_) => format!(
                "Check that the embedding generator (set via {}) runs and prints two vectors of the configured dimension",
                embedding_provider::config::EMBED_DEFAULTS.executable_env,
            ),
            ServiceError::VectorUnavailable => format!(
                "Build with the `sqlite-vec` feature or set {} to a vec0 extension library",
                config::SQLITE_VEC_PATH_ENV,
            ),
            ServiceError::ProjectRootRequired => {
                format!("Pass --project / project_root or set {}", config::DEFAULT_PROJECT_ENV)
            }
            ServiceError::IndexMissing(db_path) => {
                let root = db_path
                    .parent()
                    .and_then(|dir| dir.parent())
                    .map(|root| root.display().to_string())
                    .unwrap_or_else(|| "<project-root>".into());
                format!("Run: rag build --project {root}")
            }
            ServiceError::Config(_) => {
                "Point --project at the root of a git working tree and check that .rag/config.json is valid JSON".into()
            }
            ServiceError::Io(_) => "Check that the project directory and its .rag/ directory exist and are writable".into(),
            ServiceError::InvalidArgument(_) => {
                "Check the argument values; scope must be \"project\" or \"global\"".into()
            }
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Repo(e.to_string())
    }
}

impl From<EmbedderError> for ServiceError {
    fn from(e: EmbedderError) -> Self {
        match e {
            EmbedderError::MissingExecutable { path } => ServiceError::EmbedderMissing(path),
            other => ServiceError::Embed(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        ServiceError::Io(e.to_string())
    }
}

/// One project's index plus the collaborators that feed it.
///
/// Cheap to clone; every operation opens its own short-lived connection.
#[derive(Clone)]
pub struct HybridService {
    cfg: ServiceConfig,
    embedder: Arc<dyn DualEmbedder>,
    tokenizer: Arc<dyn KeywordTokenizer>,
    vcs: Arc<dyn RevisionSource>,
    refresh_in_flight: Arc<AtomicBool>,
}

impl HybridService {
    /// Production wiring: process embedder, default tokenizer, git CLI.
    pub fn new(cfg: ServiceConfig) -> Result<Self, ServiceError> {
        let embedder = ProcessEmbedder::new(cfg.embedder.clone())?;
        Ok(Self::with_components(cfg, Arc::new(embedder), default_tokenizer()?, Arc::new(GitCli::default())))
    }

    pub fn with_components(
        cfg: ServiceConfig,
        embedder: Arc<dyn DualEmbedder>,
        tokenizer: Arc<dyn KeywordTokenizer>,
        vcs: Arc<dyn RevisionSource>,
    ) -> Self {
        Self { cfg, embedder, tokenizer, vcs, refresh_in_flight: Arc::new(AtomicBool::new(false)) }
    }

    /// Share a background-refresh guard with other handles.
    pub fn with_refresh_guard(mut self, guard: Arc<AtomicBool>) -> Self {
        self.refresh_in_flight = guard;
        self
    }

    pub fn config(&self) -> &ServiceConfig { &self.cfg }

    pub fn embedder(&self) -> &dyn DualEmbedder { self.embedder.as_ref() }

    pub fn tokenizer(&self) -> &dyn KeywordTokenizer { self.tokenizer.as_ref() }

    /// Open (creating if needed) the index database.
    pub fn open_repo(&self) -> Result<SqliteRepo, ServiceError> {
        std::fs::create_dir_all(self.cfg.index_dir())?;
        Ok(SqliteRepo::open(self.cfg.db_path(), &self.cfg.store_options())?)
    }

    /// Open the index database, failing when it was never built.
    pub fn open_existing_repo(&self) -> Result<SqliteRepo, ServiceError> {
        if !self.index_exists() {
            return Err(ServiceError::IndexMissing(self.cfg.db_path()));
        }
        self.open_repo()
    }

    pub fn index_exists(&self) -> bool { self.cfg.db_path().is_file() }

    pub fn with_repo<R, F>(&self, f: F) -> Result<R, ServiceError>
    where
        F: FnOnce(&mut SqliteRepo) -> Result<R, ServiceError>,
    {
        let mut repo = self.open_repo()?;
        f(&mut repo)
    }

    /// Whether connections opened with this configuration get `vec0`.
    pub fn vector_available(&self) -> bool {
        match SqliteRepo::open_in_memory(&self.cfg.store_options()) {
            Ok(repo) => repo.vector_available(),
            Err(e) => {
                tracing::warn!(error = %e, "probing vector support failed");
                false
            }
        }
    }

    /// Configuration checks that make a build pointless when they fail.
    pub fn check_ready_for_build(&self) -> Result<(), ServiceError> {
        if self.cfg.project_root.is_none() {
            return Err(ServiceError::ProjectRootRequired);
        }
        self.embedder.ensure_available()?;
        if !self.vector_available() {
            return Err(ServiceError::VectorUnavailable);
        }
        Ok(())
    }
}

/// Tokenizer selected by cargo features.
pub fn default_tokenizer() -> Result<Arc<dyn KeywordTokenizer>, ServiceError> {
    #[cfg(feature = "lindera")]
    {
        let tok = chunking_store::keywords::LinderaKeywordTokenizer::new()?;
        return Ok(Arc::new(tok));
    }
    #[cfg(not(feature = "lindera"))]
    {
        Ok(Arc::new(chunking_store::keywords::UnicodeKeywordTokenizer))
    }
}
