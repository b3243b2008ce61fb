#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chunking_store::keywords::UnicodeKeywordTokenizer;
use embedding_provider::embedder::{
    DeterministicEmbedder, DualEmbedder, DualEmbedding, EmbedderError, EmbedderInfo, ProviderKind,
};
use hybrid_service::{HybridService, RevisionSource, ServiceConfig, VcsError};
use tempfile::TempDir;

pub const DIM: usize = 8;
pub const MODEL_ID: &str = "stub-dual-8";

/// Deterministic vectors that can be switched to fail every call.
pub struct FlakyEmbedder {
    inner: DeterministicEmbedder,
    failing: AtomicBool,
}

impl FlakyEmbedder {
    pub fn new() -> Self {
        Self { inner: DeterministicEmbedder::new(DIM, MODEL_ID).unwrap(), failing: AtomicBool::new(false) }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl DualEmbedder for FlakyEmbedder {
    fn embed_pair(&self, text: &str) -> Result<DualEmbedding, EmbedderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbedderError::ProcessFailed { code: Some(1) });
        }
        self.inner.embed_pair(text)
    }

    fn info(&self) -> &EmbedderInfo {
        self.inner.info()
    }
}

/// Behaves like a process embedder whose executable was never built.
pub struct MissingEmbedder {
    info: EmbedderInfo,
}

impl MissingEmbedder {
    pub fn new() -> Self {
        Self {
            info: EmbedderInfo { provider: ProviderKind::ExternalProcess, embedding_model_id: MODEL_ID.into(), dimension: DIM },
        }
    }

    fn error() -> EmbedderError {
        EmbedderError::MissingExecutable { path: PathBuf::from("/opt/rag/embed/embed") }
    }
}

impl DualEmbedder for MissingEmbedder {
    fn embed_pair(&self, _text: &str) -> Result<DualEmbedding, EmbedderError> {
        Err(Self::error())
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }

    fn ensure_available(&self) -> Result<(), EmbedderError> {
        Err(Self::error())
    }
}

/// Scripted revision source.
pub struct StubVcs {
    revision: Mutex<Result<String, VcsError>>,
    diff: Mutex<Result<Vec<String>, VcsError>>,
    pub diff_calls: AtomicUsize,
}

impl StubVcs {
    pub fn at(revision: &str) -> Self {
        Self {
            revision: Mutex::new(Ok(revision.to_string())),
            diff: Mutex::new(Ok(Vec::new())),
            diff_calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        let vcs = Self::at("");
        vcs.set_revision(Err(VcsError::Unavailable("git not installed".into())));
        vcs
    }

    pub fn set_revision(&self, rev: Result<String, VcsError>) {
        *self.revision.lock().unwrap() = rev;
    }

    pub fn set_diff(&self, diff: Result<Vec<String>, VcsError>) {
        *self.diff.lock().unwrap() = diff;
    }
}

impl RevisionSource for StubVcs {
    fn current_revision(&self, _root: &Path) -> Result<String, VcsError> {
        self.revision.lock().unwrap().clone()
    }

    fn changed_paths(&self, _root: &Path, _from: &str, _to: &str) -> Result<Vec<String>, VcsError> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        self.diff.lock().unwrap().clone()
    }
}

/// Scratch project with an empty `docs/` directory.
pub fn project() -> (TempDir, ServiceConfig) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("docs")).unwrap();
    let mut cfg = ServiceConfig::for_project(dir.path());
    cfg.embedder.dimension = DIM;
    (dir, cfg)
}

pub fn write_doc(root: &Path, rel: &str, text: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, text).unwrap();
    path
}

pub fn service(cfg: ServiceConfig, embedder: Arc<dyn DualEmbedder>, vcs: Arc<dyn RevisionSource>) -> HybridService {
    HybridService::with_components(cfg, embedder, Arc::new(UnicodeKeywordTokenizer), vcs)
}

/// Run git in `root` with a throwaway identity. `false` when git fails or is not installed.
pub fn git(root: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .arg("-C")
        .arg(root)
        .args(["-c", "user.name=rag", "-c", "user.email=rag@example.com", "-c", "commit.gpgsign=false"])
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
