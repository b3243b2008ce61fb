//! Stale-index marker written by the post-commit hook and consumed before searches.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::SystemTime;

use chunk_model::source_type;

use crate::config::ServiceConfig;
use crate::reindex::{ReindexReport, ReindexRequest};
use crate::HybridService;

/// How a dirty index is refreshed before serving a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Reindex on the calling thread; the search sees fresh data.
    #[default]
    Inline,
    /// Reindex on a spawned thread; the search serves the current index.
    Background,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Clean,
    Skipped(String),
    Refreshed(ReindexReport),
    Failed(String),
    Spawned,
}

pub fn mark_dirty(cfg: &ServiceConfig) -> io::Result<PathBuf> {
    let flag = cfg.dirty_flag_path();
    fs::create_dir_all(cfg.index_dir())?;
    fs::write(&flag, b"")?;
    Ok(flag)
}

pub fn is_dirty(cfg: &ServiceConfig) -> bool {
    cfg.dirty_flag_path().exists()
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Remove the flag unless it was touched again while the refresh ran.
fn clear_flag(flag: &Path, seen: Option<SystemTime>) {
    if seen.is_some() && modified(flag) != seen {
        tracing::debug!(flag = %flag.display(), "dirty flag re-marked during refresh; keeping it");
        return;
    }
    match fs::remove_file(flag) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(flag = %flag.display(), error = %e, "could not remove dirty flag"),
    }
}

impl HybridService {
    /// Incrementally reindex when the dirty flag is present. Never fails:
    /// problems are logged and reported in the outcome.
    pub fn refresh_if_dirty(&self) -> RefreshOutcome {
        if self.cfg.project_root.is_none() || !is_dirty(&self.cfg) {
            return RefreshOutcome::Clean;
        }
        if self.cfg.refresh == RefreshMode::Disabled {
            return RefreshOutcome::Skipped("dirty refresh disabled".into());
        }
        if let Err(e) = self.embedder.ensure_available() {
            tracing::debug!(error = %e, "dirty index left as is");
            return RefreshOutcome::Skipped(e.to_string());
        }
        if !self.vector_available() {
            return RefreshOutcome::Skipped("sqlite-vec extension not available".into());
        }

        match self.cfg.refresh {
            RefreshMode::Background => self.spawn_refresh(),
            _ => self.run_refresh(),
        }
    }

    fn run_refresh(&self) -> RefreshOutcome {
        let flag = self.cfg.dirty_flag_path();
        let seen = modified(&flag);
        match self.reindex(ReindexRequest::Incremental, source_type::DOC) {
            Ok(report) => {
                clear_flag(&flag, seen);
                RefreshOutcome::Refreshed(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "dirty-index refresh failed");
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }

    fn spawn_refresh(&self) -> RefreshOutcome {
        if self.refresh_in_flight.swap(true, Ordering::AcqRel) {
            return RefreshOutcome::Skipped("refresh already running".into());
        }
        let svc = self.clone();
        let spawned = std::thread::Builder::new().name("rag-refresh".into()).spawn(move || {
            let outcome = svc.run_refresh();
            tracing::info!(?outcome, "background refresh finished");
            svc.refresh_in_flight.store(false, Ordering::Release);
        });
        match spawned {
            Ok(_) => RefreshOutcome::Spawned,
            Err(e) => {
                self.refresh_in_flight.store(false, Ordering::Release);
                tracing::warn!(error = %e, "could not spawn refresh thread");
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }
}
