//! Incremental vs. full reindex decisions.
//!
//! [`plan_reindex`] is pure: it only looks at the stored revision, the
//! current one and the diff between them. [`HybridService::reindex`] carries
//! the plan out and is the only writer of `last_commit`.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ServiceConfig;
use crate::dirty::mark_dirty;
use crate::project_config::{update_project_config, ConfigPatch, ProjectConfig};
use crate::vcs::VcsError;
use crate::{HybridService, ServiceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullReason {
    /// The current revision could not be determined.
    NoRevision(String),
    /// Nothing was indexed against a revision yet.
    NoStoredRevision,
    /// The diff between stored and current revision failed.
    DiffFailed(String),
    Requested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexPlan {
    Full { reason: FullReason, store_revision: Option<String> },
    NoOp { revision: String },
    Incremental { from: String, to: String, changed: Vec<String> },
}

pub fn plan_reindex<F>(stored: Option<&str>, current: Result<String, VcsError>, diff: F) -> ReindexPlan
where
    F: FnOnce(&str, &str) -> Result<Vec<String>, VcsError>,
{
    let current = match current {
        Ok(rev) => rev,
        Err(e) => return ReindexPlan::Full { reason: FullReason::NoRevision(e.to_string()), store_revision: None },
    };
    let Some(stored) = stored else {
        return ReindexPlan::Full { reason: FullReason::NoStoredRevision, store_revision: Some(current) };
    };
    if stored == current {
        return ReindexPlan::NoOp { revision: current };
    }
    match diff(stored, &current) {
        Ok(changed) => ReindexPlan::Incremental { from: stored.to_string(), to: current, changed },
        Err(e) => ReindexPlan::Full { reason: FullReason::DiffFailed(e.to_string()), store_revision: Some(current) },
    }
}

/// Changed document paths split by whether they still exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub modified: Vec<PathBuf>,
    /// Root-relative source paths.
    pub deleted: Vec<String>,
}

/// Keep only documents under the document root; other paths are ignored.
pub fn classify_changes(cfg: &ServiceConfig, root: &Path, changed: &[String]) -> ChangeSet {
    let mut set = ChangeSet::default();
    for rel in changed.iter().filter(|rel| cfg.is_document_path(rel)) {
        let abs = root.join(rel);
        if abs.is_file() {
            set.modified.push(abs);
        } else {
            set.deleted.push(rel.clone());
        }
    }
    set
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReindexRequest {
    #[default]
    Incremental,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReindexMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub files_scanned: usize,
    pub chunks_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_files: Option<usize>,
    pub mode: ReindexMode,
}

impl HybridService {
    /// Bring the index up to date with the project's working tree.
    pub fn reindex(&self, request: ReindexRequest, source_type: &str) -> Result<ReindexReport, ServiceError> {
        let root = self.cfg.project_root.clone().ok_or(ServiceError::ProjectRootRequired)?;
        self.embedder.ensure_available()?;

        let config_path = self.cfg.config_path();
        let stored = ProjectConfig::load(&config_path).last_commit;
        let current = self.vcs.current_revision(&root);
        let plan = match request {
            ReindexRequest::Full => ReindexPlan::Full { reason: FullReason::Requested, store_revision: current.ok() },
            ReindexRequest::Incremental => {
                plan_reindex(stored.as_deref(), current, |from, to| self.vcs.changed_paths(&root, from, to))
            }
        };

        let mut repo = self.open_repo()?;
        let (report, revision, stale_files) = match plan {
            ReindexPlan::Full { reason, store_revision } => {
                match &reason {
                    FullReason::DiffFailed(msg) => tracing::warn!(error = %msg, "diff failed; falling back to full reindex"),
                    FullReason::NoRevision(msg) => tracing::warn!(error = %msg, "current revision unknown; full reindex"),
                    _ => {}
                }
                tracing::info!(root = %root.display(), ?reason, "full reindex");
                let scan = self.reindex_all(&mut repo, source_type)?;
                let report = ReindexReport {
                    files_scanned: scan.files_scanned,
                    chunks_written: scan.chunks_written,
                    deleted_files: Some(scan.deleted_files),
                    mode: ReindexMode::Full,
                };
                (report, store_revision, scan.stale_files)
            }
            ReindexPlan::NoOp { revision } => {
                tracing::info!(%revision, "index already at current revision");
                let report = ReindexReport { files_scanned: 0, chunks_written: 0, deleted_files: None, mode: ReindexMode::Incremental };
                (report, Some(revision), 0)
            }
            ReindexPlan::Incremental { from, to, changed } => {
                let set = classify_changes(&self.cfg, &root, &changed);
                tracing::info!(%from, %to, modified = set.modified.len(), deleted = set.deleted.len(), "incremental reindex");
                for rel in &set.deleted {
                    repo.delete_chunks_for_path(rel)?;
                }
                let counts = self.index_files(&mut repo, &set.modified, source_type)?;
                let report = ReindexReport {
                    files_scanned: counts.files,
                    chunks_written: counts.chunks,
                    deleted_files: Some(set.deleted.len()),
                    mode: ReindexMode::Incremental,
                };
                (report, Some(to), counts.stale)
            }
        };
        drop(repo);

        let touched = report.deleted_files.is_some();
        let revision = if stale_files > 0 {
            // the next incremental run must diff from the old revision again
            tracing::warn!(files = stale_files, "documents kept stale chunks; not advancing last_commit");
            if let Err(e) = mark_dirty(&self.cfg) {
                tracing::warn!(error = %e, "could not mark index dirty");
            }
            None
        } else {
            revision
        };
        let embed_model = touched.then(|| self.embedder.info().embedding_model_id.clone());
        if revision.is_some() || embed_model.is_some() {
            update_project_config(&config_path, ConfigPatch { last_commit: revision, embed_model })?;
        }
        tracing::info!(files = report.files_scanned, chunks = report.chunks_written, mode = ?report.mode, "reindex finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_diff(_: &str, _: &str) -> Result<Vec<String>, VcsError> {
        panic!("diff must not be consulted")
    }

    #[test]
    fn missing_current_revision_is_full_without_storing() {
        let plan = plan_reindex(Some("a"), Err(VcsError::Unavailable("no git".into())), no_diff);
        assert!(matches!(plan, ReindexPlan::Full { reason: FullReason::NoRevision(_), store_revision: None }));
    }

    #[test]
    fn first_run_is_full_and_stores_current() {
        let plan = plan_reindex(None, Ok("b".into()), no_diff);
        assert_eq!(plan, ReindexPlan::Full { reason: FullReason::NoStoredRevision, store_revision: Some("b".into()) });
    }

    #[test]
    fn same_revision_is_noop() {
        assert_eq!(plan_reindex(Some("c"), Ok("c".into()), no_diff), ReindexPlan::NoOp { revision: "c".into() });
    }

    #[test]
    fn diff_failure_falls_back_to_full() {
        let plan = plan_reindex(Some("old"), Ok("new".into()), |_, _| Err(VcsError::UnknownRevision("old".into())));
        assert!(matches!(plan, ReindexPlan::Full { reason: FullReason::DiffFailed(_), store_revision: Some(ref r) } if r == "new"));
    }

    #[test]
    fn diff_success_is_incremental() {
        let plan = plan_reindex(Some("old"), Ok("new".into()), |from, to| {
            assert_eq!((from, to), ("old", "new"));
            Ok(vec!["docs/a.md".into()])
        });
        assert_eq!(
            plan,
            ReindexPlan::Incremental { from: "old".into(), to: "new".into(), changed: vec!["docs/a.md".into()] }
        );
    }

    #[test]
    fn changes_outside_documents_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/kept.md"), "# K\nbody\n").unwrap();
        let cfg = ServiceConfig::for_project(dir.path());

        let set = classify_changes(
            &cfg,
            dir.path(),
            &["docs/kept.md".into(), "docs/gone.md".into(), "src/main.rs".into(), "README.md".into()],
        );
        assert_eq!(set.modified, vec![dir.path().join("docs/kept.md")]);
        assert_eq!(set.deleted, vec!["docs/gone.md".to_string()]);
    }
}
