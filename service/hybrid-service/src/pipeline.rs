//! Markdown file → chunks → keywords + embeddings → store.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use chunk_model::{ChunkId, ChunkRecord};
use chunking_store::sqlite_repo::SqliteRepo;
use chunking_store::{ChunkVectors, IndexedChunk};
use walkdir::WalkDir;

use crate::{HybridService, ServiceError};

/// What happened to one chunk on its way to the store.
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    Indexed(IndexedChunk),
    Skipped { chunk_id: ChunkId, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndexReport {
    pub source_path: String,
    pub chunks_written: usize,
    pub skipped: usize,
    /// No chunk could be embedded, so the previously stored chunks were kept.
    pub kept_stale: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullScanReport {
    pub files_scanned: usize,
    pub chunks_written: usize,
    /// Previously indexed paths that no longer exist on disk.
    pub deleted_files: usize,
    /// Files whose stored chunks were kept because embedding failed.
    pub stale_files: usize,
}

/// Totals over a batch of files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BatchCounts {
    pub files: usize,
    pub chunks: usize,
    pub stale: usize,
}

/// `path` relative to `base` with `/` separators; `path` itself when outside `base`.
pub fn relative_source_path(base: &Path, path: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}

/// `*.md` files below `dir`, sorted. A missing directory yields nothing.
pub fn collect_documents(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                if e.depth() > 0 {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                }
                continue;
            }
        };
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "md") {
            out.push(entry.into_path());
        }
    }
    out.sort();
    out
}

fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl HybridService {
    /// Tokenize and embed each record. Transient embedding failures skip the
    /// chunk; a missing embedder aborts the whole batch.
    pub fn prepare_chunks(&self, records: Vec<ChunkRecord>) -> Result<Vec<ChunkOutcome>, ServiceError> {
        let now = timestamp_now();
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let keywords = self.tokenizer.keywords(&record.content);
            let record = record.with_keywords(keywords).with_updated_at(now.clone());
            match self.embedder.embed_pair(&record.content) {
                Ok(pair) => {
                    let vectors = ChunkVectors { latin: pair.latin, cjk: pair.cjk };
                    out.push(ChunkOutcome::Indexed(IndexedChunk { record, vectors: Some(vectors) }));
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(chunk_id = %record.chunk_id, source_path = %record.source_path, error = %e, "skipping chunk");
                    out.push(ChunkOutcome::Skipped { chunk_id: record.chunk_id, reason: e.to_string() });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    /// Rewrite every chunk of one file in a single transaction.
    ///
    /// When the file has chunks but none of them could be embedded the
    /// previously stored chunks are left untouched.
    pub fn index_file(&self, repo: &mut SqliteRepo, path: &Path, source_type: &str) -> Result<FileIndexReport, ServiceError> {
        let source_path = relative_source_path(&self.cfg.base_dir(), path);
        let output = md_chunker::chunk_markdown_file(path, &source_path, source_type, &self.cfg.segment)?;
        let total = output.chunks.len();

        let mut indexed = Vec::with_capacity(total);
        let mut skipped = 0;
        for outcome in self.prepare_chunks(output.chunks)? {
            match outcome {
                ChunkOutcome::Indexed(chunk) => indexed.push(chunk),
                ChunkOutcome::Skipped { .. } => skipped += 1,
            }
        }

        if total > 0 && indexed.is_empty() {
            tracing::warn!(%source_path, chunks = total, "no chunk could be embedded; keeping stored chunks");
            return Ok(FileIndexReport { source_path, chunks_written: 0, skipped, kept_stale: true });
        }

        let report = repo.replace_chunks_for_path(&source_path, &indexed)?;
        tracing::debug!(%source_path, written = report.written, stale = report.stale_deleted, skipped, "indexed file");
        Ok(FileIndexReport { source_path, chunks_written: report.written, skipped, kept_stale: false })
    }

    /// Index each file; read failures are logged and skipped.
    pub(crate) fn index_files(&self, repo: &mut SqliteRepo, paths: &[PathBuf], source_type: &str) -> Result<BatchCounts, ServiceError> {
        let mut counts = BatchCounts::default();
        for path in paths {
            match self.index_file(repo, path, source_type) {
                Ok(report) => {
                    counts.files += 1;
                    counts.chunks += report.chunks_written;
                    counts.stale += usize::from(report.kept_stale);
                }
                Err(ServiceError::Io(msg)) => {
                    tracing::warn!(path = %path.display(), error = %msg, "skipping unreadable file");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(counts)
    }

    /// Index every document under the document root and drop chunks of
    /// documents that disappeared.
    pub fn reindex_all(&self, repo: &mut SqliteRepo, source_type: &str) -> Result<FullScanReport, ServiceError> {
        let docs = collect_documents(&self.cfg.doc_dir());
        let counts = self.index_files(repo, &docs, source_type)?;

        let base = self.cfg.base_dir();
        let present: BTreeSet<String> = docs.iter().map(|p| relative_source_path(&base, p)).collect();
        let prefix = format!("{}/", self.cfg.doc_root.trim_end_matches('/'));
        let mut deleted_files = 0;
        for stale in repo.indexed_paths(&prefix)? {
            if present.contains(&stale) || base.join(&stale).exists() {
                continue;
            }
            repo.delete_chunks_for_path(&stale)?;
            deleted_files += 1;
        }

        Ok(FullScanReport {
            files_scanned: docs.len(),
            chunks_written: counts.chunks,
            deleted_files,
            stale_files: counts.stale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_use_forward_slashes() {
        let base = Path::new("/work/proj");
        assert_eq!(relative_source_path(base, Path::new("/work/proj/docs/a/b.md")), "docs/a/b.md");
        assert_eq!(relative_source_path(base, Path::new("/elsewhere/c.md")), "/elsewhere/c.md");
    }

    #[test]
    fn documents_are_sorted_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/z.md"), "z").unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "n").unwrap();

        let docs = collect_documents(dir.path());
        assert_eq!(docs, vec![dir.path().join("a.md"), dir.path().join("b/z.md")]);
        assert!(collect_documents(&dir.path().join("missing")).is_empty());
    }
}
