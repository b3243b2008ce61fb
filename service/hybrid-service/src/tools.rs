//! The four tool operations (search, add_entry, reindex, status) as
//! structured payloads. Every failure becomes `{error, remediation}`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use chunk_model::source_type;
use chunking_store::keywords::KeywordTokenizer;
use embedding_provider::embedder::{DualEmbedder, ProcessEmbedder};
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::dirty::{is_dirty, RefreshOutcome};
use crate::project_config::ProjectConfig;
use crate::reindex::{ReindexReport, ReindexRequest};
use crate::search::{SearchRequest, SearchResult};
use crate::vcs::{GitCli, RevisionSource};
use crate::{default_tokenizer, HybridService, ServiceError};

/// Directory under the document root that project entries are written to.
pub const PROJECT_LESSONS_DIR: &str = "09-lessons-learned";
/// Directory under the user-level index dir that global entries are written to.
pub const GLOBAL_LESSONS_DIR: &str = "lessons";
const SLUG_MAX_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolError {
    pub error: String,
    pub remediation: String,
}

impl From<ServiceError> for ToolError {
    fn from(e: ServiceError) -> Self {
        ToolError { remediation: e.remediation(), error: e.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolResponse<T> {
    Ok(T),
    Err(ToolError),
}

impl<T> From<Result<T, ServiceError>> for ToolResponse<T> {
    fn from(r: Result<T, ServiceError>) -> Self {
        match r {
            Ok(v) => ToolResponse::Ok(v),
            Err(e) => ToolResponse::Err(e.into()),
        }
    }
}

impl<T> ToolResponse<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            ToolResponse::Ok(v) => Some(v),
            ToolResponse::Err(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ToolError> {
        match self {
            ToolResponse::Ok(_) => None,
            ToolResponse::Err(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmptySearch {
    pub result_count: usize,
    pub message: String,
    pub fallback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchPayload {
    Results(Vec<SearchResult>),
    Empty(EmptySearch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryScope {
    Project,
    Global,
}

impl FromStr for EntryScope {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(EntryScope::Project),
            "global" => Ok(EntryScope::Global),
            other => Err(ServiceError::InvalidArgument(format!("scope must be \"project\" or \"global\", got {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddEntryRequest {
    pub title: String,
    pub category: String,
    pub scope: EntryScope,
    /// Markdown body.
    pub content: String,
    /// Extra terms recorded in the front matter, which is indexed with the body.
    pub keywords: Vec<String>,
    pub source_type: String,
    pub project_root: Option<PathBuf>,
}

impl AddEntryRequest {
    pub fn new(title: impl Into<String>, category: impl Into<String>, scope: EntryScope, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            scope,
            content: content.into(),
            keywords: Vec::new(),
            source_type: source_type::LESSON.to_string(),
            project_root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddEntryResult {
    pub id: String,
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub status: &'static str,
    pub db_path: String,
    pub total_chunks: i64,
    pub by_source_type: BTreeMap<String, i64>,
    pub db_size_kb: u64,
    pub vector_available: bool,
    pub last_commit: Option<String>,
    pub dirty: bool,
    pub embed_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoIndexStatus {
    pub status: &'static str,
    pub db_path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusPayload {
    Ok(IndexStatus),
    NoIndex(NoIndexStatus),
}

/// Lowercase ASCII slug: runs of anything else become one `-`, at most 40 chars.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.chars().take(SLUG_MAX_CHARS).collect::<String>().trim_matches('-').to_string()
}

/// Number of an entry file named `E###-...md` or `E###.md`.
fn entry_number(file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix('E')?;
    if !file_name.ends_with(".md") || rest.len() < 4 {
        return None;
    }
    let digits = rest.get(..3)?;
    let tail = &rest[3..];
    if !digits.bytes().all(|b| b.is_ascii_digit()) || !(tail.starts_with('-') || tail.starts_with('.')) {
        return None;
    }
    digits.parse().ok()
}

/// Next free `E###` id in `dir`.
pub fn next_entry_id(dir: &Path) -> std::io::Result<String> {
    let mut max = 0;
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            if let Some(n) = name.to_str().and_then(entry_number) {
                max = max.max(n);
            }
        }
    }
    Ok(format!("E{:03}", max + 1))
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ").trim().to_string()
}

/// Entry point shared by tool hosts. Holds the production collaborators and
/// hands out a [`HybridService`] per project.
pub struct ToolHost {
    template: ServiceConfig,
    embedder: Arc<dyn DualEmbedder>,
    tokenizer: Arc<dyn KeywordTokenizer>,
    vcs: Arc<dyn RevisionSource>,
    refresh_guard: Arc<AtomicBool>,
}

impl ToolHost {
    /// Environment defaults, process embedder, default tokenizer, git CLI.
    pub fn from_env() -> Result<Self, ServiceError> {
        let template = ServiceConfig::from_env(None);
        let embedder = ProcessEmbedder::new(template.embedder.clone())?;
        Ok(Self::new(template, Arc::new(embedder), default_tokenizer()?, Arc::new(GitCli::default())))
    }

    /// `template.project_root` is the default project.
    pub fn new(
        template: ServiceConfig,
        embedder: Arc<dyn DualEmbedder>,
        tokenizer: Arc<dyn KeywordTokenizer>,
        vcs: Arc<dyn RevisionSource>,
    ) -> Self {
        Self { template, embedder, tokenizer, vcs, refresh_guard: Arc::new(AtomicBool::new(false)) }
    }

    pub fn default_project(&self) -> Option<&Path> { self.template.project_root.as_deref() }

    /// Service for `project_root`, falling back to the default project.
    pub fn service_for(&self, project_root: Option<PathBuf>) -> HybridService {
        let root = project_root.or_else(|| self.template.project_root.clone());
        self.service_at(root)
    }

    fn service_at(&self, root: Option<PathBuf>) -> HybridService {
        HybridService::with_components(
            self.template.with_project_root(root),
            self.embedder.clone(),
            self.tokenizer.clone(),
            self.vcs.clone(),
        )
        .with_refresh_guard(self.refresh_guard.clone())
    }

    pub fn search(&self, request: &SearchRequest, project_root: Option<PathBuf>) -> ToolResponse<SearchPayload> {
        let svc = self.service_for(project_root);
        match svc.refresh_if_dirty() {
            RefreshOutcome::Refreshed(report) => tracing::info!(?report, "refreshed dirty index"),
            RefreshOutcome::Failed(e) => tracing::warn!(error = %e, "dirty index refresh failed; serving stale index"),
            _ => {}
        }
        let result = svc.search(request).map(|results| {
            if results.is_empty() {
                SearchPayload::Empty(EmptySearch {
                    result_count: 0,
                    message: "No results found in the index.".into(),
                    fallback: format!("Search the document tree directly (e.g. grep or desktop search) for: \"{}\"", request.query),
                })
            } else {
                SearchPayload::Results(results)
            }
        });
        result.into()
    }

    pub fn add_entry(&self, request: &AddEntryRequest) -> ToolResponse<AddEntryResult> {
        self.add_entry_inner(request).into()
    }

    fn add_entry_inner(&self, request: &AddEntryRequest) -> Result<AddEntryResult, ServiceError> {
        let (svc, dir) = match request.scope {
            EntryScope::Project => {
                let root = request
                    .project_root
                    .clone()
                    .or_else(|| self.template.project_root.clone())
                    .ok_or(ServiceError::ProjectRootRequired)?;
                let svc = self.service_at(Some(root));
                let dir = svc.config().doc_dir().join(PROJECT_LESSONS_DIR);
                (svc, dir)
            }
            EntryScope::Global => {
                let svc = self.service_at(None);
                let dir = svc.config().index_dir().join(GLOBAL_LESSONS_DIR);
                (svc, dir)
            }
        };
        fs::create_dir_all(&dir)?;

        let id = next_entry_id(&dir)?;
        let slug = slugify(&request.title);
        let file_name = if slug.is_empty() { format!("{id}.md") } else { format!("{id}-{slug}.md") };
        let path = dir.join(file_name);

        let title = single_line(&request.title);
        let category = single_line(&request.category);
        let keywords = single_line(&request.keywords.join(" "));
        let created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let fields = [
            ("id", id.as_str()),
            ("title", title.as_str()),
            ("category", category.as_str()),
            ("source_type", request.source_type.as_str()),
            ("keywords", keywords.as_str()),
            ("created", created.as_str()),
        ];
        fs::write(&path, md_chunker::frontmatter::render_with_front_matter(&fields, &request.content))?;

        let report = svc.with_repo(|repo| svc.index_file(repo, &path, &request.source_type))?;
        tracing::info!(%id, path = %path.display(), chunks = report.chunks_written, "added entry");
        Ok(AddEntryResult { message: format!("Saved and indexed as {id}"), id, path: path.display().to_string() })
    }

    pub fn reindex(&self, project_root: Option<PathBuf>, source_type: Option<&str>, incremental: bool) -> ToolResponse<ReindexReport> {
        let svc = self.service_for(project_root);
        let request = if incremental { ReindexRequest::Incremental } else { ReindexRequest::Full };
        svc.check_ready_for_build()
            .and_then(|()| svc.reindex(request, source_type.unwrap_or(source_type::DOC)))
            .into()
    }

    pub fn status(&self, project_root: Option<PathBuf>) -> ToolResponse<StatusPayload> {
        status_of(&self.service_for(project_root)).into()
    }
}

fn status_of(svc: &HybridService) -> Result<StatusPayload, ServiceError> {
    let cfg = svc.config();
    let db_path = cfg.db_path();
    if !svc.index_exists() {
        let target = cfg.project_root.as_ref().map(|r| r.display().to_string()).unwrap_or_else(|| "<project-root>".into());
        return Ok(StatusPayload::NoIndex(NoIndexStatus {
            status: "no_index",
            db_path: db_path.display().to_string(),
            message: format!("No index found. Run: rag build --project {target}"),
        }));
    }
    let repo = svc.open_existing_repo()?;
    let project = ProjectConfig::load(&cfg.config_path());
    Ok(StatusPayload::Ok(IndexStatus {
        status: "ok",
        db_path: db_path.display().to_string(),
        total_chunks: repo.count_chunks()?,
        by_source_type: repo.count_by_source_type()?,
        db_size_kb: fs::metadata(&db_path)?.len() / 1024,
        vector_available: repo.vector_available(),
        last_commit: project.last_commit,
        dirty: is_dirty(cfg),
        embed_model: project.embed_model,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_ascii_and_capped() {
        assert_eq!(slugify("Swift Concurrency: actor hops!"), "swift-concurrency-actor-hops");
        assert_eq!(slugify("  --Hello__World--  "), "hello-world");
        assert_eq!(slugify("日本語"), "");
        let long = slugify(&"abc ".repeat(30));
        assert!(long.len() <= 40);
        assert!(!long.ends_with('-'));
    }

    #[test]
    fn entry_numbers_follow_the_naming_scheme() {
        assert_eq!(entry_number("E007-title.md"), Some(7));
        assert_eq!(entry_number("E120.md"), Some(120));
        assert_eq!(entry_number("E12-title.md"), None);
        assert_eq!(entry_number("E0123-title.md"), None);
        assert_eq!(entry_number("notes.md"), None);
        assert_eq!(entry_number("E001-title.txt"), None);
    }

    #[test]
    fn next_id_skips_past_the_highest() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_entry_id(dir.path()).unwrap(), "E001");
        fs::write(dir.path().join("E002-a.md"), "").unwrap();
        fs::write(dir.path().join("E010.md"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();
        assert_eq!(next_entry_id(dir.path()).unwrap(), "E011");
    }

    #[test]
    fn scope_parsing_is_strict() {
        assert_eq!("project".parse::<EntryScope>().unwrap(), EntryScope::Project);
        assert_eq!("global".parse::<EntryScope>().unwrap(), EntryScope::Global);
        assert!(matches!("Global".parse::<EntryScope>(), Err(ServiceError::InvalidArgument(_))));
    }

    #[test]
    fn errors_carry_remediation() {
        let resp: ToolResponse<()> = Err(ServiceError::ProjectRootRequired).into();
        let err = resp.error().unwrap();
        assert_eq!(err.error, "project_root is required");
        assert!(err.remediation.contains("RAG_DEFAULT_PROJECT"));
    }

    #[test]
    fn every_error_kind_serializes_a_remediation() {
        let errors = [
            ServiceError::Repo("database is locked".into()),
            ServiceError::EmbedderMissing("/opt/embed".into()),
            ServiceError::Embed("exit status 1".into()),
            ServiceError::VectorUnavailable,
            ServiceError::ProjectRootRequired,
            ServiceError::IndexMissing("/work/app/.rag/index.db".into()),
            ServiceError::Config("/tmp is not a git repository root".into()),
            ServiceError::Io("permission denied".into()),
            ServiceError::InvalidArgument("scope must be project or global".into()),
        ];
        for e in errors {
            let json = serde_json::to_value(ToolError::from(e)).unwrap();
            let fix = json["remediation"].as_str().unwrap();
            assert!(!fix.is_empty(), "{json}");
        }
    }
}
