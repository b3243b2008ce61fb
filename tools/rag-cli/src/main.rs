//! `rag`: command-line front end for the local hybrid Markdown index.
//!
//! # Usage
//!
//! ```bash
//! # Build (or rebuild) the index of <project>/docs/**/*.md
//! rag --project ~/work/app build
//! rag --project ~/work/app build --incremental
//!
//! # Inspect the index
//! rag status
//! rag status --json
//!
//! # Mark the index stale after every commit
//! rag install-hook
//!
//! # Query
//! rag search "actor isolation" -t lesson -t error -k 3
//!
//! # Record a lesson and index it right away
//! rag add-entry --title "Actor hop" --category swift --content-file note.md -w mainactor
//! ```
//!
//! `--project` falls back to `RAG_DEFAULT_PROJECT`, then to the current directory.

mod output;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hybrid_service::config::default_project_from_env;
use hybrid_service::hooks::install_post_commit_hook;
use hybrid_service::search::DEFAULT_TOP_K;
use hybrid_service::tools::{AddEntryRequest, EntryScope, ToolError, ToolHost, ToolResponse};
use hybrid_service::SearchRequest;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Local hybrid (BM25 + embedding) retrieval over Markdown docs.
#[derive(Parser)]
#[command(name = "rag", version, about)]
struct Cli {
    /// Project root (default: RAG_DEFAULT_PROJECT, then the current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Output JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index docs/**/*.md under the project root
    Build {
        /// Only reindex documents changed since the last indexed commit
        #[arg(long)]
        incremental: bool,
        /// Source type recorded for documents without one in their front matter
        #[arg(long, default_value = "doc")]
        source_type: String,
    },
    /// Show index statistics
    Status,
    /// Install a git post-commit hook that marks the index stale
    InstallHook,
    /// Hybrid search over the index
    Search {
        query: String,
        /// Restrict to a source type (repeatable)
        #[arg(short = 't', long = "source-type")]
        source_types: Vec<String>,
        /// Number of results
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Write a lesson/error entry and index it
    AddEntry {
        #[arg(long)]
        title: String,
        #[arg(long)]
        category: String,
        /// "project" or "global"
        #[arg(long, default_value = "project")]
        scope: EntryScope,
        /// Markdown body (default: read from stdin)
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,
        #[arg(long)]
        content_file: Option<PathBuf>,
        /// Extra keyword (repeatable)
        #[arg(short = 'w', long = "keyword")]
        keywords: Vec<String>,
        #[arg(long, default_value = "lesson")]
        source_type: String,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `--project`, else `RAG_DEFAULT_PROJECT`, else the working directory.
fn resolve_project(arg: Option<PathBuf>, env: Option<PathBuf>, cwd: Option<&Path>) -> Option<PathBuf> {
    arg.or(env).or_else(|| cwd.map(Path::to_path_buf))
}

fn run(cli: Cli) -> Result<ExitCode> {
    let host = ToolHost::from_env().context("initializing index services")?;
    let json = cli.json;
    let cwd = std::env::current_dir().ok();
    let project = resolve_project(cli.project, default_project_from_env(), cwd.as_deref());

    match cli.command {
        Command::Build { incremental, source_type } => {
            emit(host.reindex(project, Some(&source_type), incremental), json, output::report_human)
        }
        Command::Status => emit(host.status(project), json, output::status_human),
        Command::InstallHook => {
            let svc = host.service_for(project);
            let resp: ToolResponse<_> = install_post_commit_hook(svc.config()).into();
            if let ToolResponse::Ok(install) = &resp {
                if install.replaced {
                    tracing::warn!(hook = %install.path.display(), "replaced existing post-commit hook");
                }
            }
            emit(resp, json, |i| format!("installed {}", i.path.display()))
        }
        Command::Search { query, source_types, top_k } => {
            let request = SearchRequest::new(query).with_source_types(source_types).with_top_k(top_k);
            emit(host.search(&request, project), json, output::search_human)
        }
        Command::AddEntry { title, category, scope, content, content_file, keywords, source_type } => {
            let body = match (content, content_file) {
                (Some(text), _) => text,
                (None, Some(path)) => {
                    std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?
                }
                (None, None) => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf).context("reading entry body from stdin")?;
                    buf
                }
            };
            let mut request = AddEntryRequest::new(title, category, scope, body);
            request.keywords = keywords;
            request.source_type = source_type;
            request.project_root = project;
            emit(host.add_entry(&request), json, |r| format!("{} ({})", r.message, r.path))
        }
    }
}

/// Print a tool response. Errors go to stderr with their remediation and exit 1.
fn emit<T: Serialize>(resp: ToolResponse<T>, json: bool, human: impl FnOnce(&T) -> String) -> Result<ExitCode> {
    match resp {
        ToolResponse::Ok(value) => {
            if json {
                output::print_json(&value)?;
            } else {
                println!("{}", human(&value));
            }
            Ok(ExitCode::SUCCESS)
        }
        ToolResponse::Err(err) => {
            if json {
                output::print_json(&err)?;
            }
            print_tool_error(&err);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_tool_error(err: &ToolError) {
    eprintln!("error: {}", err.error);
    eprintln!("  {}", err.remediation);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_falls_back_from_flag_to_env_to_cwd() {
        let flag = PathBuf::from("/work/flag");
        let env = PathBuf::from("/work/env");
        let cwd = Path::new("/work/cwd");

        assert_eq!(resolve_project(Some(flag.clone()), Some(env.clone()), Some(cwd)), Some(flag));
        assert_eq!(resolve_project(None, Some(env.clone()), Some(cwd)), Some(env));
        assert_eq!(resolve_project(None, None, Some(cwd)), Some(cwd.to_path_buf()));
        assert_eq!(resolve_project(None, None, None), None);
    }
}
