//! Human-readable rendering of tool payloads.

use std::fmt::Write as _;

use anyhow::Result;
use hybrid_service::tools::{SearchPayload, StatusPayload};
use hybrid_service::{ReindexReport, SearchResult};
use serde::Serialize;

const SNIPPET_CHARS: usize = 200;
const COMMIT_CHARS: usize = 12;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let mut out: String = flat.chars().take(max).collect();
        out.push_str("...");
        out
    }
}

fn result_block(out: &mut String, rank: usize, r: &SearchResult) {
    let _ = writeln!(
        out,
        "{rank}. [{}] {}:{}-{}  score={:.6}",
        r.source_type, r.source_path, r.line_range[0], r.line_range[1], r.score
    );
    if !r.section.is_empty() {
        let _ = writeln!(out, "   {}", r.section);
    }
    let _ = writeln!(out, "   {}", truncate(&r.content, SNIPPET_CHARS));
}

pub fn search_human(payload: &SearchPayload) -> String {
    match payload {
        SearchPayload::Empty(empty) => format!("{}\n{}", empty.message, empty.fallback),
        SearchPayload::Results(results) => {
            let mut out = String::new();
            for (i, r) in results.iter().enumerate() {
                result_block(&mut out, i + 1, r);
            }
            out.trim_end().to_string()
        }
    }
}

pub fn status_human(payload: &StatusPayload) -> String {
    match payload {
        StatusPayload::NoIndex(s) => format!("{}\n{}", s.db_path, s.message),
        StatusPayload::Ok(s) => {
            let mut out = String::new();
            let _ = writeln!(out, "index:        {} ({} KB)", s.db_path, s.db_size_kb);
            let _ = writeln!(out, "chunks:       {}", s.total_chunks);
            for (kind, n) in &s.by_source_type {
                let _ = writeln!(out, "  {kind:<12}{n}");
            }
            let _ = writeln!(out, "vectors:      {}", if s.vector_available { "available" } else { "unavailable" });
            let commit = s
                .last_commit
                .as_deref()
                .map(|c| c.chars().take(COMMIT_CHARS).collect::<String>())
                .unwrap_or_else(|| "-".into());
            let _ = writeln!(out, "last commit:  {commit}");
            let _ = writeln!(out, "embed model:  {}", s.embed_model.as_deref().unwrap_or("-"));
            let _ = write!(out, "dirty:        {}", if s.dirty { "yes" } else { "no" });
            out
        }
    }
}

pub fn report_human(r: &ReindexReport) -> String {
    let mode = serde_json::to_value(r.mode).ok().and_then(|v| v.as_str().map(str::to_owned)).unwrap_or_default();
    let mut out = format!("{mode}: {} files scanned, {} chunks written", r.files_scanned, r.chunks_written);
    if let Some(deleted) = r.deleted_files {
        let _ = write!(out, ", {deleted} files removed");
    }
    out
}
