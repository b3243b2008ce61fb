pub mod markdown_segmenter;
pub mod reader_md;
pub mod frontmatter;

use std::io;
use std::path::Path;

use chunk_model::ChunkRecord;

pub use markdown_segmenter::{split_by_heading, Segment, SegmentParams, DEFAULT_BUDGET_CHARS};

/// Chunks of one Markdown file plus the source type they were labeled with.
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    pub source_type: String,
    pub chunks: Vec<ChunkRecord>,
}

/// Chunk text already read from `source_path` (a root-relative path).
///
/// `source_type` in the front matter, when present, wins over `default_source_type`.
/// Keywords and timestamps are left empty for the caller to fill.
pub fn chunk_markdown_text(
    text: &str,
    source_path: &str,
    default_section: &str,
    default_source_type: &str,
    params: &SegmentParams,
) -> ChunkOutput {
    let source_type = frontmatter::parse_front_matter(text)
        .and_then(|fm| fm.source_type().map(str::to_string))
        .unwrap_or_else(|| default_source_type.to_string());

    let chunks = split_by_heading(text, default_section, params)
        .into_iter()
        .map(|seg| {
            ChunkRecord::new(
                source_type.clone(),
                source_path,
                seg.section,
                seg.content,
                seg.line_start,
                seg.line_end,
            )
        })
        .collect();

    ChunkOutput { source_type, chunks }
}

/// Read and chunk a file on disk, recording it under `source_path`.
pub fn chunk_markdown_file(
    path: &Path,
    source_path: &str,
    default_source_type: &str,
    params: &SegmentParams,
) -> io::Result<ChunkOutput> {
    let text = reader_md::read_markdown(path)?;
    let section = reader_md::default_section_for(path);
    Ok(chunk_markdown_text(&text, source_path, &section, default_source_type, params))
}
