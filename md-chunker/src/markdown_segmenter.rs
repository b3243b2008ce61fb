/// Largest chunk body, in characters, before a section is split at paragraphs.
pub const DEFAULT_BUDGET_CHARS: usize = 800;

/// Joiner placed between packed paragraphs.
const PARAGRAPH_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy)]
pub struct SegmentParams {
    /// Counted in Unicode scalar values, not bytes.
    pub budget_chars: usize,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self { budget_chars: DEFAULT_BUDGET_CHARS }
    }
}

/// One chunk candidate cut from a Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub section: String,
    pub content: String,
    /// 1-based, inclusive.
    pub line_start: u32,
    /// 1-based, inclusive.
    pub line_end: u32,
}

/// Title of a level 1-3 ATX heading, `None` for any other line.
pub fn heading_title(line: &str) -> Option<&str> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// Split Markdown text into sections at level 1-3 headings, then split any
/// section over budget at blank-line paragraph boundaries.
///
/// Lines before the first heading belong to `default_section`. Heading lines
/// are not part of the body; a heading section's `line_start` is the heading's
/// own line. Sections that are empty after trimming produce nothing.
///
/// Sub-chunks of an oversized section carry approximate line ranges: the
/// first starts at the section start, each spans the newlines of its packed
/// text, and the next starts two lines after the previous end.
pub fn split_by_heading(text: &str, default_section: &str, params: &SegmentParams) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut section = default_section.to_string();
    let mut start = 1u32;
    let mut body: Vec<(u32, &str)> = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx as u32 + 1;
        if let Some(title) = heading_title(line) {
            flush_section(&mut out, &section, start, &body, params);
            section = title.to_string();
            start = lineno;
            body.clear();
        } else {
            body.push((lineno, line));
        }
    }
    flush_section(&mut out, &section, start, &body, params);
    out
}

fn flush_section(out: &mut Vec<Segment>, section: &str, start: u32, body: &[(u32, &str)], params: &SegmentParams) {
    let joined = body.iter().map(|(_, l)| *l).collect::<Vec<_>>().join("\n");
    let content = joined.trim();
    if content.is_empty() {
        return;
    }

    if content.chars().count() <= params.budget_chars {
        let line_end = body
            .iter()
            .rev()
            .find(|(_, l)| !l.trim().is_empty())
            .map(|(n, _)| *n)
            .unwrap_or(start);
        out.push(Segment {
            section: section.to_string(),
            content: content.to_string(),
            line_start: start,
            line_end: line_end.max(start),
        });
        return;
    }

    let mut buf: Vec<&str> = Vec::new();
    let mut buf_chars = 0usize;
    let mut sub_start = start;
    for para in split_paragraphs(content) {
        let para_chars = para.chars().count();
        let sep_chars = if buf.is_empty() { 0 } else { PARAGRAPH_SEPARATOR.len() };
        if !buf.is_empty() && buf_chars + sep_chars + para_chars > params.budget_chars {
            sub_start = push_packed(out, section, sub_start, &buf);
            buf.clear();
            buf.push(para);
            buf_chars = para_chars;
        } else {
            buf.push(para);
            buf_chars += sep_chars + para_chars;
        }
    }
    if !buf.is_empty() {
        push_packed(out, section, sub_start, &buf);
    }
}

/// Emit one packed sub-chunk and return the approximate start of the next.
fn push_packed(out: &mut Vec<Segment>, section: &str, line_start: u32, paras: &[&str]) -> u32 {
    let text = paras.join(PARAGRAPH_SEPARATOR);
    let newlines = text.bytes().filter(|b| *b == b'\n').count() as u32;
    let line_end = line_start + newlines;
    out.push(Segment { section: section.to_string(), content: text, line_start, line_end });
    line_end + 2
}

/// Split on runs of two or more newlines, keeping single newlines inside a paragraph.
fn split_paragraphs(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < len {
        if bytes[i] == b'\n' {
            let mut j = i;
            while j < len && bytes[j] == b'\n' { j += 1; }
            if j - i >= 2 {
                if i > start { out.push(&text[start..i]); }
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    if start < len {
        out.push(&text[start..]);
    }
    out
}
