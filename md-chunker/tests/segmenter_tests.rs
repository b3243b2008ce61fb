use md_chunker::frontmatter::parse_front_matter;
use md_chunker::reader_md::read_markdown;
use md_chunker::{chunk_markdown_file, chunk_markdown_text, split_by_heading, SegmentParams};

fn params() -> SegmentParams {
    SegmentParams::default()
}

#[test]
fn two_level2_sections_start_at_their_headings() {
    let text = "## Install\nRun the installer.\n\n## Usage\nCall the tool.\nWith flags.\n";
    let segs = split_by_heading(text, "guide", &params());

    assert_eq!(segs.len(), 2);
    assert_eq!(segs[0].section, "Install");
    assert_eq!(segs[0].content, "Run the installer.");
    assert_eq!((segs[0].line_start, segs[0].line_end), (1, 2));
    assert_eq!(segs[1].section, "Usage");
    assert_eq!(segs[1].content, "Call the tool.\nWith flags.");
    assert_eq!((segs[1].line_start, segs[1].line_end), (4, 6));
}

#[test]
fn preamble_uses_default_section() {
    let text = "Intro line.\n\n# First\nbody\n";
    let segs = split_by_heading(text, "notes", &params());

    assert_eq!(segs.len(), 2);
    assert_eq!(segs[0].section, "notes");
    assert_eq!((segs[0].line_start, segs[0].line_end), (1, 1));
    assert_eq!(segs[1].section, "First");
}

#[test]
fn bare_hash_line_starts_an_untitled_section() {
    let text = "Intro.\n#\nafter the rule\n#tag stays body\n";
    let segs = split_by_heading(text, "notes", &params());

    assert_eq!(segs.len(), 2);
    assert_eq!(segs[0].content, "Intro.");
    assert_eq!(segs[1].section, "");
    assert_eq!(segs[1].content, "after the rule\n#tag stays body");
    assert_eq!((segs[1].line_start, segs[1].line_end), (2, 4));
}

#[test]
fn deep_headings_do_not_split_and_empty_sections_vanish() {
    let text = "# Top\n\n#### Detail\nkept together\n# Empty\n   \n# Last\nend";
    let segs = split_by_heading(text, "doc", &params());

    let sections: Vec<&str> = segs.iter().map(|s| s.section.as_str()).collect();
    assert_eq!(sections, vec!["Top", "Last"]);
    assert!(segs[0].content.starts_with("#### Detail"));
}

#[test]
fn oversized_sections_respect_budget_or_are_single_paragraphs() {
    let para = "word ".repeat(30).trim().to_string(); // 149 chars
    let body: Vec<String> = (0..12).map(|_| para.clone()).collect();
    let huge = "x".repeat(1200);
    let text = format!("# Big\n{}\n\n{}\n", body.join("\n\n"), huge);

    let budget = SegmentParams { budget_chars: 400 };
    let segs = split_by_heading(&text, "doc", &budget);

    assert!(segs.len() > 3);
    for seg in &segs {
        assert_eq!(seg.section, "Big");
        let single_paragraph = !seg.content.contains("\n\n");
        assert!(
            seg.content.chars().count() <= budget.budget_chars || single_paragraph,
            "segment over budget with multiple paragraphs: {} chars",
            seg.content.chars().count()
        );
        assert!(seg.line_end >= seg.line_start);
    }
    assert_eq!(segs.last().map(|s| s.content.as_str()), Some(huge.as_str()));
    assert_eq!(segs[0].line_start, 1);
}

#[test]
fn budget_counts_characters_not_bytes() {
    let cjk = "漢".repeat(700);
    let text = format!("# CJK\n{cjk}");
    let segs = split_by_heading(&text, "doc", &params());
    assert_eq!(segs.len(), 1);
}

#[test]
fn segmentation_is_deterministic() {
    let text = "# A\none\n\ntwo\n## B\nthree\n";
    assert_eq!(split_by_heading(text, "d", &params()), split_by_heading(text, "d", &params()));
}

#[test]
fn front_matter_source_type_overrides_default() {
    let text = "---\nid: E001\nsource_type: error\n---\n\nSomething broke.\n";
    let out = chunk_markdown_text(text, "docs/09-lessons-learned/E001-x.md", "E001-x", "doc", &params());

    assert_eq!(out.source_type, "error");
    assert_eq!(out.chunks.len(), 1);
    assert_eq!(out.chunks[0].source_type, "error");
    assert!(parse_front_matter(text).is_some());
}

#[test]
fn reading_normalizes_crlf_and_invalid_utf8() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("setup.md");
    let mut bytes = b"# Setup\r\nline one\r\nbad \xff byte\r\n".to_vec();
    bytes.extend_from_slice("末尾\r\n".as_bytes());
    std::fs::write(&path, bytes).expect("write fixture");

    let text = read_markdown(&path).expect("read fixture");
    assert!(!text.contains('\r'));
    assert!(text.contains('\u{FFFD}'));

    let out = chunk_markdown_file(&path, "docs/setup.md", "doc", &params()).expect("chunk fixture");
    assert_eq!(out.chunks.len(), 1);
    let rec = &out.chunks[0];
    assert_eq!(rec.section, "Setup");
    assert_eq!(rec.source_path, "docs/setup.md");
    assert_eq!(rec.line_range(), [1, 4]);
}
