use std::fs;
use std::io;
use std::path::Path;

/// Read a Markdown file as text. Invalid UTF-8 sequences are replaced
/// and carriage returns dropped.
pub fn read_markdown<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(normalize_newlines(&String::from_utf8_lossy(&bytes)))
}

pub fn normalize_newlines(text: &str) -> String {
    text.replace('\r', "")
}

/// Section name for text that precedes the first heading: the file stem.
pub fn default_section_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
