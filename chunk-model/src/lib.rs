//! Shared models used across crates

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Well-known source type labels. Any other label is accepted as-is.
pub mod source_type {
    pub const DOC: &str = "doc";
    pub const LESSON: &str = "lesson";
    pub const ERROR: &str = "error";
    pub const API_REF: &str = "api-ref";
}

/// Identity of a chunk within a store.
///
/// Derived from `(source path, section title, starting line)` only, so
/// re-indexing an unchanged logical chunk lands on the same id even when
/// its body was edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub String);

impl ChunkId {
    /// Number of hex characters kept from the digest.
    pub const HEX_LEN: usize = 16;

    pub fn derive(source_path: &str, section: &str, line_start: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source_path.as_bytes());
        hasher.update(b"::");
        hasher.update(section.as_bytes());
        hasher.update(b"::");
        hasher.update(line_start.to_string().as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..Self::HEX_LEN].to_string())
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// A single indexed chunk of a Markdown source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: ChunkId,
    /// Free-form category label ("doc", "lesson", ...).
    pub source_type: String,
    /// Path relative to the project root, `/`-separated.
    pub source_path: String,
    pub section: String,
    pub content: String,
    /// 1-based, inclusive.
    pub line_start: u32,
    /// 1-based, inclusive.
    pub line_end: u32,
    /// Pre-tokenized text fed to the lexical index.
    pub keywords: String,
    /// RFC 3339 UTC timestamp of the last write.
    pub updated_at: String,
}

impl ChunkRecord {
    /// Build a record whose id is derived from its location.
    pub fn new(
        source_type: impl Into<String>,
        source_path: impl Into<String>,
        section: impl Into<String>,
        content: impl Into<String>,
        line_start: u32,
        line_end: u32,
    ) -> Self {
        let source_path = source_path.into();
        let section = section.into();
        let chunk_id = ChunkId::derive(&source_path, &section, line_start);
        Self {
            chunk_id,
            source_type: source_type.into(),
            source_path,
            section,
            content: content.into(),
            line_start,
            line_end,
            keywords: String::new(),
            updated_at: String::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = keywords.into();
        self
    }

    pub fn with_updated_at(mut self, ts: impl Into<String>) -> Self {
        self.updated_at = ts.into();
        self
    }

    pub fn line_range(&self) -> [u32; 2] { [self.line_start, self.line_end] }

    /// Cheap structural checks run before a record is written.
    pub fn validate_soft(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err(format!("chunk {} has empty content", self.chunk_id));
        }
        if self.line_start == 0 || self.line_end < self.line_start {
            return Err(format!(
                "chunk {} has invalid line range {}..{}",
                self.chunk_id, self.line_start, self.line_end
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_ignores_body() {
        let a = ChunkRecord::new("doc", "docs/a.md", "Intro", "first body", 3, 5);
        let b = ChunkRecord::new("doc", "docs/a.md", "Intro", "edited body", 3, 9);
        assert_eq!(a.chunk_id, b.chunk_id);
        assert_eq!(a.chunk_id.as_str().len(), ChunkId::HEX_LEN);
    }

    #[test]
    fn chunk_id_changes_with_location() {
        let base = ChunkId::derive("docs/a.md", "Intro", 3);
        assert_ne!(base, ChunkId::derive("docs/b.md", "Intro", 3));
        assert_ne!(base, ChunkId::derive("docs/a.md", "Setup", 3));
        assert_ne!(base, ChunkId::derive("docs/a.md", "Intro", 4));
    }

    #[test]
    fn chunk_id_serializes_as_plain_string() {
        let id = ChunkId::derive("docs/a.md", "Intro", 1);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_str()));
    }

    #[test]
    fn validate_soft_rejects_bad_ranges() {
        let mut rec = ChunkRecord::new("doc", "docs/a.md", "Intro", "body", 2, 2);
        assert!(rec.validate_soft().is_ok());
        rec.line_end = 1;
        assert!(rec.validate_soft().is_err());
        rec.line_end = 2;
        rec.content = "  \n".into();
        assert!(rec.validate_soft().is_err());
    }
}
