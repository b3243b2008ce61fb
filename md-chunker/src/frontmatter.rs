//! Flat `key: value` front matter delimited by `---` lines.

use std::collections::BTreeMap;

const FENCE: &str = "---";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub fields: BTreeMap<String, String>,
}

impl FrontMatter {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn source_type(&self) -> Option<&str> { self.get("source_type") }
}

/// Parse a leading front matter block. Returns `None` when the text does not
/// open with a fence or the block is never closed.
pub fn parse_front_matter(text: &str) -> Option<FrontMatter> {
    let mut lines = text.lines();
    if lines.next()?.trim_end() != FENCE {
        return None;
    }
    let mut fields = BTreeMap::new();
    for line in lines {
        if line.trim_end() == FENCE {
            return Some(FrontMatter { fields });
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                fields.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    None
}

/// Render an entry: front matter block in the given key order, a blank line, then the body.
pub fn render_with_front_matter(fields: &[(&str, &str)], body: &str) -> String {
    let mut out = String::from(FENCE);
    out.push('\n');
    for (key, value) in fields {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(FENCE);
    out.push_str("\n\n");
    out.push_str(body.trim_end());
    out.push('\n');
    out
}
