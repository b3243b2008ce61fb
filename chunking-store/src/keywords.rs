//! Keyword extraction for the lexical index.
//!
//! Chunks and queries go through the same tokenizer; the stored keyword
//! string is the tokens joined by single spaces.

/// Splits text into the tokens stored in (and matched against) the FTS index.
pub trait KeywordTokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;

    fn keywords(&self, text: &str) -> String {
        self.tokenize(text).join(" ")
    }
}

/// Dictionary-free tokenizer. Latin letters and digits form lowercase word
/// tokens; runs of CJK characters become overlapping bigrams (a lone CJK
/// character stays a unigram). Everything else separates tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnicodeKeywordTokenizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Word,
    Cjk,
    Other,
}

fn classify(c: char) -> CharClass {
    if is_cjk(c) {
        CharClass::Cjk
    } else if c.is_alphanumeric() || c == '_' {
        CharClass::Word
    } else {
        CharClass::Other
    }
}

pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF     // hiragana, katakana
        | 0x3400..=0x4DBF   // CJK extension A
        | 0x4E00..=0x9FFF   // CJK unified ideographs
        | 0xAC00..=0xD7AF   // hangul syllables
        | 0xF900..=0xFAFF   // compatibility ideographs
        | 0x20000..=0x2A6DF // extension B
    )
}

impl KeywordTokenizer for UnicodeKeywordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut run: Vec<char> = Vec::new();
        let mut run_class = CharClass::Other;

        for c in text.chars().chain(std::iter::once(' ')) {
            let class = classify(c);
            if class != run_class && !run.is_empty() {
                flush_run(&mut out, &run, run_class);
                run.clear();
            }
            run_class = class;
            if class != CharClass::Other {
                run.push(c);
            }
        }
        out
    }
}

fn flush_run(out: &mut Vec<String>, run: &[char], class: CharClass) {
    match class {
        CharClass::Word => out.push(run.iter().collect::<String>().to_lowercase()),
        CharClass::Cjk if run.len() == 1 => out.push(run[0].to_string()),
        CharClass::Cjk => {
            for pair in run.windows(2) {
                out.push(pair.iter().collect());
            }
        }
        CharClass::Other => {}
    }
}

#[cfg(feature = "lindera")]
pub use lindera_impl::LinderaKeywordTokenizer;

#[cfg(feature = "lindera")]
mod lindera_impl {
    use std::sync::Mutex;

    use lindera::dictionary::load_dictionary;
    use lindera::mode::Mode;
    use lindera::segmenter::Segmenter;
    use lindera_tantivy::tokenizer::LinderaTokenizer;
    use tantivy::tokenizer::{TokenStream, Tokenizer};

    use super::KeywordTokenizer;
    use crate::StoreError;

    /// Dictionary segmentation through Lindera (embedded IPADIC).
    pub struct LinderaKeywordTokenizer {
        tokenizer: Mutex<LinderaTokenizer>,
    }

    impl LinderaKeywordTokenizer {
        pub fn new() -> Result<Self, StoreError> {
            let dictionary = load_dictionary("embedded://ipadic")
                .map_err(|e| StoreError::Backend(format!("load lindera dictionary: {e}")))?;
            let segmenter = Segmenter::new(Mode::Normal, dictionary, None);
            Ok(Self { tokenizer: Mutex::new(LinderaTokenizer::from_segmenter(segmenter)) })
        }
    }

    impl KeywordTokenizer for LinderaKeywordTokenizer {
        fn tokenize(&self, text: &str) -> Vec<String> {
            let mut tok = self.tokenizer.lock().unwrap_or_else(|p| p.into_inner());
            let mut stream = tok.token_stream(text);
            let mut out = Vec::new();
            while stream.advance() {
                let t = stream.token().text.trim();
                if t.chars().any(char::is_alphanumeric) {
                    out.push(t.to_lowercase());
                }
            }
            out
        }
    }
}
