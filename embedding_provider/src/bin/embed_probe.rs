use std::cmp::min;
use std::process::ExitCode;

use embedding_provider::config::{default_process_config, EMBED_DEFAULTS};
use embedding_provider::embedder::{DualEmbedder, ProcessEmbedder};

fn main() -> ExitCode {
    let text = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_owned();

    let input = if text.is_empty() {
        "sample text for embedding".to_string()
    } else {
        text
    };

    let config = default_process_config();
    println!("executable: {}", config.executable.display());
    println!("override with: {}", EMBED_DEFAULTS.executable_env);

    let embedder = match ProcessEmbedder::new(config) {
        Ok(e) => e,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let pair = match embedder.embed_pair(&input) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("input: {input}");
    println!("vector length: {} (latin), {} (cjk)", pair.latin.len(), pair.cjk.len());

    let preview = &pair.latin[..min(8, pair.latin.len())];
    println!("first {} latin values: {preview:?}", preview.len());
    let preview = &pair.cjk[..min(8, pair.cjk.len())];
    println!("first {} cjk values: {preview:?}", preview.len());
    ExitCode::SUCCESS
}
