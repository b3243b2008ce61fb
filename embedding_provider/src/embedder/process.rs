use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use super::{DualEmbedder, DualEmbedding, EmbedderError, EmbedderInfo, ProviderKind};

const EXIT_POLL: Duration = Duration::from_millis(10);

/// Configuration for an embedder driven through an external executable.
///
/// The executable is called as `exe <text>` and must exit 0 after printing
/// two lines of comma-separated floats: the Latin vector, then the CJK vector.
#[derive(Debug, Clone)]
pub struct ProcessEmbedderConfig {
    pub executable: PathBuf,
    pub dimension: usize,
    /// Applies to the whole call, spawn to exit.
    pub timeout: Duration,
    pub embedding_model_id: String,
}

#[derive(Debug, Clone)]
pub struct ProcessEmbedder {
    info: EmbedderInfo,
    executable: PathBuf,
    timeout: Duration,
}

impl ProcessEmbedder {
    /// Validates the configuration only; the executable is looked up on use.
    pub fn new(config: ProcessEmbedderConfig) -> Result<Self, EmbedderError> {
        if config.dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }
        if config.timeout.is_zero() {
            return Err(EmbedderError::InvalidConfiguration {
                message: "timeout must be greater than zero".into(),
            });
        }
        Ok(Self {
            info: EmbedderInfo {
                provider: ProviderKind::ExternalProcess,
                embedding_model_id: config.embedding_model_id,
                dimension: config.dimension,
            },
            executable: config.executable,
            timeout: config.timeout,
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// A bare command name counts as available when it is found on `PATH`.
    pub fn is_available(&self) -> bool {
        resolve_executable(&self.executable, std::env::var_os("PATH").as_deref()).is_some()
    }

    fn run(&self, text: &str) -> Result<String, EmbedderError> {
        let deadline = Instant::now() + self.timeout;
        let mut child = Command::new(&self.executable)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| self.map_spawn_error(err))?;

        let Some(mut stdout) = child.stdout.take() else {
            kill_quietly(&mut child);
            return Err(EmbedderError::Spawn { message: "child stdout was not captured".into() });
        };
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = String::new();
            let res = stdout.read_to_string(&mut buf).map(|_| buf);
            let _ = tx.send(res);
        });

        let remaining = deadline.saturating_duration_since(Instant::now());
        let output = match rx.recv_timeout(remaining) {
            Ok(Ok(out)) => out,
            Ok(Err(err)) => {
                kill_quietly(&mut child);
                return Err(EmbedderError::MalformedOutput { message: format!("reading stdout failed: {err}") });
            }
            Err(_) => {
                kill_quietly(&mut child);
                return Err(EmbedderError::Timeout { timeout: self.timeout });
            }
        };

        // stdout is closed; the child should be exiting, but it still owes the deadline.
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(output),
                Ok(Some(status)) => return Err(EmbedderError::ProcessFailed { code: status.code() }),
                Ok(None) if Instant::now() >= deadline => {
                    kill_quietly(&mut child);
                    return Err(EmbedderError::Timeout { timeout: self.timeout });
                }
                Ok(None) => thread::sleep(EXIT_POLL),
                Err(err) => {
                    kill_quietly(&mut child);
                    return Err(EmbedderError::Spawn { message: format!("waiting for embedder failed: {err}") });
                }
            }
        }
    }

    fn map_spawn_error(&self, err: io::Error) -> EmbedderError {
        if err.kind() == io::ErrorKind::NotFound {
            EmbedderError::MissingExecutable { path: self.executable.clone() }
        } else {
            EmbedderError::Spawn { message: format!("`{}`: {err}", self.executable.display()) }
        }
    }
}

impl DualEmbedder for ProcessEmbedder {
    fn embed_pair(&self, text: &str) -> Result<DualEmbedding, EmbedderError> {
        self.ensure_available()?;
        let stdout = self.run(text)?;
        parse_dual_output(&stdout, self.info.dimension)
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }

    fn ensure_available(&self) -> Result<(), EmbedderError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(EmbedderError::MissingExecutable { path: self.executable.clone() })
        }
    }
}

/// File that running `executable` would start. A path with a directory part
/// is used as is; a bare name is looked up in each entry of `path_var`.
pub fn resolve_executable(executable: &Path, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if executable.as_os_str().is_empty() {
        return None;
    }
    if executable.is_absolute() || executable.components().count() > 1 {
        return executable.is_file().then(|| executable.to_path_buf());
    }
    std::env::split_paths(path_var?).map(|dir| dir.join(executable)).find(|candidate| candidate.is_file())
}

/// Parse the first two non-empty lines of embedder output into vectors of `dimension` floats.
pub fn parse_dual_output(stdout: &str, dimension: usize) -> Result<DualEmbedding, EmbedderError> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    let (Some(latin_line), Some(cjk_line)) = (lines.next(), lines.next()) else {
        return Err(EmbedderError::MalformedOutput { message: "expected two vector lines".into() });
    };
    let latin = parse_vector(latin_line)?;
    let cjk = parse_vector(cjk_line)?;
    if latin.len() != dimension || cjk.len() != dimension {
        return Err(EmbedderError::DimensionMismatch { expected: dimension, latin: latin.len(), cjk: cjk.len() });
    }
    Ok(DualEmbedding { latin, cjk })
}

fn parse_vector(line: &str) -> Result<Vec<f32>, EmbedderError> {
    line.split(',')
        .map(|field| {
            field.trim().parse::<f32>().map_err(|err| EmbedderError::MalformedOutput {
                message: format!("`{}` is not a float: {err}", field.trim()),
            })
        })
        .collect()
}

fn kill_quietly(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
