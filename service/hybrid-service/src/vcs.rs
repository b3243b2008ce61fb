//! Revision source used to decide how much of the document tree to reindex.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VcsError {
    #[error("version control tool unavailable: {0}")]
    Unavailable(String),
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("unknown revision: {0}")]
    UnknownRevision(String),
    #[error("`{command}` failed: {message}")]
    Failed { command: String, message: String },
}

/// Every failure is reported as an error, never as an empty change list.
pub trait RevisionSource: Send + Sync {
    fn current_revision(&self, root: &Path) -> Result<String, VcsError>;

    /// Root-relative, `/`-separated paths changed between two revisions.
    fn changed_paths(&self, root: &Path, from: &str, to: &str) -> Result<Vec<String>, VcsError>;
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct GitCli {
    pub program: PathBuf,
    pub revision_timeout: Duration,
    pub diff_timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
            revision_timeout: Duration::from_secs(10),
            diff_timeout: Duration::from_secs(30),
        }
    }
}

struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: String,
}

impl GitCli {
    fn run(&self, root: &Path, args: &[&str], timeout: Duration) -> Result<Captured, VcsError> {
        let command = format!("git {}", args.join(" "));
        let mut child = Command::new(&self.program)
            .arg("-C")
            .arg(root)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VcsError::Unavailable(e.to_string()))?;

        let stdout = child.stdout.take().map(|s| thread::spawn(move || drain(s)));
        let stderr = child.stderr.take().map(|s| thread::spawn(move || drain(s)));

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(VcsError::Timeout { command, timeout });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(VcsError::Failed { command, message: e.to_string() }),
            }
        };

        let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        Ok(Captured { status, stdout, stderr: String::from_utf8_lossy(&stderr).trim().to_string() })
    }
}

fn drain(mut reader: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf);
    buf
}

fn is_unknown_revision(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("unknown revision") || lower.contains("bad revision") || lower.contains("bad object")
}

impl RevisionSource for GitCli {
    fn current_revision(&self, root: &Path) -> Result<String, VcsError> {
        let out = self.run(root, &["rev-parse", "HEAD"], self.revision_timeout)?;
        if !out.status.success() {
            return Err(VcsError::Failed { command: "git rev-parse HEAD".into(), message: out.stderr });
        }
        let rev = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if rev.is_empty() {
            return Err(VcsError::Failed { command: "git rev-parse HEAD".into(), message: "empty output".into() });
        }
        Ok(rev)
    }

    fn changed_paths(&self, root: &Path, from: &str, to: &str) -> Result<Vec<String>, VcsError> {
        // -z: NUL separated, no path quoting. --no-renames: a rename lists both
        // the old and the new path.
        let out = self.run(
            root,
            &["diff", "--name-only", "--no-renames", "-z", "--relative", from, to],
            self.diff_timeout,
        )?;
        if !out.status.success() {
            if is_unknown_revision(&out.stderr) {
                return Err(VcsError::UnknownRevision(from.to_string()));
            }
            return Err(VcsError::Failed { command: format!("git diff --name-only --no-renames {from} {to}"), message: out.stderr });
        }
        Ok(String::from_utf8_lossy(&out.stdout)
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_classification() {
        assert!(is_unknown_revision("fatal: bad revision 'deadbeef'"));
        assert!(is_unknown_revision("fatal: ambiguous argument 'x': unknown revision or path"));
        assert!(!is_unknown_revision("fatal: not a git repository"));
    }

    #[test]
    fn missing_program_is_unavailable() {
        let git = GitCli { program: PathBuf::from("/nonexistent/bin/git-does-not-exist"), ..GitCli::default() };
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(git.current_revision(dir.path()), Err(VcsError::Unavailable(_))));
    }

    fn git(root: &Path, args: &[&str]) -> bool {
        Command::new("git")
            .arg("-C")
            .arg(root)
            .args(["-c", "user.name=rag", "-c", "user.email=rag@example.com", "-c", "commit.gpgsign=false"])
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    #[test]
    fn renames_list_old_and_new_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        if !git(root, &["init", "-q"]) {
            return; // git not installed
        }
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/old.md"), "# Old\nbody\n").unwrap();
        assert!(git(root, &["add", "docs"]));
        assert!(git(root, &["commit", "-q", "-m", "first"]));
        let cli = GitCli::default();
        let first = cli.current_revision(root).unwrap();

        assert!(git(root, &["mv", "docs/old.md", "docs/new.md"]));
        assert!(git(root, &["commit", "-q", "-m", "rename"]));
        let second = cli.current_revision(root).unwrap();

        let mut changed = cli.changed_paths(root, &first, &second).unwrap();
        changed.sort();
        assert_eq!(changed, vec!["docs/new.md".to_string(), "docs/old.md".to_string()]);
    }
}
