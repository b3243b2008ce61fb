use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::ServiceConfig;
use crate::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookInstall {
    pub path: PathBuf,
    /// An existing hook was overwritten.
    pub replaced: bool,
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Script body that marks the index of `cfg` stale.
pub fn post_commit_script(cfg: &ServiceConfig) -> String {
    let dir = shell_quote(&cfg.index_dir().to_string_lossy());
    let flag = shell_quote(&cfg.dirty_flag_path().to_string_lossy());
    format!("#!/bin/sh\n# Mark the retrieval index stale; the next search refreshes it.\nmkdir -p {dir} && touch {flag}\n")
}

/// Write `<root>/.git/hooks/post-commit`.
pub fn install_post_commit_hook(cfg: &ServiceConfig) -> Result<HookInstall, ServiceError> {
    let root = cfg.project_root.as_ref().ok_or(ServiceError::ProjectRootRequired)?;
    let git_dir = root.join(".git");
    if !git_dir.is_dir() {
        return Err(ServiceError::Config(format!("{} is not a git repository root", root.display())));
    }
    let hooks = git_dir.join("hooks");
    fs::create_dir_all(&hooks)?;
    let path = hooks.join("post-commit");
    let replaced = path.exists();
    fs::write(&path, post_commit_script(cfg))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    }
    tracing::info!(hook = %path.display(), replaced, "installed post-commit hook");
    Ok(HookInstall { path, replaced })
}
