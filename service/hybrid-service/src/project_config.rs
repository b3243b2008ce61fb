//! Per-project `config.json`: typed known keys, unknown keys kept verbatim.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ServiceError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Revision the index was last brought up to date with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    /// Descriptor of the embedding model that produced the stored vectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields to overwrite; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub last_commit: Option<String>,
    pub embed_model: Option<String>,
}

impl ProjectConfig {
    /// Missing, unreadable or malformed files read as an empty config.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&text) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring malformed project config");
                Self::default()
            }
        }
    }

    pub fn merge(&mut self, patch: ConfigPatch) {
        if let Some(v) = patch.last_commit {
            self.last_commit = Some(v);
        }
        if let Some(v) = patch.embed_model {
            self.embed_model = Some(v);
        }
    }

    /// Write pretty-printed JSON through a sibling temp file and rename.
    pub fn save(&self, path: &Path) -> Result<(), ServiceError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ServiceError::Config(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Load, merge `patch`, save. Returns the merged config.
pub fn update_project_config(path: &Path, patch: ConfigPatch) -> Result<ProjectConfig, ServiceError> {
    let mut cfg = ProjectConfig::load(path);
    cfg.merge(patch);
    cfg.save(path)?;
    Ok(cfg)
}
