//! Upload locations.
//!
//! A job's `input_ref` names a file relative to the upload root and inside
//! its owner's directory: `<ownerId>/<file>`. Absolute paths, `..`, and
//! references into another owner's directory are refused, and a reference
//! that resolves (through symlinks) outside the owner's directory is
//! refused at render time.

use crate::error::{JobError, JobResult};
use crate::renderer::ensure_input;
use lumen_config::StorageConfig;
use lumen_core::OwnerId;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Checks the shape of an input reference without touching the filesystem.
///
/// Returns the reference as a relative path on success, or a description
/// of what is wrong with it.
pub fn owner_relative(owner: &OwnerId, input_ref: &str) -> Result<PathBuf, String> {
    let path = Path::new(input_ref);
    if path.has_root() || path.is_absolute() {
        return Err("must be relative to the upload root".to_string());
    }

    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == owner.as_str() => {}
        _ => return Err(format!("must start with the owner directory '{owner}/'")),
    }

    let mut depth = 0usize;
    for component in components {
        match component {
            Component::Normal(_) => depth += 1,
            _ => return Err("must not contain '.', '..' or a path prefix".to_string()),
        }
    }
    if depth == 0 {
        return Err("must name a file inside the owner directory".to_string());
    }

    Ok(path.to_path_buf())
}

/// Root directory of uploaded originals.
#[derive(Debug, Clone)]
pub struct UploadRoot {
    root: PathBuf,
}

impl UploadRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolves `input_ref` to an existing file inside `owner`'s directory.
    ///
    /// A malformed or escaping reference is [`JobError::InputRejected`]; a
    /// well-formed one with no file behind it is [`JobError::InputMissing`].
    pub async fn resolve(&self, owner: &OwnerId, input_ref: &str) -> JobResult<PathBuf> {
        let relative = owner_relative(owner, input_ref)
            .map_err(|reason| JobError::InputRejected(format!("inputRef {reason}")))?;
        let candidate = self.root.join(relative);
        ensure_input(&candidate).await?;

        let missing = || JobError::InputMissing {
            path: candidate.display().to_string(),
        };
        let resolved = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|_| missing())?;
        let owner_dir = tokio::fs::canonicalize(self.root.join(owner.as_str()))
            .await
            .map_err(|_| missing())?;

        if !resolved.starts_with(&owner_dir) {
            warn!(owner_id = %owner, input_ref, "Input resolves outside the owner's uploads");
            return Err(JobError::InputRejected(
                "inputRef resolves outside the owner directory".to_string(),
            ));
        }
        Ok(resolved)
    }
}

impl From<&StorageConfig> for UploadRoot {
    fn from(config: &StorageConfig) -> Self {
        Self::new(config.upload_root.clone())
    }
}
