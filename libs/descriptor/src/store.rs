//! File-backed descriptor store.
//!
//! Each sandbox gets `<base_dir>/<sandbox_id>.json`. Records are written to
//! a temporary file in the same directory and renamed into place so readers
//! never observe a partial record.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::descriptor::Descriptor;
use crate::error::DescriptorError;

/// Default base directory for descriptor records.
pub const DEFAULT_BASE_DIR: &str = "/run/dans";

/// Check that a sandbox identifier is usable as a record key.
///
/// Identifiers must start with an alphanumeric character and contain only
/// alphanumerics, `-`, `_` and `.`.
pub fn validate_sandbox_id(sandbox_id: &str) -> Result<(), DescriptorError> {
    let mut chars = sandbox_id.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if !valid {
        return Err(DescriptorError::InvalidSandboxId(sandbox_id.to_string()));
    }
    Ok(())
}

/// Descriptor records keyed by sandbox identifier.
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    base_dir: PathBuf,
}

impl DescriptorStore {
    /// Create a store rooted at `base_dir`. The directory is created on first save.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Base directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Record path for a sandbox.
    pub fn path_for(&self, sandbox_id: &str) -> Result<PathBuf, DescriptorError> {
        validate_sandbox_id(sandbox_id)?;
        Ok(self.base_dir.join(format!("{}.json", sandbox_id)))
    }

    /// Persist the descriptor for a sandbox, replacing any previous record.
    pub fn save(&self, sandbox_id: &str, descriptor: &Descriptor) -> Result<PathBuf, DescriptorError> {
        let path = self.path_for(sandbox_id)?;

        fs::create_dir_all(&self.base_dir).map_err(|source| DescriptorError::Io {
            path: self.base_dir.clone(),
            source,
        })?;

        // Stored as a sequence so a sandbox can carry more than one device later
        let data = serde_json::to_vec(std::slice::from_ref(descriptor))?;
        debug!(
            sandbox_id = %sandbox_id,
            record = %String::from_utf8_lossy(&data),
            "Writing descriptor"
        );

        let tmp_path = self.base_dir.join(format!(".{}.json.tmp", sandbox_id));
        fs::write(&tmp_path, &data).map_err(|source| DescriptorError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            DescriptorError::Io {
                path: path.clone(),
                source,
            }
        })?;

        info!(sandbox_id = %sandbox_id, path = %path.display(), "Descriptor saved");
        Ok(path)
    }

    /// Load the descriptors stored for a sandbox.
    pub fn load(&self, sandbox_id: &str) -> Result<Vec<Descriptor>, DescriptorError> {
        let path = self.path_for(sandbox_id)?;

        let data = fs::read(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => DescriptorError::NotFound { path: path.clone() },
            _ => DescriptorError::Io {
                path: path.clone(),
                source,
            },
        })?;

        Ok(serde_json::from_slice(&data)?)
    }

    /// Delete the record for a sandbox.
    pub fn remove(&self, sandbox_id: &str) -> Result<(), DescriptorError> {
        let path = self.path_for(sandbox_id)?;

        fs::remove_file(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => DescriptorError::NotFound { path: path.clone() },
            _ => DescriptorError::Io {
                path: path.clone(),
                source,
            },
        })?;

        info!(sandbox_id = %sandbox_id, path = %path.display(), "Descriptor removed");
        Ok(())
    }
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("abc123")]
    #[case("5f2c1d-e8_b.1")]
    fn test_valid_sandbox_ids(#[case] id: &str) {
        assert!(validate_sandbox_id(id).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("../etc/passwd")]
    #[case("a/b")]
    #[case("-leading")]
    #[case("with space")]
    fn test_invalid_sandbox_ids(#[case] id: &str) {
        assert!(matches!(
            validate_sandbox_id(id),
            Err(DescriptorError::InvalidSandboxId(_))
        ));
    }

    #[test]
    fn test_path_for() {
        let store = DescriptorStore::new("/run/dans");
        assert_eq!(
            store.path_for("sandbox1").unwrap(),
            PathBuf::from("/run/dans/sandbox1.json")
        );
    }
}
