//! Project discovery and structure
//!
//! A project is any directory holding a `.fsd/` folder. The folder carries
//! the project config and the SQLite record store.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::store::{SqliteStore, StoreError};

/// Name of the project marker directory
pub const PROJECT_DIR: &str = ".fsd";

/// Represents an fsd project
#[derive(Debug)]
pub struct Project {
    /// Root directory of the project (parent of .fsd/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current = std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(PROJECT_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new project at the given path. With `force`, an existing
    /// config is overwritten; the record store is never touched.
    pub fn init(path: &Path, force: bool) -> Result<Self, ProjectError> {
        std::fs::create_dir_all(path).map_err(|e| ProjectError::IoError(e.to_string()))?;
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let fsd_dir = root.join(PROJECT_DIR);
        if fsd_dir.exists() && !force {
            return Err(ProjectError::AlreadyExists(root));
        }

        std::fs::create_dir_all(&fsd_dir).map_err(|e| ProjectError::IoError(e.to_string()))?;
        std::fs::write(fsd_dir.join("config.yaml"), Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        std::fs::write(fsd_dir.join(".gitignore"), "store.db*\n")
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        let project = Self { root };
        project.open_store()?;
        Ok(project)
    }

    fn default_config() -> &'static str {
        r#"# Field Service Desk project configuration

# Tenant used when --tenant and FSD_TENANT are not set
# tenant: ""

# Recorded as performed_by on stock movements
# author: ""

# Largest page a list query may request
# max_page_size: 100

# Page size used by `list` when --page-size is not given
# default_page_size: 25

# Rows per insert batch during `import`
# import_batch_size: 50

# Default output format (auto, tsv, csv, json, yaml, md, id)
# default_format: auto
"#
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .fsd configuration directory
    pub fn fsd_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.fsd_dir().join("config.yaml")
    }

    pub fn store_path(&self) -> PathBuf {
        self.fsd_dir().join("store.db")
    }

    /// Open (creating if needed) the project's record store
    pub fn open_store(&self) -> Result<SqliteStore, ProjectError> {
        Ok(SqliteStore::open(&self.store_path())?)
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not an fsd project (searched from {searched_from:?}). Run 'fsd init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("fsd project already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("cannot open the record store: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_project_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path(), false).unwrap();

        assert!(project.fsd_dir().is_dir());
        assert!(project.config_path().exists());
        assert!(project.store_path().exists());
    }

    #[test]
    fn test_project_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path(), false).unwrap();

        let err = Project::init(tmp.path(), false).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists(_)));
        assert!(Project::init(tmp.path(), true).is_ok());
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path(), false).unwrap();
        let nested = tmp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = Project::discover_from(&nested).unwrap();
        assert_eq!(found.root(), tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_discover_outside_project_fails() {
        let tmp = tempdir().unwrap();
        assert!(matches!(
            Project::discover_from(tmp.path()),
            Err(ProjectError::NotFound { .. })
        ));
    }
}
