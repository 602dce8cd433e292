//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::core::engine::DEFAULT_MAX_PAGE_SIZE;
use crate::core::import::DEFAULT_BATCH_SIZE;
use crate::core::query::DEFAULT_PAGE_SIZE;
use crate::core::Project;

/// fsd configuration with layered hierarchy
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tenant used when none is given on the command line
    pub tenant: Option<String>,

    /// Recorded as the performer of stock movements
    pub author: Option<String>,

    pub max_page_size: Option<u32>,

    pub default_page_size: Option<u32>,

    pub import_batch_size: Option<usize>,

    /// Default output format
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (accessors below)

        // 2. Global user config (~/.config/fsd/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read(&global_path) {
                config.merge(global);
            }
        }

        // 3. Project config (.fsd/config.yaml)
        if let Some(project) = project {
            if let Some(project_config) = Self::read(&project.config_path()) {
                config.merge(project_config);
            }
        }

        // 4. Environment variables
        if let Ok(tenant) = std::env::var("FSD_TENANT") {
            config.tenant = Some(tenant);
        }
        if let Ok(author) = std::env::var("FSD_AUTHOR") {
            config.author = Some(author);
        }

        config
    }

    fn read(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "fsd").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.tenant.is_some() {
            self.tenant = other.tenant;
        }
        if other.author.is_some() {
            self.author = other.author;
        }
        if other.max_page_size.is_some() {
            self.max_page_size = other.max_page_size;
        }
        if other.default_page_size.is_some() {
            self.default_page_size = other.default_page_size;
        }
        if other.import_batch_size.is_some() {
            self.import_batch_size = other.import_batch_size;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
    }

    /// Get the author name, falling back to the login name
    pub fn author(&self) -> String {
        if let Some(ref author) = self.author {
            return author.clone();
        }
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size.unwrap_or(DEFAULT_MAX_PAGE_SIZE)
    }

    /// Default page size, never above the maximum
    pub fn default_page_size(&self) -> u32 {
        self.default_page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(self.max_page_size())
    }

    pub fn import_batch_size(&self) -> usize {
        self.import_batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_later_layer() {
        let mut config: Config = serde_yml::from_str("tenant: acme\nmax_page_size: 50\n").unwrap();
        let project: Config = serde_yml::from_str("tenant: globex\nimport_batch_size: 10\n").unwrap();
        config.merge(project);

        assert_eq!(config.tenant.as_deref(), Some("globex"));
        assert_eq!(config.max_page_size(), 50);
        assert_eq!(config.import_batch_size(), 10);
        assert_eq!(config.default_page_size(), 25);
    }

    #[test]
    fn test_default_page_size_capped_by_max() {
        let config: Config = serde_yml::from_str("max_page_size: 10\ndefault_page_size: 40\n").unwrap();
        assert_eq!(config.default_page_size(), 10);
    }

    #[test]
    fn test_project_config_is_read() {
        let tmp = tempfile::tempdir().unwrap();
        let project = Project::init(tmp.path(), false).unwrap();
        std::fs::write(project.config_path(), "default_page_size: 7\n").unwrap();

        let config = Config::load(Some(&project));
        assert_eq!(config.default_page_size(), 7);
    }
}
