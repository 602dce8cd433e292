//! Shared helper functions for CLI commands
//!
//! Every data command opens the same things: the project, its layered
//! config, the record store and the tenant to act for. [`Context`] bundles
//! them.

use miette::{miette, Result};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::TenantId;
use crate::core::mutator::Payload;
use crate::core::project::Project;
use crate::core::store::SqliteStore;
use crate::core::Config;

/// Everything a data command needs
pub struct Context {
    pub project: Project,
    pub config: Config,
    pub store: SqliteStore,
    pub tenant: TenantId,
}

impl Context {
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = match &global.project {
            Some(path) => Project::discover_from(path),
            None => Project::discover(),
        }
        .map_err(|e| miette!("{}", e))?;
        let config = Config::load(Some(&project));

        let raw_tenant = global
            .tenant
            .clone()
            .or_else(|| config.tenant.clone())
            .unwrap_or_default();
        let tenant = TenantId::parse(&raw_tenant).map_err(|e| {
            miette!(
                code = "fsd::invalid_tenant",
                help = "pass --tenant <name>, set FSD_TENANT, or add `tenant:` to .fsd/config.yaml",
                "{}",
                e
            )
        })?;

        let store = project.open_store().map_err(|e| {
            tracing::warn!(error = %e, "store open failed");
            miette!(code = "fsd::store_unavailable", "{}", e)
        })?;

        Ok(Self {
            project,
            config,
            store,
            tenant,
        })
    }

    /// The `--format` flag, falling back to the configured default, then `fallback`
    pub fn format(&self, global: &GlobalOpts, fallback: OutputFormat) -> OutputFormat {
        match global.format {
            OutputFormat::Auto => self
                .config
                .default_format
                .as_deref()
                .and_then(|f| f.parse::<OutputFormat>().ok())
                .unwrap_or(OutputFormat::Auto)
                .or(fallback),
            f => f,
        }
    }
}

/// Parse repeated `field=value` arguments into a form payload
pub fn parse_assignments(pairs: &[String]) -> Result<Payload> {
    let mut payload = Payload::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| miette!("expected field=value, got '{}'", pair))?;
        if key.trim().is_empty() {
            return Err(miette!("expected field=value, got '{}'", pair));
        }
        payload.insert(key.trim().to_string(), value.to_string());
    }
    Ok(payload)
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignments() {
        let payload = parse_assignments(&[
            "name=Air Filter".to_string(),
            " quantity =3".to_string(),
            "notes=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!(payload["name"], "Air Filter");
        assert_eq!(payload["quantity"], "3");
        assert_eq!(payload["notes"], "a=b");

        assert!(parse_assignments(&["nothing".to_string()]).is_err());
        assert!(parse_assignments(&["=3".to_string()]).is_err());
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("hi", 2), "hi");
    }
}
