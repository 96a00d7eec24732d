//! Shell configuration
//!
//! Resolved in layers: built-in defaults, then an optional JSON config file,
//! then `WUACTL_*` environment variables (a `.env` file is honoured by the
//! binary), then command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::orchestrator::DispatchMode;

/// Default config file looked up in the working directory
pub const CONFIG_FILENAME: &str = "wuactl.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" => Ok(OutputFormat::Text),
            other => Err(format!("unknown output format '{}' (expected json or text)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Path to the update catalog backing the local provider
    pub catalog: PathBuf,
    pub format: OutputFormat,
    pub dispatch: DispatchMode,
    pub verbose: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("update_catalog.json"),
            format: OutputFormat::Json,
            dispatch: DispatchMode::Batch,
            verbose: false,
        }
    }
}

impl ShellConfig {
    /// Load from `path` if given, else from `WUACTL_CONFIG` or `wuactl.json`
    /// when present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("WUACTL_CONFIG").map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(CONFIG_FILENAME).exists() => Self::from_file(Path::new(CONFIG_FILENAME))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    /// Apply `WUACTL_CATALOG`, `WUACTL_FORMAT`, `WUACTL_DISPATCH` and `WUACTL_VERBOSE`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(catalog) = lookup("WUACTL_CATALOG") {
            self.catalog = PathBuf::from(catalog);
        }
        if let Some(format) = lookup("WUACTL_FORMAT") {
            self.format = format.parse().map_err(anyhow::Error::msg).context("WUACTL_FORMAT")?;
        }
        if let Some(dispatch) = lookup("WUACTL_DISPATCH") {
            self.dispatch = dispatch.parse().map_err(anyhow::Error::msg).context("WUACTL_DISPATCH")?;
        }
        if let Some(verbose) = lookup("WUACTL_VERBOSE") {
            self.verbose = matches!(verbose.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_then_env_layering() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{ "catalog": "/var/lib/catalog.json", "format": "text" }"#).unwrap();

        let mut config = ShellConfig::from_file(file.path()).unwrap();
        assert_eq!(config.catalog, PathBuf::from("/var/lib/catalog.json"));
        assert_eq!(config.format, OutputFormat::Text);
        assert_eq!(config.dispatch, DispatchMode::Batch);

        let env: HashMap<&str, &str> = [("WUACTL_DISPATCH", "incremental"), ("WUACTL_VERBOSE", "yes")].into();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.dispatch, DispatchMode::Incremental);
        assert!(config.verbose);
        assert_eq!(config.format, OutputFormat::Text);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = ShellConfig::default();
        let err = config
            .apply_env(|k| (k == "WUACTL_FORMAT").then(|| "yaml".to_string()))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("yaml"));
    }

    #[test]
    fn test_malformed_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not json").unwrap();
        assert!(ShellConfig::from_file(file.path()).is_err());
    }
}
