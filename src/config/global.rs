use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::user_error;

/// Log output format selected in `global.yaml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
    Stackdriver,
}

/// Top-level runner settings from `global.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Global {
    pub proto_root: String,
    #[serde(default)]
    pub proto_imports: Vec<String>,
    #[serde(default)]
    pub proto_sources: Vec<String>,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub timestamp: bool,
    /// When true the first failed test case stops the whole run instead of
    /// only skipping its dependents.
    #[serde(default)]
    pub stop_at_first_failure: bool,
}

impl Global {
    pub fn load(configs: &Path) -> Result<Self> {
        let path = configs.join("global.yaml");
        let content = std::fs::read_to_string(&path)
            .map_err(|err| user_error(format!("error reading {}: {err}", path.display())))?;

        serde_yaml::from_str(&content)
            .map_err(|err| user_error(format!("error parsing {}: {err}", path.display())))
            .context("global configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_full_global() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("global.yaml"),
            concat!(
                "proto_root: protos\n",
                "proto_imports:\n  - vendor\n",
                "proto_sources:\n  - billing\n  - users/users.proto\n",
                "format: json\n",
                "timestamp: true\n",
                "stop_at_first_failure: true\n",
            ),
        )
        .unwrap();

        let global = Global::load(dir.path()).unwrap();
        assert_eq!(global.proto_root, "protos");
        assert_eq!(global.proto_imports, vec!["vendor"]);
        assert_eq!(global.proto_sources, vec!["billing", "users/users.proto"]);
        assert_eq!(global.format, LogFormat::Json);
        assert!(global.timestamp);
        assert!(global.stop_at_first_failure);
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("global.yaml"), "proto_root: .\n").unwrap();

        let global = Global::load(dir.path()).unwrap();
        assert_eq!(global.format, LogFormat::Text);
        assert!(!global.timestamp);
        assert!(!global.stop_at_first_failure);
        assert!(global.proto_sources.is_empty());
    }

    #[test]
    fn test_missing_file_is_user_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Global::load(dir.path()).unwrap_err();
        assert!(crate::error::find_user_error(&err).is_some());
    }
}
