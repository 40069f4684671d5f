use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::sandbox::SandboxKind;

/// Project config file names, in lookup order
pub const PROJECT_CONFIG_NAMES: &[&str] = &[".agentbox.yaml", ".agentbox.yml"];

/// Configuration for agentbox, read from .agentbox.yaml
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Sandbox backend record, handed as-is to the backend selector.
    /// Must contain a `type` key; the remaining keys depend on the type.
    #[serde(default)]
    pub sandbox: Option<Value>,
}

/// Walk upward from `start_dir` looking for a project config file.
/// The nearest one wins.
pub fn find_project_config(start_dir: &Path) -> Option<PathBuf> {
    start_dir.ancestors().find_map(|dir| {
        PROJECT_CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

impl Config {
    /// Load configuration.
    ///
    /// With an explicit path, only that file is read and it must exist.
    /// Otherwise the global config is merged with the nearest project config.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "config:loading explicit");
            return Self::load_from_path(path)?
                .ok_or_else(|| anyhow!("Config file not found: {}", path.display()));
        }

        debug!("config:loading");
        let global = Self::load_global()?.unwrap_or_default();
        let project = Self::load_project()?.unwrap_or_default();
        let config = global.merge(project);

        debug!(has_sandbox = config.sandbox.is_some(), "config:loaded");
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "config:reading file");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config at {}: {}", path.display(), e))?;
        Ok(Some(config))
    }

    /// Load the global configuration file from ~/.config/agentbox.
    fn load_global() -> Result<Option<Self>> {
        let Some(home_dir) = home::home_dir() else {
            return Ok(None);
        };
        for name in ["config.yaml", "config.yml"] {
            let path = home_dir.join(".config/agentbox").join(name);
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }
        Ok(None)
    }

    fn load_project() -> Result<Option<Self>> {
        let start_dir = std::env::current_dir().unwrap_or_default();
        match find_project_config(&start_dir) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(None),
        }
    }

    /// Merge a project config over a global one.
    /// The project sandbox record replaces the global record wholesale.
    fn merge(self, project: Self) -> Self {
        Self {
            sandbox: project.sandbox.or(self.sandbox),
        }
    }

    /// Build the record for the backend selector, applying command-line
    /// overrides. Without any configured record, defaults to the filesystem
    /// kind rooted at the current directory.
    ///
    /// Overrides only apply to mapping records; anything else is passed
    /// through so the selector can report it.
    pub fn sandbox_record(&self, kind: Option<&str>, root_dir: Option<&Path>) -> Value {
        let mut record = self.sandbox.clone().unwrap_or_else(|| {
            let mut default = Map::new();
            default.insert(
                "type".to_string(),
                Value::String(SandboxKind::Filesystem.to_string()),
            );
            Value::Object(default)
        });

        if let Value::Object(map) = &mut record {
            if let Some(kind) = kind {
                map.insert("type".to_string(), Value::String(kind.to_string()));
            }
            if let Some(root) = root_dir {
                map.insert(
                    "root_dir".to_string(),
                    Value::String(root.to_string_lossy().into_owned()),
                );
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_find_project_config_from_subdir() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join(".agentbox.yaml"), "sandbox:\n  type: filesystem\n").unwrap();
        let nested = root.join("a/b/c");
        fs::create_dir_all(&nested).unwrap();

        let found = find_project_config(&nested).unwrap();
        assert_eq!(found, root.join(".agentbox.yaml"));
    }

    #[test]
    fn test_find_project_config_nearest_wins() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let backend = root.join("backend");
        fs::create_dir_all(&backend).unwrap();
        fs::write(root.join(".agentbox.yaml"), "").unwrap();
        fs::write(backend.join(".agentbox.yml"), "").unwrap();

        let found = find_project_config(&backend).unwrap();
        assert!(found.ends_with("backend/.agentbox.yml"));
    }

    #[test]
    fn test_load_from_path_parses_sandbox_record() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("agentbox.yaml");
        fs::write(
            &path,
            "sandbox:\n  type: filesystem\n  root_dir: /workspace\n  timeout_secs: 30\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap().unwrap();
        assert_eq!(
            config.sandbox,
            Some(json!({"type": "filesystem", "root_dir": "/workspace", "timeout_secs": 30}))
        );
    }

    #[test]
    fn test_load_from_path_missing_and_empty() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            Config::load_from_path(&temp.path().join("absent.yaml")).unwrap(),
            None
        );

        let empty = temp.path().join("empty.yaml");
        fs::write(&empty, "\n").unwrap();
        assert_eq!(
            Config::load_from_path(&empty).unwrap(),
            Some(Config::default())
        );
    }

    #[test]
    fn test_load_from_path_reports_parse_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yaml");
        fs::write(&path, "sandbox: [unterminated\n").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_load_explicit_requires_file() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(Some(&temp.path().join("nope.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_merge_project_replaces_global_record() {
        let global = Config {
            sandbox: Some(json!({"type": "filesystem", "root_dir": "/global"})),
        };
        let project = Config {
            sandbox: Some(json!({"type": "modal"})),
        };
        assert_eq!(
            global.clone().merge(project).sandbox,
            Some(json!({"type": "modal"}))
        );
        assert_eq!(
            global.merge(Config::default()).sandbox,
            Some(json!({"type": "filesystem", "root_dir": "/global"}))
        );
    }

    #[test]
    fn test_sandbox_record_defaults_to_filesystem() {
        assert_eq!(
            Config::default().sandbox_record(None, None),
            json!({"type": "filesystem"})
        );
    }

    #[test]
    fn test_sandbox_record_applies_overrides() {
        let config = Config {
            sandbox: Some(json!({"type": "filesystem", "root_dir": "/a", "shell": "bash"})),
        };
        assert_eq!(
            config.sandbox_record(Some("daytona"), Some(Path::new("/b"))),
            json!({"type": "daytona", "root_dir": "/b", "shell": "bash"})
        );
    }

    #[test]
    fn test_sandbox_record_passes_non_mapping_through() {
        let config = Config {
            sandbox: Some(json!(["filesystem"])),
        };
        assert_eq!(
            config.sandbox_record(Some("filesystem"), None),
            json!(["filesystem"])
        );
    }
}
