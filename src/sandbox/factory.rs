use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{FilesystemBackend, SandboxBackend, SandboxConfigError, SandboxKind};

/// Optional keys of a `type: filesystem` record. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct FilesystemSettings {
    /// Root directory. Default: current working directory
    #[serde(default)]
    root_dir: Option<PathBuf>,

    /// Shell used to run commands. Default: sh
    #[serde(default)]
    shell: Option<String>,

    /// Default execute timeout in seconds; 0 disables it. Default: 120
    #[serde(default)]
    timeout_secs: Option<u64>,
}

/// Create a sandbox backend from a declarative config record.
///
/// The record must be a mapping with a `type` key naming one of the
/// [`SandboxKind`]s. For example:
///
/// ```yaml
/// type: filesystem
/// root_dir: /workspace
/// ```
///
/// Recognized kinds that are not available yet fail with
/// [`SandboxConfigError::NotYetAvailable`].
pub fn create_sandbox_backend(
    config: &Value,
) -> Result<Arc<dyn SandboxBackend>, SandboxConfigError> {
    let record = config
        .as_object()
        .ok_or_else(|| SandboxConfigError::NotAMapping(json_type_name(config)))?;

    let kind = parse_kind(record.get("type"))?;
    debug!(%kind, "sandbox:creating backend");

    match kind {
        SandboxKind::Filesystem => Ok(Arc::new(build_filesystem(config)?)),
        SandboxKind::Modal | SandboxKind::Runloop | SandboxKind::Daytona | SandboxKind::Harbor => {
            Err(SandboxConfigError::NotYetAvailable(kind))
        }
    }
}

fn parse_kind(value: Option<&Value>) -> Result<SandboxKind, SandboxConfigError> {
    match value {
        None => Err(SandboxConfigError::MissingType),
        Some(value) if is_empty_value(value) => Err(SandboxConfigError::MissingType),
        Some(Value::String(name)) => name
            .parse()
            .map_err(|_| SandboxConfigError::UnsupportedType(name.clone())),
        Some(other) => Err(SandboxConfigError::UnsupportedType(other.to_string())),
    }
}

fn build_filesystem(config: &Value) -> Result<FilesystemBackend, SandboxConfigError> {
    let settings =
        FilesystemSettings::deserialize(config).map_err(|source| {
            SandboxConfigError::InvalidSettings {
                kind: SandboxKind::Filesystem,
                source,
            }
        })?;

    let root = settings.root_dir.unwrap_or_else(|| PathBuf::from("."));
    let mut backend =
        FilesystemBackend::new(&root).map_err(|source| SandboxConfigError::RootDir {
            path: root.clone(),
            source,
        })?;

    if let Some(shell) = settings.shell {
        backend = backend.with_shell(shell);
    }
    if let Some(secs) = settings.timeout_secs {
        backend = backend.with_default_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }
    Ok(backend)
}

/// Values that count as "not set": null, false, zero, and empty strings,
/// lists or mappings
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}
