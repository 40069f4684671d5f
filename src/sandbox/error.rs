use std::path::PathBuf;

use super::types::SandboxKind;

/// Errors raised while turning a sandbox config record into a backend.
///
/// These are always fatal and reported synchronously by
/// [`create_sandbox_backend`](super::create_sandbox_backend).
#[derive(Debug, thiserror::Error)]
pub enum SandboxConfigError {
    #[error("sandbox config must be a mapping, got {0}")]
    NotAMapping(&'static str),

    #[error(
        "sandbox config must include a 'type' key. Supported types: {kinds}",
        kinds = SandboxKind::supported_list()
    )]
    MissingType,

    #[error(
        "Unsupported sandbox type: {0}. Supported types: {kinds}",
        kinds = SandboxKind::supported_list()
    )]
    UnsupportedType(String),

    #[error(
        "{name} sandbox support coming soon. For now, use 'filesystem' type for local execution.",
        name = .0.display_name()
    )]
    NotYetAvailable(SandboxKind),

    #[error("Invalid {kind} sandbox settings: {source}")]
    InvalidSettings {
        kind: SandboxKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to prepare sandbox root {}: {source}", .path.display())]
    RootDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
