//! Shared types for sandbox backends.

use serde::{Deserialize, Serialize};

/// Outcome of a single command execution.
///
/// Execution failures (non-zero exits, unknown commands, timeouts) are
/// reported here rather than as errors, so callers can inspect and react.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Process exit status. 124 when the command was killed on timeout,
    /// 128 + N when terminated by signal N.
    pub exit_code: i32,
    /// Captured standard output (lossy UTF-8)
    pub stdout: String,
    /// Captured standard error (lossy UTF-8)
    pub stderr: String,
}

impl ExecutionResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A single line matched by `grep`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// Path relative to the sandbox root
    pub path: String,
    /// 1-based line number
    pub line_number: usize,
    /// The matching line, without its terminator
    pub line: String,
}

/// Sandbox backend kind, as named by the `type` key of a sandbox config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxKind {
    /// Local filesystem with shell execution
    Filesystem,
    /// Modal cloud sandbox
    Modal,
    /// Runloop devbox
    Runloop,
    /// Daytona workspace
    Daytona,
    /// Harbor hosted sandbox
    Harbor,
}

impl SandboxKind {
    /// Every recognized kind, in the order they are listed to users.
    pub const ALL: [SandboxKind; 5] = [
        SandboxKind::Filesystem,
        SandboxKind::Modal,
        SandboxKind::Runloop,
        SandboxKind::Daytona,
        SandboxKind::Harbor,
    ];

    /// Config name of this kind (the value of the `type` key)
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxKind::Filesystem => "filesystem",
            SandboxKind::Modal => "modal",
            SandboxKind::Runloop => "runloop",
            SandboxKind::Daytona => "daytona",
            SandboxKind::Harbor => "harbor",
        }
    }

    /// Human-facing product name, used in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            SandboxKind::Filesystem => "Filesystem",
            SandboxKind::Modal => "Modal",
            SandboxKind::Runloop => "Runloop",
            SandboxKind::Daytona => "Daytona",
            SandboxKind::Harbor => "Harbor",
        }
    }

    /// Whether a backend can currently be constructed for this kind
    pub fn is_available(&self) -> bool {
        matches!(self, SandboxKind::Filesystem)
    }

    /// Comma-separated list of all kinds, e.g. "filesystem, modal, ..."
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for SandboxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SandboxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown sandbox type: {}", s))
    }
}
