//! Sandbox backends that give agents rooted file access and command execution.
//!
//! A backend is selected from a declarative config record by
//! [`create_sandbox_backend`]. Every backend implements [`SandboxBackend`]
//! (file capability); backends that can run commands also expose a
//! [`CommandExecutor`] through [`SandboxBackend::executor`].

mod error;
mod factory;
pub mod filesystem;
pub mod types;

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

pub use error::SandboxConfigError;
pub use factory::create_sandbox_backend;
pub use filesystem::FilesystemBackend;
pub use types::*;

/// File capability shared by all sandbox backends.
///
/// Paths are relative to the backend root. Implementations must be
/// Send + Sync to allow sharing via Arc<dyn SandboxBackend>.
pub trait SandboxBackend: Send + Sync {
    /// Which kind of sandbox this is
    fn kind(&self) -> SandboxKind;

    /// Working root for all operations
    fn root(&self) -> &Path;

    // === Files ===

    /// Read the full contents of a file
    fn read_file(&self, path: &str) -> Result<String>;

    /// Write a file, creating parent directories and replacing existing content
    fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Replace `old` with `new` in a file. Returns the number of replacements.
    ///
    /// Fails if `old` is absent, or appears more than once and `replace_all`
    /// is false.
    fn edit_file(&self, path: &str, old: &str, new: &str, replace_all: bool) -> Result<usize>;

    /// List the entries directly under the root.
    ///
    /// Names are relative and sorted; directories carry a trailing `/`.
    fn list_files(&self) -> Result<Vec<String>>;

    // === Search ===

    /// Find files matching a glob pattern relative to the root
    fn glob_files(&self, pattern: &str) -> Result<Vec<String>>;

    /// Search file contents for a regex, optionally restricted by a glob
    fn grep(&self, pattern: &str, glob: Option<&str>) -> Result<Vec<GrepMatch>>;

    // === Execution ===

    /// Command execution capability, if this backend supports it
    fn executor(&self) -> Option<&dyn CommandExecutor> {
        None
    }
}

/// Shell command execution inside a sandbox.
pub trait CommandExecutor: Send + Sync {
    /// Run a command line through the sandbox shell.
    ///
    /// Command failures and timeouts are reported in the returned
    /// [`ExecutionResult`]; `Err` is reserved for failures to launch the
    /// shell at all. `None` uses the backend's default timeout.
    fn execute(&self, command: &str, timeout: Option<Duration>) -> Result<ExecutionResult>;
}
