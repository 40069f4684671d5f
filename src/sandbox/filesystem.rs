//! Local filesystem sandbox with shell execution.
//!
//! All file paths are resolved beneath a root directory. `..` components are
//! rejected, and symlinks are followed only while they stay inside the root,
//! so file operations cannot leave it. Commands run through a shell with the
//! root as working directory and the caller's environment.

use anyhow::{Context, Result, bail};
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

use super::{CommandExecutor, ExecutionResult, GrepMatch, SandboxBackend, SandboxKind};
use crate::cmd::{DEFAULT_SHELL, ShellCmd};

/// Timeout applied to `execute` when the caller gives none
pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
    shell: String,
    default_timeout: Option<Duration>,
}

impl FilesystemBackend {
    /// Create a backend rooted at `root`, creating the directory (and its
    /// parents) if missing. The stored root is canonical.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let root = fs::canonicalize(root)?;
        debug!(root = %root.display(), "filesystem:backend ready");
        Ok(Self {
            root,
            shell: DEFAULT_SHELL.to_string(),
            default_timeout: Some(DEFAULT_EXECUTE_TIMEOUT),
        })
    }

    /// Use a different shell for `execute` (invoked as `<shell> -c <command>`)
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Set the timeout used when `execute` is called without one.
    /// `None` lets commands run unbounded.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Resolve a root-relative path. A leading `/` means the root itself.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir => bail!("Path escapes sandbox root: {}", path),
                Component::Prefix(_) => {
                    bail!("Path must be relative to the sandbox root: {}", path)
                }
            }
        }
        self.ensure_contained(&resolved, path)?;
        Ok(resolved)
    }

    /// Follow symlinks in the deepest existing part of `resolved` and make
    /// sure it still lands under the root.
    fn ensure_contained(&self, resolved: &Path, path: &str) -> Result<()> {
        let existing = resolved
            .ancestors()
            .find(|p| p.symlink_metadata().is_ok())
            .unwrap_or(self.root.as_path());
        // Fails for dangling symlinks, which could otherwise be written through
        let real = fs::canonicalize(existing)
            .with_context(|| format!("Failed to resolve path: {}", path))?;
        if !real.starts_with(&self.root) {
            bail!("Path escapes sandbox root: {}", path);
        }
        Ok(())
    }

    fn is_contained(&self, path: &Path) -> bool {
        fs::canonicalize(path).is_ok_and(|real| real.starts_with(&self.root))
    }

    fn relative(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }
}

impl SandboxBackend for FilesystemBackend {
    fn kind(&self) -> SandboxKind {
        SandboxKind::Filesystem
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn read_file(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        trace!(path = %full.display(), "filesystem:read");
        fs::read_to_string(&full).with_context(|| format!("Failed to read file: {}", path))
    }

    fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directories for {}", path))?;
        }
        trace!(path = %full.display(), bytes = content.len(), "filesystem:write");
        fs::write(&full, content).with_context(|| format!("Failed to write file: {}", path))
    }

    fn edit_file(&self, path: &str, old: &str, new: &str, replace_all: bool) -> Result<usize> {
        if old.is_empty() {
            bail!("Text to replace must not be empty");
        }
        let content = self.read_file(path)?;
        let occurrences = content.matches(old).count();
        if occurrences == 0 {
            bail!("Text not found in {}: {:?}", path, old);
        }
        if occurrences > 1 && !replace_all {
            bail!(
                "Text appears {} times in {}; provide more context or replace all occurrences",
                occurrences,
                path
            );
        }

        let (updated, replaced) = if replace_all {
            (content.replace(old, new), occurrences)
        } else {
            (content.replacen(old, new, 1), 1)
        };
        self.write_file(path, &updated)?;
        debug!(path, replaced, "filesystem:edit");
        Ok(replaced)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list {}", self.root.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn glob_files(&self, pattern: &str) -> Result<Vec<String>> {
        if Path::new(pattern)
            .components()
            .any(|c| c == Component::ParentDir)
        {
            bail!("Glob pattern escapes sandbox root: {}", pattern);
        }

        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let full = format!("{}/{}", root, pattern.trim_start_matches('/'));

        let mut matches = Vec::new();
        for entry in
            glob::glob(&full).with_context(|| format!("Invalid glob pattern: {}", pattern))?
        {
            let path = entry?;
            if path.is_file()
                && self.is_contained(&path)
                && let Some(rel) = self.relative(&path)
            {
                matches.push(rel);
            }
        }
        matches.sort();
        Ok(matches)
    }

    fn grep(&self, pattern: &str, glob: Option<&str>) -> Result<Vec<GrepMatch>> {
        let regex =
            Regex::new(pattern).with_context(|| format!("Invalid search pattern: {}", pattern))?;

        let mut matches = Vec::new();
        for path in self.glob_files(glob.unwrap_or("**/*"))? {
            let Ok(content) = fs::read_to_string(self.root.join(&path)) else {
                trace!(path, "filesystem:grep skipping unreadable or binary file");
                continue;
            };
            for (idx, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(GrepMatch {
                        path: path.clone(),
                        line_number: idx + 1,
                        line: line.to_string(),
                    });
                }
            }
        }
        Ok(matches)
    }

    fn executor(&self) -> Option<&dyn CommandExecutor> {
        Some(self)
    }
}

impl CommandExecutor for FilesystemBackend {
    fn execute(&self, command: &str, timeout: Option<Duration>) -> Result<ExecutionResult> {
        let mut cmd = ShellCmd::new(command)
            .shell(&self.shell)
            .workdir(&self.root);
        if let Some(limit) = timeout.or(self.default_timeout) {
            cmd = cmd.timeout(limit);
        }
        cmd.run()
    }
}
