use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agentbox::config::Config;
use agentbox::sandbox::{SandboxBackend, SandboxKind, create_sandbox_backend};
use agentbox::shell;
use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing::debug;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "agentbox")]
#[command(about = "Sandbox backends for agents: rooted file access and shell execution")]
#[command(
    after_help = "The sandbox is configured by the `sandbox:` key of .agentbox.yaml (nearest \
                  to the current directory) or ~/.config/agentbox/config.yaml. Without one, \
                  a filesystem sandbox rooted at the current directory is used."
)]
pub struct Cli {
    /// Read this config file instead of discovering .agentbox.yaml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Sandbox type, overriding the configured one (e.g. filesystem)
    #[arg(long = "type", global = true)]
    kind: Option<String>,

    /// Sandbox root directory, overriding the configured one
    #[arg(long, global = true)]
    root_dir: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a shell command in the sandbox root
    ///
    /// Exits with the command's exit code (124 on timeout).
    Exec {
        /// Kill the command after this many seconds (default: sandbox setting)
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the result as JSON instead of replaying output
        #[arg(long)]
        json: bool,

        /// Command to run (everything after --). A single argument is passed
        /// to the shell verbatim.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Print a file
    Read {
        /// Path relative to the sandbox root
        path: String,
    },

    /// Write a file, creating parent directories
    Write {
        /// Path relative to the sandbox root
        path: String,

        /// Content to write (default: read from stdin)
        #[arg(long)]
        content: Option<String>,
    },

    /// Replace text in a file
    Edit {
        /// Path relative to the sandbox root
        path: String,

        /// Text to find
        #[arg(long)]
        old: String,

        /// Replacement text
        #[arg(long)]
        new: String,

        /// Replace every occurrence instead of requiring a unique match
        #[arg(long)]
        all: bool,
    },

    /// List entries directly under the sandbox root
    #[command(visible_alias = "ls")]
    List,

    /// Find files matching a glob pattern (supports **)
    Glob {
        pattern: String,
    },

    /// Search file contents with a regular expression
    Grep {
        pattern: String,

        /// Only search files matching this glob
        #[arg(long)]
        glob: Option<String>,
    },

    /// Show sandbox types and whether they are available
    Kinds,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    fn open_backend(&self) -> Result<Arc<dyn SandboxBackend>> {
        let config = Config::load(self.config.as_deref())?;
        let record = config.sandbox_record(self.kind.as_deref(), self.root_dir.as_deref());
        debug!(%record, "cli:sandbox record");
        Ok(create_sandbox_backend(&record)?)
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Exec {
            timeout,
            json,
            command,
        } => {
            let code = exec(&cli, command, *timeout, *json)?;
            std::process::exit(code);
        }
        Commands::Read { path } => {
            let content = cli.open_backend()?.read_file(path)?;
            print!("{content}");
            Ok(())
        }
        Commands::Write { path, content } => {
            let content = match content {
                Some(content) => content.clone(),
                None => {
                    let mut buf = String::new();
                    io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read content from stdin")?;
                    buf
                }
            };
            cli.open_backend()?.write_file(path, &content)
        }
        Commands::Edit {
            path,
            old,
            new,
            all,
        } => {
            let replaced = cli.open_backend()?.edit_file(path, old, new, *all)?;
            eprintln!("{path}: {replaced} replacement(s)");
            Ok(())
        }
        Commands::List => print_lines(cli.open_backend()?.list_files()?),
        Commands::Glob { pattern } => print_lines(cli.open_backend()?.glob_files(pattern)?),
        Commands::Grep { pattern, glob } => {
            let matches = cli.open_backend()?.grep(pattern, glob.as_deref())?;
            print_lines(
                matches
                    .into_iter()
                    .map(|m| format!("{}:{}:{}", m.path, m.line_number, m.line)),
            )
        }
        Commands::Kinds => print_lines(SandboxKind::ALL.iter().map(|kind| {
            let status = if kind.is_available() {
                "available"
            } else {
                "coming soon"
            };
            format!("{:<12}{}", kind.as_str(), status)
        })),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}

/// Run a command and replay its output. Returns the exit code to exit with.
fn exec(cli: &Cli, parts: &[String], timeout: Option<u64>, json: bool) -> Result<i32> {
    let backend = cli.open_backend()?;
    let executor = backend
        .executor()
        .ok_or_else(|| anyhow!("{} sandbox does not support command execution", backend.kind()))?;

    let command = shell::command_line(parts);
    let result = executor.execute(&command, timeout.map(Duration::from_secs))?;

    let mut stdout = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &result)?;
        writeln!(stdout)?;
    } else {
        stdout.write_all(result.stdout.as_bytes())?;
        let mut stderr = io::stderr().lock();
        stderr.write_all(result.stderr.as_bytes())?;
        stderr.flush()?;
    }
    // process::exit skips destructors, so flush explicitly
    stdout.flush()?;

    Ok(result.exit_code)
}

fn print_lines<I, S>(lines: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut stdout = io::stdout().lock();
    for line in lines {
        writeln!(stdout, "{}", line.as_ref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_requires_double_dash() {
        assert!(Cli::try_parse_from(["agentbox", "exec", "ls"]).is_err());
        let cli = Cli::try_parse_from(["agentbox", "exec", "--timeout", "5", "--", "ls", "-la"])
            .unwrap();
        match cli.command {
            Commands::Exec {
                timeout, command, ..
            } => {
                assert_eq!(timeout, Some(5));
                assert_eq!(command, vec!["ls", "-la"]);
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_global_overrides_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "agentbox",
            "ls",
            "--type",
            "filesystem",
            "--root-dir",
            "/tmp/ws",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.kind.as_deref(), Some("filesystem"));
        assert_eq!(cli.root_dir, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cli.log_level(), "debug");
    }

    #[test]
    fn test_open_backend_uses_config_file_and_overrides() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("agentbox.yaml");
        let root = temp.path().join("from-config");
        std::fs::write(
            &config_path,
            format!("sandbox:\n  type: filesystem\n  root_dir: {}\n", root.display()),
        )
        .unwrap();

        let config_arg = config_path.to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["agentbox", "--config", &config_arg, "ls"]).unwrap();
        let backend = cli.open_backend().unwrap();
        assert_eq!(backend.root(), root.canonicalize().unwrap());

        let override_root = temp.path().join("from-flag");
        let override_arg = override_root.to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "agentbox",
            "--config",
            &config_arg,
            "--root-dir",
            &override_arg,
            "ls",
        ])
        .unwrap();
        let backend = cli.open_backend().unwrap();
        assert_eq!(backend.root(), override_root.canonicalize().unwrap());
    }

    #[test]
    fn test_open_backend_surfaces_selector_errors() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("agentbox.yaml");
        std::fs::write(&config_path, serde_yaml::to_string(&json!({"sandbox": {"type": "harbor"}})).unwrap())
            .unwrap();

        let config_arg = config_path.to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["agentbox", "--config", &config_arg, "kinds"]).unwrap();
        let err = cli.open_backend().err().expect("harbor is not available");
        assert!(err.to_string().contains("Harbor sandbox support coming soon"));
    }
}
