//! Configuration-driven sandbox backends for agents.
//!
//! A sandbox backend gives an agent file access rooted at a directory and,
//! where supported, shell command execution with captured output and a
//! timeout. Backends are chosen from a declarative record:
//!
//! ```no_run
//! use agentbox::sandbox::{CommandExecutor, SandboxBackend, create_sandbox_backend};
//! use serde_json::json;
//!
//! let backend = create_sandbox_backend(&json!({"type": "filesystem", "root_dir": "/tmp/ws"}))?;
//! backend.write_file("hello.txt", "hi")?;
//! if let Some(exec) = backend.executor() {
//!     let result = exec.execute("cat hello.txt", None)?;
//!     assert_eq!(result.stdout, "hi");
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod cmd;
pub mod config;
pub mod sandbox;
pub mod shell;
