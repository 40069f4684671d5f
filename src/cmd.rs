use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use wait_timeout::ChildExt;

use crate::sandbox::ExecutionResult;

/// Exit code reported when a command is killed for exceeding its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How long to wait for pipes to close after killing a timed out command
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Shell used when none is configured
pub const DEFAULT_SHELL: &str = "sh";

/// A builder for running a command line through a shell with captured output
pub struct ShellCmd<'a> {
    command: &'a str,
    shell: &'a str,
    workdir: Option<&'a Path>,
    timeout: Option<Duration>,
    envs: Vec<(&'a str, &'a str)>,
}

enum Outcome {
    Exited(ExitStatus),
    TimedOut(Duration),
}

impl<'a> ShellCmd<'a> {
    /// Create a new command builder for `<shell> -c <command>`
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            shell: DEFAULT_SHELL,
            workdir: None,
            timeout: None,
            envs: Vec::new(),
        }
    }

    /// Set the shell binary (default: `sh`)
    pub fn shell(mut self, shell: &'a str) -> Self {
        self.shell = shell;
        self
    }

    /// Set the working directory for the command
    pub fn workdir(mut self, path: &'a Path) -> Self {
        self.workdir = Some(path);
        self
    }

    /// Kill the command if it runs longer than `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add an environment variable on top of the inherited environment
    pub fn env(mut self, key: &'a str, value: &'a str) -> Self {
        self.envs.push((key, value));
        self
    }

    /// Execute the command and capture its result.
    ///
    /// Non-zero exits and timeouts are returned as an [`ExecutionResult`].
    /// The timeout covers the shell and anything it leaves holding the output
    /// pipes; when it passes, the whole process group is killed.
    /// Returns an error only if the shell cannot be spawned or waited on.
    pub fn run(self) -> Result<ExecutionResult> {
        let ShellCmd {
            command,
            shell,
            workdir,
            timeout,
            envs,
        } = self;
        let workdir_display = workdir.map(|p| p.display().to_string());

        trace!(command, shell, workdir = ?workdir_display, ?timeout, "cmd:run start");

        let mut cmd = Command::new(shell);
        cmd.arg("-c").arg(command);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        cmd.envs(envs);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a timeout can take down the whole pipeline
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let started = Instant::now();
        let deadline = timeout.map(|limit| started + limit);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute command with {}: {}", shell, command))?;

        let (tx, rx) = mpsc::channel();
        let mut captured = Captured::default();
        captured.pending += spawn_reader(Stream::Stdout, child.stdout.take(), &tx);
        captured.pending += spawn_reader(Stream::Stderr, child.stderr.take(), &tx);
        drop(tx);

        let status = match deadline {
            Some(deadline) => child
                .wait_timeout(deadline.saturating_duration_since(Instant::now()))
                .context("Failed to wait for command")?,
            None => Some(child.wait().context("Failed to wait for command")?),
        };

        // A background descendant can hold the pipes open after the shell
        // exits, so draining them runs against the same deadline.
        let exited = status.filter(|_| captured.drain(&rx, deadline));

        let outcome = match exited {
            Some(status) => Outcome::Exited(status),
            None => {
                let limit = timeout.unwrap_or_default();
                debug!(command, pid = child.id(), ?limit, "cmd:run timeout, killing");
                kill_process_group(&mut child);
                if status.is_none() {
                    child.wait().context("Failed to reap timed out command")?;
                }
                if !captured.drain(&rx, Some(Instant::now() + KILL_GRACE)) {
                    debug!(
                        command,
                        pending = captured.pending,
                        "cmd:run pipes still open after kill"
                    );
                }
                Outcome::TimedOut(limit)
            }
        };

        let stdout = String::from_utf8_lossy(&captured.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&captured.stderr).into_owned();

        let exit_code = match outcome {
            Outcome::Exited(status) => exit_code(status),
            Outcome::TimedOut(limit) => {
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!(
                    "Command timed out after {} seconds",
                    limit.as_secs_f64()
                ));
                TIMEOUT_EXIT_CODE
            }
        };

        debug!(
            command,
            exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cmd:run finished"
        );
        Ok(ExecutionResult::new(exit_code, stdout, stderr))
    }
}

/// Which pipe a reader thread drained
#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Output collected from the reader threads
#[derive(Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    /// Reader threads that have not reported back yet
    pending: usize,
}

impl Captured {
    /// Collect finished readers until all have reported or `deadline` passes.
    /// Returns false if some pipe was still open at the deadline.
    fn drain(&mut self, rx: &Receiver<(Stream, Vec<u8>)>, deadline: Option<Instant>) -> bool {
        while self.pending > 0 {
            let received = match deadline {
                Some(deadline) => {
                    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((Stream::Stdout, buf)) => self.stdout = buf,
                Ok((Stream::Stderr, buf)) => self.stderr = buf,
                Err(RecvTimeoutError::Timeout) => return false,
                // Every sender is gone, nothing more will arrive
                Err(RecvTimeoutError::Disconnected) => {
                    self.pending = 0;
                    return true;
                }
            }
            self.pending -= 1;
        }
        true
    }
}

/// Read `pipe` to EOF on its own thread. Returns the number of readers started.
fn spawn_reader<R: Read + Send + 'static>(
    stream: Stream,
    pipe: Option<R>,
    tx: &Sender<(Stream, Vec<u8>)>,
) -> usize {
    let Some(mut reader) = pipe else {
        return 0;
    };
    let tx = tx.clone();
    thread::spawn(move || {
        let mut buf = Vec::new();
        // A read error just truncates the capture
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send((stream, buf));
    });
    1
}

/// Map an exit status to a shell-style exit code (128 + N for signal N)
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // The child leads its own group (process_group(0)), so pgid == pid
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        debug!(pid = child.id(), error = %e, "cmd:killpg failed, killing child only");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}
