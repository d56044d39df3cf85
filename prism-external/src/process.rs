use camino::Utf8PathBuf;
use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' did not finish within {}s", .timeout.as_secs_f64())]
    Timeout { program: String, timeout: Duration },

    #[error("waiting for '{program}' failed: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub cwd: Option<Utf8PathBuf>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            cwd: None,
            stdin: None,
            timeout,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Last non-empty stderr line, for short diagnostics.
    pub fn stderr_tail(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
    }
}

/// Run a command to completion or kill it at the deadline.
///
/// Pipes are drained on helper threads and collected against the same
/// deadline, so a descendant that keeps them open cannot outlive it.
pub fn run(spec: &CommandSpec) -> Result<CommandOutput, ExternalError> {
    let Some((program, args)) = spec.argv.split_first() else {
        return Err(ExternalError::EmptyCommand);
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    // Own process group, so the deadline reaches anything the child spawns.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| ExternalError::Spawn {
        program: program.clone(),
        source,
    })?;
    debug!(program = %program, pid = child.id(), "spawned");

    if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), spec.stdin.clone()) {
        // Detached: a grandchild holding stdin open must not stall us.
        thread::spawn(move || {
            // Broken pipe when the child exits without reading.
            let _ = pipe.write_all(&bytes);
        });
    }
    let stdout_rx = child.stdout.take().map(drain);
    let stderr_rx = child.stderr.take().map(drain);

    let deadline = Instant::now() + spec.timeout;
    let timed_out = |child: &mut Child| {
        kill_tree(child);
        let _ = child.wait();
        debug!(program = %program, "killed at deadline");
        ExternalError::Timeout {
            program: program.clone(),
            timeout: spec.timeout,
        }
    };

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => return Err(timed_out(&mut child)),
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                kill_tree(&mut child);
                return Err(ExternalError::Wait {
                    program: program.clone(),
                    source,
                });
            }
        }
    };

    // The child is gone but a descendant may still hold its pipes open.
    let Some(stdout) = collect(stdout_rx, deadline) else {
        return Err(timed_out(&mut child));
    };
    let Some(stderr) = collect(stderr_rx, deadline) else {
        return Err(timed_out(&mut child));
    };

    Ok(CommandOutput {
        code: status.code(),
        success: status.success(),
        stdout,
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Pipe contents, or `None` if the pipe is still open at `deadline`.
fn collect(rx: Option<mpsc::Receiver<Vec<u8>>>, deadline: Instant) -> Option<String> {
    let Some(rx) = rx else {
        return Some(String::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(mpsc::RecvTimeoutError::Timeout) => None,
        Err(mpsc::RecvTimeoutError::Disconnected) => Some(String::new()),
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    // A negative pid names the process group.
    let _ = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{}", child.id())])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}
