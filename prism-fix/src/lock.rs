use crate::error::LockError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::OpenOptions;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Lock file at the dataset root, held while fixes are written.
pub const LOCK_FILE: &str = ".prism.lock";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Exclusive, run-scoped dataset lock. Released on drop.
#[derive(Debug)]
pub struct DatasetLock {
    path: Utf8PathBuf,
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        debug!(path = %self.path, "lock released");
    }
}

#[derive(Debug)]
enum LockState {
    HeldBy(u32),
    Stale,
    Unknown,
}

impl DatasetLock {
    pub fn path_for(root: &Utf8Path) -> Utf8PathBuf {
        root.join(LOCK_FILE)
    }

    /// Acquire, waiting up to `timeout` for a live holder to let go.
    /// Locks left by dead processes are removed.
    pub fn acquire(root: &Utf8Path, timeout: Duration) -> Result<DatasetLock, LockError> {
        let path = Self::path_for(root);
        let started = Instant::now();
        loop {
            match try_acquire(&path)? {
                Ok(lock) => return Ok(lock),
                Err(LockState::Stale) => {
                    warn!(path = %path, "removing stale lock");
                    remove_stale(&path)?;
                }
                Err(state) => {
                    if started.elapsed() >= timeout {
                        return Err(match state {
                            LockState::HeldBy(pid) => LockError::Held { path, pid },
                            _ => LockError::Unknown { path },
                        });
                    }
                    thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    /// Wait up to `timeout` for the dataset to be unlocked. Returns `false` if
    /// a live holder still has it. Readers never take the lock themselves.
    pub fn wait_released(root: &Utf8Path, timeout: Duration) -> bool {
        let path = Self::path_for(root);
        let started = Instant::now();
        loop {
            match read_state(&path) {
                None | Some(LockState::Stale) => return true,
                Some(_) if started.elapsed() >= timeout => return false,
                Some(_) => thread::sleep(RETRY_DELAY),
            }
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

fn try_acquire(path: &Utf8Path) -> Result<Result<DatasetLock, LockState>, LockError> {
    match OpenOptions::new().create_new(true).write(true).open(path) {
        Ok(mut file) => {
            let _ = writeln!(file, "{}", std::process::id());
            debug!(path = %path, "lock acquired");
            Ok(Ok(DatasetLock {
                path: path.to_path_buf(),
            }))
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            Ok(Err(read_state(path).unwrap_or(LockState::Stale)))
        }
        Err(err) => Err(LockError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

/// `None` when no lock file exists.
fn read_state(path: &Utf8Path) -> Option<LockState> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(_) => return Some(LockState::Unknown),
    };
    Some(match text.trim().parse::<u32>() {
        Ok(pid) if is_process_running(pid) => LockState::HeldBy(pid),
        Ok(_) => LockState::Stale,
        Err(_) => LockState::Unknown,
    })
}

/// Move the lock aside before deleting it, so a lock another process
/// created after our read is put back instead of removed.
fn remove_stale(path: &Utf8Path) -> Result<(), LockError> {
    let io = |e: std::io::Error| LockError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let aside = path.with_extension(format!("lock.stale.{}.{nanos}", std::process::id()));
    match std::fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io(e)),
    }
    if let Some(LockState::HeldBy(pid)) = read_state(&aside) {
        debug!(path = %path, pid, "lock was replaced by a live holder; restoring");
        // hard_link refuses to overwrite, so a newer lock at `path` wins.
        if let Err(e) = std::fs::hard_link(&aside, path)
            && e.kind() != std::io::ErrorKind::AlreadyExists
        {
            let _ = std::fs::remove_file(&aside);
            return Err(io(e));
        }
    }
    std::fs::remove_file(&aside).map_err(io)
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    let proc_root = std::path::Path::new("/proc");
    if proc_root.join("self").exists() {
        return proc_root.join(pid.to_string()).exists();
    }
    // `kill -0` also fails on processes we may not signal; only ESRCH means gone.
    match std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(std::process::Stdio::piped())
        .output()
    {
        Ok(out) if out.status.success() => true,
        Ok(out) => !String::from_utf8_lossy(&out.stderr)
            .to_ascii_lowercase()
            .contains("no such process"),
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}
