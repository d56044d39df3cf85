//! Error types for prism-fix.
//!
//! Lock contention is reported separately from runtime failures so callers
//! can tell "try again later" from "something is broken".

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixError {
    #[error("dataset locked: {0}")]
    Locked(#[from] LockError),

    #[error("runtime error: {0:#}")]
    Runtime(#[from] anyhow::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("{path} is held by pid {pid}")]
    Held { path: Utf8PathBuf, pid: u32 },

    #[error("{path} exists and its owner cannot be determined; remove it if no prism process is running")]
    Unknown { path: Utf8PathBuf },

    #[error("cannot create {path}: {message}")]
    Io { path: Utf8PathBuf, message: String },
}

impl FixError {
    pub fn is_locked(&self) -> bool {
        matches!(self, FixError::Locked(_))
    }

    /// Recommended process exit code.
    pub fn exit_code(&self) -> u8 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_error_converts_and_reports() {
        let err = FixError::from(LockError::Held {
            path: ".prism.lock".into(),
            pid: 42,
        });
        assert!(err.is_locked());
        assert!(err.to_string().contains("pid 42"));
    }

    #[test]
    fn runtime_error_is_not_locked() {
        let err = FixError::from(anyhow::anyhow!("disk full"));
        assert!(!err.is_locked());
        assert!(err.to_string().contains("disk full"));
    }
}
