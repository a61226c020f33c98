//! Error types for proc_spawn.
//!
//! This module defines two main error categories:
//! - [`Violation`]: Problems detected during `prepare()` - the request is rejected
//!   before any process exists
//! - [`SpawnError`]: OS failures of the spawn call itself - fork, `posix_spawn`, or wait
//!
//! Failures inside the child between fork and exec are NOT reported here. They
//! surface only as the child's exit status (see [`crate::WaitStatus`]).

use nix::errno::Errno;
use thiserror::Error;

/// Request rejected during `prepare()`.
///
/// All error messages are safe to log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Program path is empty
    #[error("program path is empty")]
    EmptyProgram,

    /// A string destined for the child contains a NUL byte
    #[error("{field} contains an interior NUL byte: {value:?}")]
    InteriorNul { field: &'static str, value: String },

    /// A bare program name could not be found on the search path
    #[error("executable not found: {name}")]
    ExecutableNotFound { name: String },

    /// Requested working directory does not exist
    #[error("working directory not found: {path}")]
    WorkingDirectoryNotFound { path: String },

    /// Requested working directory is not a directory
    #[error("working directory is not a directory: {path}")]
    WorkingDirectoryNotDirectory { path: String },

    /// The posix_spawn route was forced but cannot express the request
    #[error("posix_spawn route cannot express this request: {reason}")]
    FastPathUnavailable { reason: &'static str },
}

/// OS failure while creating or reaping a process.
///
/// Carries the same errno a native `fork`/`posix_spawn`/`waitpid` call would
/// report, so callers can present identical diagnostics.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// `fork()` failed; no process was created
    #[error("fork failed: {0}")]
    Fork(Errno),

    /// `posix_spawn()` or one of its attribute/file-action setup calls failed
    #[error("posix_spawn failed: {0}")]
    Spawn(Errno),

    /// `waitpid()` failed
    #[error("waitpid failed: {0}")]
    Wait(Errno),
}

impl SpawnError {
    /// The underlying errno.
    pub fn errno(&self) -> Errno {
        match *self {
            SpawnError::Fork(e) | SpawnError::Spawn(e) | SpawnError::Wait(e) => e,
        }
    }

    /// The raw OS error number.
    pub fn raw_os_error(&self) -> i32 {
        self.errno() as i32
    }
}

impl From<SpawnError> for std::io::Error {
    fn from(err: SpawnError) -> Self {
        std::io::Error::from_raw_os_error(err.raw_os_error())
    }
}

/// Combined error type for the prepare-and-spawn flow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcError {
    #[error(transparent)]
    Violation(#[from] Violation),

    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

impl ProcError {
    /// The errno when the failure came from the OS, `None` for rejected requests.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            ProcError::Violation(_) => None,
            ProcError::Spawn(e) => Some(e.raw_os_error()),
        }
    }
}
