//! # proc_spawn
//!
//! Low-level process spawning for Unix.
//!
//! `proc_spawn` starts a child process from a fully described request: program,
//! arguments, environment, working directory, standard stream bindings,
//! credentials, session and process group. It picks the cheapest mechanism the
//! platform offers that can express the request exactly (`posix_spawn` when it
//! can, `fork` + `execve` otherwise) and returns the child pid.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use proc_spawn::{wait_pid, Environment, SpawnRequest, StreamBindings};
//! use nix::unistd::pipe;
//! use std::os::fd::AsRawFd;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (read, write) = pipe()?;
//!
//! let request = SpawnRequest::new("/bin/echo", ["echo", "hello"])
//!     .with_env(Environment::InheritWith(vec![("LANG".into(), "C".into())]))
//!     .with_streams(
//!         StreamBindings::inherit().with_stdout(write.as_raw_fd(), Some(read.as_raw_fd())),
//!     )
//!     .new_process_group(true);
//!
//! // Validate and allocate everything the child needs
//! let prepared = request.prepare()?;
//! let pid = prepared.spawn()?;
//! drop(write);
//!
//! let status = wait_pid(pid)?;
//! println!("child finished: {}", status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Principles
//!
//! - **Prepare, then spawn**: every C string and pointer array is built by
//!   `prepare()`; the child never allocates between fork and exec
//! - **One route per call**: the mechanism is chosen once and never retried
//! - **Errors are errno**: spawn failures carry the OS error code; failures in
//!   the child before exec become its exit status
//! - **Same child either way**: both routes bind streams, close parent ends and
//!   reset signal state identically
//!
//! ## Platform Support
//!
//! Unix only (Linux, macOS, the BSDs). On Apple platforms `posix_spawn` also
//! covers credential, session and working directory changes.

#[cfg(windows)]
compile_error!(
    "proc_spawn does not support Windows. \
     It is built on fork, execve and posix_spawn."
);

mod child;
mod dispatch;
pub mod environ;
mod error;
mod fork_exec;
#[cfg(any(target_os = "linux", target_os = "freebsd", target_vendor = "apple"))]
mod posix_spawn;
mod prepared;
mod request;
mod resolve;
mod status;
mod streams;

// Public API
pub use dispatch::{spawn, spawner_for, Spawner};
pub use error::{ProcError, SpawnError, Violation};
pub use fork_exec::ForkExec;
#[cfg(any(target_os = "linux", target_os = "freebsd", target_vendor = "apple"))]
pub use posix_spawn::PosixSpawn;
pub use prepared::PreparedSpawn;
pub use request::{Environment, Identity, Route, SpawnRequest};
pub use resolve::{resolve_executable, DEFAULT_SEARCH_PATHS};
pub use status::{wait_pid, Termination, WaitStatus};
pub use streams::StreamBindings;

pub use nix::unistd::{Gid, Pid, Uid};
