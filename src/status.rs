//! Wait status decoding.

use crate::error::SpawnError;
use nix::errno::Errno;
use nix::unistd::Pid;

/// How a child terminated, in short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// Exited normally with this code.
    Exited(i32),
    /// Killed by this signal.
    Signaled(i32),
    /// Neither (stopped, continued, or not a termination status at all).
    Other(i32),
}

/// Raw status from the `wait` family.
///
/// Decoding is pure: the same raw value always yields the same answers, and
/// every value decodes to something, whether or not it came from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitStatus(libc::c_int);

impl WaitStatus {
    /// Wrap a raw status.
    pub const fn from_raw(status: libc::c_int) -> Self {
        Self(status)
    }

    /// The raw status.
    pub const fn into_raw(self) -> libc::c_int {
        self.0
    }

    /// Did the process exit normally?
    pub fn exited(&self) -> bool {
        libc::WIFEXITED(self.0)
    }

    /// Exit code bits of the status. Only meaningful when [`exited`](Self::exited).
    pub fn exit_code(&self) -> i32 {
        libc::WEXITSTATUS(self.0)
    }

    /// Was the process terminated by a signal?
    pub fn signaled(&self) -> bool {
        libc::WIFSIGNALED(self.0)
    }

    /// Signal bits of the status. Only meaningful when [`signaled`](Self::signaled).
    pub fn signal_number(&self) -> i32 {
        libc::WTERMSIG(self.0)
    }

    /// Exit code, if the process exited.
    pub fn code(&self) -> Option<i32> {
        self.exited().then(|| self.exit_code())
    }

    /// Terminating signal, if the process was signaled.
    pub fn signal(&self) -> Option<i32> {
        self.signaled().then(|| self.signal_number())
    }

    /// Did a signal termination leave a core dump?
    pub fn core_dumped(&self) -> bool {
        self.signaled() && libc::WCOREDUMP(self.0)
    }

    /// Signal that stopped the process, if the status reports a stop.
    pub fn stopped_signal(&self) -> Option<i32> {
        libc::WIFSTOPPED(self.0).then(|| libc::WSTOPSIG(self.0))
    }

    /// Was a stopped process resumed by `SIGCONT`?
    pub fn continued(&self) -> bool {
        libc::WIFCONTINUED(self.0)
    }

    /// True for a normal exit with code 0.
    pub fn success(&self) -> bool {
        self.code() == Some(0)
    }

    /// Collapse into a [`Termination`].
    pub fn termination(&self) -> Termination {
        if let Some(code) = self.code() {
            Termination::Exited(code)
        } else if let Some(signal) = self.signal() {
            Termination::Signaled(signal)
        } else {
            Termination::Other(self.0)
        }
    }
}

impl From<libc::c_int> for WaitStatus {
    fn from(status: libc::c_int) -> Self {
        Self(status)
    }
}

impl std::fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = self.code() {
            write!(f, "exit status: {}", code)
        } else if let Some(signal) = self.signal() {
            if self.core_dumped() {
                write!(f, "signal: {} (core dumped)", signal)
            } else {
                write!(f, "signal: {}", signal)
            }
        } else if let Some(signal) = self.stopped_signal() {
            write!(f, "stopped by signal: {}", signal)
        } else if self.continued() {
            write!(f, "continued")
        } else {
            write!(f, "unrecognised wait status: {} {:#x}", self.0, self.0)
        }
    }
}

/// Block until `pid` terminates and return its status.
///
/// Retries on `EINTR`.
///
/// # Errors
///
/// `SpawnError::Wait` if `waitpid` fails, e.g. `ECHILD` for a pid that is not
/// our child or was already reaped.
pub fn wait_pid(pid: Pid) -> Result<WaitStatus, SpawnError> {
    let mut status: libc::c_int = 0;
    loop {
        let res = unsafe { libc::waitpid(pid.as_raw(), &mut status, 0) };
        match Errno::result(res) {
            Ok(_) => return Ok(WaitStatus(status)),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(SpawnError::Wait(e)),
        }
    }
}
