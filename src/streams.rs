//! Standard stream bindings for a spawned child.
//!
//! Each of the three standard streams has two ends: the child-side end that is
//! duplicated onto fd 0/1/2 in the child, and an optional parent-side end that
//! the child must not keep open. `None` means "no redirection" for a child-side
//! end and "nothing to close" for a parent-side end.
//!
//! The descriptors are borrowed. The caller keeps ownership and closes its
//! parent-side ends after the spawn returns.

use std::os::unix::io::RawFd;

/// Descriptor layout for the child's stdin, stdout and stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamBindings {
    /// Read end duplicated onto the child's stdin.
    pub stdin: Option<RawFd>,
    /// Write end of the stdin pipe, held by the parent.
    pub stdin_parent: Option<RawFd>,
    /// Write end duplicated onto the child's stdout.
    pub stdout: Option<RawFd>,
    /// Read end of the stdout pipe, held by the parent.
    pub stdout_parent: Option<RawFd>,
    /// Write end duplicated onto the child's stderr.
    pub stderr: Option<RawFd>,
    /// Read end of the stderr pipe, held by the parent.
    pub stderr_parent: Option<RawFd>,
}

impl StreamBindings {
    /// No redirection: the child inherits all three standard streams.
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Build from the six-descriptor layout
    /// `[stdin, stdin_parent, stdout, stdout_parent, stderr, stderr_parent]`,
    /// where `0` is the "no redirection" sentinel.
    pub fn from_raw(fds: [RawFd; 6]) -> Self {
        let slot = |fd: RawFd| if fd == 0 { None } else { Some(fd) };
        Self {
            stdin: slot(fds[0]),
            stdin_parent: slot(fds[1]),
            stdout: slot(fds[2]),
            stdout_parent: slot(fds[3]),
            stderr: slot(fds[4]),
            stderr_parent: slot(fds[5]),
        }
    }

    /// Inverse of [`from_raw`](Self::from_raw).
    pub fn into_raw(self) -> [RawFd; 6] {
        [
            self.stdin.unwrap_or(0),
            self.stdin_parent.unwrap_or(0),
            self.stdout.unwrap_or(0),
            self.stdout_parent.unwrap_or(0),
            self.stderr.unwrap_or(0),
            self.stderr_parent.unwrap_or(0),
        ]
    }

    /// Redirect the child's stdin from `child`, closing `parent` in the child.
    pub fn with_stdin(mut self, child: RawFd, parent: Option<RawFd>) -> Self {
        self.stdin = Some(child);
        self.stdin_parent = parent;
        self
    }

    /// Redirect the child's stdout to `child`, closing `parent` in the child.
    pub fn with_stdout(mut self, child: RawFd, parent: Option<RawFd>) -> Self {
        self.stdout = Some(child);
        self.stdout_parent = parent;
        self
    }

    /// Redirect the child's stderr to `child`, closing `parent` in the child.
    pub fn with_stderr(mut self, child: RawFd, parent: Option<RawFd>) -> Self {
        self.stderr = Some(child);
        self.stderr_parent = parent;
        self
    }

    /// Child-side ends paired with the standard slot each one is duplicated onto.
    pub(crate) fn child_ends(&self) -> [(Option<RawFd>, RawFd); 3] {
        [
            (self.stdin, libc::STDIN_FILENO),
            (self.stdout, libc::STDOUT_FILENO),
            (self.stderr, libc::STDERR_FILENO),
        ]
    }

    /// Parent-side ends the child has to close.
    ///
    /// Descriptors that are themselves standard slots are skipped; by the time
    /// they would be closed they hold the child's own redirected streams.
    pub(crate) fn parent_ends(&self) -> [Option<RawFd>; 3] {
        let closable = |fd: Option<RawFd>| fd.filter(|&fd| fd > libc::STDERR_FILENO);
        [
            closable(self.stdin_parent),
            closable(self.stdout_parent),
            closable(self.stderr_parent),
        ]
    }
}

/// True if the child-side end `fd` sits on a standard slot other than its
/// `target`. An earlier `dup2` onto that slot would replace it, so it has to
/// be moved above stderr before any slot is written.
pub(crate) fn must_relocate(fd: RawFd, target: RawFd) -> bool {
    fd <= libc::STDERR_FILENO && fd != target
}
