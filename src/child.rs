//! Pre-exec steps run inside the forked child.
//!
//! Everything here executes between `fork()` and `exec()`. Only
//! async-signal-safe calls are allowed: no allocation, no locks, no logging.
//! Every input was built by `prepare()` in the parent.
//!
//! Each step returns `nix::Result<()>` so a sequence of them short-circuits
//! on the first failure. The caller turns that failure into the child's exit
//! status with [`exit_with`].

use crate::prepared::RawIdentity;
use crate::streams::{must_relocate, StreamBindings};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::signal::{
    sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use nix::unistd::{self, Gid, Pid, Uid};
use std::ffi::CStr;
use std::os::unix::io::RawFd;

/// Change the working directory.
pub(crate) fn change_directory(cwd: Option<&CStr>) -> nix::Result<()> {
    match cwd {
        Some(dir) => unistd::chdir(dir),
        None => Ok(()),
    }
}

/// Apply credentials: gid, then supplementary groups, then uid.
///
/// The gid and group list are set while the process still holds the
/// privilege to change them; `setuid` to an unprivileged user comes last.
pub(crate) fn apply_identity(identity: &RawIdentity) -> nix::Result<()> {
    if let Some(gid) = identity.gid {
        unistd::setgid(Gid::from_raw(gid))?;
    }
    if let Some(groups) = &identity.groups {
        set_groups(groups)?;
    }
    if let Some(uid) = identity.uid {
        unistd::setuid(Uid::from_raw(uid))?;
    }
    Ok(())
}

// nix does not expose setgroups on every platform; the raw call is the same
// everywhere modulo the length type.
fn set_groups(groups: &[libc::gid_t]) -> nix::Result<()> {
    let res = unsafe { libc::setgroups(groups.len() as _, groups.as_ptr()) };
    Errno::result(res).map(drop)
}

/// Start a new session if requested.
pub(crate) fn enter_session(enabled: bool) -> nix::Result<()> {
    if enabled {
        unistd::setsid()?;
    }
    Ok(())
}

/// Start a new process group if requested.
///
/// A session leader already leads its own process group and `setpgid` would
/// fail with `EPERM`, so it is skipped after `setsid`.
pub(crate) fn enter_process_group(enabled: bool, session_created: bool) -> nix::Result<()> {
    if enabled && !session_created {
        unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
    }
    Ok(())
}

/// Duplicate each child-side end onto its standard slot.
///
/// Ends that sit on another standard slot are first copied above stderr
/// (close-on-exec), so a swap such as stdout=2, stderr=1 sees the original
/// descriptors. When an end already sits on its own slot, `dup2` would be a
/// no-op that leaves `FD_CLOEXEC` set, so the flag is cleared instead.
pub(crate) fn bind_streams(streams: &StreamBindings) -> nix::Result<()> {
    let mut sources: [Option<RawFd>; 3] = [None; 3];
    for (source, (fd, target)) in sources.iter_mut().zip(streams.child_ends()) {
        *source = match fd {
            Some(fd) if must_relocate(fd, target) => {
                Some(fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(libc::STDERR_FILENO + 1))?)
            }
            other => other,
        };
    }

    for (fd, (_, target)) in sources.into_iter().zip(streams.child_ends()) {
        let Some(fd) = fd else { continue };
        if fd == target {
            let flags = FdFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFD)?);
            fcntl(fd, FcntlArg::F_SETFD(flags - FdFlag::FD_CLOEXEC))?;
        } else {
            retry(|| unistd::dup2(fd, target))?;
        }
    }
    Ok(())
}

/// Close the parent-side ends.
///
/// Every close is attempted; the first failure is reported once all of them
/// have run, so one bad descriptor does not leak the others into the child.
pub(crate) fn close_parent_ends(streams: &StreamBindings) -> nix::Result<()> {
    let mut first_error = None;
    for fd in streams.parent_ends().into_iter().flatten() {
        if let Err(e) = unistd::close(fd) {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Empty the signal mask and restore default dispositions.
///
/// Matches what the posix_spawn route requests with `SETSIGMASK` and
/// `SETSIGDEF`.
pub(crate) fn reset_signals() -> nix::Result<()> {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in Signal::iterator() {
        if matches!(signal, Signal::SIGKILL | Signal::SIGSTOP) {
            continue;
        }
        unsafe { sigaction(signal, &default) }?;
    }
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)
}

/// Terminate the child, surfacing `errno` as its exit status.
pub(crate) fn exit_with(errno: Errno) -> ! {
    unsafe { libc::_exit(errno as i32) }
}

fn retry<T>(mut f: impl FnMut() -> nix::Result<T>) -> nix::Result<T> {
    loop {
        match f() {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}
