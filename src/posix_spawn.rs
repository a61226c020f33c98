//! `posix_spawn` spawner.
//!
//! The fast route: one library call creates the child, applies the file
//! actions (stream duplication, closing parent ends) and the attributes
//! (signal mask, signal defaults, process group), and execs the program.
//!
//! On Apple platforms the primitive also understands `POSIX_SPAWN_SETEXEC`,
//! which turns it into an exec of the calling process. That lets a forked
//! child apply credential and session changes first and then hand over to
//! `posix_spawn` instead of forking a second time. Elsewhere those requests
//! go to [`ForkExec`](crate::ForkExec).

use crate::dispatch::Spawner;
use crate::error::SpawnError;
use crate::prepared::PreparedSpawn;
use crate::streams::{must_relocate, StreamBindings};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg};
use nix::sys::signal::{SigSet, Signal};
use nix::unistd::Pid;
use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// The primitive can replace the calling process (`POSIX_SPAWN_SETEXEC`).
const CAN_SETEXEC: bool = cfg!(target_vendor = "apple");

/// The file-action list can change directory.
const CAN_CHDIR: bool = cfg!(target_vendor = "apple");

#[cfg(target_vendor = "apple")]
extern "C" {
    fn posix_spawn_file_actions_addchdir_np(
        file_actions: *mut libc::posix_spawn_file_actions_t,
        path: *const libc::c_char,
    ) -> libc::c_int;
}

/// Native `posix_spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixSpawn;

impl Spawner for PosixSpawn {
    fn name(&self) -> &'static str {
        "posix_spawn"
    }

    fn check(&self, prepared: &PreparedSpawn) -> Result<(), &'static str> {
        if prepared.cwd.is_some() && !CAN_CHDIR {
            return Err("working directory change is not a file action on this platform");
        }
        if prepared.requires_pre_exec_identity() && !CAN_SETEXEC {
            return Err("credential or session change needs a pre-exec step on this platform");
        }
        Ok(())
    }

    fn spawn(&self, prepared: &PreparedSpawn) -> Result<Pid, SpawnError> {
        if self.check(prepared).is_err() {
            return Err(SpawnError::Spawn(Errno::ENOTSUP));
        }

        // Held until the child has exec'd; close-on-exec keeps them out of it.
        let relocated = relocate_low_ends(&prepared.streams)?;

        let mut raw_actions = MaybeUninit::uninit();
        let mut actions = FileActions::new(&mut raw_actions)?;
        for ((fd, target), moved) in prepared.streams.child_ends().into_iter().zip(&relocated) {
            let source = match (fd, moved) {
                (_, Some(moved)) => moved.as_raw_fd(),
                (Some(fd), None) => fd,
                (None, None) => continue,
            };
            actions.add_dup2(source, target)?;
        }
        for fd in prepared.streams.parent_ends().into_iter().flatten() {
            actions.add_close(fd)?;
        }
        if let Some(cwd) = &prepared.cwd {
            actions.add_chdir(cwd)?;
        }

        let mut raw_attrs = MaybeUninit::uninit();
        let mut attrs = SpawnAttrs::new(&mut raw_attrs)?;
        attrs.set_sigmask(&SigSet::empty())?;
        attrs.set_sigdefault(&default_signals())?;

        let mut flags = libc::POSIX_SPAWN_SETSIGMASK | libc::POSIX_SPAWN_SETSIGDEF;
        // A session leader already leads its own group.
        if prepared.new_process_group && !prepared.new_session {
            flags |= libc::POSIX_SPAWN_SETPGROUP;
            attrs.set_pgroup(0)?;
        }
        attrs.set_flags(flags)?;

        if prepared.requires_pre_exec_identity() {
            return spawn_after_fork(prepared, &actions, &mut attrs, flags);
        }

        let mut pid: libc::pid_t = 0;
        check_rc(unsafe { posix_spawn(&mut pid, prepared, &actions, &attrs) })?;
        Ok(Pid::from_raw(pid))
    }
}

/// Fork, apply credentials and session in the child, then let `posix_spawn`
/// exec in place of the child with `POSIX_SPAWN_SETEXEC`.
#[cfg(target_vendor = "apple")]
fn spawn_after_fork(
    prepared: &PreparedSpawn,
    actions: &FileActions<'_>,
    attrs: &mut SpawnAttrs<'_>,
    flags: libc::c_int,
) -> Result<Pid, SpawnError> {
    use crate::child;
    use nix::unistd::{fork, ForkResult};

    // SAFETY: the child only calls async-signal-safe functions on memory
    // allocated before the fork, and exits instead of returning.
    match unsafe { fork() }.map_err(SpawnError::Fork)? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => {
            let setup = || -> nix::Result<()> {
                child::apply_identity(&prepared.identity)?;
                child::enter_session(prepared.new_session)
            };
            if let Err(errno) = setup() {
                child::exit_with(errno);
            }
            let rc = unsafe {
                libc::posix_spawnattr_setflags(
                    attrs.as_mut_ptr(),
                    (flags | libc::POSIX_SPAWN_SETEXEC) as libc::c_short,
                )
            };
            if rc != 0 {
                child::exit_with(Errno::from_raw(rc));
            }
            let mut pid: libc::pid_t = 0;
            let rc = unsafe { posix_spawn(&mut pid, prepared, actions, attrs) };
            child::exit_with(Errno::from_raw(rc))
        }
    }
}

#[cfg(not(target_vendor = "apple"))]
fn spawn_after_fork(
    _prepared: &PreparedSpawn,
    _actions: &FileActions<'_>,
    _attrs: &mut SpawnAttrs<'_>,
    _flags: libc::c_int,
) -> Result<Pid, SpawnError> {
    Err(SpawnError::Spawn(Errno::ENOTSUP))
}

unsafe fn posix_spawn(
    pid: &mut libc::pid_t,
    prepared: &PreparedSpawn,
    actions: &FileActions<'_>,
    attrs: &SpawnAttrs<'_>,
) -> libc::c_int {
    libc::posix_spawn(
        pid,
        prepared.program.as_ptr(),
        actions.as_ptr(),
        attrs.as_ptr(),
        prepared.argv.as_ptr() as *const *mut libc::c_char,
        prepared.envp.as_ptr() as *const *mut libc::c_char,
    )
}

/// Copy every child-side end that sits on another standard slot above
/// stderr, in the parent. File actions run in order, so without the copy a
/// later `dup2` would read a slot an earlier one already replaced.
fn relocate_low_ends(streams: &StreamBindings) -> Result<[Option<OwnedFd>; 3], SpawnError> {
    let mut relocated = [None, None, None];
    for (slot, (fd, target)) in relocated.iter_mut().zip(streams.child_ends()) {
        if let Some(fd) = fd.filter(|&fd| must_relocate(fd, target)) {
            let high = fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(libc::STDERR_FILENO + 1))
                .map_err(SpawnError::Spawn)?;
            // SAFETY: `high` was just returned by fcntl and has no other owner.
            *slot = Some(unsafe { OwnedFd::from_raw_fd(high) });
        }
    }
    Ok(relocated)
}

/// Every catchable signal, reset to its default disposition in the child.
fn default_signals() -> SigSet {
    let mut set = SigSet::all();
    set.remove(Signal::SIGKILL);
    set.remove(Signal::SIGSTOP);
    set
}

fn check_rc(rc: libc::c_int) -> Result<(), SpawnError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(SpawnError::Spawn(Errno::from_raw(rc)))
    }
}

/// Initialized `posix_spawn_file_actions_t`, destroyed on drop.
struct FileActions<'a>(&'a mut MaybeUninit<libc::posix_spawn_file_actions_t>);

impl<'a> FileActions<'a> {
    fn new(raw: &'a mut MaybeUninit<libc::posix_spawn_file_actions_t>) -> Result<Self, SpawnError> {
        check_rc(unsafe { libc::posix_spawn_file_actions_init(raw.as_mut_ptr()) })?;
        Ok(Self(raw))
    }

    fn as_ptr(&self) -> *const libc::posix_spawn_file_actions_t {
        self.0.as_ptr()
    }

    fn add_dup2(&mut self, fd: libc::c_int, target: libc::c_int) -> Result<(), SpawnError> {
        check_rc(unsafe { libc::posix_spawn_file_actions_adddup2(self.0.as_mut_ptr(), fd, target) })
    }

    fn add_close(&mut self, fd: libc::c_int) -> Result<(), SpawnError> {
        check_rc(unsafe { libc::posix_spawn_file_actions_addclose(self.0.as_mut_ptr(), fd) })
    }

    #[cfg(target_vendor = "apple")]
    fn add_chdir(&mut self, dir: &CStr) -> Result<(), SpawnError> {
        check_rc(unsafe { posix_spawn_file_actions_addchdir_np(self.0.as_mut_ptr(), dir.as_ptr()) })
    }

    #[cfg(not(target_vendor = "apple"))]
    fn add_chdir(&mut self, _dir: &CStr) -> Result<(), SpawnError> {
        Err(SpawnError::Spawn(Errno::ENOTSUP))
    }
}

impl Drop for FileActions<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawn_file_actions_destroy(self.0.as_mut_ptr());
        }
    }
}

/// Initialized `posix_spawnattr_t`, destroyed on drop.
struct SpawnAttrs<'a>(&'a mut MaybeUninit<libc::posix_spawnattr_t>);

impl<'a> SpawnAttrs<'a> {
    fn new(raw: &'a mut MaybeUninit<libc::posix_spawnattr_t>) -> Result<Self, SpawnError> {
        check_rc(unsafe { libc::posix_spawnattr_init(raw.as_mut_ptr()) })?;
        Ok(Self(raw))
    }

    fn as_ptr(&self) -> *const libc::posix_spawnattr_t {
        self.0.as_ptr()
    }

    #[cfg_attr(not(target_vendor = "apple"), allow(dead_code))]
    fn as_mut_ptr(&mut self) -> *mut libc::posix_spawnattr_t {
        self.0.as_mut_ptr()
    }

    fn set_sigmask(&mut self, set: &SigSet) -> Result<(), SpawnError> {
        check_rc(unsafe { libc::posix_spawnattr_setsigmask(self.0.as_mut_ptr(), set.as_ref()) })
    }

    fn set_sigdefault(&mut self, set: &SigSet) -> Result<(), SpawnError> {
        check_rc(unsafe { libc::posix_spawnattr_setsigdefault(self.0.as_mut_ptr(), set.as_ref()) })
    }

    fn set_pgroup(&mut self, pgroup: libc::pid_t) -> Result<(), SpawnError> {
        check_rc(unsafe { libc::posix_spawnattr_setpgroup(self.0.as_mut_ptr(), pgroup) })
    }

    fn set_flags(&mut self, flags: libc::c_int) -> Result<(), SpawnError> {
        check_rc(unsafe {
            libc::posix_spawnattr_setflags(self.0.as_mut_ptr(), flags as libc::c_short)
        })
    }
}

impl Drop for SpawnAttrs<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawnattr_destroy(self.0.as_mut_ptr());
        }
    }
}
