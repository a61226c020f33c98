//! Fork-then-exec spawner.
//!
//! The general route, available everywhere. The parent forks and returns the
//! child pid immediately. The child runs a fixed sequence of pre-exec steps
//! from [`crate::child`], then `execve`. If any step or the exec itself fails,
//! the child exits with the errno as its exit status; the parent never sees
//! that failure except through the child's wait status.

use crate::child;
use crate::dispatch::Spawner;
use crate::error::SpawnError;
use crate::prepared::PreparedSpawn;
use nix::errno::Errno;
use nix::unistd::{fork, ForkResult, Pid};

/// `fork` + `execve`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForkExec;

impl Spawner for ForkExec {
    fn name(&self) -> &'static str {
        "fork_exec"
    }

    fn check(&self, _prepared: &PreparedSpawn) -> Result<(), &'static str> {
        Ok(())
    }

    fn spawn(&self, prepared: &PreparedSpawn) -> Result<Pid, SpawnError> {
        // SAFETY: the child only runs `run_child`, which restricts itself to
        // async-signal-safe calls on data allocated before the fork, and
        // never returns.
        match unsafe { fork() }.map_err(SpawnError::Fork)? {
            ForkResult::Parent { child } => Ok(child),
            ForkResult::Child => child::exit_with(run_child(prepared)),
        }
    }
}

/// The child side. Returns only on failure, with the errno to exit with.
fn run_child(prepared: &PreparedSpawn) -> Errno {
    let setup = || -> nix::Result<()> {
        child::change_directory(prepared.cwd.as_deref())?;
        child::apply_identity(&prepared.identity)?;
        child::enter_session(prepared.new_session)?;
        child::enter_process_group(prepared.new_process_group, prepared.new_session)?;
        child::bind_streams(&prepared.streams)?;
        child::close_parent_ends(&prepared.streams)?;
        child::reset_signals()
    };

    if let Err(errno) = setup() {
        return errno;
    }

    unsafe {
        libc::execve(
            prepared.program.as_ptr(),
            prepared.argv.as_ptr(),
            prepared.envp.as_ptr(),
        );
    }
    Errno::last()
}
