//! Route selection between the two spawners.
//!
//! Both spawners implement [`Spawner`]. Which ones exist, and what the
//! `posix_spawn` route can express, is fixed at build time by the target
//! platform. The choice for a given request is made once, in `prepare()`, and
//! is never retried on the other route: a half-applied credential change
//! cannot be undone.

use crate::error::{ProcError, SpawnError, Violation};
use crate::fork_exec::ForkExec;
use crate::prepared::PreparedSpawn;
use crate::request::{Route, SpawnRequest};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// A way of turning a [`PreparedSpawn`] into a running child.
pub trait Spawner {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// `Ok` if this spawner can express `prepared` exactly; otherwise the
    /// reason it cannot.
    fn check(&self, prepared: &PreparedSpawn) -> Result<(), &'static str>;

    /// Start the child and return its pid.
    fn spawn(&self, prepared: &PreparedSpawn) -> Result<Pid, SpawnError>;
}

#[cfg(any(target_os = "linux", target_os = "freebsd", target_vendor = "apple"))]
fn posix_spawner() -> Option<&'static dyn Spawner> {
    Some(&crate::posix_spawn::PosixSpawn)
}

#[cfg(not(any(target_os = "linux", target_os = "freebsd", target_vendor = "apple")))]
fn posix_spawner() -> Option<&'static dyn Spawner> {
    None
}

/// The spawner behind a resolved route.
pub fn spawner_for(route: Route) -> &'static dyn Spawner {
    match route {
        Route::PosixSpawn => posix_spawner().unwrap_or(&ForkExec),
        Route::ForkExec | Route::Auto => &ForkExec,
    }
}

/// Resolve the requested route for `prepared`.
///
/// `Auto` prefers `posix_spawn` whenever it can express the request and falls
/// back to fork/exec otherwise. A forced `PosixSpawn` that cannot express the
/// request is a `Violation`.
pub(crate) fn select_route(requested: Route, prepared: &PreparedSpawn) -> Result<Route, Violation> {
    let fast = posix_spawner().map(|spawner| spawner.check(prepared));

    match (requested, fast) {
        (Route::ForkExec, _) => Ok(Route::ForkExec),
        (Route::Auto, Some(Ok(()))) => Ok(Route::PosixSpawn),
        (Route::Auto, Some(Err(reason))) => {
            debug!(reason, "falling back to fork_exec");
            Ok(Route::ForkExec)
        }
        (Route::Auto, None) => Ok(Route::ForkExec),
        (Route::PosixSpawn, Some(Ok(()))) => Ok(Route::PosixSpawn),
        (Route::PosixSpawn, Some(Err(reason))) => Err(Violation::FastPathUnavailable { reason }),
        (Route::PosixSpawn, None) => Err(Violation::FastPathUnavailable {
            reason: "posix_spawn is not available on this platform",
        }),
    }
}

impl PreparedSpawn {
    /// Start the child on the route chosen at `prepare()` time.
    ///
    /// # Returns
    ///
    /// The child's pid. The child may still fail before or during exec; such
    /// failures show up only as its exit status, which carries the errno.
    ///
    /// # Errors
    ///
    /// - `SpawnError::Fork` if `fork()` failed
    /// - `SpawnError::Spawn` if `posix_spawn()` or its setup failed
    pub fn spawn(&self) -> Result<Pid, SpawnError> {
        let spawner = spawner_for(self.route);
        match spawner.spawn(self) {
            Ok(pid) => {
                debug!(
                    %pid,
                    route = spawner.name(),
                    program = %self.program().display(),
                    "spawned child"
                );
                Ok(pid)
            }
            Err(err) => {
                warn!(
                    route = spawner.name(),
                    program = %self.program().display(),
                    error = %err,
                    "spawn failed"
                );
                Err(err)
            }
        }
    }
}

/// Prepare `request` and spawn it in one call.
///
/// # Errors
///
/// `ProcError::Violation` if the request is rejected by `prepare()`,
/// `ProcError::Spawn` if the OS refuses to create the child.
pub fn spawn(request: SpawnRequest) -> Result<Pid, ProcError> {
    let prepared = request.prepare()?;
    Ok(prepared.spawn()?)
}
