//! Process spawn request.

use crate::streams::StreamBindings;
use nix::unistd::{Gid, Uid};
use std::ffi::OsString;
use std::path::PathBuf;

/// Environment handed to the child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Environment {
    /// Snapshot of the caller's environment at `prepare()` time (default).
    #[default]
    Inherit,

    /// Caller's environment with the given keys replaced or added.
    InheritWith(Vec<(OsString, OsString)>),

    /// Exactly these `KEY=VALUE` entries, in order. Duplicate keys are passed
    /// through as given.
    Custom(Vec<OsString>),
}

impl Environment {
    /// Build a custom environment from key/value pairs.
    pub fn custom<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Environment::Custom(
            pairs
                .into_iter()
                .map(|(k, v)| {
                    let mut entry = k.into();
                    entry.push("=");
                    entry.push(v.into());
                    entry
                })
                .collect(),
        )
    }
}

/// Credentials applied to the child before exec.
///
/// Each field is independent; any subset may be set. Changing credentials
/// normally requires the caller to be privileged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// User id set with `setuid`.
    pub uid: Option<Uid>,
    /// Group id set with `setgid`.
    pub gid: Option<Gid>,
    /// Supplementary groups set with `setgroups`. `Some(vec![])` drops all
    /// supplementary groups.
    pub groups: Option<Vec<Gid>>,
}

impl Identity {
    /// True if no credential change was requested.
    pub fn is_empty(&self) -> bool {
        self.uid.is_none() && self.gid.is_none() && self.groups.is_none()
    }
}

/// Which spawn mechanism to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Route {
    /// Let the dispatcher decide (default).
    #[default]
    Auto,
    /// Native `posix_spawn`. Rejected at `prepare()` if the platform cannot
    /// express the request with it.
    PosixSpawn,
    /// `fork` followed by `execve`. Always available.
    ForkExec,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Auto => write!(f, "auto"),
            Route::PosixSpawn => write!(f, "posix_spawn"),
            Route::ForkExec => write!(f, "fork_exec"),
        }
    }
}

/// A request to start a child process.
///
/// Must be turned into a [`PreparedSpawn`](crate::PreparedSpawn) by
/// [`prepare()`](SpawnRequest::prepare) before it can run.
#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    /// Program to execute.
    ///
    /// A path containing `/` is used as given. A bare name is resolved against
    /// `PATH` during `prepare()`.
    pub program: PathBuf,

    /// Full argument vector, including `argv[0]`.
    ///
    /// If empty, `argv[0]` defaults to the program path.
    pub args: Vec<OsString>,

    /// Environment for the child.
    pub env: Environment,

    /// Working directory. If `None`, the child inherits the caller's.
    pub cwd: Option<PathBuf>,

    /// Standard stream redirections.
    pub streams: StreamBindings,

    /// Credential changes.
    pub identity: Identity,

    /// Call `setsid()` in the child.
    pub new_session: bool,

    /// Put the child in a new process group of its own.
    pub new_process_group: bool,

    /// Spawn mechanism override.
    pub route: Route,
}

impl SpawnRequest {
    /// Create a request for `program` with the given full argument vector.
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the environment.
    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the stream bindings.
    pub fn with_streams(mut self, streams: StreamBindings) -> Self {
        self.streams = streams;
        self
    }

    /// Set the user id.
    pub fn with_uid(mut self, uid: Uid) -> Self {
        self.identity.uid = Some(uid);
        self
    }

    /// Set the group id.
    pub fn with_gid(mut self, gid: Gid) -> Self {
        self.identity.gid = Some(gid);
        self
    }

    /// Set the supplementary groups.
    pub fn with_groups(mut self, groups: impl IntoIterator<Item = Gid>) -> Self {
        self.identity.groups = Some(groups.into_iter().collect());
        self
    }

    /// Start a new session in the child.
    pub fn new_session(mut self, enabled: bool) -> Self {
        self.new_session = enabled;
        self
    }

    /// Start a new process group in the child.
    pub fn new_process_group(mut self, enabled: bool) -> Self {
        self.new_process_group = enabled;
        self
    }

    /// Force a spawn mechanism.
    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }
}
