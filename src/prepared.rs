//! Prepared spawn ready for execution.
//!
//! This module contains `PreparedSpawn`, which can only be created by
//! `SpawnRequest::prepare()`. Everything the child needs between fork and exec
//! is allocated here, in the parent, so the child never touches the allocator.

use crate::dispatch;
use crate::environ;
use crate::error::Violation;
use crate::request::{Environment, Route, SpawnRequest};
use crate::resolve::resolve_executable;
use crate::streams::StreamBindings;
use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use tracing::trace;

/// NUL-terminated array of C strings, as `execve` and `posix_spawn` expect.
pub(crate) struct CStringArray {
    items: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

// The pointers only ever reference the heap buffers owned by `items`, which
// are never mutated after construction.
unsafe impl Send for CStringArray {}
unsafe impl Sync for CStringArray {}

impl CStringArray {
    fn new(items: Vec<CString>) -> Self {
        let mut ptrs: Vec<*const libc::c_char> = items.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(ptr::null());
        Self { items, ptrs }
    }

    pub(crate) fn as_ptr(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }

    pub(crate) fn items(&self) -> &[CString] {
        &self.items
    }
}

impl Clone for CStringArray {
    fn clone(&self) -> Self {
        Self::new(self.items.clone())
    }
}

impl std::fmt::Debug for CStringArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.items).finish()
    }
}

/// Credentials in the raw form the child applies them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RawIdentity {
    pub(crate) uid: Option<libc::uid_t>,
    pub(crate) gid: Option<libc::gid_t>,
    pub(crate) groups: Option<Vec<libc::gid_t>>,
}

impl RawIdentity {
    pub(crate) fn is_empty(&self) -> bool {
        self.uid.is_none() && self.gid.is_none() && self.groups.is_none()
    }
}

/// A validated spawn ready for execution.
///
/// This type cannot be constructed outside of `proc_spawn`.
/// The only way to create it is via `SpawnRequest::prepare()`.
#[derive(Debug, Clone)]
pub struct PreparedSpawn {
    pub(crate) program: CString,
    pub(crate) argv: CStringArray,
    pub(crate) envp: CStringArray,
    pub(crate) cwd: Option<CString>,
    pub(crate) streams: StreamBindings,
    pub(crate) identity: RawIdentity,
    pub(crate) new_session: bool,
    pub(crate) new_process_group: bool,
    pub(crate) route: Route,
}

impl PreparedSpawn {
    /// Resolved program path.
    pub fn program(&self) -> &Path {
        Path::new(OsStr::from_bytes(self.program.as_bytes()))
    }

    /// Argument vector, including `argv[0]`.
    pub fn argv(&self) -> Vec<&OsStr> {
        self.argv
            .items()
            .iter()
            .map(|s| OsStr::from_bytes(s.as_bytes()))
            .collect()
    }

    /// Environment entries, `KEY=VALUE`.
    pub fn envp(&self) -> Vec<&OsStr> {
        self.envp
            .items()
            .iter()
            .map(|s| OsStr::from_bytes(s.as_bytes()))
            .collect()
    }

    /// Working directory override, if any.
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd
            .as_ref()
            .map(|c| Path::new(OsStr::from_bytes(c.as_bytes())))
    }

    /// Stream bindings.
    pub fn streams(&self) -> &StreamBindings {
        &self.streams
    }

    /// The route chosen by the dispatcher. Never `Route::Auto`.
    pub fn route(&self) -> Route {
        self.route
    }

    /// True if the child has to change something before exec that a plain
    /// `posix_spawn` cannot express atomically.
    pub(crate) fn requires_pre_exec_identity(&self) -> bool {
        !self.identity.is_empty() || self.new_session
    }
}

impl SpawnRequest {
    /// Validate the request and prepare it for execution.
    ///
    /// This is the ONLY way to create a `PreparedSpawn`.
    ///
    /// # Errors
    ///
    /// Returns a `Violation` if the request cannot be turned into a spawn:
    /// empty or unresolvable program, NUL bytes, missing working directory,
    /// or a forced route that cannot express the request.
    pub fn prepare(self) -> Result<PreparedSpawn, Violation> {
        let env_entries = match &self.env {
            Environment::Inherit => environ::snapshot(&[]),
            Environment::InheritWith(overrides) => environ::snapshot(overrides),
            Environment::Custom(entries) => entries.clone(),
        };

        // A path is handed to exec untouched; exec reports its own errors.
        let program = if self.program.as_os_str().as_bytes().contains(&b'/') {
            self.program.clone()
        } else {
            resolve_executable(
                &self.program,
                environ::lookup(&env_entries, OsStr::new("PATH")),
            )?
        };

        let program_c = to_cstring("program path", program.as_os_str())?;

        let argv = if self.args.is_empty() {
            vec![program_c.clone()]
        } else {
            self.args
                .iter()
                .map(|arg| to_cstring("argument", arg))
                .collect::<Result<_, _>>()?
        };

        let envp = env_entries
            .iter()
            .map(|entry| to_cstring("environment entry", entry))
            .collect::<Result<_, _>>()?;

        let cwd = match &self.cwd {
            Some(dir) => {
                check_working_directory(dir)?;
                Some(to_cstring("working directory", dir.as_os_str())?)
            }
            None => None,
        };

        let identity = RawIdentity {
            uid: self.identity.uid.map(|u| u.as_raw()),
            gid: self.identity.gid.map(|g| g.as_raw()),
            groups: self
                .identity
                .groups
                .as_ref()
                .map(|groups| groups.iter().map(|g| g.as_raw()).collect()),
        };

        let mut prepared = PreparedSpawn {
            program: program_c,
            argv: CStringArray::new(argv),
            envp: CStringArray::new(envp),
            cwd,
            streams: self.streams,
            identity,
            new_session: self.new_session,
            new_process_group: self.new_process_group,
            route: self.route,
        };
        prepared.route = dispatch::select_route(self.route, &prepared)?;

        trace!(
            program = %prepared.program().display(),
            route = %prepared.route,
            "prepared spawn"
        );
        Ok(prepared)
    }
}

fn to_cstring(field: &'static str, value: &OsStr) -> Result<CString, Violation> {
    CString::new(value.as_bytes()).map_err(|_| Violation::InteriorNul {
        field,
        value: value.to_string_lossy().into_owned(),
    })
}

fn check_working_directory(dir: &Path) -> Result<(), Violation> {
    let path = dir.display().to_string();
    match std::fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(Violation::WorkingDirectoryNotDirectory { path }),
        Err(_) => Err(Violation::WorkingDirectoryNotFound { path }),
    }
}
