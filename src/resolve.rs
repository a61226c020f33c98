//! Executable lookup for bare program names.

use crate::error::Violation;
use nix::unistd::{access, AccessFlags};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Directories searched after `PATH`, in this order.
pub const DEFAULT_SEARCH_PATHS: &[&str] =
    &["/usr/bin", "/bin", "/usr/sbin", "/sbin", "/usr/local/bin"];

/// Resolve `program` to an executable path.
///
/// - A program containing `/` is returned as given if it is an executable
///   regular file.
/// - A bare name is looked up in each directory of `path_var` (when set),
///   then in [`DEFAULT_SEARCH_PATHS`]. The first executable regular file wins.
///
/// # Errors
///
/// - `EmptyProgram` if `program` is empty
/// - `ExecutableNotFound` if nothing executable matches
pub fn resolve_executable(program: &Path, path_var: Option<&OsStr>) -> Result<PathBuf, Violation> {
    if program.as_os_str().is_empty() {
        return Err(Violation::EmptyProgram);
    }

    let not_found = || Violation::ExecutableNotFound {
        name: program.display().to_string(),
    };

    if program.as_os_str().as_bytes().contains(&b'/') {
        return if is_executable_file(program) {
            Ok(program.to_path_buf())
        } else {
            Err(not_found())
        };
    }

    let from_env = path_var
        .into_iter()
        .flat_map(|value| value.as_bytes().split(|&b| b == b':'))
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(OsStr::from_bytes(dir)));
    let defaults = DEFAULT_SEARCH_PATHS.iter().map(Path::new);

    let mut seen: Vec<&Path> = Vec::new();
    for dir in from_env.chain(defaults) {
        if seen.contains(&dir) {
            continue;
        }
        seen.push(dir);

        let candidate = dir.join(program);
        if is_executable_file(&candidate) {
            return Ok(candidate);
        }
    }

    Err(not_found())
}

/// Regular file that the current user may execute.
fn is_executable_file(path: &Path) -> bool {
    let is_file = std::fs::metadata(path)
        .map(|metadata| metadata.is_file())
        .unwrap_or(false);
    is_file && access(path, AccessFlags::X_OK).is_ok()
}
