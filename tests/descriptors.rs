//! Descriptor hygiene and request rejection tests.
//!
//! Kept in its own test binary: one test below deliberately creates a pipe
//! end without `FD_CLOEXEC`, which would otherwise leak into children spawned
//! concurrently by unrelated tests.

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::unistd::{pipe, Pid};
use proc_spawn::{
    wait_pid, Environment, Route, SpawnRequest, StreamBindings, Violation, WaitStatus,
};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn set_cloexec(fd: &OwnedFd) {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).unwrap();
}

async fn wait_bounded(pid: Pid) -> WaitStatus {
    tokio::time::timeout(TIMEOUT, tokio::task::spawn_blocking(move || wait_pid(pid)))
        .await
        .expect("child did not exit in time")
        .unwrap()
        .unwrap()
}

async fn read_bounded(fd: OwnedFd) -> String {
    tokio::time::timeout(
        TIMEOUT,
        tokio::task::spawn_blocking(move || {
            let mut out = String::new();
            File::from(fd).read_to_string(&mut out).map(|_| out)
        }),
    )
    .await
    .expect("pipe not closed in time")
    .unwrap()
    .unwrap()
}

/// Shell snippet exiting 0 if `fd` is open in the child, 1 otherwise.
fn fd_check_script(fd: i32) -> String {
    format!("if [ -e /dev/fd/{} ]; then exit 0; else exit 1; fi", fd)
}

// =============================================================================
// Parent-side ends
// =============================================================================

#[tokio::test]
async fn test_parent_stdin_end_closed_in_child() {
    // The write end is inheritable. If the child kept it, `cat` would never
    // see EOF and the read below would time out.
    for route in [Route::PosixSpawn, Route::ForkExec] {
        let (stdin_read, stdin_write) = pipe().unwrap();
        let (stdout_read, stdout_write) = pipe().unwrap();
        set_cloexec(&stdin_read);
        set_cloexec(&stdout_read);
        set_cloexec(&stdout_write);

        let streams = StreamBindings::inherit()
            .with_stdin(stdin_read.as_raw_fd(), Some(stdin_write.as_raw_fd()))
            .with_stdout(stdout_write.as_raw_fd(), Some(stdout_read.as_raw_fd()));
        let pid = SpawnRequest::new("/bin/cat", ["cat"])
            .with_streams(streams)
            .with_route(route)
            .prepare()
            .unwrap()
            .spawn()
            .unwrap();
        drop((stdin_read, stdout_write));

        let mut stdin = File::from(stdin_write);
        stdin.write_all(b"through cat\n").unwrap();
        drop(stdin);

        assert_eq!(read_bounded(stdout_read).await, "through cat\n", "route {}", route);
        assert!(wait_bounded(pid).await.success());
    }
}

#[tokio::test]
async fn test_listed_parent_end_not_accessible() {
    for route in [Route::PosixSpawn, Route::ForkExec] {
        // Read ends only: leaking one into another child blocks nobody.
        let (read, _write) = pipe().unwrap();
        let fd = read.as_raw_fd();

        let unlisted = SpawnRequest::new("/bin/sh", ["sh", "-c", fd_check_script(fd).as_str()])
            .with_route(route)
            .prepare()
            .unwrap()
            .spawn()
            .unwrap();
        assert_eq!(
            wait_bounded(unlisted).await.code(),
            Some(0),
            "unlisted descriptor is inherited (route {})",
            route
        );

        let streams = StreamBindings {
            stdout_parent: Some(fd),
            ..StreamBindings::inherit()
        };
        let listed = SpawnRequest::new("/bin/sh", ["sh", "-c", fd_check_script(fd).as_str()])
            .with_streams(streams)
            .with_route(route)
            .prepare()
            .unwrap()
            .spawn()
            .unwrap();
        assert_eq!(
            wait_bounded(listed).await.code(),
            Some(1),
            "listed parent end is closed (route {})",
            route
        );
    }
}

#[tokio::test]
async fn test_cloexec_descriptor_not_inherited() {
    let (read, write) = pipe().unwrap();
    set_cloexec(&read);
    set_cloexec(&write);

    for route in [Route::PosixSpawn, Route::ForkExec] {
        let pid = SpawnRequest::new(
            "/bin/sh",
            ["sh".to_string(), "-c".to_string(), fd_check_script(read.as_raw_fd())],
        )
        .with_route(route)
        .prepare()
        .unwrap()
        .spawn()
        .unwrap();
        assert_eq!(wait_bounded(pid).await.code(), Some(1), "route {}", route);
    }
    drop(write);
}

#[test]
fn test_raw_layout_keeps_low_parent_ends() {
    // Recorded as given; the child skips closing them since they are its own
    // streams after dup2.
    let streams = StreamBindings::from_raw([0, 1, 0, 2, 0, 0]);
    assert_eq!(streams.stdin_parent, Some(1));
    assert_eq!(streams.stdout_parent, Some(2));
    assert_eq!(streams.into_raw(), [0, 1, 0, 2, 0, 0]);
}

// =============================================================================
// Interior NUL bytes
// =============================================================================

#[test]
fn test_null_byte_in_program_path() {
    let result = SpawnRequest::new("/bin/sh\0evil", ["sh"]).prepare();
    assert!(matches!(
        result,
        Err(Violation::InteriorNul { field: "program path", .. })
    ));
}

#[test]
fn test_null_byte_in_argument() {
    let result = SpawnRequest::new("/bin/sh", ["sh", "-c", "echo a\0rm -rf /"]).prepare();
    match result {
        Err(Violation::InteriorNul { field, value }) => {
            assert_eq!(field, "argument");
            assert!(value.starts_with("echo a"));
        }
        other => panic!("expected InteriorNul, got {:?}", other),
    }
}

#[test]
fn test_null_byte_in_environment_override() {
    let result = SpawnRequest::new("/bin/sh", ["sh"])
        .with_env(Environment::InheritWith(vec![("KEY".into(), "a\0b".into())]))
        .prepare();
    assert!(matches!(
        result,
        Err(Violation::InteriorNul { field: "environment entry", .. })
    ));
}

#[test]
fn test_null_byte_in_bare_name_not_found() {
    // A bare name with a NUL never matches a file on the search path.
    let result = SpawnRequest::new("sh\0x", ["sh"]).prepare();
    assert!(matches!(result, Err(Violation::ExecutableNotFound { .. })));
}
