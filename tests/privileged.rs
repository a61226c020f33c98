//! Credential tests.
//!
//! These need root. Each test returns early when the effective uid is not 0.

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::unistd::{pipe, Gid, Uid};
use proc_spawn::{wait_pid, Route, SpawnRequest, StreamBindings};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::os::fd::AsRawFd;

const NOBODY: u32 = 65534;

fn is_root() -> bool {
    Uid::effective().is_root()
}

/// Run synchronously and return stdout. Panics if the child fails.
fn capture(request: SpawnRequest) -> String {
    let (read, write) = pipe().unwrap();
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).unwrap();
    }
    let streams = StreamBindings::inherit().with_stdout(write.as_raw_fd(), Some(read.as_raw_fd()));
    let pid = request.with_streams(streams).prepare().unwrap().spawn().unwrap();
    drop(write);

    let mut out = String::new();
    File::from(read).read_to_string(&mut out).unwrap();
    let status = wait_pid(pid).unwrap();
    assert!(status.success(), "child failed: {}", status);
    out
}

fn ids(out: &str) -> BTreeSet<u32> {
    out.split_whitespace().map(|id| id.parse().unwrap()).collect()
}

#[test]
fn test_supplementary_groups_applied_exactly() {
    if !is_root() {
        return;
    }
    for route in [Route::Auto, Route::ForkExec] {
        let out = capture(
            SpawnRequest::new("id", ["id", "-G"])
                .with_gid(Gid::from_raw(100))
                .with_groups([Gid::from_raw(4), Gid::from_raw(27), Gid::from_raw(1001)])
                .with_route(route),
        );
        assert_eq!(ids(&out), BTreeSet::from([4, 27, 100, 1001]), "route {}", route);
    }
}

#[test]
fn test_empty_group_list_drops_supplementary_groups() {
    if !is_root() {
        return;
    }
    let out = capture(
        SpawnRequest::new("id", ["id", "-G"])
            .with_gid(Gid::from_raw(NOBODY))
            .with_groups(Vec::new()),
    );
    assert_eq!(ids(&out), BTreeSet::from([NOBODY]));
}

#[test]
fn test_gid_and_uid_both_dropped() {
    if !is_root() {
        return;
    }
    // setgid after setuid would fail with EPERM; both ids must land.
    for route in [Route::Auto, Route::ForkExec] {
        let request = |flag: &str| {
            SpawnRequest::new("id", ["id", flag])
                .with_uid(Uid::from_raw(NOBODY))
                .with_gid(Gid::from_raw(NOBODY))
                .with_groups(Vec::new())
                .with_route(route)
        };
        let uid = capture(request("-u"));
        let gid = capture(request("-g"));
        assert_eq!(uid.trim(), NOBODY.to_string(), "route {}", route);
        assert_eq!(gid.trim(), NOBODY.to_string(), "route {}", route);
    }
}

#[test]
fn test_failed_identity_change_is_exit_status() {
    if !is_root() {
        return;
    }
    // More groups than the kernel accepts: setgroups fails in the child,
    // which exits with the errno instead of exec'ing.
    let (read, write) = pipe().unwrap();
    let streams = StreamBindings::inherit().with_stdout(write.as_raw_fd(), Some(read.as_raw_fd()));
    let too_many = (0..70_000).map(Gid::from_raw);
    let pid = SpawnRequest::new("/bin/sh", ["sh", "-c", "echo ran"])
        .with_groups(too_many)
        .with_uid(Uid::from_raw(NOBODY))
        .with_streams(streams)
        .with_route(Route::ForkExec)
        .prepare()
        .unwrap()
        .spawn()
        .unwrap();
    drop(write);

    let mut out = String::new();
    File::from(read).read_to_string(&mut out).unwrap();
    let status = wait_pid(pid).unwrap();

    assert_eq!(status.code(), Some(libc::EINVAL));
    assert!(out.is_empty());
}
