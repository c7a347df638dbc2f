use libc::{F_OK, O_APPEND, O_CLOEXEC, O_CREAT, O_EXCL, O_RDONLY, O_RDWR, O_TRUNC, O_WRONLY, R_OK, W_OK, X_OK};
use std::ffi::CStr;
use sysbroker_policy::{BrokerPolicy, Policy, PolicyError, PolicyRequest, PolicyVerdict};

fn c(path: &str) -> std::ffi::CString {
    std::ffi::CString::new(path).unwrap()
}

fn open_verdict<'a>(policy: &'a Policy, path: &'a CStr, flags: i32) -> PolicyVerdict<'a> {
    policy.check_request(&PolicyRequest::FileOpen { path, flags })
}

fn access_verdict<'a>(policy: &'a Policy, path: &'a CStr, mode: i32) -> PolicyVerdict<'a> {
    policy.check_request(&PolicyRequest::FileAccess { path, mode })
}

#[test]
fn file_path_policy_decision() {
    let mut policy = Policy::nothing_allowed();
    policy.allow_file_read("/etc/hosts").unwrap();
    println!("{:?}", &policy);
    let hosts = c("/etc/hosts");
    assert!(open_verdict(&policy, &hosts, O_RDONLY).is_granted(), "exact file path did not match");
    assert!(
        matches!(
            open_verdict(&policy, &c("/etc/nothosts"), O_RDONLY),
            PolicyVerdict::DeniedByPolicy { .. }
        ),
        "different file path should not have matched"
    );
    assert!(
        matches!(open_verdict(&policy, &hosts, O_WRONLY), PolicyVerdict::DeniedByPolicy { .. }),
        "different file rights should not have matched"
    );
    assert!(
        matches!(open_verdict(&policy, &hosts, O_RDONLY | O_TRUNC), PolicyVerdict::DeniedByPolicy { .. }),
        "truncation requires write access"
    );
    assert!(
        matches!(
            open_verdict(&policy, &c("/etc/hosts "), O_RDONLY),
            PolicyVerdict::DeniedByPolicy { .. }
        ),
        "trailing spaces should not be canonicalized"
    );
    assert!(
        matches!(
            open_verdict(&policy, &c("/etc/hosts/"), O_RDONLY),
            PolicyVerdict::DeniedByPolicy { .. }
        ),
        "file rules do not apply to directories"
    );

    let mut policy = Policy::nothing_allowed();
    policy.allow_dir_write("/without_trailing_slash").unwrap();
    println!("{:?}", &policy);
    for path in ["/without_trailing_slash", "/without_trailing_slash/", "/without_trailing_slash/a/b"] {
        assert!(
            open_verdict(&policy, &c(path), O_WRONLY | O_APPEND).is_granted(),
            "{} should have matched",
            path
        );
    }
    assert!(
        matches!(
            open_verdict(&policy, &c("/not_without_trailing_slash"), O_WRONLY),
            PolicyVerdict::DeniedByPolicy { .. }
        ),
        "different dir path should not have matched"
    );
    assert!(
        matches!(
            open_verdict(&policy, &c("/without_trailing_slash_suffix/a"), O_WRONLY),
            PolicyVerdict::DeniedByPolicy { .. }
        ),
        "dir rules must match whole components"
    );
    assert!(
        matches!(
            open_verdict(&policy, &c("/without_trailing_slash/new"), O_WRONLY | O_CREAT),
            PolicyVerdict::DeniedByPolicy { .. }
        ),
        "write access does not imply creation"
    );

    let mut policy = Policy::nothing_allowed();
    policy.allow_dir_read("/").unwrap();
    assert!(open_verdict(&policy, &c("/usr/lib/x"), O_RDONLY).is_granted(), "root dir rule should match anything");
}

#[test]
fn file_path_policy_combines_rules() {
    let mut policy = Policy::nothing_allowed();
    policy.allow_dir_read("/data").unwrap();
    policy.allow_file_write("/data/out").unwrap();
    assert!(open_verdict(&policy, &c("/data/out"), O_RDWR).is_granted());
    assert!(matches!(
        open_verdict(&policy, &c("/data/other"), O_RDWR),
        PolicyVerdict::DeniedByPolicy { .. }
    ));
}

#[test]
fn file_path_policy_rejects_non_canonical_paths() {
    let mut policy = Policy::nothing_allowed();
    policy.allow_dir_create("/tmp/sandboxed").unwrap();
    for path in [
        "relative",
        "",
        "/tmp/sandboxed/../../etc/passwd",
        "/tmp/sandboxed/./x",
        "/tmp/sandboxed//x",
    ] {
        assert!(
            matches!(
                open_verdict(&policy, &c(path), O_RDONLY),
                PolicyVerdict::InvalidRequestParameters { argument_name: "path", .. }
            ),
            "{:?} should be rejected",
            path
        );
    }

    for path in ["relative", "/a/../b", "/a//b", ""] {
        assert_eq!(
            policy.allow_file_read(path),
            Err(PolicyError::UnsupportedFilesystemPath { path: path.to_owned() })
        );
    }
    assert!(policy.allow_file_read("/a/dir/").is_err(), "file rules cannot end with a separator");
}

#[test]
fn file_path_policy_open_flags() {
    let mut policy = Policy::nothing_allowed();
    policy.allow_dir_create("/tmp/sandboxed").unwrap();
    let path = c("/tmp/sandboxed/x");
    assert!(open_verdict(&policy, &path, O_RDWR | O_CREAT | O_TRUNC).is_granted());
    assert!(
        matches!(
            open_verdict(&policy, &path, O_RDONLY | O_CLOEXEC),
            PolicyVerdict::DelegationToSandboxNotSupported { .. }
        ),
        "close-on-exec cannot be delegated"
    );
    assert!(
        matches!(
            open_verdict(&policy, &path, O_RDONLY | 0x4000_0000),
            PolicyVerdict::DelegationToSandboxNotSupported { .. }
        ),
        "unknown flags must be denied"
    );
    assert!(matches!(
        open_verdict(&policy, &path, libc::O_ACCMODE),
        PolicyVerdict::InvalidRequestParameters { argument_name: "flags", .. }
    ));
}

#[test]
fn file_path_policy_temporary_files() {
    let mut policy = Policy::nothing_allowed();
    policy.allow_file_temporary("/tmp/sandboxed/tmpfile").unwrap();
    let path = c("/tmp/sandboxed/tmpfile");
    assert_eq!(
        policy.file_name_if_allowed_to_open(&path, O_RDWR | O_CREAT | O_EXCL),
        Some((path.as_c_str(), true))
    );
    assert_eq!(
        policy.file_name_if_allowed_to_open(&path, O_RDWR | O_CREAT),
        None,
        "temporary files must be created exclusively"
    );
    assert_eq!(policy.file_name_if_allowed_to_open(&path, O_RDWR), None);
    assert_eq!(
        policy.file_name_if_allowed_to_access(&path, F_OK),
        None,
        "temporary files cannot be probed"
    );
}

#[test]
fn file_path_policy_access_modes() {
    let mut policy = Policy::nothing_allowed();
    policy.allow_file_read("/etc/passwd").unwrap();
    policy.allow_file_write("/var/log/out").unwrap();
    let passwd = c("/etc/passwd");
    let out = c("/var/log/out");
    assert!(access_verdict(&policy, &passwd, F_OK).is_granted());
    assert!(access_verdict(&policy, &passwd, R_OK).is_granted());
    assert!(!access_verdict(&policy, &passwd, W_OK).is_granted());
    assert!(!access_verdict(&policy, &passwd, R_OK | X_OK).is_granted(), "execute access is never granted");
    assert!(access_verdict(&policy, &out, W_OK).is_granted());
    assert!(!access_verdict(&policy, &out, R_OK).is_granted());
    assert!(!access_verdict(&policy, &c("/etc/shadow"), F_OK).is_granted());
    assert!(matches!(
        access_verdict(&policy, &passwd, 0x100),
        PolicyVerdict::InvalidRequestParameters { argument_name: "mode", .. }
    ));
}

#[test]
fn file_path_policy_returns_its_own_path() {
    let mut policy = Policy::nothing_allowed();
    policy.allow_file_read("/etc/hosts").unwrap();
    let requested = c("/etc/hosts");
    let (granted, unlink) = policy
        .file_name_if_allowed_to_open(&requested, O_RDONLY)
        .expect("access should be granted");
    assert_eq!(granted, requested.as_c_str());
    assert!(!unlink);
    assert_ne!(
        granted.as_ptr(),
        requested.as_ptr(),
        "exact file matches must return the policy's copy of the path"
    );
}

#[test]
fn file_path_policy_denied_errno() {
    let mut policy = Policy::nothing_allowed();
    assert_eq!(policy.denied_errno(), libc::EPERM);
    policy.set_denied_errno(libc::EACCES).unwrap();
    assert_eq!(policy.denied_errno(), libc::EACCES);
    assert_eq!(policy.set_denied_errno(0), Err(PolicyError::InvalidDeniedErrno { errno: 0 }));
    assert_eq!(policy.denied_errno(), libc::EACCES);
}
