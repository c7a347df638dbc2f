use common::{
    common_test_setup, cstring, fd_is_cloexec, path_str, read_fd_to_end, scratch_dir, start_broker, stop_broker,
    write_fd,
};
use libc::{O_CLOEXEC, O_CREAT, O_EXCL, O_RDONLY, O_RDWR, O_WRONLY};
use std::ffi::CString;
use sysbroker_policy::Policy;

#[test]
fn file_path_open_sandboxed_dir() {
    common_test_setup();
    let (_dir, dir_path) = scratch_dir();
    let sandboxed = dir_path.join("sandboxed");
    std::fs::create_dir(&sandboxed).unwrap();
    let mut policy = Policy::nothing_allowed();
    policy.allow_dir_create(path_str(&sandboxed)).unwrap();

    for fast_check in [true, false] {
        let (client, thread) = start_broker(policy.clone(), fast_check);
        let passwd = CString::new("/etc/passwd").unwrap();
        assert_eq!(client.open(Some(&passwd), O_RDONLY), -libc::EPERM);
        assert_eq!(client.access(Some(&passwd), libc::R_OK), -libc::EPERM);

        let x_path = sandboxed.join(format!("x_{}", fast_check));
        let x = cstring(&x_path);
        let fd = client.open(Some(&x), O_RDWR | O_CREAT);
        assert!(fd >= 0, "open(O_CREAT) failed with {}", fd);
        write_fd(fd, b"hello");
        assert_eq!(std::fs::read(&x_path).unwrap(), b"hello");
        let fd = client.open(Some(&x), O_RDONLY);
        assert!(fd >= 0, "open(O_RDONLY) failed with {}", fd);
        assert_eq!(read_fd_to_end(fd), b"hello");

        assert_eq!(
            client.open(Some(&cstring(&sandboxed.join("missing"))), O_RDONLY),
            -libc::ENOENT,
            "real open() errors must be passed verbatim"
        );
        stop_broker(client, thread);
    }
}

#[test]
fn file_path_open_creates_private_files() {
    common_test_setup();
    let (_dir, dir_path) = scratch_dir();
    let mut policy = Policy::nothing_allowed();
    policy.allow_dir_create(path_str(&dir_path)).unwrap();
    let (client, thread) = start_broker(policy, true);
    let path = dir_path.join("private");
    let fd = client.open(Some(&cstring(&path)), O_WRONLY | O_CREAT | O_EXCL);
    assert!(fd >= 0, "open() failed with {}", fd);
    unsafe { libc::close(fd) };
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o077, 0, "created file must not be accessible to others");
    assert_eq!(
        client.open(Some(&cstring(&path)), O_WRONLY | O_CREAT | O_EXCL),
        -libc::EEXIST
    );
    stop_broker(client, thread);
}

#[test]
fn file_path_open_cloexec_applied_by_client() {
    common_test_setup();
    let (_dir, dir_path) = scratch_dir();
    let path = dir_path.join("file");
    std::fs::write(&path, b"contents").unwrap();
    let mut policy = Policy::nothing_allowed();
    policy.allow_file_read(path_str(&path)).unwrap();
    let (client, thread) = start_broker(policy, true);

    let fd = client.open(Some(&cstring(&path)), O_RDONLY | O_CLOEXEC);
    assert!(fd >= 0, "open(O_CLOEXEC) failed with {}", fd);
    assert!(fd_is_cloexec(fd));
    assert_eq!(read_fd_to_end(fd), b"contents");

    let fd = client.open(Some(&cstring(&path)), O_RDONLY);
    assert!(fd >= 0);
    assert!(!fd_is_cloexec(fd), "close-on-exec set without being requested");
    unsafe { libc::close(fd) };
    stop_broker(client, thread);
}

#[test]
fn file_path_open_temporary_file_is_unlinked() {
    common_test_setup();
    let (_dir, dir_path) = scratch_dir();
    let path = dir_path.join("tmpfile");
    let mut policy = Policy::nothing_allowed();
    policy.allow_file_temporary(path_str(&path)).unwrap();
    let (client, thread) = start_broker(policy, true);

    assert_eq!(
        client.open(Some(&cstring(&path)), O_RDWR | O_CREAT),
        -libc::EPERM,
        "temporary files must be created exclusively"
    );
    let fd = client.open(Some(&cstring(&path)), O_RDWR | O_CREAT | O_EXCL);
    assert!(fd >= 0, "open() failed with {}", fd);
    assert!(!path.exists(), "temporary file still has a name");
    let written = unsafe { libc::pwrite(fd, b"scratch".as_ptr() as *const _, 7, 0) };
    assert_eq!(written, 7);
    let mut buf = [0u8; 7];
    let read = unsafe { libc::pread(fd, buf.as_mut_ptr() as *mut _, buf.len(), 0) };
    assert_eq!(read, 7);
    assert_eq!(&buf, b"scratch");
    unsafe { libc::close(fd) };

    // The name is free again, and can be used for another temporary file
    let fd = client.open(Some(&cstring(&path)), O_RDWR | O_CREAT | O_EXCL);
    assert!(fd >= 0, "second open() failed with {}", fd);
    unsafe { libc::close(fd) };
    stop_broker(client, thread);
}

#[test]
fn file_path_open_null_path() {
    common_test_setup();
    let (client, thread) = start_broker(Policy::nothing_allowed(), true);
    assert_eq!(client.open(None, O_RDONLY), -libc::EFAULT);
    assert_eq!(client.access(None, libc::F_OK), -libc::EFAULT);
    let null_path = unsafe { sysbroker_client::path_from_ptr(std::ptr::null()) };
    assert_eq!(client.open(null_path, O_RDONLY), -libc::EFAULT);
    stop_broker(client, thread);
}

#[test]
fn file_path_open_custom_denied_errno() {
    common_test_setup();
    let mut policy = Policy::nothing_allowed();
    policy.set_denied_errno(libc::EACCES).unwrap();
    for fast_check in [true, false] {
        let (client, thread) = start_broker(policy.clone(), fast_check);
        let passwd = CString::new("/etc/passwd").unwrap();
        assert_eq!(client.open(Some(&passwd), O_RDONLY), -libc::EACCES);
        stop_broker(client, thread);
    }
}
