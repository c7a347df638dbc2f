use common::{common_test_setup, cstring, read_fd_to_end, scratch_dir, start_broker, stop_broker};
use std::collections::HashMap;
use std::ffi::CString;
use std::path::Path;
use sysbroker_policy::{BrokerPolicy, PolicyRequest, PolicyVerdict};

// Grants requests for paths which do not exist, but tells the broker to act
// on other, real, paths instead.
struct RedirectingPolicy {
    redirections: HashMap<CString, CString>,
}

impl RedirectingPolicy {
    fn new(dir: &Path, names: &[&str]) -> Self {
        let redirections = names
            .iter()
            .map(|name| {
                (
                    CString::new(format!("/nonexistent/redirected/{}", name)).unwrap(),
                    cstring(&dir.join(name)),
                )
            })
            .collect();
        Self { redirections }
    }
}

impl BrokerPolicy for RedirectingPolicy {
    fn check_request<'a>(&'a self, request: &PolicyRequest<'a>) -> PolicyVerdict<'a> {
        let path = match *request {
            PolicyRequest::FileOpen { path, .. } | PolicyRequest::FileAccess { path, .. } => path,
        };
        match self.redirections.get(path) {
            Some(real_path) => PolicyVerdict::Granted {
                path: real_path.as_c_str(),
                unlink_after_open: false,
            },
            None => PolicyVerdict::DeniedByPolicy { why: "not redirected" },
        }
    }

    fn denied_errno(&self) -> libc::c_int {
        libc::EACCES
    }
}

fn requested(name: &str) -> CString {
    CString::new(format!("/nonexistent/redirected/{}", name)).unwrap()
}

#[test]
fn canonical_path_used_by_every_command() {
    common_test_setup();
    let (_dir, dir_path) = scratch_dir();
    std::fs::write(dir_path.join("file"), b"real contents").unwrap();
    std::fs::write(dir_path.join("old"), b"renamed").unwrap();
    std::os::unix::fs::symlink("/link/target", dir_path.join("link")).unwrap();
    let names = ["file", "old", "new", "link", "created"];

    for fast_check in [true, false] {
        let (client, thread) = start_broker(RedirectingPolicy::new(&dir_path, &names), fast_check);
        let file = requested("file");
        let file = file.as_c_str();

        assert_eq!(client.access(Some(file), libc::R_OK), 0);

        let fd = client.open(Some(file), libc::O_RDONLY);
        assert!(fd >= 0, "open() failed with {}", fd);
        assert_eq!(read_fd_to_end(fd), b"real contents");

        let mut sb: libc::stat = unsafe { std::mem::zeroed() };
        assert_eq!(client.stat(Some(file), true, &mut sb), 0);
        assert_eq!(sb.st_size, 13);
        let mut sb64: libc::stat64 = unsafe { std::mem::zeroed() };
        assert_eq!(client.stat64(Some(file), false, &mut sb64), 0);
        assert_eq!(sb64.st_size, 13);

        let mut buf = [0u8; 32];
        assert_eq!(client.readlink(Some(&requested("link")), &mut buf), 12);
        assert_eq!(&buf[..12], b"/link/target");

        if fast_check {
            assert_eq!(client.rename(Some(&requested("old")), Some(&requested("new"))), 0);
            assert!(dir_path.join("new").exists());
        } else {
            assert_eq!(client.rename(Some(&requested("new")), Some(&requested("old"))), 0);
            assert!(dir_path.join("old").exists());
        }

        let created = requested("created");
        let fd = client.open(Some(&created), libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC);
        assert!(fd >= 0, "open(O_CREAT) failed with {}", fd);
        unsafe { libc::close(fd) };
        assert!(dir_path.join("created").exists());

        assert_eq!(client.access(Some(&requested("unknown")), libc::F_OK), -libc::EACCES);
        stop_broker(client, thread);
    }
    assert!(!Path::new("/nonexistent").exists());
}
