//! Host-side request execution for `LoopbackHost`.
//!
//! Runs one request payload against the real filesystem via nix and
//! returns the reply payload. Relative paths resolve against the host's
//! virtual working directory, never the process cwd.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::{FileStat, Mode};

use hostcall_core::kdebug;
use hostcall_core::msg::{
    Chdir, CwdRes, HostError, HostErrorKind, MakeTempDir, MakeTempDirRes, Mkdir, Payload, Stat,
    StatRes,
};

const DEFAULT_TEMP_PREFIX: &str = "hostcall";

/// Map an errno to the boundary error classification.
pub fn classify_errno(errno: Errno) -> HostErrorKind {
    match errno {
        Errno::ENOENT => HostErrorKind::NotFound,
        Errno::EACCES | Errno::EPERM => HostErrorKind::PermissionDenied,
        Errno::EEXIST => HostErrorKind::AlreadyExists,
        Errno::ENOTDIR => HostErrorKind::NotADirectory,
        Errno::EINVAL | Errno::ENAMETOOLONG => HostErrorKind::InvalidInput,
        Errno::ENOSYS | Errno::EOPNOTSUPP => HostErrorKind::Unsupported,
        _ => HostErrorKind::Other,
    }
}

fn errno_error(path: &Path, errno: Errno) -> HostError {
    HostError::new(
        classify_errno(errno),
        format!("{}: {}", path.display(), errno.desc()),
    )
}

pub fn resolve(cwd: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        cwd.join(p)
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))] {
        fn created_secs(st: &FileStat) -> i64 {
            st.st_birthtime as i64
        }
    } else {
        // No birth time in struct stat; status-change time is the closest.
        fn created_secs(st: &FileStat) -> i64 {
            st.st_ctime as i64
        }
    }
}

fn stat_res(st: &FileStat) -> StatRes {
    let mode = st.st_mode as u32;
    let fmt = mode & libc::S_IFMT as u32;
    StatRes {
        is_file: fmt == libc::S_IFREG as u32,
        is_symlink: fmt == libc::S_IFLNK as u32,
        len: st.st_size.max(0) as u64,
        modified: st.st_mtime as i64,
        accessed: st.st_atime as i64,
        created: created_secs(st),
        mode: Some(mode & 0o7777),
    }
}

pub fn stat(cwd: &Path, req: &Stat) -> Result<StatRes, HostError> {
    let path = resolve(cwd, &req.filename);
    let st = if req.lstat {
        nix::sys::stat::lstat(&path)
    } else {
        nix::sys::stat::stat(&path)
    }
    .map_err(|e| errno_error(&path, e))?;
    Ok(stat_res(&st))
}

pub fn mkdir(cwd: &Path, req: &Mkdir) -> Result<(), HostError> {
    let path = resolve(cwd, &req.path);
    nix::unistd::mkdir(&path, Mode::from_bits_truncate(req.mode as _))
        .map_err(|e| errno_error(&path, e))
}

pub fn make_temp_dir(cwd: &Path, req: &MakeTempDir) -> Result<MakeTempDirRes, HostError> {
    let dir = match &req.dir {
        Some(dir) => resolve(cwd, dir),
        None => std::env::temp_dir(),
    };
    let prefix = req.prefix.as_deref().unwrap_or(DEFAULT_TEMP_PREFIX);
    if prefix.contains('/') {
        return Err(HostError::new(
            HostErrorKind::InvalidInput,
            format!("temp dir prefix must not contain '/': {}", prefix),
        ));
    }
    let template = dir.join(format!("{}XXXXXX", prefix));
    let path = nix::unistd::mkdtemp(&template).map_err(|e| errno_error(&template, e))?;
    Ok(MakeTempDirRes {
        path: path.to_string_lossy().into_owned(),
    })
}

/// Resolve the new working directory. The caller stores it.
pub fn chdir(cwd: &Path, req: &Chdir) -> Result<PathBuf, HostError> {
    let path = resolve(cwd, &req.directory);
    let st = nix::sys::stat::stat(&path).map_err(|e| errno_error(&path, e))?;
    if (st.st_mode as u32) & (libc::S_IFMT as u32) != libc::S_IFDIR as u32 {
        return Err(errno_error(&path, Errno::ENOTDIR));
    }
    let canonical = std::fs::canonicalize(&path).map_err(|e| {
        let errno = Errno::from_raw(e.raw_os_error().unwrap_or(libc::EIO));
        errno_error(&path, errno)
    })?;
    kdebug!("chdir {}", canonical.display());
    Ok(canonical)
}

pub fn cwd_res(cwd: &Path) -> CwdRes {
    CwdRes {
        cwd: cwd.to_string_lossy().into_owned(),
    }
}

/// Turn a handler outcome into a reply payload.
pub fn reply<T>(result: Result<T, HostError>, ok: impl FnOnce(T) -> Payload) -> Payload {
    match result {
        Ok(v) => ok(v),
        Err(err) => Payload::Error(err),
    }
}
