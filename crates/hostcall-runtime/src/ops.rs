//! Typed hostcall wrappers.
//!
//! Each op is one dispatch call plus the conversion from the reply
//! envelope to a domain value.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use hostcall_core::bridge::HostBridge;
use hostcall_core::codec::Codec;
use hostcall_core::envelope::{CmdId, Envelope};
use hostcall_core::error::Result;
use hostcall_core::msg::{Chdir, Exit, MakeTempDir, MessageKind, Mkdir, Payload, Stat, StatRes};
use hostcall_executor::Dispatcher;
use hostcall_module::CallHandle;

/// File metadata as reported by the host. Times are seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub is_file: bool,
    pub is_symlink: bool,
    pub len: u64,
    pub modified: i64,
    pub accessed: i64,
    pub created: i64,
    /// Permission bits. `None` on hosts without a unix mode.
    pub mode: Option<u32>,
}

impl From<StatRes> for FileInfo {
    fn from(res: StatRes) -> Self {
        Self {
            is_file: res.is_file,
            is_symlink: res.is_symlink,
            len: res.len,
            modified: res.modified,
            accessed: res.accessed,
            created: res.created,
            mode: res.mode,
        }
    }
}

/// An in-flight async op. Resolves to the converted reply.
pub struct OpHandle<T> {
    call: CallHandle,
    convert: fn(Envelope) -> Result<T>,
}

impl<T> OpHandle<T> {
    fn new(call: CallHandle, convert: fn(Envelope) -> Result<T>) -> Self {
        Self { call, convert }
    }

    pub fn cmd_id(&self) -> CmdId {
        self.call.cmd_id()
    }

    pub fn is_complete(&self) -> bool {
        self.call.is_complete()
    }

    pub fn wait(self) -> Result<T> {
        self.call.wait().and_then(self.convert)
    }

    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        let convert = self.convert;
        match self.call.wait_timeout(timeout) {
            Ok(result) => Ok(result.and_then(convert)),
            Err(call) => Err(Self::new(call, convert)),
        }
    }
}

impl<T> Future for OpHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let convert = this.convert;
        Pin::new(&mut this.call).poll(cx).map(|r| r.and_then(convert))
    }
}

fn to_file_info(env: Envelope) -> Result<FileInfo> {
    env.into_stat_res().map(FileInfo::from)
}

fn stat_payload(filename: &str, lstat: bool) -> Payload {
    Payload::Stat(Stat {
        filename: filename.to_string(),
        lstat,
    })
}

pub fn stat_sync<B: HostBridge, C: Codec>(d: &Dispatcher<B, C>, filename: &str) -> Result<FileInfo> {
    to_file_info(d.call_sync_expect(stat_payload(filename, false), MessageKind::StatRes)?)
}

/// Like `stat_sync`, but does not follow a final symlink.
pub fn lstat_sync<B: HostBridge, C: Codec>(d: &Dispatcher<B, C>, filename: &str) -> Result<FileInfo> {
    to_file_info(d.call_sync_expect(stat_payload(filename, true), MessageKind::StatRes)?)
}

pub fn stat<B: HostBridge, C: Codec>(d: &Dispatcher<B, C>, filename: &str) -> Result<OpHandle<FileInfo>> {
    Ok(OpHandle::new(d.call_async(stat_payload(filename, false))?, to_file_info))
}

pub fn lstat<B: HostBridge, C: Codec>(d: &Dispatcher<B, C>, filename: &str) -> Result<OpHandle<FileInfo>> {
    Ok(OpHandle::new(d.call_async(stat_payload(filename, true))?, to_file_info))
}

pub fn mkdir_sync<B: HostBridge, C: Codec>(d: &Dispatcher<B, C>, path: &str, mode: u32) -> Result<()> {
    let req = Payload::Mkdir(Mkdir {
        path: path.to_string(),
        mode,
    });
    d.call_sync(req)?.into_ok()
}

/// Create a fresh directory `<dir>/<prefix>XXXXXX` and return its path.
///
/// `dir` defaults to the host's temp dir.
pub fn make_temp_dir_sync<B: HostBridge, C: Codec>(
    d: &Dispatcher<B, C>,
    dir: Option<&str>,
    prefix: Option<&str>,
) -> Result<String> {
    let req = Payload::MakeTempDir(MakeTempDir {
        dir: dir.map(str::to_string),
        prefix: prefix.map(str::to_string),
    });
    Ok(d.call_sync(req)?.into_make_temp_dir_res()?.path)
}

pub fn chdir<B: HostBridge, C: Codec>(d: &Dispatcher<B, C>, directory: &str) -> Result<()> {
    let req = Payload::Chdir(Chdir {
        directory: directory.to_string(),
    });
    d.call_sync(req)?.into_ok()
}

pub fn cwd<B: HostBridge, C: Codec>(d: &Dispatcher<B, C>) -> Result<String> {
    Ok(d.call_sync(Payload::Cwd)?.into_cwd_res()?.cwd)
}

/// Tell the host the process is exiting, then exit.
///
/// The host's answer is ignored; exiting goes ahead regardless.
pub fn exit<B: HostBridge, C: Codec>(d: &Dispatcher<B, C>, code: i32) {
    if let Err(err) = d.call_sync(Payload::Exit(Exit { code })) {
        hostcall_core::kdebug!("exit notification failed: {}", err);
    }
    d.process_exit().exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostcall_core::error::DispatchError;
    use hostcall_core::exit::RecordingExit;
    use hostcall_core::msg::HostErrorKind;
    use hostcall_module::{LoopbackHost, LoopbackHostConfig};
    use std::path::Path;
    use std::sync::Arc;

    fn setup() -> (Arc<LoopbackHost>, Arc<RecordingExit>, Dispatcher<LoopbackHost>, String) {
        let host = Arc::new(LoopbackHost::new(LoopbackHostConfig::default().cwd("/")).unwrap());
        let exit = Arc::new(RecordingExit::new());
        let d = Dispatcher::new(Arc::clone(&host), exit.clone());
        d.install_router().unwrap();
        let scratch = make_temp_dir_sync(&d, None, Some("hc-ops-")).unwrap();
        (host, exit, d, scratch)
    }

    #[test]
    fn test_fs_ops_end_to_end() {
        let (host, _exit, d, scratch) = setup();
        assert!(Path::new(&scratch).is_dir());

        chdir(&d, &scratch).unwrap();
        assert_eq!(cwd(&d).unwrap(), host.cwd().to_string_lossy());

        mkdir_sync(&d, "sub", 0o755).unwrap();
        let info = stat_sync(&d, "sub").unwrap();
        assert!(!info.is_file);
        assert!(!info.is_symlink);

        let err = mkdir_sync(&d, "sub", 0o755).unwrap_err();
        assert_eq!(err.host_error().map(|e| e.kind), Some(HostErrorKind::AlreadyExists));

        std::fs::write(Path::new(&scratch).join("hello.txt"), b"hello world").unwrap();
        let info = lstat_sync(&d, "hello.txt").unwrap();
        assert!(info.is_file);
        assert_eq!(info.len, 11);

        std::fs::remove_dir_all(&scratch).unwrap();
    }

    #[test]
    fn test_async_stat() {
        let (host, _exit, d, scratch) = setup();
        let file = format!("{}/a.txt", scratch);
        std::fs::write(&file, b"abc").unwrap();

        let present = stat(&d, &file).unwrap();
        let missing = lstat(&d, &format!("{}/missing", scratch)).unwrap();
        assert!(!present.is_complete());
        assert_eq!(host.drain(8), 2);

        assert_eq!(present.wait().unwrap().len, 3);
        match missing.wait() {
            Err(DispatchError::Host(e)) => assert_eq!(e.kind, HostErrorKind::NotFound),
            other => panic!("unexpected: {:?}", other),
        }
        std::fs::remove_dir_all(&scratch).unwrap();
    }

    #[test]
    fn test_op_handle_timeout_returns_handle() {
        let (host, _exit, d, scratch) = setup();
        let h = stat(&d, &scratch).unwrap();
        let h = h.wait_timeout(Duration::from_millis(1)).unwrap_err();
        host.drain(1);
        assert!(!h.wait().unwrap().is_file);
        std::fs::remove_dir_all(&scratch).unwrap();
    }

    #[test]
    fn test_chdir_to_file_fails() {
        let (_host, _exit, d, scratch) = setup();
        let file = format!("{}/f", scratch);
        std::fs::write(&file, b"").unwrap();
        let err = chdir(&d, &file).unwrap_err();
        assert_eq!(err.host_error().map(|e| e.kind), Some(HostErrorKind::NotADirectory));
        std::fs::remove_dir_all(&scratch).unwrap();
    }

    #[test]
    fn test_exit_notifies_host() {
        let (host, exit, d, scratch) = setup();
        super::exit(&d, 7);
        assert_eq!(host.exit_requested(), Some(7));
        assert_eq!(exit.codes(), vec![7]);
        std::fs::remove_dir_all(&scratch).unwrap();
    }
}
