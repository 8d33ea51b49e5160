//! Bootstrap handshake.
//!
//! At process init the script side registers its delivery router and
//! error trampoline, then sends one empty `Start` request. The `StartRes`
//! reply becomes the immutable `BootState` for the rest of the process.

use hostcall_core::bridge::HostBridge;
use hostcall_core::codec::Codec;
use hostcall_core::error::Result;
use hostcall_core::kprint::{self, LogLevel};
use hostcall_core::msg::{MessageKind, Payload, StartRes};
use hostcall_core::kdebug;
use hostcall_executor::Dispatcher;

use crate::trampoline::ErrorTrampoline;

/// Process state reported by the host at `Start`.
///
/// Built once. Only `&self` accessors, so it cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootState {
    cwd: String,
    args: Vec<String>,
    debug_flag: bool,
    recompile_flag: bool,
    deps_flag: bool,
}

impl BootState {
    /// `argv[0]` (the interpreter) is dropped; `args` is `argv[1..]`.
    pub fn from_start_res(res: StartRes) -> Self {
        Self {
            cwd: res.cwd,
            args: res.argv.into_iter().skip(1).collect(),
            debug_flag: res.debug_flag,
            recompile_flag: res.recompile_flag,
            deps_flag: res.deps_flag,
        }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// First argument: the script to run.
    pub fn main_module(&self) -> Option<&str> {
        self.args.first().map(String::as_str).filter(|s| !s.is_empty())
    }

    /// Arguments after the main module.
    pub fn script_args(&self) -> &[String] {
        self.args.get(1..).unwrap_or_default()
    }

    pub fn debug_flag(&self) -> bool {
        self.debug_flag
    }

    pub fn recompile_flag(&self) -> bool {
        self.recompile_flag
    }

    pub fn deps_flag(&self) -> bool {
        self.deps_flag
    }
}

impl From<StartRes> for BootState {
    fn from(res: StartRes) -> Self {
        Self::from_start_res(res)
    }
}

/// Run the handshake against `dispatcher`'s bridge.
pub fn bootstrap<B, C>(dispatcher: &Dispatcher<B, C>, trampoline: ErrorTrampoline) -> Result<BootState>
where
    B: HostBridge,
    C: Codec + 'static,
{
    dispatcher.install_router()?;
    trampoline.install(dispatcher.bridge().as_ref());

    let res = dispatcher
        .call_sync_expect(Payload::Start, MessageKind::StartRes)?
        .into_start_res()?;
    let state = BootState::from_start_res(res);

    if state.debug_flag() {
        kprint::raise_log_level(LogLevel::Debug);
    }
    kdebug!("cwd {}", state.cwd());
    kdebug!("args {:?}", state.args());
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostcall_core::bridge::{ErrorValue, UncaughtError};
    use hostcall_core::error::DispatchError;
    use hostcall_core::exit::RecordingExit;
    use hostcall_module::{LoopbackHost, LoopbackHostConfig};
    use std::sync::Arc;

    fn start_res(argv: &[&str]) -> StartRes {
        StartRes {
            cwd: "/home/user".into(),
            argv: argv.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_argv0_dropped() {
        let state = BootState::from(start_res(&["_", "script.js"]));
        assert_eq!(state.cwd(), "/home/user");
        assert_eq!(state.args(), ["script.js".to_string()]);
        assert_eq!(state.main_module(), Some("script.js"));
        assert!(state.script_args().is_empty());
    }

    #[test]
    fn test_no_input() {
        let state = BootState::from(start_res(&["_"]));
        assert!(state.args().is_empty());
        assert_eq!(state.main_module(), None);

        let state = BootState::from(start_res(&[]));
        assert!(state.args().is_empty());
    }

    #[test]
    fn test_handshake_over_loopback() {
        let host = Arc::new(
            LoopbackHost::new(
                LoopbackHostConfig::default()
                    .argv(["_", "script.js", "--port", "80"])
                    .cwd("/home/user")
                    .recompile(true),
            )
            .unwrap(),
        );
        let exit = Arc::new(RecordingExit::new());
        let d = Dispatcher::new(Arc::clone(&host), exit.clone());

        let state = bootstrap(&d, ErrorTrampoline::with_default_source(exit.clone())).unwrap();
        assert_eq!(state.args(), ["script.js", "--port", "80"].map(String::from));
        assert_eq!(state.script_args(), ["--port", "80"].map(String::from));
        assert!(state.recompile_flag());
        assert!(!state.deps_flag());
        assert!(d.router_installed());

        // Trampoline is live after the handshake.
        let err = UncaughtError::new("boom", Some("main.js"), ErrorValue::Thrown("boom".into()));
        assert!(host.raise_uncaught(err));
        assert_eq!(exit.codes(), vec![1]);
    }

    #[test]
    fn test_handshake_without_reply() {
        let host = Arc::new(LoopbackHost::new(LoopbackHostConfig::default().cwd("/")).unwrap());
        host.set_mute(true);
        let exit = Arc::new(RecordingExit::new());
        let d = Dispatcher::new(host, exit.clone());
        assert_eq!(
            bootstrap(&d, ErrorTrampoline::with_default_source(exit)),
            Err(DispatchError::NoResponse { kind: MessageKind::Start })
        );
    }

    #[test]
    fn test_debug_flag_keeps_higher_level() {
        kprint::set_log_level(LogLevel::Trace);
        let host = Arc::new(LoopbackHost::new(LoopbackHostConfig::default().cwd("/").debug(true)).unwrap());
        let exit = Arc::new(RecordingExit::new());
        let d = Dispatcher::new(host, exit.clone());

        let state = bootstrap(&d, ErrorTrampoline::with_default_source(exit)).unwrap();
        assert!(state.debug_flag());
        assert_eq!(kprint::log_level(), LogLevel::Trace);
    }
}
