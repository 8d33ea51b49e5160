//! # hostcall-runtime
//!
//! Process-level runtime for a sandboxed script context.
//!
//! This crate provides:
//! - Runtime configuration (`RuntimeConfig`)
//! - The `Start` bootstrap handshake and immutable `BootState`
//! - The entry policy (`EntryPlan`)
//! - The global error trampoline
//! - Typed ops (`stat`, `mkdir`, `chdir`, ...)
//! - Panic hook and `HostExit`

pub mod config;
pub mod bootstrap;
pub mod entry;
pub mod trampoline;
pub mod ops;
pub mod exit;
pub mod panic;

// Re-exports
pub use bootstrap::{bootstrap, BootState};
pub use config::RuntimeConfig;
pub use entry::EntryPlan;
pub use exit::HostExit;
pub use ops::{FileInfo, OpHandle};
pub use panic::install_panic_hook;
pub use trampoline::{ErrorTrampoline, TrampolineOutcome};

use std::sync::Arc;

use hostcall_core::bridge::HostBridge;
use hostcall_core::error::{DispatchError, Result};
use hostcall_core::exit::ProcessExit;
use hostcall_core::{kerror, kinfo, kprint};
use hostcall_executor::Dispatcher;

/// A bootstrapped script context.
pub struct Runtime<B: HostBridge> {
    config: RuntimeConfig,
    dispatcher: Dispatcher<B>,
    boot: BootState,
    plan: EntryPlan,
}

impl<B: HostBridge> Runtime<B> {
    /// Validate `config`, run the handshake, and pick the entry plan.
    pub fn start(bridge: Arc<B>, config: RuntimeConfig, exit: Arc<dyn ProcessExit>) -> Result<Self> {
        config.validate().map_err(DispatchError::Config)?;
        if let Some(level) = config.log_level {
            kprint::set_log_level(level);
        }

        let dispatcher = Dispatcher::new(bridge, Arc::clone(&exit));
        let trampoline = ErrorTrampoline::new(config.interactive_source.clone(), exit);
        let boot = bootstrap(&dispatcher, trampoline)?;
        let plan = EntryPlan::from_boot(&boot);
        kinfo!("bootstrap complete: {:?}", plan);

        Ok(Self {
            config,
            dispatcher,
            boot,
            plan,
        })
    }

    /// `start`, treating any failure as fatal: log it and exit 1.
    pub fn start_or_exit(bridge: Arc<B>, config: RuntimeConfig, exit: Arc<dyn ProcessExit>) -> Option<Self> {
        match Self::start(bridge, config, Arc::clone(&exit)) {
            Ok(rt) => Some(rt),
            Err(err) => {
                kerror!("bootstrap failed: {}", err);
                // Protocol violations already went through the dispatcher's exit.
                if !err.is_fatal() {
                    exit.exit(1);
                }
                None
            }
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher<B> {
        &self.dispatcher
    }

    pub fn boot(&self) -> &BootState {
        &self.boot
    }

    pub fn plan(&self) -> &EntryPlan {
        &self.plan
    }

    /// Time out stale async calls per `async_timeout`. No-op when unset.
    pub fn reap(&self) -> usize {
        match self.config.async_timeout {
            Some(max_age) => self.dispatcher.reap_expired(max_age),
            None => 0,
        }
    }

    /// Notify the host and exit with `code`.
    pub fn exit(&self, code: i32) {
        ops::exit(&self.dispatcher, code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostcall_core::bridge::{Bytes, DeliveryCallback, ErrorValue, GlobalErrorHandler, UncaughtError};
    use hostcall_core::exit::RecordingExit;
    use hostcall_core::msg::Payload;
    use hostcall_module::{LoopbackHost, LoopbackHostConfig};
    use std::time::Duration;

    fn host(config: LoopbackHostConfig) -> Arc<LoopbackHost> {
        Arc::new(LoopbackHost::new(config).unwrap())
    }

    #[test]
    fn test_start_runs_script() {
        let h = host(LoopbackHostConfig::default().argv(["_", "script.js"]).cwd("/home/user"));
        let exit = Arc::new(RecordingExit::new());
        let rt = Runtime::start(Arc::clone(&h), RuntimeConfig::new(), exit.clone()).unwrap();

        assert_eq!(rt.boot().cwd(), "/home/user");
        assert_eq!(rt.boot().args(), ["script.js".to_string()]);
        assert_eq!(rt.plan(), &EntryPlan::Run { main: "script.js".into(), recompile: false });

        let repl = UncaughtError::new("x", Some("repl"), ErrorValue::Thrown("x".into()));
        h.raise_uncaught(repl);
        assert_eq!(exit.last(), None);

        let fatal = UncaughtError::new("x", Some("main.js"), ErrorValue::Thrown("x".into()));
        h.raise_uncaught(fatal);
        assert_eq!(exit.codes(), vec![1]);
    }

    #[test]
    fn test_start_interactive_without_script() {
        let h = host(LoopbackHostConfig::default().argv(["_"]).cwd("/"));
        let rt = Runtime::start(h, RuntimeConfig::new(), Arc::new(RecordingExit::new())).unwrap();
        assert_eq!(rt.plan(), &EntryPlan::Interactive);
    }

    #[test]
    fn test_start_or_exit_on_failure() {
        let h = host(LoopbackHostConfig::default().cwd("/"));
        h.set_mute(true);
        let exit = Arc::new(RecordingExit::new());
        assert!(Runtime::start_or_exit(h, RuntimeConfig::new(), exit.clone()).is_none());
        assert_eq!(exit.codes(), vec![1]);
    }

    /// Answers every request with a cut-off reply.
    struct TruncatingHost(LoopbackHost);

    impl HostBridge for TruncatingHost {
        fn send_bytes(&self, buf: Bytes) -> Option<Bytes> {
            self.0.send_bytes(buf).map(|reply| reply.slice(..reply.len() / 2))
        }

        fn set_delivery_callback(&self, callback: DeliveryCallback) {
            self.0.set_delivery_callback(callback);
        }

        fn set_global_error_handler(&self, handler: GlobalErrorHandler) {
            self.0.set_global_error_handler(handler);
        }
    }

    #[test]
    fn test_malformed_start_reply_exits_once() {
        let inner = LoopbackHost::new(LoopbackHostConfig::default().cwd("/")).unwrap();
        let exit = Arc::new(RecordingExit::new());
        let started = Runtime::start_or_exit(
            Arc::new(TruncatingHost(inner)),
            RuntimeConfig::new(),
            exit.clone(),
        );
        assert!(started.is_none());
        assert_eq!(exit.codes(), vec![1]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let h = host(LoopbackHostConfig::default().cwd("/"));
        let config = RuntimeConfig::new().interactive_source("");
        assert!(matches!(
            Runtime::start(h, config, Arc::new(RecordingExit::new())),
            Err(DispatchError::Config(_))
        ));
    }

    #[test]
    fn test_reap_uses_configured_timeout() {
        let h = host(LoopbackHostConfig::default().cwd("/"));
        let exit = Arc::new(RecordingExit::new());
        let config = RuntimeConfig::new().async_timeout(Duration::from_millis(1));
        let rt = Runtime::start(Arc::clone(&h), config, exit.clone()).unwrap();

        let call = rt.dispatcher().call_async(Payload::Cwd).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(rt.reap(), 1);
        assert!(matches!(call.wait(), Err(DispatchError::Timeout(_))));

        // A late answer for a reaped call is dropped, not fatal.
        assert_eq!(h.drain(1), 1);
        assert_eq!(exit.last(), None);
    }

    #[test]
    fn test_reap_disabled_by_default() {
        let h = host(LoopbackHostConfig::default().cwd("/"));
        let rt = Runtime::start(h, RuntimeConfig::new(), Arc::new(RecordingExit::new())).unwrap();
        let _call = rt.dispatcher().call_async(Payload::Cwd).unwrap();
        assert_eq!(rt.reap(), 0);
        assert_eq!(rt.dispatcher().pending_count(), 1);
    }
}
