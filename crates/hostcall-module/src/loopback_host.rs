//! `LoopbackHost` — in-process `HostBridge`.
//!
//! Services requests in the calling process instead of across a sandbox.
//! Synchronous requests are answered inline from `send_bytes`.
//! Asynchronous requests are acknowledged with `None`, queued in a
//! bounded `ArrayQueue`, and answered through the delivery callback when
//! `drain()` runs (one host event-loop tick).
//!
//! A full queue rejects the request immediately with an `Error` reply.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use crossbeam_queue::ArrayQueue;

use hostcall_core::bridge::{DeliveryCallback, GlobalErrorHandler, HostBridge, UncaughtError};
use hostcall_core::codec::Codec;
use hostcall_core::envelope::Envelope;
use hostcall_core::error::{DispatchError, Result};
use hostcall_core::msg::{HostErrorKind, Payload, StartRes};
use hostcall_core::{kdebug, ktrace, kwarn};

use crate::binary_codec::BinaryCodec;
use crate::host_exec;

type SharedDelivery = Arc<dyn Fn(Bytes) + Send + Sync>;
type SharedErrorHandler = Arc<dyn Fn(UncaughtError) + Send + Sync>;

/// What the host reports at `Start`, plus queue sizing.
#[derive(Debug, Clone)]
pub struct LoopbackHostConfig {
    /// Full argv. Index 0 is the interpreter name.
    pub argv: Vec<String>,
    /// Initial working directory. `None` → the process cwd.
    pub cwd: Option<PathBuf>,
    pub debug_flag: bool,
    pub deps_flag: bool,
    pub recompile_flag: bool,
    /// Max queued asynchronous requests.
    pub queue_capacity: usize,
}

impl Default for LoopbackHostConfig {
    fn default() -> Self {
        Self {
            argv: vec!["hostcall".to_string()],
            cwd: None,
            debug_flag: false,
            deps_flag: false,
            recompile_flag: false,
            queue_capacity: 256,
        }
    }
}

impl LoopbackHostConfig {
    pub fn argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv = argv.into_iter().map(Into::into).collect();
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.debug_flag = on;
        self
    }

    pub fn deps(mut self, on: bool) -> Self {
        self.deps_flag = on;
        self
    }

    pub fn recompile(mut self, on: bool) -> Self {
        self.recompile_flag = on;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(DispatchError::Config("queue_capacity must be > 0"));
        }
        if self.argv.is_empty() {
            return Err(DispatchError::Config("argv must hold at least the interpreter name"));
        }
        if let Some(cwd) = &self.cwd {
            if !cwd.is_absolute() {
                return Err(DispatchError::Config("cwd must be absolute"));
            }
        }
        Ok(())
    }
}

/// Traffic counters.
#[derive(Debug, Default)]
pub struct LoopbackStats {
    pub sync_requests: AtomicU64,
    pub async_requests: AtomicU64,
    pub deliveries: AtomicU64,
    pub rejected: AtomicU64,
}

pub struct LoopbackHost {
    config: LoopbackHostConfig,
    codec: BinaryCodec,
    cwd: Mutex<PathBuf>,
    queue: ArrayQueue<Envelope>,
    delivery: Mutex<Option<SharedDelivery>>,
    error_handler: Mutex<Option<SharedErrorHandler>>,
    exit_code: Mutex<Option<i32>>,
    /// Drop sync replies (simulates a host that answers nothing).
    mute: AtomicBool,
    stats: LoopbackStats,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl LoopbackHost {
    pub fn new(config: LoopbackHostConfig) -> Result<Self> {
        config.validate()?;
        let cwd = match &config.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir()
                .map_err(|_| DispatchError::Config("process cwd is unavailable"))?,
        };
        Ok(Self {
            queue: ArrayQueue::new(config.queue_capacity),
            config,
            codec: BinaryCodec::new(),
            cwd: Mutex::new(cwd),
            delivery: Mutex::new(None),
            error_handler: Mutex::new(None),
            exit_code: Mutex::new(None),
            mute: AtomicBool::new(false),
            stats: LoopbackStats::default(),
        })
    }

    pub fn config(&self) -> &LoopbackHostConfig {
        &self.config
    }

    pub fn stats(&self) -> &LoopbackStats {
        &self.stats
    }

    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Relaxed);
    }

    /// Current virtual working directory.
    pub fn cwd(&self) -> PathBuf {
        lock(&self.cwd).clone()
    }

    /// Code from the last `Exit` request, if any.
    pub fn exit_requested(&self) -> Option<i32> {
        *lock(&self.exit_code)
    }

    /// Asynchronous requests waiting for `drain`.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Service up to `max` queued requests, delivering replies in FIFO order.
    pub fn drain(&self, max: usize) -> usize {
        let batch = self.pop_batch(max);
        self.deliver_batch(batch)
    }

    /// Like `drain`, but delivers the batch newest first.
    pub fn drain_reversed(&self, max: usize) -> usize {
        let mut batch = self.pop_batch(max);
        batch.reverse();
        self.deliver_batch(batch)
    }

    /// Push raw bytes through the delivery callback.
    ///
    /// Returns `false` if no callback is registered.
    pub fn deliver_raw(&self, bytes: Bytes) -> bool {
        let callback = lock(&self.delivery).clone();
        match callback {
            Some(cb) => {
                self.stats.deliveries.fetch_add(1, Ordering::Relaxed);
                cb(bytes);
                true
            }
            None => false,
        }
    }

    /// Report an uncaught script error through the registered handler.
    ///
    /// Returns `false` if no handler is registered.
    pub fn raise_uncaught(&self, err: UncaughtError) -> bool {
        let handler = lock(&self.error_handler).clone();
        match handler {
            Some(h) => {
                h(err);
                true
            }
            None => false,
        }
    }

    fn pop_batch(&self, max: usize) -> Vec<Envelope> {
        let mut batch = Vec::with_capacity(max.min(self.queue.len()));
        while batch.len() < max {
            match self.queue.pop() {
                Some(env) => batch.push(env),
                None => break,
            }
        }
        batch
    }

    fn deliver_batch(&self, batch: Vec<Envelope>) -> usize {
        let mut delivered = 0;
        for req in batch {
            let cmd_id = req.cmd_id;
            let reply = Envelope::new(cmd_id, self.execute(req.payload));
            ktrace!("loopback deliver {:?} {}", cmd_id, reply.kind());
            if !self.deliver_raw(self.encode_reply(&reply)) {
                kwarn!("loopback: no delivery callback, dropped reply for {:?}", cmd_id);
                continue;
            }
            delivered += 1;
        }
        delivered
    }

    fn start_res(&self) -> StartRes {
        StartRes {
            cwd: self.cwd().to_string_lossy().into_owned(),
            argv: self.config.argv.clone(),
            debug_flag: self.config.debug_flag,
            deps_flag: self.config.deps_flag,
            recompile_flag: self.config.recompile_flag,
        }
    }

    fn execute(&self, payload: Payload) -> Payload {
        let cwd = self.cwd();
        match payload {
            Payload::Start => Payload::StartRes(self.start_res()),
            Payload::Stat(req) => host_exec::reply(host_exec::stat(&cwd, &req), Payload::StatRes),
            Payload::Mkdir(req) => host_exec::reply(host_exec::mkdir(&cwd, &req), |()| Payload::Ok),
            Payload::MakeTempDir(req) => host_exec::reply(
                host_exec::make_temp_dir(&cwd, &req),
                Payload::MakeTempDirRes,
            ),
            Payload::Chdir(req) => match host_exec::chdir(&cwd, &req) {
                Ok(next) => {
                    *lock(&self.cwd) = next;
                    Payload::Ok
                }
                Err(err) => Payload::Error(err),
            },
            Payload::Cwd => Payload::CwdRes(host_exec::cwd_res(&cwd)),
            Payload::Exit(req) => {
                kdebug!("loopback: exit({}) requested", req.code);
                *lock(&self.exit_code) = Some(req.code);
                Payload::Ok
            }
            other => Payload::error(
                HostErrorKind::Unsupported,
                format!("{} is not a request", other.kind()),
            ),
        }
    }

    fn reject(&self, env: &Envelope, kind: HostErrorKind, message: &str) -> Option<Bytes> {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        let reply = Envelope::new(env.cmd_id, Payload::error(kind, message));
        Some(self.encode_reply(&reply))
    }

    /// Encode a reply. One that does not fit the wire becomes an error reply.
    fn encode_reply(&self, reply: &Envelope) -> Bytes {
        match self.codec.encode(reply) {
            Ok(bytes) => bytes,
            Err(err) => {
                kwarn!("loopback: cannot encode {} reply: {}", reply.kind(), err);
                let fallback = Envelope::new(reply.cmd_id, Payload::error(HostErrorKind::Other, err.to_string()));
                self.codec.encode(&fallback).unwrap_or_default()
            }
        }
    }
}

impl HostBridge for LoopbackHost {
    fn send_bytes(&self, buf: Bytes) -> Option<Bytes> {
        let req = match self.codec.decode(&buf) {
            Ok(req) => req,
            Err(err) => {
                kwarn!("loopback: undecodable request: {}", err);
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                let reply = Envelope::sync(Payload::error(HostErrorKind::InvalidInput, err.to_string()));
                return Some(self.encode_reply(&reply));
            }
        };

        if req.cmd_id.is_sync() {
            self.stats.sync_requests.fetch_add(1, Ordering::Relaxed);
            ktrace!("loopback sync {}", req.kind());
            let reply = Envelope::sync(self.execute(req.payload));
            if self.mute.load(Ordering::Relaxed) {
                return None;
            }
            return Some(self.encode_reply(&reply));
        }

        self.stats.async_requests.fetch_add(1, Ordering::Relaxed);
        ktrace!("loopback async {:?} {}", req.cmd_id, req.kind());
        match self.queue.push(req) {
            Ok(()) => None,
            Err(req) => self.reject(&req, HostErrorKind::Other, "async queue full"),
        }
    }

    fn set_delivery_callback(&self, callback: DeliveryCallback) {
        *lock(&self.delivery) = Some(Arc::from(callback));
    }

    fn set_global_error_handler(&self, handler: GlobalErrorHandler) {
        *lock(&self.error_handler) = Some(Arc::from(handler));
    }
}
