//! # hostcall-executor — The Dispatcher
//!
//! Every hostcall goes through one `Dispatcher`:
//!
//! ```text
//! call_sync(payload)
//!     encode(SYNC) → bridge.send_bytes → Some(reply) → decode → Envelope
//!                                      → None        → NoResponse
//!                                      → bad reply   → log + exit(1)
//!
//! call_async(payload)
//!     table.allocate() → encode(id) → bridge.send_bytes → None → CallHandle
//!
//! host delivery (router, installed once)
//!     decode → table.remove(id) → complete CallHandle
//!            → unknown id / bad bytes → log + exit(1)
//! ```
//!
//! The dispatcher is generic over the bridge and the codec. Swap either
//! and nothing here changes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use hostcall_core::bridge::HostBridge;
use hostcall_core::codec::Codec;
use hostcall_core::envelope::{CmdId, Envelope};
use hostcall_core::error::{DispatchError, Result};
use hostcall_core::exit::ProcessExit;
use hostcall_core::msg::{MessageKind, Payload};
use hostcall_core::{kerror, ktrace, kwarn};
use hostcall_module::{BinaryCodec, CallHandle, CorrelationTable};

/// Dispatcher counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub sync_calls: AtomicU64,
    pub async_calls: AtomicU64,
    pub deliveries: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub timeouts: AtomicU64,
}

/// State reachable from the delivery callback.
///
/// Holds no reference to the bridge, so registering the callback with the
/// bridge does not create a cycle.
struct Shared<C> {
    codec: C,
    table: CorrelationTable,
    exit: Arc<dyn ProcessExit>,
    stats: DispatchStats,
}

impl<C: Codec> Shared<C> {
    fn route(&self, buf: &[u8]) -> Result<()> {
        let env = self.codec.decode(buf)?;
        let cmd_id = env.cmd_id;
        let pending = match self.table.remove(cmd_id) {
            Some(pending) => pending,
            None if self.table.clear_reaped(cmd_id) => {
                kwarn!("late {} for timed-out call {:?} dropped", env.kind(), cmd_id);
                return Ok(());
            }
            None => return Err(DispatchError::UnknownCorrelationId(cmd_id)),
        };

        self.stats.deliveries.fetch_add(1, Ordering::Relaxed);
        ktrace!(
            "resolve {:?} {} after {:?}",
            cmd_id,
            env.kind(),
            pending.issued_at.elapsed()
        );
        pending.slot.complete(env.into_result());
        Ok(())
    }

    /// Count a failed exchange. Fatal classes log and exit(1).
    fn protocol_failure(&self, context: &str, err: &DispatchError) {
        self.stats.protocol_errors.fetch_add(1, Ordering::Relaxed);
        if err.is_fatal() {
            kerror!("protocol violation on {}: {}", context, err);
            self.exit.exit(1);
        } else {
            kwarn!("{} failed: {}", context, err);
        }
    }

    /// Decode a reply returned by `send_bytes`.
    ///
    /// Bad bytes or a foreign correlation id break the boundary: the error
    /// is returned after `exit(1)`. An async rejection may come back under
    /// its own id or under `SYNC`.
    fn decode_reply(&self, kind: MessageKind, sent_id: CmdId, reply: &[u8]) -> Result<Envelope> {
        let checked = self.codec.decode(reply).and_then(|env| {
            if env.cmd_id == sent_id || env.cmd_id.is_sync() {
                Ok(env)
            } else if sent_id.is_sync() {
                Err(DispatchError::malformed("sync reply carries a correlation id"))
            } else {
                Err(DispatchError::malformed("reply carries a different correlation id"))
            }
        });
        checked.map_err(|err| {
            self.protocol_failure(&format!("reply to {}", kind), &err);
            err
        })
    }
}

pub struct Dispatcher<B: HostBridge, C: Codec = BinaryCodec> {
    bridge: Arc<B>,
    shared: Arc<Shared<C>>,
    router_installed: AtomicBool,
}

impl<B: HostBridge> Dispatcher<B, BinaryCodec> {
    pub fn new(bridge: Arc<B>, exit: Arc<dyn ProcessExit>) -> Self {
        Self::with_codec(bridge, BinaryCodec::new(), exit)
    }
}

impl<B: HostBridge, C: Codec> Dispatcher<B, C> {
    pub fn with_codec(bridge: Arc<B>, codec: C, exit: Arc<dyn ProcessExit>) -> Self {
        Self::with_table(bridge, codec, CorrelationTable::new(), exit)
    }

    /// Use a pre-built correlation table (e.g. one starting at a given id).
    pub fn with_table(
        bridge: Arc<B>,
        codec: C,
        table: CorrelationTable,
        exit: Arc<dyn ProcessExit>,
    ) -> Self {
        Self {
            bridge,
            shared: Arc::new(Shared {
                codec,
                table,
                exit,
                stats: DispatchStats::default(),
            }),
            router_installed: AtomicBool::new(false),
        }
    }

    pub fn bridge(&self) -> &Arc<B> {
        &self.bridge
    }

    pub fn process_exit(&self) -> &Arc<dyn ProcessExit> {
        &self.shared.exit
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.shared.stats
    }

    fn send(&self, env: &Envelope) -> Result<Option<Bytes>> {
        let buf = self.shared.codec.encode(env)?;
        Ok(self.bridge.send_bytes(buf))
    }

    /// Send a request and block for the reply.
    ///
    /// An `Error` reply becomes `DispatchError::Host`. A malformed reply,
    /// or one carrying a correlation id, ends the process with exit code 1
    /// before the error is returned.
    pub fn call_sync(&self, payload: Payload) -> Result<Envelope> {
        let kind = payload.kind();
        self.shared.stats.sync_calls.fetch_add(1, Ordering::Relaxed);

        let reply = self
            .send(&Envelope::sync(payload))?
            .ok_or(DispatchError::NoResponse { kind })?;
        let env = self.shared.decode_reply(kind, CmdId::SYNC, &reply)?;
        ktrace!("sync {} -> {}", kind, env.kind());
        env.into_result()
    }

    /// `call_sync`, failing with `UnexpectedKind` unless the reply is `expected`.
    pub fn call_sync_expect(&self, payload: Payload, expected: MessageKind) -> Result<Envelope> {
        self.call_sync(payload)?.expect_kind(expected)
    }

    /// Send a request under a fresh correlation id and return its handle.
    ///
    /// The handle completes when the host delivers a reply through the
    /// router. A request the host never answers stays pending until
    /// `reap_expired` removes it.
    pub fn call_async(&self, payload: Payload) -> Result<CallHandle> {
        let handle = self.shared.table.allocate();
        self.send_async(handle, payload)
    }

    /// `call_async` with a caller-chosen id. Fails with
    /// `DuplicateCorrelationId` if the id is still pending.
    pub fn call_async_as(&self, cmd_id: CmdId, payload: Payload) -> Result<CallHandle> {
        let handle = self.shared.table.insert(cmd_id)?;
        self.send_async(handle, payload)
    }

    fn send_async(&self, handle: CallHandle, payload: Payload) -> Result<CallHandle> {
        let cmd_id = handle.cmd_id();
        let kind = payload.kind();
        self.shared.stats.async_calls.fetch_add(1, Ordering::Relaxed);
        ktrace!("async {:?} {}", cmd_id, kind);

        // Registered before sending: the host may deliver on another
        // thread before send_bytes returns.
        let reply = match self.send(&Envelope::new(cmd_id, payload)) {
            Ok(None) => return Ok(handle),
            Ok(Some(reply)) => reply,
            Err(err) => {
                self.shared.table.remove(cmd_id);
                return Err(err);
            }
        };

        // Bytes instead of an acknowledgement: immediate rejection.
        self.shared.table.remove(cmd_id);
        let env = self.shared.decode_reply(kind, cmd_id, &reply)?;
        kwarn!("async {} {:?} rejected immediately with {}", kind, cmd_id, env.kind());
        match env.payload {
            Payload::Error(err) => Err(DispatchError::Host(err)),
            other => Err(DispatchError::UnexpectedKind {
                expected: kind.result_kind().unwrap_or(MessageKind::Ok),
                actual: other.kind(),
            }),
        }
    }

    /// Resolve one host delivery.
    ///
    /// Unknown ids fail with `UnknownCorrelationId` and leave every other
    /// pending call untouched.
    pub fn handle_delivery(&self, buf: &[u8]) -> Result<()> {
        self.shared.route(buf)
    }

    /// Register the router as the bridge's delivery callback. Once only.
    ///
    /// Protocol violations seen by the callback are logged and end the
    /// process with exit code 1.
    pub fn install_router(&self) -> Result<()>
    where
        C: 'static,
    {
        if self.router_installed.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::AlreadyInstalled("delivery router"));
        }
        let shared = Arc::clone(&self.shared);
        self.bridge.set_delivery_callback(Box::new(move |buf: Bytes| {
            if let Err(err) = shared.route(&buf) {
                shared.protocol_failure("delivery", &err);
            }
        }));
        Ok(())
    }

    pub fn router_installed(&self) -> bool {
        self.router_installed.load(Ordering::SeqCst)
    }

    /// Fail every pending call older than `max_age` with `Timeout`.
    pub fn reap_expired(&self, max_age: Duration) -> usize {
        let expired = self.shared.table.take_expired(max_age, Instant::now());
        let n = expired.len();
        for pending in expired {
            kwarn!("call {:?} timed out after {:?}", pending.cmd_id, max_age);
            pending.slot.complete(Err(DispatchError::Timeout(pending.cmd_id)));
        }
        self.shared.stats.timeouts.fetch_add(n as u64, Ordering::Relaxed);
        n
    }

    pub fn pending_count(&self) -> usize {
        self.shared.table.len()
    }
}
