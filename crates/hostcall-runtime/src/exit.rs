//! `HostExit` — tells the host before terminating.

use std::sync::Arc;

use hostcall_core::bridge::HostBridge;
use hostcall_core::codec::Codec;
use hostcall_core::envelope::Envelope;
use hostcall_core::exit::ProcessExit;
use hostcall_core::msg::{Exit, Payload};
use hostcall_core::{kdebug, kwarn};
use hostcall_module::BinaryCodec;

/// Sends a synchronous `Exit` request, then hands off to `inner`.
///
/// Holds the bridge rather than a dispatcher, so it can be the
/// dispatcher's own `ProcessExit` without a reference cycle.
pub struct HostExit<B: HostBridge, C: Codec = BinaryCodec> {
    bridge: Arc<B>,
    codec: C,
    inner: Arc<dyn ProcessExit>,
}

impl<B: HostBridge> HostExit<B, BinaryCodec> {
    pub fn new(bridge: Arc<B>, inner: Arc<dyn ProcessExit>) -> Self {
        Self::with_codec(bridge, BinaryCodec::new(), inner)
    }
}

impl<B: HostBridge, C: Codec> HostExit<B, C> {
    pub fn with_codec(bridge: Arc<B>, codec: C, inner: Arc<dyn ProcessExit>) -> Self {
        Self { bridge, codec, inner }
    }
}

impl<B: HostBridge, C: Codec> ProcessExit for HostExit<B, C> {
    fn exit(&self, code: i32) {
        let req = Envelope::sync(Payload::Exit(Exit { code }));
        match self.codec.encode(&req) {
            Ok(buf) => {
                if self.bridge.send_bytes(buf).is_none() {
                    kdebug!("host did not acknowledge exit({})", code);
                }
            }
            Err(err) => kwarn!("exit({}) not sent to host: {}", code, err),
        }
        self.inner.exit(code);
    }
}
