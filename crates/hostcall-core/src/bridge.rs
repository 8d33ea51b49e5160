//! Host bridge abstraction.
//!
//! A `HostBridge` moves encoded envelopes between the sandboxed script
//! context and the privileged host. It is consumed through three primitives:
//!
//! - `send_bytes()`: synchronous hand-off. Returns the reply buffer for
//!   synchronous calls, `None` as receipt acknowledgement for async calls.
//! - `set_delivery_callback()`: host-initiated asynchronous delivery.
//!   Invoked zero or more times, in host order, after bootstrap.
//! - `set_global_error_handler()`: invoked when script code throws
//!   without catching.
//!
//! # Implementors
//!
//! - `LoopbackHost` (hostcall-module): in-process host that services
//!   requests directly. Used by tests and the smoke binary.
//! - An embedding interpreter's native bridge (out of tree).

/// Buffer type at the seam, re-exported for bridge implementors.
pub use bytes::Bytes;

/// Asynchronous delivery entry point.
pub type DeliveryCallback = Box<dyn Fn(Bytes) + Send + Sync>;

/// Uncaught-error entry point.
pub type GlobalErrorHandler = Box<dyn Fn(UncaughtError) + Send + Sync>;

/// Moves bytes across the boundary.
///
/// **Contract:**
/// - `send_bytes()` blocks the calling context until the host has either
///   produced a reply or acknowledged receipt.
/// - Each setter replaces any previously registered callback.
/// - Callbacks may be invoked from a host thread; they must be `Send + Sync`.
pub trait HostBridge: Send + Sync {
    fn send_bytes(&self, buf: Bytes) -> Option<Bytes>;

    fn set_delivery_callback(&self, callback: DeliveryCallback);

    fn set_global_error_handler(&self, handler: GlobalErrorHandler);
}

/// The thrown value of an uncaught script error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorValue {
    /// A structured error object.
    Structured {
        name: String,
        message: String,
        stack: Option<String>,
    },
    /// Anything else that was thrown, already stringified.
    Thrown(String),
}

/// One uncaught script error as reported by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncaughtError {
    pub message: String,
    /// Source label of the failing script. Some interpreters leave it
    /// empty for thrown primitives.
    pub source: Option<String>,
    pub line: u32,
    pub column: u32,
    pub value: ErrorValue,
}

impl UncaughtError {
    pub fn new(message: impl Into<String>, source: Option<&str>, value: ErrorValue) -> Self {
        Self {
            message: message.into(),
            source: source.map(str::to_string),
            line: 0,
            column: 0,
            value,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }
}
