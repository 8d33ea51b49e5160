//! Dispatch error types.

use std::fmt;

use crate::envelope::CmdId;
use crate::msg::{HostError, MessageKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Truncated or invalid envelope bytes. Protocol bug, never retried.
    MalformedEnvelope { reason: &'static str },
    /// The host reported a failure for this request.
    Host(HostError),
    /// A synchronous send returned no bytes.
    NoResponse { kind: MessageKind },
    /// The reply carried a kind the caller is not prepared to accept.
    UnexpectedKind {
        expected: MessageKind,
        actual: MessageKind,
    },
    /// A delivery referenced an id with no pending call.
    UnknownCorrelationId(CmdId),
    /// An id was reused while the previous call is still pending.
    DuplicateCorrelationId(CmdId),
    /// A pending call was reaped before the host answered.
    Timeout(CmdId),
    /// A process-wide hook was registered twice.
    AlreadyInstalled(&'static str),
    /// Invalid runtime configuration.
    Config(&'static str),
    /// The encoded payload does not fit the wire limit. Nothing was sent.
    PayloadTooLarge { kind: MessageKind, len: usize },
}

impl DispatchError {
    /// Errors that mean the boundary contract itself is broken.
    ///
    /// The process cannot trust further traffic after one of these.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedEnvelope { .. } | Self::UnknownCorrelationId(_)
        )
    }

    pub fn malformed(reason: &'static str) -> Self {
        Self::MalformedEnvelope { reason }
    }

    /// The host error, if this is one.
    pub fn host_error(&self) -> Option<&HostError> {
        match self {
            Self::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEnvelope { reason } => write!(f, "malformed envelope: {}", reason),
            Self::Host(err) => write!(f, "host error: {}", err),
            Self::NoResponse { kind } => write!(f, "no response to {} request", kind),
            Self::UnexpectedKind { expected, actual } => {
                write!(f, "unexpected response kind: expected {}, got {}", expected, actual)
            }
            Self::UnknownCorrelationId(id) => write!(f, "unknown correlation id {}", id),
            Self::DuplicateCorrelationId(id) => write!(f, "correlation id {} already pending", id),
            Self::Timeout(id) => write!(f, "call {} timed out", id),
            Self::AlreadyInstalled(what) => write!(f, "{} already installed", what),
            Self::Config(msg) => write!(f, "invalid config: {}", msg),
            Self::PayloadTooLarge { kind, len } => {
                write!(f, "{} payload of {} bytes exceeds the wire limit", kind, len)
            }
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HostError> for DispatchError {
    fn from(e: HostError) -> Self {
        DispatchError::Host(e)
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
