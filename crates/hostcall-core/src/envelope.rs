//! Envelope and correlation id types.

use core::fmt;

use crate::error::{DispatchError, Result};
use crate::msg::{CwdRes, MakeTempDirRes, MessageKind, Payload, StartRes, StatRes};

/// Correlation id for one call.
///
/// `CmdId::SYNC` marks a synchronous call (no correlation needed).
/// Asynchronous calls get a non-zero id that is unique while pending.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CmdId(pub u32);

impl CmdId {
    pub const SYNC: Self = Self(0);

    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_sync(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for CmdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sync() {
            write!(f, "CmdId(SYNC)")
        } else {
            write!(f, "CmdId({})", self.0)
        }
    }
}

impl fmt::Display for CmdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tagged message unit crossing the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub cmd_id: CmdId,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(cmd_id: CmdId, payload: Payload) -> Self {
        Self { cmd_id, payload }
    }

    /// A synchronous (uncorrelated) envelope.
    pub fn sync(payload: Payload) -> Self {
        Self::new(CmdId::SYNC, payload)
    }

    #[inline]
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Turn an `Error` envelope into `DispatchError::Host`, pass anything else through.
    pub fn into_result(self) -> Result<Envelope> {
        match self.payload {
            Payload::Error(err) => Err(DispatchError::Host(err)),
            _ => Ok(self),
        }
    }

    /// Fail with `UnexpectedKind` unless the payload is `expected`.
    pub fn expect_kind(self, expected: MessageKind) -> Result<Envelope> {
        let actual = self.kind();
        if actual == expected {
            Ok(self)
        } else {
            Err(DispatchError::UnexpectedKind { expected, actual })
        }
    }

    // ── Typed accessors ──

    pub fn into_start_res(self) -> Result<StartRes> {
        match self.payload {
            Payload::StartRes(res) => Ok(res),
            other => Err(unexpected(MessageKind::StartRes, &other)),
        }
    }

    pub fn into_stat_res(self) -> Result<StatRes> {
        match self.payload {
            Payload::StatRes(res) => Ok(res),
            other => Err(unexpected(MessageKind::StatRes, &other)),
        }
    }

    pub fn into_make_temp_dir_res(self) -> Result<MakeTempDirRes> {
        match self.payload {
            Payload::MakeTempDirRes(res) => Ok(res),
            other => Err(unexpected(MessageKind::MakeTempDirRes, &other)),
        }
    }

    pub fn into_cwd_res(self) -> Result<CwdRes> {
        match self.payload {
            Payload::CwdRes(res) => Ok(res),
            other => Err(unexpected(MessageKind::CwdRes, &other)),
        }
    }

    pub fn into_ok(self) -> Result<()> {
        match self.payload {
            Payload::Ok => Ok(()),
            other => Err(unexpected(MessageKind::Ok, &other)),
        }
    }
}

fn unexpected(expected: MessageKind, actual: &Payload) -> DispatchError {
    match actual {
        Payload::Error(err) => DispatchError::Host(err.clone()),
        _ => DispatchError::UnexpectedKind {
            expected,
            actual: actual.kind(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::HostErrorKind;

    #[test]
    fn test_cmd_id_sync() {
        assert!(CmdId::SYNC.is_sync());
        assert!(!CmdId::new(7).is_sync());
        assert_eq!(format!("{:?}", CmdId::SYNC), "CmdId(SYNC)");
        assert_eq!(format!("{:?}", CmdId::new(7)), "CmdId(7)");
    }

    #[test]
    fn test_into_result_maps_error() {
        let env = Envelope::sync(Payload::error(HostErrorKind::NotFound, "no such file"));
        match env.into_result() {
            Err(DispatchError::Host(err)) => {
                assert_eq!(err.kind, HostErrorKind::NotFound);
                assert_eq!(err.message, "no such file");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let env = Envelope::sync(Payload::Ok);
        assert!(env.into_result().is_ok());
    }

    #[test]
    fn test_expect_kind() {
        let env = Envelope::sync(Payload::Ok);
        let err = env.expect_kind(MessageKind::StatRes).unwrap_err();
        assert_eq!(
            err,
            DispatchError::UnexpectedKind {
                expected: MessageKind::StatRes,
                actual: MessageKind::Ok,
            }
        );
    }

    #[test]
    fn test_wrong_accessor() {
        let env = Envelope::sync(Payload::Cwd);
        assert!(matches!(
            env.into_stat_res(),
            Err(DispatchError::UnexpectedKind { expected: MessageKind::StatRes, .. })
        ));
    }
}
