//! Message kinds and payload structs.
//!
//! These are the *lingua franca* between script side and host side.
//! Every request/response that crosses the boundary is one `Payload`
//! variant; the variant decides the `MessageKind` tag on the wire.

use core::fmt;

/// Discriminant carried in every envelope header.
///
/// Tag 0 is reserved for "no payload" and never produced by `tag()`.
/// Requests and their results are paired by convention only, see
/// [`MessageKind::result_kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Host-side failure; valid as a response to any request.
    Error = 1,
    /// Empty acknowledgement for unit-returning requests.
    Ok = 2,
    Start = 3,
    StartRes = 4,
    Stat = 5,
    StatRes = 6,
    Mkdir = 7,
    MakeTempDir = 8,
    MakeTempDirRes = 9,
    Chdir = 10,
    Cwd = 11,
    CwdRes = 12,
    Exit = 13,
}

impl MessageKind {
    /// Every valid kind, in tag order.
    pub const ALL: [MessageKind; 13] = [
        MessageKind::Error,
        MessageKind::Ok,
        MessageKind::Start,
        MessageKind::StartRes,
        MessageKind::Stat,
        MessageKind::StatRes,
        MessageKind::Mkdir,
        MessageKind::MakeTempDir,
        MessageKind::MakeTempDirRes,
        MessageKind::Chdir,
        MessageKind::Cwd,
        MessageKind::CwdRes,
        MessageKind::Exit,
    ];

    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Map a wire tag back to a kind. `None` for 0 and unknown tags.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageKind::Error),
            2 => Some(MessageKind::Ok),
            3 => Some(MessageKind::Start),
            4 => Some(MessageKind::StartRes),
            5 => Some(MessageKind::Stat),
            6 => Some(MessageKind::StatRes),
            7 => Some(MessageKind::Mkdir),
            8 => Some(MessageKind::MakeTempDir),
            9 => Some(MessageKind::MakeTempDirRes),
            10 => Some(MessageKind::Chdir),
            11 => Some(MessageKind::Cwd),
            12 => Some(MessageKind::CwdRes),
            13 => Some(MessageKind::Exit),
            _ => None,
        }
    }

    /// The result kind a host is expected to answer with.
    ///
    /// `None` for kinds that are themselves results. Any request may also
    /// be answered with `Error`.
    pub fn result_kind(self) -> Option<MessageKind> {
        match self {
            MessageKind::Start => Some(MessageKind::StartRes),
            MessageKind::Stat => Some(MessageKind::StatRes),
            MessageKind::Mkdir | MessageKind::Chdir | MessageKind::Exit => Some(MessageKind::Ok),
            MessageKind::MakeTempDir => Some(MessageKind::MakeTempDirRes),
            MessageKind::Cwd => Some(MessageKind::CwdRes),
            MessageKind::Error
            | MessageKind::Ok
            | MessageKind::StartRes
            | MessageKind::StatRes
            | MessageKind::MakeTempDirRes
            | MessageKind::CwdRes => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Error => "Error",
            MessageKind::Ok => "Ok",
            MessageKind::Start => "Start",
            MessageKind::StartRes => "StartRes",
            MessageKind::Stat => "Stat",
            MessageKind::StatRes => "StatRes",
            MessageKind::Mkdir => "Mkdir",
            MessageKind::MakeTempDir => "MakeTempDir",
            MessageKind::MakeTempDirRes => "MakeTempDirRes",
            MessageKind::Chdir => "Chdir",
            MessageKind::Cwd => "Cwd",
            MessageKind::CwdRes => "CwdRes",
            MessageKind::Exit => "Exit",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Error payload ──

/// Classification of a host-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HostErrorKind {
    Other = 0,
    NotFound = 1,
    PermissionDenied = 2,
    AlreadyExists = 3,
    NotADirectory = 4,
    InvalidInput = 5,
    Unsupported = 6,
}

impl HostErrorKind {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HostErrorKind::Other),
            1 => Some(HostErrorKind::NotFound),
            2 => Some(HostErrorKind::PermissionDenied),
            3 => Some(HostErrorKind::AlreadyExists),
            4 => Some(HostErrorKind::NotADirectory),
            5 => Some(HostErrorKind::InvalidInput),
            6 => Some(HostErrorKind::Unsupported),
            _ => None,
        }
    }
}

/// A failure the host reported for one specific request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub kind: HostErrorKind,
    pub message: String,
}

impl HostError {
    pub fn new(kind: HostErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for HostError {}

// ── Request / response payloads ──

/// Answer to the bootstrap `Start` request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartRes {
    pub cwd: String,
    /// Full argv; index 0 is the executable and is skipped by consumers.
    pub argv: Vec<String>,
    pub debug_flag: bool,
    pub deps_flag: bool,
    pub recompile_flag: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub filename: String,
    /// Do not follow a trailing symlink.
    pub lstat: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatRes {
    pub is_file: bool,
    pub is_symlink: bool,
    pub len: u64,
    /// Seconds since the epoch.
    pub modified: i64,
    pub accessed: i64,
    pub created: i64,
    /// Permission bits, when the platform has them.
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mkdir {
    pub path: String,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MakeTempDir {
    /// Parent directory; host temp dir when absent.
    pub dir: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeTempDirRes {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chdir {
    pub directory: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CwdRes {
    pub cwd: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    pub code: i32,
}

/// One populated payload per envelope. The variant *is* the discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Error(HostError),
    Ok,
    Start,
    StartRes(StartRes),
    Stat(Stat),
    StatRes(StatRes),
    Mkdir(Mkdir),
    MakeTempDir(MakeTempDir),
    MakeTempDirRes(MakeTempDirRes),
    Chdir(Chdir),
    Cwd,
    CwdRes(CwdRes),
    Exit(Exit),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Error(_) => MessageKind::Error,
            Payload::Ok => MessageKind::Ok,
            Payload::Start => MessageKind::Start,
            Payload::StartRes(_) => MessageKind::StartRes,
            Payload::Stat(_) => MessageKind::Stat,
            Payload::StatRes(_) => MessageKind::StatRes,
            Payload::Mkdir(_) => MessageKind::Mkdir,
            Payload::MakeTempDir(_) => MessageKind::MakeTempDir,
            Payload::MakeTempDirRes(_) => MessageKind::MakeTempDirRes,
            Payload::Chdir(_) => MessageKind::Chdir,
            Payload::Cwd => MessageKind::Cwd,
            Payload::CwdRes(_) => MessageKind::CwdRes,
            Payload::Exit(_) => MessageKind::Exit,
        }
    }

    pub fn error(kind: HostErrorKind, message: impl Into<String>) -> Self {
        Payload::Error(HostError::new(kind, message))
    }
}
