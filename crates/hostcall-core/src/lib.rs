//! # hostcall-core — boundary types and trait definitions
//!
//! Script code inside a sandbox asks a privileged host to do things for
//! it. This crate defines what crosses that boundary and the trait seams
//! every other crate programs against.
//!
//! ## Modules
//!
//! - `msg` - `MessageKind` discriminant and per-kind payload structs
//! - `envelope` - `Envelope` and the `CmdId` correlation id
//! - `bridge` - `HostBridge` primitives and uncaught-error types
//! - `codec` - `Codec` trait (bytes <-> envelope)
//! - `exit` - `ProcessExit` trait for fatal paths
//! - `error` - `DispatchError`
//! - `kprint` - leveled stderr logging macros
//! - `env` - environment variable helpers

pub mod msg;
pub mod envelope;
pub mod bridge;
pub mod codec;
pub mod exit;
pub mod error;
pub mod kprint;
pub mod env;

pub use bridge::{DeliveryCallback, ErrorValue, GlobalErrorHandler, HostBridge, UncaughtError};
pub use codec::Codec;
pub use envelope::{CmdId, Envelope};
pub use error::{DispatchError, Result};
pub use exit::{OsExit, ProcessExit, RecordingExit};
pub use msg::{HostError, HostErrorKind, MessageKind, Payload};
