//! # hostcall-module — Default implementations
//!
//! This crate provides the default implementation for every hostcall
//! trait, plus the bookkeeping the dispatcher builds on.
//!
//! ## Default stack
//!
//! | Trait / role        | Default Impl       | Notes                          |
//! |---------------------|--------------------|--------------------------------|
//! | Codec               | BinaryCodec        | little-endian, see `wire`      |
//! | HostBridge          | LoopbackHost       | in-process, nix-backed fs ops  |
//! | async bookkeeping   | CorrelationTable   | `Mutex<HashMap<CmdId, ..>>`    |
//! | completion object   | CallHandle         | blocking wait or `Future`      |

pub mod wire;
pub mod binary_codec;
pub mod completion;
pub mod correlation;
pub mod host_exec;
pub mod loopback_host;

pub use binary_codec::BinaryCodec;
pub use completion::{CallHandle, CompletionSlot};
pub use correlation::{CorrelationTable, PendingCall};
pub use loopback_host::{LoopbackHost, LoopbackHostConfig, LoopbackStats};
