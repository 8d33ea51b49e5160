//! Envelope codec abstraction.
//!
//! A `Codec` turns an `Envelope` into one contiguous buffer and back.
//! The byte layout must match the host's schema exactly; it is the only
//! bit-exact contract in the system.
//!
//! # Implementors
//!
//! - `BinaryCodec` (hostcall-module): fixed 16-byte header + packed
//!   little-endian payload.

use bytes::Bytes;

use crate::envelope::Envelope;
use crate::error::Result;

/// Pure envelope transform. Holds no per-call state.
///
/// **Contract:** `decode(&encode(e)?) == Ok(e)` for every envelope that
/// encodes. `encode()` fails with `PayloadTooLarge` instead of emitting a
/// buffer the other side would reject. `decode()` fails with
/// `MalformedEnvelope` on truncated input, unknown discriminants and
/// trailing bytes.
pub trait Codec: Send + Sync {
    fn encode(&self, envelope: &Envelope) -> Result<Bytes>;

    fn decode(&self, buf: &[u8]) -> Result<Envelope>;
}
