//! Envelope wire layout.
//!
//! Shared contract between script side and host side. Bit-exact.
//!
//! ```text
//! 0x00  magic        u32   ENVELOPE_MAGIC
//! 0x04  version      u8    WIRE_VERSION
//! 0x05  kind         u8    MessageKind tag, 0 = none (rejected)
//! 0x06  _reserved    u16   0
//! 0x08  cmd_id       u32   0 = sync
//! 0x0C  payload_len  u32
//! 0x10  payload      payload_len bytes
//! ```
//!
//! All integers little-endian.

use bytes::{Buf, BufMut};

use hostcall_core::error::{DispatchError, Result};

pub const ENVELOPE_MAGIC: u32 = 0x4843_4C45; // "HCLE"
pub const WIRE_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 16;

/// Upper bound on a single payload. Decoding treats anything larger as
/// corrupt; encoding refuses it.
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind_tag: u8,
    pub cmd_id: u32,
    pub payload_len: u32,
}

impl Header {
    pub fn put(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(ENVELOPE_MAGIC);
        buf.put_u8(WIRE_VERSION);
        buf.put_u8(self.kind_tag);
        buf.put_u16_le(0);
        buf.put_u32_le(self.cmd_id);
        buf.put_u32_le(self.payload_len);
    }

    /// Read and validate a header. Advances `buf` past it.
    pub fn take(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < HEADER_LEN {
            return Err(DispatchError::malformed("truncated header"));
        }
        if buf.get_u32_le() != ENVELOPE_MAGIC {
            return Err(DispatchError::malformed("bad magic"));
        }
        if buf.get_u8() != WIRE_VERSION {
            return Err(DispatchError::malformed("unsupported wire version"));
        }
        let kind_tag = buf.get_u8();
        let _reserved = buf.get_u16_le();
        let cmd_id = buf.get_u32_le();
        let payload_len = buf.get_u32_le();
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(DispatchError::malformed("payload length out of range"));
        }
        Ok(Self {
            kind_tag,
            cmd_id,
            payload_len,
        })
    }
}

// ── Payload primitives ──

pub fn put_bool(buf: &mut impl BufMut, v: bool) {
    buf.put_u8(v as u8);
}

pub fn put_str(buf: &mut impl BufMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

pub fn put_opt_str(buf: &mut impl BufMut, s: Option<&str>) {
    match s {
        Some(s) => {
            put_bool(buf, true);
            put_str(buf, s);
        }
        None => put_bool(buf, false),
    }
}

pub fn put_str_list(buf: &mut impl BufMut, list: &[String]) {
    buf.put_u32_le(list.len() as u32);
    for s in list {
        put_str(buf, s);
    }
}

/// Bounds-checked reader over a payload slice.
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            Err(DispatchError::malformed("truncated payload"))
        } else {
            Ok(())
        }
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DispatchError::malformed("invalid bool")),
        }
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn i64(&mut self) -> Result<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        let s = std::str::from_utf8(head)
            .map_err(|_| DispatchError::malformed("string is not utf-8"))?
            .to_string();
        self.buf = tail;
        Ok(s)
    }

    pub fn opt_string(&mut self) -> Result<Option<String>> {
        if self.bool()? {
            Ok(Some(self.string()?))
        } else {
            Ok(None)
        }
    }

    pub fn str_list(&mut self) -> Result<Vec<String>> {
        let count = self.u32()? as usize;
        // Each entry needs at least its length prefix.
        self.need(count.saturating_mul(4))?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.string()?);
        }
        Ok(out)
    }

    /// Fail unless every byte was consumed.
    pub fn finish(self) -> Result<()> {
        if self.buf.has_remaining() {
            Err(DispatchError::malformed("trailing payload bytes"))
        } else {
            Ok(())
        }
    }
}
