//! `BinaryCodec` — default `Codec` implementation.
//!
//! One header (see `wire`) followed by the variant's fields packed in
//! declaration order. Stateless: encoding and decoding never touch
//! anything but the buffers passed in.

use bytes::{BufMut, Bytes, BytesMut};

use hostcall_core::codec::Codec;
use hostcall_core::envelope::{CmdId, Envelope};
use hostcall_core::error::{DispatchError, Result};
use hostcall_core::msg::{
    Chdir, CwdRes, Exit, HostError, HostErrorKind, MakeTempDir, MakeTempDirRes, MessageKind,
    Mkdir, Payload, StartRes, Stat, StatRes,
};

use crate::wire::{self, Header, Reader, HEADER_LEN, MAX_PAYLOAD_LEN};

#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCodec;

impl BinaryCodec {
    pub const fn new() -> Self {
        Self
    }
}

impl Codec for BinaryCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Bytes> {
        let mut body = BytesMut::new();
        encode_payload(&envelope.payload, &mut body);

        // Also catches any u32 length prefix that wrapped inside the body.
        let payload_len = match u32::try_from(body.len()) {
            Ok(len) if len <= MAX_PAYLOAD_LEN => len,
            _ => {
                return Err(DispatchError::PayloadTooLarge {
                    kind: envelope.kind(),
                    len: body.len(),
                })
            }
        };

        let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
        Header {
            kind_tag: envelope.kind().tag(),
            cmd_id: envelope.cmd_id.as_u32(),
            payload_len,
        }
        .put(&mut buf);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    fn decode(&self, buf: &[u8]) -> Result<Envelope> {
        let mut rest = buf;
        let header = Header::take(&mut rest)?;
        let kind = MessageKind::from_tag(header.kind_tag)
            .ok_or(DispatchError::malformed("unknown discriminant"))?;

        let len = header.payload_len as usize;
        if rest.len() < len {
            return Err(DispatchError::malformed("truncated payload"));
        }
        if rest.len() > len {
            return Err(DispatchError::malformed("trailing bytes after payload"));
        }

        let mut r = Reader::new(rest);
        let payload = decode_payload(kind, &mut r)?;
        r.finish()?;

        Ok(Envelope::new(CmdId::new(header.cmd_id), payload))
    }
}

fn encode_payload(payload: &Payload, buf: &mut BytesMut) {
    match payload {
        Payload::Error(err) => {
            buf.put_u8(err.kind.code());
            wire::put_str(buf, &err.message);
        }
        Payload::Ok | Payload::Start | Payload::Cwd => {}
        Payload::StartRes(res) => {
            wire::put_str(buf, &res.cwd);
            wire::put_str_list(buf, &res.argv);
            wire::put_bool(buf, res.debug_flag);
            wire::put_bool(buf, res.deps_flag);
            wire::put_bool(buf, res.recompile_flag);
        }
        Payload::Stat(req) => {
            wire::put_str(buf, &req.filename);
            wire::put_bool(buf, req.lstat);
        }
        Payload::StatRes(res) => {
            wire::put_bool(buf, res.is_file);
            wire::put_bool(buf, res.is_symlink);
            buf.put_u64_le(res.len);
            buf.put_i64_le(res.modified);
            buf.put_i64_le(res.accessed);
            buf.put_i64_le(res.created);
            wire::put_bool(buf, res.mode.is_some());
            buf.put_u32_le(res.mode.unwrap_or(0));
        }
        Payload::Mkdir(req) => {
            wire::put_str(buf, &req.path);
            buf.put_u32_le(req.mode);
        }
        Payload::MakeTempDir(req) => {
            wire::put_opt_str(buf, req.dir.as_deref());
            wire::put_opt_str(buf, req.prefix.as_deref());
        }
        Payload::MakeTempDirRes(res) => wire::put_str(buf, &res.path),
        Payload::Chdir(req) => wire::put_str(buf, &req.directory),
        Payload::CwdRes(res) => wire::put_str(buf, &res.cwd),
        Payload::Exit(req) => buf.put_i32_le(req.code),
    }
}

fn decode_payload(kind: MessageKind, r: &mut Reader<'_>) -> Result<Payload> {
    // Exhaustive on purpose: a new kind must get a decode arm.
    let payload = match kind {
        MessageKind::Error => {
            let kind = HostErrorKind::from_code(r.u8()?)
                .ok_or(DispatchError::malformed("unknown host error kind"))?;
            Payload::Error(HostError {
                kind,
                message: r.string()?,
            })
        }
        MessageKind::Ok => Payload::Ok,
        MessageKind::Start => Payload::Start,
        MessageKind::Cwd => Payload::Cwd,
        MessageKind::StartRes => Payload::StartRes(StartRes {
            cwd: r.string()?,
            argv: r.str_list()?,
            debug_flag: r.bool()?,
            deps_flag: r.bool()?,
            recompile_flag: r.bool()?,
        }),
        MessageKind::Stat => Payload::Stat(Stat {
            filename: r.string()?,
            lstat: r.bool()?,
        }),
        MessageKind::StatRes => {
            let is_file = r.bool()?;
            let is_symlink = r.bool()?;
            let len = r.u64()?;
            let modified = r.i64()?;
            let accessed = r.i64()?;
            let created = r.i64()?;
            let has_mode = r.bool()?;
            let mode = r.u32()?;
            Payload::StatRes(StatRes {
                is_file,
                is_symlink,
                len,
                modified,
                accessed,
                created,
                mode: has_mode.then_some(mode),
            })
        }
        MessageKind::Mkdir => Payload::Mkdir(Mkdir {
            path: r.string()?,
            mode: r.u32()?,
        }),
        MessageKind::MakeTempDir => Payload::MakeTempDir(MakeTempDir {
            dir: r.opt_string()?,
            prefix: r.opt_string()?,
        }),
        MessageKind::MakeTempDirRes => Payload::MakeTempDirRes(MakeTempDirRes { path: r.string()? }),
        MessageKind::Chdir => Payload::Chdir(Chdir { directory: r.string()? }),
        MessageKind::CwdRes => Payload::CwdRes(CwdRes { cwd: r.string()? }),
        MessageKind::Exit => Payload::Exit(Exit { code: r.i32()? }),
    };
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One representative payload per kind.
    fn samples() -> Vec<Payload> {
        vec![
            Payload::error(HostErrorKind::NotFound, "hello.txt: not found"),
            Payload::Ok,
            Payload::Start,
            Payload::StartRes(StartRes {
                cwd: "/home/user".into(),
                argv: vec!["_".into(), "script.js".into(), "--flag".into()],
                debug_flag: true,
                deps_flag: false,
                recompile_flag: true,
            }),
            Payload::Stat(Stat { filename: "hello.txt".into(), lstat: true }),
            Payload::StatRes(StatRes {
                is_file: true,
                is_symlink: false,
                len: 1 << 40,
                modified: 1_540_000_000,
                accessed: -5,
                created: 0,
                mode: Some(0o644),
            }),
            Payload::Mkdir(Mkdir { path: "/tmp/a/b".into(), mode: 0o755 }),
            Payload::MakeTempDir(MakeTempDir { dir: None, prefix: Some("run-".into()) }),
            Payload::MakeTempDirRes(MakeTempDirRes { path: "/tmp/run-abc".into() }),
            Payload::Chdir(Chdir { directory: "..".into() }),
            Payload::Cwd,
            Payload::CwdRes(CwdRes { cwd: "/".into() }),
            Payload::Exit(Exit { code: -1 }),
        ]
    }

    #[test]
    fn test_every_kind_roundtrips() {
        let codec = BinaryCodec::new();
        let samples = samples();
        // Keep the sample list in step with the enum.
        assert_eq!(samples.len(), MessageKind::ALL.len());

        for (i, payload) in samples.into_iter().enumerate() {
            let env = Envelope::new(CmdId::new(i as u32), payload);
            let bytes = codec.encode(&env).unwrap();
            let decoded = codec.decode(&bytes).unwrap();
            assert_eq!(decoded.kind(), env.kind());
            assert_eq!(decoded, env);
        }
    }

    #[test]
    fn test_decode_is_idempotent() {
        let codec = BinaryCodec::new();
        let env = Envelope::new(CmdId::new(3), samples().remove(3));
        let bytes = codec.encode(&env).unwrap();
        let a = codec.decode(&bytes).unwrap();
        let b = codec.decode(&bytes).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stat_res_without_mode() {
        let codec = BinaryCodec::new();
        let env = Envelope::sync(Payload::StatRes(StatRes { mode: None, ..Default::default() }));
        let decoded = codec.decode(&codec.encode(&env).unwrap()).unwrap();
        assert_eq!(decoded.into_stat_res().unwrap().mode, None);
    }

    #[test]
    fn test_rejects_empty_and_truncated() {
        let codec = BinaryCodec::new();
        assert_eq!(
            codec.decode(&[]),
            Err(DispatchError::malformed("truncated header"))
        );

        let bytes = codec.encode(&Envelope::sync(Payload::Stat(Stat {
            filename: "a".into(),
            lstat: false,
        })))
        .unwrap();
        for cut in 1..bytes.len() {
            let err = codec.decode(&bytes[..cut]).unwrap_err();
            assert!(err.is_fatal(), "cut at {} gave {:?}", cut, err);
        }
    }

    #[test]
    fn test_rejects_zero_and_unknown_tag() {
        let codec = BinaryCodec::new();
        let mut raw = codec.encode(&Envelope::sync(Payload::Ok)).unwrap().to_vec();
        raw[5] = 0;
        assert_eq!(
            codec.decode(&raw),
            Err(DispatchError::malformed("unknown discriminant"))
        );
        raw[5] = 0xEE;
        assert_eq!(
            codec.decode(&raw),
            Err(DispatchError::malformed("unknown discriminant"))
        );
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let codec = BinaryCodec::new();
        let mut raw = codec.encode(&Envelope::sync(Payload::Cwd)).unwrap().to_vec();
        raw.push(0);
        assert_eq!(
            codec.decode(&raw),
            Err(DispatchError::malformed("trailing bytes after payload"))
        );
    }

    #[test]
    fn test_rejects_payload_longer_than_kind_needs() {
        let codec = BinaryCodec::new();
        // Exit with a declared 5-byte payload: one byte too many for an i32.
        let mut raw = BytesMut::new();
        Header { kind_tag: MessageKind::Exit.tag(), cmd_id: 0, payload_len: 5 }.put(&mut raw);
        raw.put_slice(&[1, 0, 0, 0, 9]);
        assert_eq!(
            codec.decode(&raw),
            Err(DispatchError::malformed("trailing payload bytes"))
        );
    }

    #[test]
    fn test_cmd_id_preserved() {
        let codec = BinaryCodec::new();
        let env = Envelope::new(CmdId::new(u32::MAX), Payload::Cwd);
        assert_eq!(codec.decode(&codec.encode(&env).unwrap()).unwrap().cmd_id, CmdId::new(u32::MAX));
    }

    #[test]
    fn test_payload_limit_boundary() {
        let codec = BinaryCodec::new();
        let max = MAX_PAYLOAD_LEN as usize;

        // CwdRes is a u32 length prefix plus the string bytes.
        let at_limit = Envelope::sync(Payload::CwdRes(CwdRes { cwd: "a".repeat(max - 4) }));
        let bytes = codec.encode(&at_limit).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + max);
        assert_eq!(codec.decode(&bytes).unwrap(), at_limit);

        let over = Envelope::sync(Payload::CwdRes(CwdRes { cwd: "a".repeat(max - 3) }));
        assert_eq!(
            codec.encode(&over),
            Err(DispatchError::PayloadTooLarge { kind: MessageKind::CwdRes, len: max + 1 })
        );
    }
}
