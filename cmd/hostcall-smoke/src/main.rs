//! Hostcall End-to-End Smoke Test
//!
//! Drives the full stack against an in-process `LoopbackHost`:
//!   Part A — Envelope codec: round-trips and rejects
//!   Part B — Bootstrap: Start handshake, argv, entry plan
//!   Part C — Sync ops: make_temp_dir, chdir, mkdir, stat, cwd
//!   Part D — Async ops: out-of-order delivery, unknown ids
//!   Part E — Global error trampoline
//!   Part F — Stale-call reaper
//!
//! Run: ./target/release/hostcall-smoke [script args...]
//! Extra args are passed to the host as argv[1..].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use hostcall_core::bridge::{ErrorValue, UncaughtError};
use hostcall_core::codec::Codec;
use hostcall_core::envelope::{CmdId, Envelope};
use hostcall_core::error::DispatchError;
use hostcall_core::exit::RecordingExit;
use hostcall_core::msg::{CwdRes, HostErrorKind, Payload, Stat};
use hostcall_module::wire::MAX_PAYLOAD_LEN;
use hostcall_module::{BinaryCodec, LoopbackHost, LoopbackHostConfig};
use hostcall_runtime::{ops, EntryPlan, Runtime, RuntimeConfig};

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

type Rt = Runtime<LoopbackHost>;

fn new_runtime(argv: Vec<String>, config: RuntimeConfig) -> Option<(Arc<LoopbackHost>, Arc<RecordingExit>, Rt)> {
    let host = LoopbackHost::new(LoopbackHostConfig::default().argv(argv).cwd("/")).ok()?;
    let host = Arc::new(host);
    let exit = Arc::new(RecordingExit::new());
    let rt = Runtime::start(Arc::clone(&host), config, exit.clone()).ok()?;
    Some((host, exit, rt))
}

// ════════════════════════════════════════════════════════════
// Part A: Envelope codec
// ════════════════════════════════════════════════════════════

fn test_codec(t: &mut TestRunner) {
    t.section("Part A: Envelope codec");
    let codec = BinaryCodec::new();

    let env = Envelope::new(CmdId::new(42), Payload::CwdRes(CwdRes { cwd: "/home/user".into() }));
    let bytes = match codec.encode(&env) {
        Ok(bytes) => bytes,
        Err(e) => {
            t.fail("CwdRes encode", &e.to_string());
            return;
        }
    };
    match codec.decode(&bytes) {
        Ok(back) => t.check("CwdRes round-trip", back == env, "decoded envelope differs"),
        Err(e) => t.fail("CwdRes round-trip", &e.to_string()),
    }

    let twice = codec.decode(&bytes).ok() == codec.decode(&bytes).ok();
    t.check("decode is idempotent", twice, "two decodes differ");

    let mut zero = bytes.to_vec();
    zero[5] = 0;
    let rejected = matches!(codec.decode(&zero), Err(DispatchError::MalformedEnvelope { .. }));
    t.check("zero discriminant rejected", rejected, "decoded a tag-0 envelope");

    let truncated = codec.decode(&bytes[..bytes.len() - 1]).is_err();
    t.check("truncated buffer rejected", truncated, "decoded a short buffer");

    let huge = "a".repeat(MAX_PAYLOAD_LEN as usize);
    let oversize = codec.encode(&Envelope::sync(Payload::CwdRes(CwdRes { cwd: huge })));
    t.check(
        "oversize payload refused by encode",
        matches!(oversize, Err(DispatchError::PayloadTooLarge { .. })),
        "encoded past the wire limit",
    );
}

// ════════════════════════════════════════════════════════════
// Part B: Bootstrap
// ════════════════════════════════════════════════════════════

fn test_bootstrap(t: &mut TestRunner, argv: &[String]) {
    t.section("Part B: Bootstrap handshake");

    let Some((_host, _exit, rt)) = new_runtime(argv.to_vec(), RuntimeConfig::from_env()) else {
        t.fail("Runtime::start", "bootstrap failed");
        return;
    };
    t.pass("Runtime::start");

    t.check("cwd reported", rt.boot().cwd() == "/", rt.boot().cwd());
    let args_ok = rt.boot().args() == &argv[1..];
    t.check("argv[0] dropped", args_ok, &format!("{:?}", rt.boot().args()));

    let plan_ok = matches!(rt.plan(), EntryPlan::Run { main, .. } if Some(main.as_str()) == rt.boot().main_module());
    t.check("entry plan runs main module", plan_ok, &format!("{:?}", rt.plan()));

    match new_runtime(vec!["_".into()], RuntimeConfig::new()) {
        Some((_, _, rt)) => t.check(
            "no input script is interactive",
            rt.plan() == &EntryPlan::Interactive,
            &format!("{:?}", rt.plan()),
        ),
        None => t.fail("no input script is interactive", "bootstrap failed"),
    }
}

// ════════════════════════════════════════════════════════════
// Part C: Sync ops
// ════════════════════════════════════════════════════════════

fn test_sync_ops(t: &mut TestRunner) {
    t.section("Part C: Sync ops");

    let Some((_host, _exit, rt)) = new_runtime(vec!["_".into()], RuntimeConfig::new()) else {
        t.fail("Runtime::start", "bootstrap failed");
        return;
    };
    let d = rt.dispatcher();

    let scratch = match ops::make_temp_dir_sync(d, None, Some("hostcall-smoke-")) {
        Ok(p) => {
            t.pass("make_temp_dir_sync");
            p
        }
        Err(e) => {
            t.fail("make_temp_dir_sync", &e.to_string());
            return;
        }
    };

    match ops::chdir(d, &scratch).and_then(|()| ops::cwd(d)) {
        Ok(cwd) => t.check("chdir + cwd", cwd.ends_with(scratch.rsplit('/').next().unwrap_or("")), &cwd),
        Err(e) => t.fail("chdir + cwd", &e.to_string()),
    }

    match ops::mkdir_sync(d, "sub", 0o755) {
        Ok(()) => t.pass("mkdir_sync"),
        Err(e) => t.fail("mkdir_sync", &e.to_string()),
    }

    let again = ops::mkdir_sync(d, "sub", 0o755);
    let exists = again.as_ref().err().and_then(|e| e.host_error()).map(|e| e.kind)
        == Some(HostErrorKind::AlreadyExists);
    t.check("mkdir_sync twice → AlreadyExists", exists, &format!("{:?}", again));

    let _ = std::fs::write(format!("{}/hello.txt", scratch), b"hello world");
    match ops::stat_sync(d, "hello.txt") {
        Ok(info) => t.check("stat_sync file", info.is_file && info.len == 11, &format!("{:?}", info)),
        Err(e) => t.fail("stat_sync file", &e.to_string()),
    }

    let missing = ops::lstat_sync(d, "nope");
    let not_found = missing.as_ref().err().and_then(|e| e.host_error()).map(|e| e.kind)
        == Some(HostErrorKind::NotFound);
    t.check("lstat_sync missing → NotFound", not_found, &format!("{:?}", missing));

    let _ = std::fs::remove_dir_all(&scratch);
}

// ════════════════════════════════════════════════════════════
// Part D: Async ops
// ════════════════════════════════════════════════════════════

fn test_async(t: &mut TestRunner) {
    t.section("Part D: Async ops");

    let Some((host, exit, rt)) = new_runtime(vec!["_".into()], RuntimeConfig::new()) else {
        t.fail("Runtime::start", "bootstrap failed");
        return;
    };
    let d = rt.dispatcher();

    let handles: Vec<_> = ["/", "/tmp", "/nonexistent-hostcall-smoke"]
        .iter()
        .filter_map(|p| ops::stat(d, p).ok())
        .collect();
    t.check("3 async stats issued", handles.len() == 3, "call_async failed");
    t.check("3 calls pending", d.pending_count() == 3, &d.pending_count().to_string());

    let delivered = host.drain_reversed(8);
    t.check("host delivered in reverse", delivered == 3, &delivered.to_string());

    let results: Vec<_> = handles.into_iter().map(|h| h.wait()).collect();
    let ok = results.len() == 3
        && results[0].as_ref().map(|i| !i.is_file).unwrap_or(false)
        && results[1].is_ok()
        && matches!(&results[2], Err(DispatchError::Host(e)) if e.kind == HostErrorKind::NotFound);
    t.check("each handle got its own reply", ok, &format!("{:?}", results));
    t.check("no calls pending", d.pending_count() == 0, &d.pending_count().to_string());

    if let Ok(stray) = BinaryCodec::new().encode(&Envelope::new(CmdId::new(999), Payload::Ok)) {
        host.deliver_raw(stray);
    }
    t.check("unknown id → exit(1)", exit.codes() == vec![1], &format!("{:?}", exit.codes()));

    host.deliver_raw(Bytes::from_static(b"\x00\x01"));
    t.check("garbage delivery → exit(1)", exit.codes() == vec![1, 1], &format!("{:?}", exit.codes()));

    let req = Payload::Stat(Stat { filename: "/".into(), lstat: false });
    let dup = d.call_async_as(CmdId::new(7), req.clone()).and_then(|_h| d.call_async_as(CmdId::new(7), req));
    t.check(
        "duplicate id rejected",
        matches!(dup, Err(DispatchError::DuplicateCorrelationId(_))),
        &format!("{:?}", dup.map(|h| h.cmd_id())),
    );
}

// ════════════════════════════════════════════════════════════
// Part E: Global error trampoline
// ════════════════════════════════════════════════════════════

fn test_trampoline(t: &mut TestRunner) {
    t.section("Part E: Global error trampoline");

    let Some((host, exit, _rt)) = new_runtime(vec!["_".into()], RuntimeConfig::new()) else {
        t.fail("Runtime::start", "bootstrap failed");
        return;
    };

    let repl = UncaughtError::new("x is not defined", Some("repl"), ErrorValue::Structured {
        name: "ReferenceError".into(),
        message: "x is not defined".into(),
        stack: None,
    });
    host.raise_uncaught(repl);
    t.check("repl error reported, not fatal", exit.last().is_none(), &format!("{:?}", exit.codes()));

    let fatal = UncaughtError::new("boom", Some("main.js"), ErrorValue::Thrown("boom".into())).at(1, 7);
    host.raise_uncaught(fatal);
    t.check("main.js error → exit(1)", exit.codes() == vec![1], &format!("{:?}", exit.codes()));
}

// ════════════════════════════════════════════════════════════
// Part F: Reaper
// ════════════════════════════════════════════════════════════

fn test_reaper(t: &mut TestRunner) {
    t.section("Part F: Stale-call reaper");

    let config = RuntimeConfig::new().async_timeout(Duration::from_millis(2));
    let Some((host, exit, rt)) = new_runtime(vec!["_".into()], config) else {
        t.fail("Runtime::start", "bootstrap failed");
        return;
    };

    let h = match ops::stat(rt.dispatcher(), "/") {
        Ok(h) => h,
        Err(e) => {
            t.fail("async stat", &e.to_string());
            return;
        }
    };
    std::thread::sleep(Duration::from_millis(10));
    let reaped = rt.reap();
    t.check("stale call reaped", reaped == 1, &reaped.to_string());
    t.check(
        "handle fails with Timeout",
        matches!(h.wait(), Err(DispatchError::Timeout(_))),
        "expected Timeout",
    );

    host.drain(1);
    t.check("late reply dropped", exit.last().is_none(), &format!("{:?}", exit.codes()));
}

// ════════════════════════════════════════════════════════════

fn main() {
    hostcall_runtime::install_panic_hook();
    println!("=== Hostcall End-to-End Smoke Test ===");

    let mut argv: Vec<String> = std::env::args().collect();
    if argv.len() < 2 {
        argv.push("script.js".to_string());
    }
    println!("    argv: {:?}", argv);

    let mut t = TestRunner::new();

    test_codec(&mut t);
    test_bootstrap(&mut t, &argv);
    test_sync_ops(&mut t);
    test_async(&mut t);
    test_trampoline(&mut t);
    test_reaper(&mut t);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
