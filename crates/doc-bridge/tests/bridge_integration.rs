//! Integration tests for the full bridge: session controller, forwarding
//! thread, supervisor and virtual sockets wired together through their
//! *public* API, the same way `main()` wires them.
//!
//! # Purpose
//!
//! These tests verify the end-to-end properties of the bridge:
//!
//! - Server→host order preservation: messages arrive at the scripting host
//!   as script-evaluation calls in exactly the order the server wrote them.
//! - Framing at the seam: multi-line server payloads arrive as base64
//!   `ArrayBuffer` deliveries, single-line payloads as escaped text.
//! - Teardown equivalence: a server-initiated end-of-stream and a
//!   host-initiated close sentinel leave the bridge in the same final state
//!   (forwarding thread gone, connection severed).
//! - Restart: after an abnormal server exit the supervisor brings up a
//!   fresh instance that publishes a new listening socket, while the old
//!   session's forwarder winds down on end-of-stream.
//! - Document close: `close_document` does not return until the server run
//!   has fully completed.
//!
//! # Test server
//!
//! The in-tree `EchoServer` is deliberately dumb, so these tests drive a
//! scripted server instead: after consuming the association payload it
//! interprets each received message as a command (`burst`, `multiline`,
//! `finish`, `abort`).  The scripted server shares the `RecordingHost` with
//! the test so it can pace multi-message sends, which keeps each message a
//! distinct delivery instead of letting the forwarder drain several writes
//! in one read.
//!
//! ```text
//! host (test)                          scripted server
//! ───────────                          ───────────────
//! HULLO            ──────────────────▶ publish + consume association
//! "burst"          ──────────────────▶ write msg-1..msg-5, paced
//!   ◀── onmessage('msg-1') … onmessage('msg-5')
//! "finish"         ──────────────────▶ close sockets, exit Ok
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bridge_core::{PollRequest, ReadOutcome, ServerEndpoint, SocketRegistry};
use doc_bridge::domain::BridgeConfig;
use doc_bridge::infrastructure::{
    BridgeSession, DocumentServer, RecordingHost, ScriptHost, ServerFactory, Supervisor,
};

// ── Scripted server ───────────────────────────────────────────────────────────

/// Command-driven server used in place of a real document engine.
struct ScriptedServer {
    registry: Arc<SocketRegistry>,
    endpoint: Arc<ServerEndpoint>,
    host: Arc<RecordingHost>,
    runs_completed: Arc<AtomicU64>,
}

impl ScriptedServer {
    fn factory(
        registry: Arc<SocketRegistry>,
        endpoint: Arc<ServerEndpoint>,
        host: Arc<RecordingHost>,
        runs_completed: Arc<AtomicU64>,
    ) -> ServerFactory {
        Box::new(move || {
            Box::new(ScriptedServer {
                registry: Arc::clone(&registry),
                endpoint: Arc::clone(&endpoint),
                host: Arc::clone(&host),
                runs_completed: Arc::clone(&runs_completed),
            })
        })
    }

    fn shut_down(&self, listening: bridge_core::SocketId) {
        self.registry.close(listening);
        self.endpoint.clear();
        self.runs_completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl DocumentServer for ScriptedServer {
    fn run(&mut self) -> anyhow::Result<()> {
        let listening = self.registry.create();
        self.endpoint.publish(listening);
        let mut associated = false;

        loop {
            self.registry
                .poll(&[PollRequest::readable(listening)], None);
            let available = self.registry.available(listening).max(1);
            let command = match self.registry.read(listening, available) {
                ReadOutcome::Data(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                ReadOutcome::Empty => continue,
                ReadOutcome::Eof => {
                    self.shut_down(listening);
                    return Ok(());
                }
            };

            if !associated {
                associated = true;
                continue;
            }

            match command.as_str() {
                // Five paced messages: wait for each delivery to reach the
                // host before writing the next, so every message arrives as
                // its own script call.
                "burst" => {
                    let base = self.host.count();
                    for i in 1..=5u32 {
                        self.registry.write(listening, format!("msg-{i}").as_bytes())?;
                        assert!(
                            self.host
                                .wait_for_count(base + i as usize, Duration::from_secs(2)),
                            "delivery {i} never reached the host"
                        );
                    }
                }
                "multiline" => {
                    self.registry.write(listening, b"first line\nsecond line")?;
                }
                // Server-initiated graceful end of stream.
                "finish" => {
                    self.shut_down(listening);
                    return Ok(());
                }
                // Abnormal exit; still closes its sockets, as the real
                // server's teardown path does on failure.
                "abort" => {
                    self.shut_down(listening);
                    anyhow::bail!("scripted abnormal exit");
                }
                other => panic!("unscripted command: {other}"),
            }
        }
    }
}

// ── Rig ───────────────────────────────────────────────────────────────────────

struct Rig {
    session: BridgeSession,
    host: Arc<RecordingHost>,
    registry: Arc<SocketRegistry>,
    endpoint: Arc<ServerEndpoint>,
    runs_completed: Arc<AtomicU64>,
}

fn rig() -> Rig {
    let registry = Arc::new(SocketRegistry::new());
    let endpoint = Arc::new(ServerEndpoint::new());
    let host = Arc::new(RecordingHost::new());
    let runs_completed = Arc::new(AtomicU64::new(0));
    let supervisor = Supervisor::spawn(ScriptedServer::factory(
        Arc::clone(&registry),
        Arc::clone(&endpoint),
        Arc::clone(&host),
        Arc::clone(&runs_completed),
    ));
    let session = BridgeSession::new(
        Arc::clone(&registry),
        Arc::clone(&endpoint),
        supervisor,
        Arc::clone(&host) as Arc<dyn ScriptHost>,
        BridgeConfig::new("file:///tmp/integration.odt"),
    );
    Rig {
        session,
        host,
        registry,
        endpoint,
        runs_completed,
    }
}

/// Opens the session and gives the association payload time to land as its
/// own message before any command follows it.
fn open_and_settle(rig: &Rig) {
    rig.session.handle_host_message("HULLO");
    thread::sleep(Duration::from_millis(100));
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

// ── Order preservation ────────────────────────────────────────────────────────

/// Five server messages must reach the host as five script calls in write
/// order.
#[test]
fn test_server_messages_reach_host_in_write_order() {
    let rig = rig();
    open_and_settle(&rig);

    rig.session.handle_host_message("burst");
    assert!(rig.host.wait_for_count(5, Duration::from_secs(5)));

    let evals = rig.host.evals();
    for (i, eval) in evals.iter().enumerate() {
        assert!(
            eval.contains(&format!("'msg-{}'", i + 1)),
            "delivery {i} out of order: {eval}"
        );
    }
}

// ── Framing ───────────────────────────────────────────────────────────────────

/// A payload with a line break arrives as a base64 ArrayBuffer delivery;
/// the encoded bytes must decode back to the original payload.
#[test]
fn test_multiline_payload_arrives_as_base64_buffer() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    let rig = rig();
    open_and_settle(&rig);

    rig.session.handle_host_message("multiline");
    assert!(rig.host.wait_for_count(1, Duration::from_secs(2)));

    let eval = &rig.host.evals()[0];
    assert!(eval.contains("Base64ToArrayBuffer("));
    assert!(eval.contains(&STANDARD.encode(b"first line\nsecond line")));
}

// ── Teardown equivalence ──────────────────────────────────────────────────────

/// Host-initiated close: BYE unwinds the forwarder.
#[test]
fn test_host_close_sentinel_unwinds_forwarder() {
    let rig = rig();
    open_and_settle(&rig);

    rig.session.handle_host_message("BYE");
    wait_until("forwarder exit", || rig.session.forwarder_finished());
}

/// Server-initiated end of stream must leave the same final state as a
/// host-initiated close: forwarder gone, run completed.
#[test]
fn test_server_eof_is_equivalent_to_host_close() {
    let rig = rig();
    open_and_settle(&rig);

    rig.session.handle_host_message("finish");
    wait_until("forwarder exit", || rig.session.forwarder_finished());
    wait_until("run completion", || {
        rig.runs_completed.load(Ordering::SeqCst) >= 1
    });
}

// ── Restart ───────────────────────────────────────────────────────────────────

/// After an abnormal server exit the supervisor must bring up a fresh run
/// that publishes a new listening socket, while the old session's forwarder
/// observes end-of-stream and exits.
#[test]
fn test_supervisor_replaces_aborted_server_run() {
    let rig = rig();
    open_and_settle(&rig);
    let first = rig.endpoint.current().expect("first run published");

    rig.session.handle_host_message("abort");

    // Old session winds down on EOF.
    wait_until("forwarder exit", || rig.session.forwarder_finished());

    // A fresh run publishes a new listening socket within one restart cycle.
    wait_until("fresh endpoint", || {
        matches!(rig.endpoint.current(), Some(id) if id != first)
    });

    // The replacement instance is reachable: a direct connection handshake
    // round-trips against it.
    let listening = rig.endpoint.current().expect("fresh endpoint");
    let probe = rig.registry.create();
    rig.registry.connect(probe, listening);
    rig.registry.write(probe, b"file:///tmp/probe.odt").unwrap();
    thread::sleep(Duration::from_millis(50));
    rig.registry.write(probe, b"multiline").unwrap();
    let events = rig.registry.poll(
        &[PollRequest::readable(probe)],
        Some(Duration::from_secs(2)),
    );
    assert!(!events.is_empty(), "replacement server must answer");
    rig.registry.close(probe);
}

// ── Document close ────────────────────────────────────────────────────────────

/// `close_document` must not return before the server run has completed.
#[test]
fn test_close_document_blocks_until_run_completes() {
    let rig = rig();
    open_and_settle(&rig);

    rig.session.close_document();

    assert!(rig.session.forwarder_finished());
    assert!(
        rig.runs_completed.load(Ordering::SeqCst) >= 1,
        "run must have completed before close_document returned"
    );
}
