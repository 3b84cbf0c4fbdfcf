//! The host-facing session controller.
//!
//! [`BridgeSession`] receives the host's opaque control messages and drives
//! the connection handshake: an open sentinel builds the virtual connection
//! to the server's published listening socket and spawns the forwarding
//! thread, a close sentinel signals teardown through the notification pipe,
//! and every other message is passed through to the server verbatim.
//!
//! # Ordering across passthrough messages
//!
//! Each passthrough message is written by its own short-lived sender thread,
//! so relative order across *consecutive host messages* is not guaranteed.
//! Bytes of a single message are never interleaved with another (a write is
//! one atomic queue append), and everything the server sends back reaches
//! the host strictly in order.  Hosts needing request ordering must sequence
//! at the protocol level.
//!
//! A bridge instance carries at most one host↔server connection for its
//! lifetime; a second open sentinel is a contract violation.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bridge_core::{PollRequest, ServerEndpoint, SocketId, SocketRegistry};
use tracing::{debug, info, warn};

use crate::domain::{BridgeConfig, HostCommand};
use crate::infrastructure::forwarder;
use crate::infrastructure::script_host::ScriptHost;
use crate::infrastructure::supervisor::Supervisor;

/// Thread name of the short-lived host→server sender tasks.
pub const SENDER_THREAD_NAME: &str = "host2srv";

/// How long an open request will wait for a server run to publish its
/// listening socket.  Covers the supervisor's between-runs gap; a server
/// that still has not published after this is a wiring bug.
const ENDPOINT_WAIT: Duration = Duration::from_secs(2);

/// The live connection of an opened session.
struct OpenConnection {
    /// Client-side data socket, connected to the server.
    client: SocketId,
    /// Host-retained end of the teardown notification pipe.
    notify: SocketId,
    /// Completed-run count observed at open.  The server run serving this
    /// connection is the one that moves the supervisor's count past this
    /// value; teardown waits for exactly that run, never for a replacement
    /// run the restart loop may have started since.
    run_watermark: u64,
}

#[derive(Default)]
struct SessionState {
    connection: Option<OpenConnection>,
    forwarder: Option<JoinHandle<()>>,
    senders: Vec<JoinHandle<()>>,
}

/// Drives one host↔server session over the virtual socket registry.
pub struct BridgeSession {
    registry: Arc<SocketRegistry>,
    endpoint: Arc<ServerEndpoint>,
    supervisor: Supervisor,
    host: Arc<dyn ScriptHost>,
    config: BridgeConfig,
    state: Mutex<SessionState>,
}

impl BridgeSession {
    pub fn new(
        registry: Arc<SocketRegistry>,
        endpoint: Arc<ServerEndpoint>,
        supervisor: Supervisor,
        host: Arc<dyn ScriptHost>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            registry,
            endpoint,
            supervisor,
            host,
            config,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Dispatches one opaque control message from the host.
    pub fn handle_host_message(&self, message: &str) {
        match HostCommand::parse(message) {
            HostCommand::Open => self.open(),
            HostCommand::Close => self.signal_close(),
            HostCommand::Passthrough(text) => self.forward_to_server(text),
        }
    }

    /// Builds the host↔server connection and starts forwarding.
    ///
    /// # Panics
    ///
    /// Panics if a connection already exists (single-connection contract) or
    /// if no server run publishes a listening socket within the grace
    /// window.
    fn open(&self) {
        let mut state = self.lock_state();
        assert!(
            state.connection.is_none(),
            "bridge supports a single host connection per instance"
        );

        let listening = self.wait_for_endpoint();
        let run_watermark = self.supervisor.runs_completed();
        let client = self.registry.create();
        self.registry.connect(client, listening);
        let (notify, notify_fwd_end) = self.registry.pipe();
        info!(%client, %listening, "host connection established");

        state.forwarder = Some(forwarder::spawn(
            Arc::clone(&self.registry),
            Arc::clone(&self.host),
            client,
            notify_fwd_end,
        ));

        // The association payload travels like any other host message: a
        // sender task of its own, off the control path.
        info!("sending to server: {}", self.config.document_url);
        let url = self.config.document_url.clone().into_bytes();
        state.senders.push(spawn_sender(
            Arc::clone(&self.registry),
            client,
            url,
        ));
        state.connection = Some(OpenConnection {
            client,
            notify,
            run_watermark,
        });
    }

    /// Signals teardown by closing the host-retained notification end.
    ///
    /// Safe to repeat; closing an already-closed socket is a no-op.  With no
    /// open connection there is nothing to signal.
    fn signal_close(&self) {
        let state = self.lock_state();
        match &state.connection {
            Some(conn) => {
                debug!(socket = %conn.notify, "signaling session teardown");
                self.registry.close(conn.notify);
            }
            None => debug!("close requested with no open connection"),
        }
    }

    /// Queues one passthrough message for delivery to the server.
    fn forward_to_server(&self, text: String) {
        let mut state = self.lock_state();
        match &state.connection {
            Some(conn) => {
                let sender = spawn_sender(
                    Arc::clone(&self.registry),
                    conn.client,
                    text.into_bytes(),
                );
                state.senders.push(sender);
            }
            None => warn!("dropping host message sent before open handshake: {text}"),
        }
    }

    /// Shuts the document down and blocks until the server run has ended
    /// and every bridge thread for this session has exited.
    pub fn close_document(&self) {
        let (run_watermark, forwarder, senders) = {
            let mut state = self.lock_state();
            let conn = match state.connection.take() {
                Some(conn) => conn,
                None => {
                    debug!("close_document with no open connection");
                    return;
                }
            };
            debug!("closing document");
            self.registry.close(conn.notify);
            (
                conn.run_watermark,
                state.forwarder.take(),
                std::mem::take(&mut state.senders),
            )
        };

        // The notify close unwinds the forwarder, which severs the data
        // connection, which ends the server run.  Wait for that chain to
        // complete — and only for the run that served this session: if the
        // host already signaled close, that run has ended and the restart
        // loop is running a fresh idle instance by now.
        self.supervisor.wait_for_run_completion(run_watermark);
        if let Some(handle) = forwarder {
            let _ = handle.join();
        }
        for handle in senders {
            let _ = handle.join();
        }
        info!("document closed");
    }

    /// Whether the forwarding thread has exited.  Test observability.
    pub fn forwarder_finished(&self) -> bool {
        self.lock_state()
            .forwarder
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Blocks until the current server run has published a listening socket.
    fn wait_for_endpoint(&self) -> SocketId {
        self.endpoint
            .wait_until_published(ENDPOINT_WAIT)
            .unwrap_or_else(|| {
                panic!("no server listening socket published within {ENDPOINT_WAIT:?}")
            })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawns a sender task delivering one payload to the server.
///
/// The task polls the socket writable, writes once and exits.  A write
/// failure means the connection closed underneath it, which is an ordinary
/// shutdown race: logged and dropped.
fn spawn_sender(registry: Arc<SocketRegistry>, socket: SocketId, payload: Vec<u8>) -> JoinHandle<()> {
    thread::Builder::new()
        .name(SENDER_THREAD_NAME.to_string())
        .spawn(move || {
            registry.poll(&[PollRequest::writable(socket)], None);
            if let Err(e) = registry.write(socket, &payload) {
                warn!("dropping message to server: {e}");
            }
        })
        .unwrap_or_else(|e| panic!("failed to spawn sender thread: {e}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
