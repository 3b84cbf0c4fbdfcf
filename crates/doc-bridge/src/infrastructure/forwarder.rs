//! The server→host forwarding thread.
//!
//! One forwarding thread exists per open bridge connection.  It owns two
//! handles: the data-carrying socket connected to the server, and one end of
//! a dedicated notification pipe used purely for teardown signaling.  The
//! pipe is kept separate from the data socket so a close request can never
//! be confused with incoming data and cannot race against it.
//!
//! # Loop contract
//!
//! Block in `poll` on {data readable, notify readable} with no timeout:
//!
//! - Notify signaled → close the notify end, close the data socket, exit.
//!   This is the explicit-teardown path, triggered by the host's close
//!   command.
//! - Data signaled with zero bytes available → the server closed its end:
//!   close both sockets and exit.  This is the graceful-EOF path.  Both
//!   paths leave the same final state: all sockets closed, thread gone.
//! - Data signaled with bytes available → drain everything with one `read`,
//!   frame the payload, hand it to the host, loop.
//!
//! Because a socket's inbound queue is strictly FIFO regardless of writer,
//! deliveries reach the host in exactly the order the server wrote them.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bridge_core::{PollRequest, ReadOutcome, SocketId, SocketRegistry};
use tracing::{debug, trace};

use crate::application::framing::{abbreviate, render_delivery};
use crate::infrastructure::script_host::ScriptHost;

/// Thread name of the server→host forwarder.
pub const FORWARDER_THREAD_NAME: &str = "srv2host";

/// Spawns the forwarding thread for one open connection.
///
/// `data` is the client-side socket connected to the server; `notify` is the
/// forwarder-owned end of the notification pipe.  The returned handle is
/// retained by the session controller so the thread stays joinable.
pub fn spawn(
    registry: Arc<SocketRegistry>,
    host: Arc<dyn ScriptHost>,
    data: SocketId,
    notify: SocketId,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(FORWARDER_THREAD_NAME.to_string())
        .spawn(move || forward_loop(&registry, host.as_ref(), data, notify))
        .unwrap_or_else(|e| panic!("failed to spawn forwarding thread: {e}"))
}

fn forward_loop(registry: &SocketRegistry, host: &dyn ScriptHost, data: SocketId, notify: SocketId) {
    loop {
        let events = registry.poll(
            &[PollRequest::readable(data), PollRequest::readable(notify)],
            None,
        );

        // Teardown takes precedence over pending data: the host asked the
        // session to go away, so whatever is still queued is discarded with
        // the socket.
        if events.iter().any(|e| e.id == notify) {
            debug!("teardown signaled; closing connection sockets");
            registry.close(notify);
            registry.close(data);
            return;
        }

        if events.iter().any(|e| e.id == data) {
            let available = registry.available(data);
            if available == 0 {
                // Readable with an empty queue means the server closed its
                // end and everything has been drained.
                debug!("server closed the connection (eof); forwarder exiting");
                registry.close(data);
                registry.close(notify);
                return;
            }
            match registry.read(data, available) {
                ReadOutcome::Data(bytes) => {
                    let script = render_delivery(&bytes);
                    trace!("evaluating: {}", abbreviate(&script));
                    host.eval(&script);
                }
                ReadOutcome::Empty => {}
                ReadOutcome::Eof => {
                    debug!("end of stream on data socket; forwarder exiting");
                    registry.close(data);
                    registry.close(notify);
                    return;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
