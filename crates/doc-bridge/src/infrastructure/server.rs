//! The document-server seam.
//!
//! The server's own processing logic is an external collaborator: the bridge
//! treats everything past the listening socket as an opaque byte stream.
//! [`DocumentServer`] is the trait at that seam; the supervisor constructs a
//! fresh instance per run from a [`ServerFactory`].
//!
//! [`EchoServer`] is the in-tree reference collaborator used by the binary
//! and by tests: it follows the full endpoint discipline (publish a fresh
//! listening socket on start, clear it on exit) and echoes every payload
//! after the initial association handshake.

use std::sync::Arc;

use bridge_core::{PollRequest, ReadOutcome, ServerEndpoint, SocketRegistry};
use tracing::{debug, info, warn};

/// One run of the document server.
///
/// Instances are single-use: the supervisor constructs one, calls [`run`],
/// and drops it.  `run` blocks for the lifetime of the run and must close
/// its own sockets and clear the endpoint before returning on *every* exit
/// path, so severed connections surface as end-of-stream on the bridge side.
///
/// [`run`]: DocumentServer::run
pub trait DocumentServer: Send {
    /// Runs the server to completion.
    ///
    /// # Errors
    ///
    /// An `Err` is an abnormal exit; the supervisor logs it and restarts.
    fn run(&mut self) -> anyhow::Result<()>;
}

/// Constructs a fresh server instance for each supervisor run.
pub type ServerFactory = Box<dyn Fn() -> Box<dyn DocumentServer> + Send>;

/// Reference server: consumes the association payload, then echoes.
pub struct EchoServer {
    registry: Arc<SocketRegistry>,
    endpoint: Arc<ServerEndpoint>,
}

impl EchoServer {
    pub fn new(registry: Arc<SocketRegistry>, endpoint: Arc<ServerEndpoint>) -> Self {
        Self { registry, endpoint }
    }

    /// A factory producing one [`EchoServer`] per run.
    pub fn factory(registry: Arc<SocketRegistry>, endpoint: Arc<ServerEndpoint>) -> ServerFactory {
        Box::new(move || {
            Box::new(EchoServer::new(
                Arc::clone(&registry),
                Arc::clone(&endpoint),
            ))
        })
    }
}

impl DocumentServer for EchoServer {
    fn run(&mut self) -> anyhow::Result<()> {
        let listening = self.registry.create();
        self.endpoint.publish(listening);
        let mut associated = false;

        loop {
            self.registry
                .poll(&[PollRequest::readable(listening)], None);
            let available = self.registry.available(listening).max(1);
            match self.registry.read(listening, available) {
                ReadOutcome::Data(bytes) => {
                    if !associated {
                        // First payload on a fresh connection is the document
                        // URL, the in-process analogue of the Upgrade request.
                        associated = true;
                        info!(
                            "echo server: serving {}",
                            String::from_utf8_lossy(&bytes)
                        );
                        continue;
                    }
                    if let Err(e) = self.registry.write(listening, &bytes) {
                        warn!("echo server: client went away mid-echo: {e}");
                        break;
                    }
                }
                ReadOutcome::Empty => continue,
                ReadOutcome::Eof => {
                    debug!("echo server: connection closed");
                    break;
                }
            }
        }

        self.registry.close(listening);
        self.endpoint.clear();
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    /// Runs an EchoServer on its own thread and returns once it has
    /// published its listening socket.
    fn start_echo(
        registry: &Arc<SocketRegistry>,
        endpoint: &Arc<ServerEndpoint>,
    ) -> thread::JoinHandle<anyhow::Result<()>> {
        let mut server = EchoServer::new(Arc::clone(registry), Arc::clone(endpoint));
        let handle = thread::spawn(move || server.run());
        endpoint
            .wait_until_published(Duration::from_secs(2))
            .expect("echo server must publish its listening socket");
        handle
    }

    #[test]
    fn test_echo_server_publishes_then_clears_endpoint() {
        let registry = Arc::new(SocketRegistry::new());
        let endpoint = Arc::new(ServerEndpoint::new());
        let handle = start_echo(&registry, &endpoint);

        let listening = endpoint.current().expect("published");
        let client = registry.create();
        registry.connect(client, listening);
        registry.write(client, b"doc.odt").unwrap();
        registry.close(client);

        handle.join().unwrap().unwrap();
        assert_eq!(endpoint.current(), None, "endpoint cleared on exit");
    }

    #[test]
    fn test_echo_server_consumes_handshake_then_echoes() {
        let registry = Arc::new(SocketRegistry::new());
        let endpoint = Arc::new(ServerEndpoint::new());
        let handle = start_echo(&registry, &endpoint);

        let client = registry.create();
        registry.connect(client, endpoint.current().expect("published"));
        registry.write(client, b"doc.odt").unwrap();

        // Give the server a chance to consume the handshake before the
        // payload, so the two arrive as distinct reads.
        thread::sleep(Duration::from_millis(30));
        registry.write(client, b"ping").unwrap();

        let events = registry.poll(
            &[PollRequest::readable(client)],
            Some(Duration::from_secs(2)),
        );
        assert!(!events.is_empty(), "echo must arrive");
        assert_eq!(registry.read(client, 64), ReadOutcome::Data(b"ping".to_vec()));

        registry.close(client);
        handle.join().unwrap().unwrap();
    }
}
