//! doc-bridge — entry point.
//!
//! This binary hosts a supervised in-process document server and bridges it
//! to a sandboxed scripting host over virtual sockets.  No network sockets
//! are ever opened: the host and server live in the same process and talk
//! through the in-memory registry in `bridge-core`.
//!
//! # Usage
//!
//! ```text
//! doc-bridge <DOCUMENT>
//! ```
//!
//! Exactly one positional argument, the document URL to serve.  Any other
//! argument count makes `clap` print usage to stderr and exit non-zero.
//!
//! # Host control channel
//!
//! The binary reads host control messages from stdin, one per line — a
//! stand-in for the embedded scripting host's message channel:
//!
//! - `HULLO` opens the connection and sends the document URL to the server.
//! - `BYE` signals teardown.
//! - anything else is passed through to the server verbatim.
//!
//! Server messages come back as script-evaluation calls printed to stdout.
//! On stdin EOF the document is closed and the process exits.
//!
//! # Architecture overview
//!
//! ```text
//! scripting host  (control messages in, script evaluations out)
//!       ↕
//! doc-bridge  ← this process
//!   domain/          BridgeConfig, host command sentinels
//!   application/     payload → script-call framing
//!   infrastructure/  session controller, forwarder, supervisor, seams
//!       ↕  (virtual sockets, bridge-core registry)
//! document server  (supervised, restarted per run)
//! ```

use std::io::{self, BufRead};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bridge_core::{ServerEndpoint, SocketRegistry};
use doc_bridge::domain::BridgeConfig;
use doc_bridge::infrastructure::{BridgeSession, EchoServer, ScriptHost, StdoutHost, Supervisor};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Virtual-socket bridge between a sandboxed scripting host and an
/// in-process document server.
#[derive(Debug, Parser)]
#[command(
    name = "doc-bridge",
    about = "In-process virtual-socket bridge for sandboxed document hosts",
    version
)]
struct Cli {
    /// URL of the document to serve.
    ///
    /// Sent to the server as the association payload when the host opens
    /// the connection.
    #[arg(env = "DOC_BRIDGE_DOCUMENT")]
    document: String,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`].
    fn into_bridge_config(self) -> BridgeConfig {
        BridgeConfig::new(self.document)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; the log level is controlled by
///    the `RUST_LOG` environment variable, falling back to `info`.
/// 2. CLI arguments are parsed with `clap` into a [`Cli`] struct.
/// 3. The socket registry and server endpoint are built, and the supervisor
///    starts the first server run.
/// 4. Host control messages are read from stdin until EOF, then the
///    document is closed and the process exits.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_bridge_config();
    info!("doc-bridge starting — document={}", config.document_url);

    let registry = Arc::new(SocketRegistry::new());
    let endpoint = Arc::new(ServerEndpoint::new());
    let supervisor = Supervisor::spawn(EchoServer::factory(
        Arc::clone(&registry),
        Arc::clone(&endpoint),
    ));
    let session = BridgeSession::new(
        registry,
        endpoint,
        supervisor,
        Arc::new(StdoutHost) as Arc<dyn ScriptHost>,
        config,
    );

    // Stdin is the host control channel: one message per line.
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        session.handle_host_message(&line);
    }

    info!("host channel closed");
    session.close_document();
    info!("doc-bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
