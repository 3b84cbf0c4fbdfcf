//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is constructed from CLI arguments in production and from defaults in
//! tests.  Keeping configuration as a plain struct — no global state, no
//! environment reads inside the domain — makes the bridge easy to embed in
//! tests.

/// All runtime configuration for the document bridge.
///
/// Build this struct once at startup and share it by reference (or clone —
/// it is small) with the components that need it.
///
/// # Example
///
/// ```rust
/// use doc_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::new("file:///tmp/hello.odt");
/// assert_eq!(cfg.document_url, "file:///tmp/hello.odt");
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The resource the bridge opens a session for.  Sent to the server as
    /// the first payload on a new connection, mirroring an HTTP GET with
    /// Upgrade: the "hello" that associates the connection with a document.
    pub document_url: String,
}

impl BridgeConfig {
    /// Creates a configuration for one document.
    pub fn new(document_url: impl Into<String>) -> Self {
        Self {
            document_url: document_url.into(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
