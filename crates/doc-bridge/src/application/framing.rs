//! Framing of server payloads into host script-evaluation calls.
//!
//! The host receives every server message as one JavaScript call against its
//! in-page socket shim.  There is no explicit framing metadata on the wire —
//! the bridge decides the delivery shape by inspecting the payload:
//!
//! - **Binary delivery**: any payload containing a line-break byte.  We call
//!   a message "binary" even when it strictly isn't (a multi-line JSON blob,
//!   say), because the host's `onmessage` handler copes fine with text
//!   arriving as an `ArrayBuffer`.  The payload is base64-encoded and wrapped
//!   in a `Base64ToArrayBuffer` call.
//!
//! - **Text delivery**: single-line payloads are embedded as a JavaScript
//!   string literal, with control bytes and the string-literal
//!   metacharacters (`'`, `\`) escaped as `\xHH`.
//!
//! The functions in this module are pure: no I/O, no threads, no registry.
//! That keeps the framing rules trivially unit-testable.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Longest rendered script prefix shown in log output.
pub const SHOW_SCRIPT_MAXLEN: usize = 70;

/// The host-side shim object every delivery is dispatched to.
const ONMESSAGE_TARGET: &str = "window.TheBridgeSocket.onmessage";

/// Renders one server payload as the script call delivering it to the host.
pub fn render_delivery(payload: &[u8]) -> String {
    if payload.contains(&b'\n') {
        format!(
            "{ONMESSAGE_TARGET}({{'data': Base64ToArrayBuffer('{}')}});",
            BASE64.encode(payload)
        )
    } else {
        format!(
            "{ONMESSAGE_TARGET}({{'data': '{}'}});",
            escape_single_line(payload)
        )
    }
}

/// Escapes a single-line payload for embedding in a single-quoted JavaScript
/// string literal.
///
/// Bytes below 0x20, `'`, and `\` become `\xHH`; every other byte is passed
/// through as the character with the same code, so the host-side unescaped
/// character codes equal the original bytes exactly.
fn escape_single_line(payload: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(payload.len());
    for &byte in payload {
        if byte < b' ' || byte == b'\'' || byte == b'\\' {
            out.push('\\');
            out.push('x');
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 0x0f) as usize] as char);
        } else {
            out.push(byte as char);
        }
    }
    out
}

/// Truncates a rendered script to [`SHOW_SCRIPT_MAXLEN`] characters for log
/// output, appending an ellipsis marker when anything was cut.
pub fn abbreviate(script: &str) -> String {
    if script.chars().count() <= SHOW_SCRIPT_MAXLEN {
        return script.to_string();
    }
    let mut out: String = script.chars().take(SHOW_SCRIPT_MAXLEN).collect();
    out.push_str("...");
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
