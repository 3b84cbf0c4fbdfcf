//! Application layer: pure payload-framing logic.

pub mod framing;

pub use framing::{abbreviate, render_delivery, SHOW_SCRIPT_MAXLEN};
