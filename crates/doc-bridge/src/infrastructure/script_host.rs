//! The scripting-host seam.
//!
//! The bridge never renders anything itself — it hands each framed server
//! message to the host as one script-evaluation call.  [`ScriptHost`] is the
//! trait at that seam; production wires in whatever evaluates JavaScript in
//! the sandboxed page, the binary uses [`StdoutHost`], and tests use
//! [`RecordingHost`].

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Receives framed server messages as script-evaluation calls.
///
/// Implementations must be cheap to call from the forwarding thread: `eval`
/// is invoked inline in the forwarding loop, so a slow host delays delivery
/// of subsequent messages (which is exactly the ordering guarantee callers
/// rely on).
pub trait ScriptHost: Send + Sync {
    /// Evaluates one script call in the host environment.
    fn eval(&self, script: &str);
}

/// Host that prints every evaluation to stdout.  Used by the binary.
#[derive(Debug, Default)]
pub struct StdoutHost;

impl ScriptHost for StdoutHost {
    fn eval(&self, script: &str) {
        println!("{script}");
    }
}

/// Test double that records every evaluation and lets tests block until a
/// given number of deliveries has arrived.
#[derive(Debug, Default)]
pub struct RecordingHost {
    evals: Mutex<Vec<String>>,
    delivered: Condvar,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything evaluated so far, in delivery order.
    pub fn evals(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Number of evaluations delivered so far.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Blocks until at least `n` evaluations have been recorded.
    ///
    /// Returns `false` on timeout, so assertions fail with a useful count
    /// instead of hanging the test suite.
    pub fn wait_for_count(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut evals = self.lock();
        while evals.len() < n {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .delivered
                .wait_timeout(evals, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            evals = guard;
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.evals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScriptHost for RecordingHost {
    fn eval(&self, script: &str) {
        self.lock().push(script.to_string());
        self.delivered.notify_all();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
