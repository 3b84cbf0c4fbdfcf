//! The document-server lifecycle supervisor.
//!
//! The server is expected to terminate: the host can shut the document down,
//! a run can fail, a run can panic.  The supervisor owns a dedicated thread
//! that constructs a fresh server instance per run and immediately starts
//! the next run when one ends, so the bridge is always ready for the host's
//! next open command.
//!
//! # Run accounting
//!
//! Completed runs are counted behind a mutex/condvar pair.  A caller that
//! needs to know when the run serving *it* has fully wound down records the
//! completed-run count when its session opens and later blocks until the
//! count moves past that watermark.  Waiting on the watermark rather than on
//! "whatever run is current" matters: by the time a session tears down, the
//! restart loop has usually started a fresh idle run already, and waiting
//! for that one to end would block forever.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::infrastructure::server::ServerFactory;

/// Pause between runs.  Also throttles a crash loop.
const RESTART_DELAY: Duration = Duration::from_millis(20);

/// Thread name of the restart loop.
pub const SUPERVISOR_THREAD_NAME: &str = "server";

/// Completed-run counter shared between the restart loop and waiters.
#[derive(Debug, Default)]
struct RunCounter {
    completed: Mutex<u64>,
    ended: Condvar,
}

impl RunCounter {
    fn completed(&self) -> u64 {
        *self.lock()
    }

    fn bump(&self) {
        *self.lock() += 1;
        self.ended.notify_all();
    }

    fn wait_past(&self, watermark: u64) {
        let mut completed = self.lock();
        while *completed <= watermark {
            completed = self
                .ended
                .wait(completed)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs the document server in a restart loop on a dedicated thread.
pub struct Supervisor {
    runs: Arc<RunCounter>,
    _thread: JoinHandle<()>,
}

impl Supervisor {
    /// Spawns the supervisor thread and starts the first run immediately.
    pub fn spawn(factory: ServerFactory) -> Self {
        let runs = Arc::new(RunCounter::default());
        let counter = Arc::clone(&runs);
        let thread = thread::Builder::new()
            .name(SUPERVISOR_THREAD_NAME.to_string())
            .spawn(move || restart_loop(&counter, factory))
            .unwrap_or_else(|e| panic!("failed to spawn supervisor thread: {e}"));
        Self {
            runs,
            _thread: thread,
        }
    }

    /// Number of server runs that have fully ended so far.
    ///
    /// Record this when opening a connection: the run serving that
    /// connection is the one that moves the count past the recorded value.
    pub fn runs_completed(&self) -> u64 {
        self.runs.completed()
    }

    /// Blocks until more runs have completed than `watermark`.
    ///
    /// Returns immediately when the watermarked run has already ended, even
    /// if a later run is currently in progress.  Callers use this to
    /// sequence teardown: once it returns, no server code from the
    /// watermarked run is still executing.
    pub fn wait_for_run_completion(&self, watermark: u64) {
        debug!(watermark, "waiting for server run to wind down");
        self.runs.wait_past(watermark);
        debug!(watermark, "server run has ended");
    }
}

fn restart_loop(runs: &RunCounter, factory: ServerFactory) {
    let mut run = 0u64;
    loop {
        run += 1;
        info!(run, "starting document server");
        let mut server = factory();
        match panic::catch_unwind(AssertUnwindSafe(|| server.run())) {
            Ok(Ok(())) => info!(run, "document server exited cleanly"),
            Ok(Err(e)) => warn!(run, "document server exited with error: {e:#}"),
            Err(_) => error!(run, "document server panicked; restarting"),
        }
        runs.bump();
        thread::sleep(RESTART_DELAY);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
