//! Wall-clock limit for cell and macro evaluation.
//!
//! Rhai calls the progress hook between operations, so a runaway script is
//! stopped by the interpreter itself regardless of what the script does.
//! The outermost evaluation arms the deadline; nested evaluations (a cell
//! reading another cell) run under the same one.

use rhai::{Dynamic, Engine};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// How many operations run between clock checks.
const CHECK_INTERVAL: u64 = 256;

#[derive(Debug)]
pub struct Deadline {
    limit_ms: AtomicU64,
    started: Mutex<Option<Instant>>,
}

impl Deadline {
    pub fn new(limit: Duration) -> Arc<Self> {
        Arc::new(Deadline {
            limit_ms: AtomicU64::new(limit.as_millis() as u64),
            started: Mutex::new(None),
        })
    }

    pub fn limit_ms(&self) -> u64 {
        self.limit_ms.load(Ordering::Relaxed)
    }

    pub fn set_limit(&self, limit: Duration) {
        self.limit_ms
            .store(limit.as_millis() as u64, Ordering::Relaxed);
    }

    /// Start the clock unless an enclosing evaluation already did.
    ///
    /// The returned guard stops the clock when dropped, on every exit path.
    pub fn arm(self: &Arc<Self>) -> Option<DeadlineGuard> {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if started.is_some() {
            return None;
        }
        *started = Some(Instant::now());
        Some(DeadlineGuard {
            deadline: Arc::clone(self),
        })
    }

    pub fn is_armed(&self) -> bool {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn is_expired(&self) -> bool {
        let started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        match *started {
            Some(at) => at.elapsed() >= Duration::from_millis(self.limit_ms()),
            None => false,
        }
    }
}

/// Disarms its [`Deadline`] on drop.
#[derive(Debug)]
pub struct DeadlineGuard {
    deadline: Arc<Deadline>,
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        *self
            .deadline
            .started
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Terminate any evaluation on `engine` once `deadline` expires.
pub fn install_deadline(engine: &mut Engine, deadline: Arc<Deadline>) {
    engine.on_progress(move |ops| {
        if ops % CHECK_INTERVAL == 0 && deadline.is_expired() {
            tracing::warn!(limit_ms = deadline.limit_ms(), "evaluation timed out");
            Some(Dynamic::from(deadline.limit_ms() as i64))
        } else {
            None
        }
    });
}
