use crate::notify::{Notifier, Severity};
use crate::session::SessionContext;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Single-flight lock for new/save/load. A second acquisition while held fails immediately;
/// nothing is queued.
#[derive(Clone)]
pub struct OperationGuard {
    session: SessionContext,
    notifier: Arc<dyn Notifier>,
}

impl OperationGuard {
    pub fn new(session: SessionContext, notifier: Arc<dyn Notifier>) -> Self {
        Self { session, notifier }
    }

    pub fn try_acquire(&self) -> bool {
        let mut state = self.session.lock();
        if state.guard_held {
            return false;
        }
        state.guard_held = true;
        state.guard_acquired_at = Some(Instant::now());
        state.generation = state.generation.wrapping_add(1);
        true
    }

    /// Releases the guard and cancels any armed watchdog. Safe to call when not held.
    pub fn release(&self) {
        let mut state = self.session.lock();
        state.guard_held = false;
        state.guard_acquired_at = None;
        state.watchdog_cancel = None;
    }

    pub fn is_held(&self) -> bool {
        self.session.guard_held()
    }

    /// Force-releases the current hold if `release` has not run within `timeout`. Re-arming
    /// replaces the previous watchdog.
    pub fn arm_watchdog(&self, timeout: Duration) {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let generation = {
            let mut state = self.session.lock();
            if !state.guard_held {
                return;
            }
            state.watchdog_cancel = Some(cancel);
            state.generation
        };
        let session = self.session.clone();
        let notifier = Arc::clone(&self.notifier);
        let spawned = thread::Builder::new().name("dm-guard-watchdog".into()).spawn(move || {
            if cancelled.recv_timeout(timeout) != Err(RecvTimeoutError::Timeout) {
                return;
            }
            {
                let mut state = session.lock();
                if !state.guard_held || state.generation != generation {
                    return;
                }
                state.guard_held = false;
                state.guard_acquired_at = None;
                state.watchdog_cancel = None;
            }
            log::warn!("[guard] operation exceeded {} ms; guard force-released", timeout.as_millis());
            notifier.notify(
                Severity::Warn,
                "The previous operation timed out. You can try again; changes already applied were kept.",
            );
        });
        if let Err(err) = spawned {
            log::error!("[guard] failed to start watchdog thread: {err}");
        }
    }

    /// Acquires and arms the watchdog, returning a lease that releases on drop.
    pub fn lease(&self, timeout: Duration) -> Option<GuardLease> {
        if !self.try_acquire() {
            return None;
        }
        let generation = self.session.lock().generation;
        self.arm_watchdog(timeout);
        Some(GuardLease { session: self.session.clone(), generation })
    }
}

/// Held for the whole span of an operation, including every suspension point. Releases only the
/// acquisition it was created for.
#[derive(Debug)]
pub struct GuardLease {
    session: SessionContext,
    generation: u64,
}

impl GuardLease {
    /// True while this lease still owns the guard (the watchdog has not fired).
    pub fn is_current(&self) -> bool {
        let state = self.session.lock();
        state.guard_held && state.generation == self.generation
    }
}

impl Drop for GuardLease {
    fn drop(&mut self) {
        let mut state = self.session.lock();
        if state.guard_held && state.generation == self.generation {
            state.guard_held = false;
            state.guard_acquired_at = None;
            state.watchdog_cancel = None;
        }
    }
}
