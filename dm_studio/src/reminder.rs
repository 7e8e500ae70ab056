use crate::notify::{Notifier, Severity};
use crate::session::SessionContext;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Nudges the user when too long has passed since the last successful save.
#[derive(Clone)]
pub struct SaveReminderScheduler {
    session: SessionContext,
    notifier: Arc<dyn Notifier>,
    threshold: Duration,
}

impl SaveReminderScheduler {
    pub fn new(session: SessionContext, notifier: Arc<dyn Notifier>, threshold: Duration) -> Self {
        Self { session, notifier, threshold }
    }

    /// Returns true when a reminder was shown by this call.
    pub fn check(&self, now: Instant) -> bool {
        let elapsed = {
            let mut state = self.session.lock();
            if !state.reminder_enabled || state.reminder_visible || state.guard_held {
                return false;
            }
            let elapsed = now.saturating_duration_since(state.last_successful_save_at);
            if elapsed < self.threshold {
                return false;
            }
            state.reminder_visible = true;
            elapsed
        };
        let minutes = elapsed.as_secs() / 60;
        log::debug!("[reminder] {minutes} minute(s) since last save");
        self.notifier.notify(
            Severity::Info,
            &format!("It has been {minutes} minute(s) since your last save. Consider saving your project."),
        );
        true
    }

    /// Hides a visible reminder; the next check past the threshold shows it again.
    pub fn acknowledge(&self) {
        self.session.lock().reminder_visible = false;
    }

    /// Runs `check` every `interval` on a background thread until the handle is dropped.
    pub fn start(&self, interval: Duration) -> std::io::Result<ReminderHandle> {
        let (stop, stopped) = mpsc::channel::<()>();
        let scheduler = self.clone();
        let thread = thread::Builder::new().name("dm-save-reminder".into()).spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    scheduler.check(Instant::now());
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })?;
        Ok(ReminderHandle { stop: Some(stop), thread: Some(thread) })
    }
}

/// Stops the reminder thread on drop.
#[derive(Debug)]
pub struct ReminderHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for ReminderHandle {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("[reminder] reminder thread panicked");
            }
        }
    }
}
