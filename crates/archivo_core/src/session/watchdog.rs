//! Background thread driving an [`InactivityMonitor`].
//!
//! The watchdog polls on a fixed interval, shortens its sleep while the
//! warning phase runs, and invokes `on_expire` exactly once.

use crate::session::clock::SharedClock;
use crate::session::monitor::{ActivityKind, InactivityMonitor, WatchState};
use log::{info, warn};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a running inactivity watchdog. Dropping it stops the thread.
pub struct Watchdog {
    monitor: Arc<Mutex<InactivityMonitor>>,
    clock: SharedClock,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn spawn<F>(
        monitor: InactivityMonitor,
        clock: SharedClock,
        poll_interval: Duration,
        on_expire: F,
    ) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let monitor = Arc::new(Mutex::new(monitor));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_monitor = Arc::clone(&monitor);
        let thread_clock = Arc::clone(&clock);

        let handle = thread::Builder::new()
            .name("archivo-inactivity".to_string())
            .spawn(move || {
                let mut wait = poll_interval;
                loop {
                    match stop_rx.recv_timeout(wait) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    let now = thread_clock.now_ms();
                    let state = match thread_monitor.lock() {
                        Ok(mut guard) => guard.poll(now),
                        Err(poisoned) => poisoned.into_inner().poll(now),
                    };
                    match state {
                        WatchState::Active { .. } => wait = poll_interval,
                        WatchState::Expiring { remaining } => {
                            wait = remaining.min(poll_interval);
                        }
                        WatchState::Expired => {
                            info!("event=session_expired module=session status=signed_out");
                            on_expire();
                            return;
                        }
                    }
                }
            })?;

        Ok(Self {
            monitor,
            clock,
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Forwards a client input event to the monitor.
    pub fn record_activity(&self, kind: ActivityKind) -> bool {
        let now = self.clock.now_ms();
        match self.monitor.lock() {
            Ok(mut guard) => guard.record_activity(kind, now),
            Err(poisoned) => poisoned.into_inner().record_activity(kind, now),
        }
    }

    /// Current phase evaluated at the clock's now.
    pub fn state(&self) -> WatchState {
        let now = self.clock.now_ms();
        match self.monitor.lock() {
            Ok(mut guard) => guard.poll(now),
            Err(poisoned) => poisoned.into_inner().poll(now),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops polling and waits for the thread to exit.
    pub fn stop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("event=watchdog_stop module=session status=error reason=thread_panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
