//! Ctrl-C handling for apply and destroy
//!
//! The first SIGINT cancels the run cooperatively: nothing new is dispatched
//! and in-flight platform calls finish so the ledger stays accurate. The
//! handler then restores the default disposition, so a second SIGINT kills
//! the process.

use provision::CancelToken;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cancels `token` on SIGINT while alive.
pub struct InterruptGuard {
    stop: Arc<AtomicBool>,
    watcher: Option<thread::JoinHandle<()>>,
}

impl InterruptGuard {
    pub fn install(token: CancelToken) -> Self {
        INTERRUPTED.store(false, Ordering::SeqCst);
        install_handler();

        let stop = Arc::new(AtomicBool::new(false));
        let watcher = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    if INTERRUPTED.load(Ordering::SeqCst) {
                        log::warn!("interrupted, waiting for in-flight operations to finish");
                        token.cancel();
                        return;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            })
        };

        Self {
            stop,
            watcher: Some(watcher),
        }
    }

    /// Whether SIGINT arrived since the guard was installed
    pub fn interrupted(&self) -> bool {
        INTERRUPTED.load(Ordering::SeqCst)
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
        restore_default();
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
    // SAFETY: signal() is async-signal-safe
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn install_handler() {
    let handler = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only touches an atomic and calls signal()
    unsafe {
        libc::signal(libc::SIGINT, handler);
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn restore_default() {
    // SAFETY: restoring the default disposition has no preconditions
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

#[cfg(not(unix))]
fn install_handler() {}

#[cfg(not(unix))]
fn restore_default() {}
