//! Process-wide Ctrl-C flag.
//!
//! The handler only records the request. Child processes receive the signal
//! from the terminal themselves, and an open transaction observes the flag
//! when it ends and rolls back.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Installs the Ctrl-C handler. Safe to call more than once.
pub fn install_handler() {
    if let Err(e) = ctrlc::set_handler(|| {
        if !INTERRUPTED.swap(true, Ordering::SeqCst) {
            log::warn!("Interrupt requested, aborting after the current operation");
        }
    }) {
        log::debug!("Ctrl-C handler not installed: {}", e);
    }
}

/// True once the user asked the program to stop.
pub fn requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Raises the flag as if Ctrl-C had been pressed.
pub fn request() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Clears the flag.
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}
