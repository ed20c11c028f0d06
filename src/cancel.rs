//! Interrupt handling: one shared cancellation flag and the listener that trips it.

use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared signal telling the running statement to abort.
///
/// Clones observe the same flag. The session re-arms it before every
/// statement, so an interrupt delivered while nothing runs is absorbed.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the flag. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation before starting new work.
    pub fn rearm(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Install the process-wide SIGINT/SIGTERM listener.
///
/// The handler runs on the dedicated thread owned by `ctrlc` and does nothing
/// but trip `cancel`. It can only be installed once per process.
pub fn listen_for_interrupts(cancel: &Cancellation) -> Result<(), ctrlc::Error> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
        debug!("interrupt received");
        cancel.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let cancel = Cancellation::new();
        let listener = cancel.clone();
        assert!(!cancel.is_cancelled());

        listener.cancel();
        assert!(cancel.is_cancelled());

        cancel.rearm();
        assert!(!listener.is_cancelled());
    }

    #[test]
    fn cancel_from_another_thread_is_visible() {
        let cancel = Cancellation::new();
        let remote = cancel.clone();
        std::thread::spawn(move || remote.cancel())
            .join()
            .unwrap();
        assert!(cancel.is_cancelled());
    }
}
