//! Process-wide shutdown request flag
//!
//! Listeners poll [`requested`] (directly or through a [`Timer`](crate::Timer))
//! and wrap up when it turns true. All operations are lock-free and safe to
//! call from any thread, including from inside a signal handler.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::signal::Signal;

/// Global request flag — set by the handlers a [`SignalGuard`](crate::SignalGuard) installs
pub fn request_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Ask every listener in this process to shut down
pub fn request() {
    request_flag().store(true, Ordering::SeqCst);
}

/// Withdraw the shutdown request
pub fn reset() {
    request_flag().store(false, Ordering::SeqCst);
}

/// Check if shutdown was requested
pub fn requested() -> bool {
    request_flag().load(Ordering::SeqCst)
}

/// Caught signal whose shut down warning has not been logged yet; 0 if none.
static NOTICE: AtomicI32 = AtomicI32::new(0);

/// Remember `signal` for [`report_shutdown`](crate::report_shutdown).
/// The first unreported signal is kept. Async-signal-safe.
pub(crate) fn note(signal: Signal) {
    let _ = NOTICE.compare_exchange(0, signal.as_raw(), Ordering::SeqCst, Ordering::SeqCst);
}

/// Take the remembered signal, leaving none.
pub(crate) fn take_note() -> Option<Signal> {
    match NOTICE.swap(0, Ordering::SeqCst) {
        0 => None,
        raw => Some(Signal::from_raw_unchecked(raw)),
    }
}
