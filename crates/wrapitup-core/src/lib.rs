//! Wrapitup Core - Graceful shutdown for long-running work
//!
//! Code that should stop early when asked becomes a *listener*: it polls
//! [`requested`] now and then, or keeps a [`Timer`] whose [`Timer::expired`]
//! turns true on the earlier of its time limit running out or a shutdown
//! request. A [`SignalGuard`] turns signals such as Ctrl+C into requests
//! while one of its scopes is open.
//!
//! # Example
//!
//! ```no_run
//! use wrapitup_core::{SignalGuard, Timer};
//!
//! fn a_lot_of_work(data: &[u64], limit: f64) {
//!     let mut timer = Timer::new(limit).expect("limit is a valid number");
//!     for datum in data {
//!         if timer.expired() {
//!             break;
//!         }
//!         // do_work(datum)
//!         let _ = datum;
//!     }
//! }
//!
//! let guard = SignalGuard::new();
//! guard.run(|| a_lot_of_work(&[1, 2, 3], 60.0)).expect("main thread");
//! ```
//!
//! [`request`], [`reset`] and [`requested`] are thread safe. Guards must be
//! used from the main thread. Timers need external synchronization.

#[cfg(not(unix))]
compile_error!("wrapitup-core installs handlers with sigaction and supports unix targets only");

pub mod callback;
pub mod error;
pub mod guard;
pub mod logging;
pub mod platform;
pub mod progress;
pub mod requests;
pub mod signal;
pub mod timer;

// Re-exports for convenience
pub use callback::{Callback, SignalContext, note_shutdown, report_shutdown};
pub use error::{Error, Result};
pub use guard::{Scope, SignalGuard};
pub use logging::{ProgressLogger, init_logging};
pub use platform::SignalPolicy;
pub use progress::{ProgressContext, SharedProgress, fmt_remaining};
pub use requests::{request, request_flag, requested, reset};
pub use signal::Signal;
pub use timer::Timer;
