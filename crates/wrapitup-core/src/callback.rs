//! Signal callbacks and the context they receive

use std::sync::Arc;

use crate::requests;
use crate::signal::Signal;

/// What the OS reported alongside a caught signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalContext {
    pub signal: Signal,
    /// `si_code`: who or what raised the signal (`SI_USER`, `SI_KERNEL`, ...).
    pub code: i32,
    /// Sending process, where the platform reports one.
    pub sender_pid: Option<i32>,
}

impl SignalContext {
    /// Build a context from the `siginfo_t` a `SA_SIGINFO` handler receives.
    ///
    /// # Safety
    /// `info` must be null or point to the `siginfo_t` the kernel passed to
    /// the currently running handler.
    pub(crate) unsafe fn from_siginfo(signal: Signal, info: *const libc::siginfo_t) -> Self {
        if info.is_null() {
            return Self {
                signal,
                code: 0,
                sender_pid: None,
            };
        }
        let info = &*info;
        Self {
            signal,
            code: info.si_code,
            sender_pid: sender_pid(info),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn sender_pid(info: &libc::siginfo_t) -> Option<i32> {
    Some(info.si_pid())
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn sender_pid(info: &libc::siginfo_t) -> Option<i32> {
    Some(info.si_pid)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
)))]
unsafe fn sender_pid(_info: &libc::siginfo_t) -> Option<i32> {
    None
}

/// Called from the installed handler once the request flag is set and the
/// pre-scope handlers are back.
///
/// Runs in signal-handling context: keep it short. Anything beyond atomics
/// and async-signal-safe calls is at the caller's own risk.
pub type Callback = Arc<dyn Fn(Signal, &SignalContext) + Send + Sync + 'static>;

/// Wrap a two-argument callable as a [`Callback`].
///
/// The signature is the whole contract: anything that does not take exactly
/// a signal and a context is rejected at compile time.
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(Signal, &SignalContext) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Warning logged by [`report_shutdown`].
pub fn shutdown_message(signal: Signal, pid: u32) -> String {
    let hint = if signal == Signal::INT {
        ". Press Ctrl+C again to exit immediately."
    } else {
        ""
    };
    format!("Commencing shut down. (Signal {signal}, process {pid}.){hint}")
}

/// Default callback: remember the signal so its warning can be logged
/// outside the handler. Nothing here may take a lock.
pub fn note_shutdown(signal: Signal, _ctx: &SignalContext) {
    requests::note(signal);
}

/// Log the shut down warning for a signal caught by the default callback.
///
/// Each caught signal is reported once; returns it, or `None` if there is
/// nothing new. Scope exit and [`Timer`](crate::Timer) polling call this, so
/// most code never needs to.
pub fn report_shutdown() -> Option<Signal> {
    let signal = requests::take_note()?;
    log::warn!("{}", shutdown_message(signal, std::process::id()));
    Some(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn interrupt_gets_hint() {
        let msg = shutdown_message(Signal::INT, 42);
        assert_eq!(
            msg,
            "Commencing shut down. (Signal SIGINT, process 42.). Press Ctrl+C again to exit immediately."
        );
    }

    #[test]
    fn other_signals_have_no_hint() {
        let msg = shutdown_message(Signal::TERM, 7);
        assert_eq!(msg, "Commencing shut down. (Signal SIGTERM, process 7.)");
    }

    #[test]
    fn closures_become_callbacks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb = callback(move |sig, ctx: &SignalContext| {
            sink.lock().unwrap().push((sig, ctx.code));
        });
        let ctx = SignalContext {
            signal: Signal::USR1,
            code: 0,
            sender_pid: None,
        };
        cb(Signal::USR1, &ctx);
        assert_eq!(*seen.lock().unwrap(), vec![(Signal::USR1, 0)]);
    }

    #[test]
    fn null_siginfo() {
        let ctx = unsafe { SignalContext::from_siginfo(Signal::TERM, std::ptr::null()) };
        assert_eq!(ctx.signal, Signal::TERM);
        assert_eq!(ctx.sender_pid, None);
    }

    #[test]
    fn default_callback_defers_warning() {
        let _lock = crate::test_support::serial();
        report_shutdown();
        let cb: Callback = Arc::new(note_shutdown);
        let ctx = SignalContext {
            signal: Signal::TERM,
            code: 0,
            sender_pid: None,
        };
        cb(Signal::TERM, &ctx);
        assert_eq!(report_shutdown(), Some(Signal::TERM));
        assert_eq!(report_shutdown(), None);
    }
}
