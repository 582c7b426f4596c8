//! Scoped, reentrant signal handlers that request shutdown
//!
//! A [`SignalGuard`] installs one handler for each of its signals when a
//! scope is entered and puts the previous handlers back when the scope is
//! left. On delivery the handler:
//!
//! 1. sets the request flag,
//! 2. restores the pre-scope handlers for every guarded signal, so a second
//!    signal reaches whatever was installed before (an outer scope, or the
//!    OS default which usually terminates),
//! 3. calls the guard's callback.
//!
//! The default callback only records the signal. Its warning is logged from
//! normal code: at scope exit, or when a [`Timer`](crate::Timer) first sees
//! the request.
//!
//! Leaving the scope restores handlers unconditionally and returns the
//! request flag to its value from before the scope was entered.
//!
//! Each entry pushes a snapshot of the previous handlers onto the guard's
//! stack and each exit pops exactly one, so the same guard can be entered
//! again while already entered.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use libc::{c_int, c_void};

use crate::callback::{self, Callback, SignalContext};
use crate::error::{Error, Result};
use crate::platform::{self, SignalPolicy};
use crate::requests;
use crate::signal::{Signal, join_names};

/// One slot per signal number; covers NSIG on every supported platform.
const SLOTS: usize = 128;

/// Innermost frame currently handling each signal.
static ACTIVE: [AtomicPtr<Frame>; SLOTS] = [const { AtomicPtr::new(ptr::null_mut()) }; SLOTS];

/// Handlers currently executing on any thread.
static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

fn slot(signal: Signal) -> &'static AtomicPtr<Frame> {
    &ACTIVE[signal.as_raw() as usize]
}

/// Previous disposition of one signal, saved at scope entry.
struct Saved {
    signal: Signal,
    action: libc::sigaction,
    /// Frame that handled `signal` before this one, if any.
    outer: *mut Frame,
    /// Cleared once restored; restoration runs at most once per entry.
    pending: AtomicBool,
}

/// Snapshot pushed by one scope entry.
struct Frame {
    callback: Callback,
    baseline: bool,
    saved: Vec<Saved>,
    panic: AtomicPtr<Box<dyn Any + Send>>,
}

impl Frame {
    /// Put back every saved handler that is still pending.
    ///
    /// Only atomics and `sigaction` here: this runs inside signal handlers.
    fn restore(&self) -> std::io::Result<()> {
        let mut result = Ok(());
        for saved in &self.saved {
            if !saved.pending.swap(false, Ordering::SeqCst) {
                continue;
            }
            slot(saved.signal).store(saved.outer, Ordering::SeqCst);
            // SAFETY: `action` is a disposition the kernel reported for this signal.
            let rc = unsafe { libc::sigaction(saved.signal.as_raw(), &saved.action, ptr::null_mut()) };
            if rc != 0 && result.is_ok() {
                result = Err(std::io::Error::last_os_error());
            }
        }
        result
    }

    fn stash_panic(&self, payload: Box<dyn Any + Send>) {
        let raw = Box::into_raw(Box::new(payload));
        if self
            .panic
            .compare_exchange(ptr::null_mut(), raw, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Keep the first panic; drop later ones.
            // SAFETY: `raw` was never published.
            drop(unsafe { Box::from_raw(raw) });
        }
    }

    fn take_panic(&self) -> Option<Box<dyn Any + Send>> {
        let raw = self.panic.swap(ptr::null_mut(), Ordering::SeqCst);
        if raw.is_null() {
            None
        } else {
            // SAFETY: only `stash_panic` publishes pointers, each from `Box::into_raw`.
            Some(*unsafe { Box::from_raw(raw) })
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        drop(self.take_panic());
    }
}

/// Block until no handler on another thread can still be reading a frame.
fn wait_for_handlers() {
    while IN_FLIGHT.load(Ordering::SeqCst) != 0 {
        std::thread::yield_now();
    }
}

extern "C" fn handle(signum: c_int, info: *mut libc::siginfo_t, _ucontext: *mut c_void) {
    IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
    requests::request();
    let frame = usize::try_from(signum)
        .ok()
        .filter(|&i| i < SLOTS)
        .map(|i| ACTIVE[i].load(Ordering::SeqCst))
        .unwrap_or(ptr::null_mut());
    if !frame.is_null() {
        // SAFETY: a frame outlives its slot entry, and exits wait for IN_FLIGHT to drain
        // before freeing it.
        let frame = unsafe { &*frame };
        let _ = frame.restore();
        let signal = Signal::from_raw_unchecked(signum);
        // SAFETY: `info` is the siginfo the kernel passed to this SA_SIGINFO handler.
        let ctx = unsafe { SignalContext::from_siginfo(signal, info) };
        let callback = &frame.callback;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(signal, &ctx))) {
            frame.stash_panic(payload);
        }
    }
    IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
}

fn current_action(signal: Signal) -> Result<libc::sigaction> {
    let mut old = MaybeUninit::<libc::sigaction>::zeroed();
    // SAFETY: a null `act` only queries; `old` is valid for writes.
    if unsafe { libc::sigaction(signal.as_raw(), ptr::null(), old.as_mut_ptr()) } != 0 {
        return Err(Error::last_os("sigaction"));
    }
    // SAFETY: filled in by the successful call above.
    Ok(unsafe { old.assume_init() })
}

fn handler_action() -> libc::sigaction {
    let handler: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) = handle;
    // SAFETY: all-zero is a valid sigaction; the fields that matter are set below.
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = handler as libc::sighandler_t;
    action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
    // SAFETY: `sa_mask` is a valid sigset_t to initialize.
    unsafe { libc::sigemptyset(&mut action.sa_mask) };
    action
}

/// Catch signals and turn them into shutdown requests while a [`Scope`] is open.
///
/// Guards must be entered from the main thread; they are neither `Send` nor
/// `Sync`, so scopes also close there. If listeners run in threads started
/// inside the scope, join them before leaving it.
///
/// ```no_run
/// use wrapitup_core::{SignalGuard, Timer};
///
/// let guard = SignalGuard::new();
/// guard.run(|| {
///     let mut timer = Timer::new(30.0).unwrap();
///     while !timer.expired() {
///         // one unit of work
///     }
/// }).unwrap();
/// ```
pub struct SignalGuard {
    signals: Vec<Signal>,
    callback: Callback,
    frames: RefCell<Vec<Box<Frame>>>,
}

impl SignalGuard {
    /// Guard the host platform's default signals with the default callback.
    pub fn new() -> Self {
        Self::from_signals(platform::host().defaults().to_vec())
    }

    /// Guard `signals` (duplicates ignored) with the default callback.
    pub fn with_signals<I>(signals: I) -> Result<Self>
    where
        I: IntoIterator<Item = Signal>,
    {
        Self::with_policy(platform::host(), signals)
    }

    /// Like [`with_signals`](Self::with_signals), validated against `policy`.
    pub fn with_policy<I>(policy: &SignalPolicy, signals: I) -> Result<Self>
    where
        I: IntoIterator<Item = Signal>,
    {
        let mut unique = Vec::new();
        for signal in signals {
            if !unique.contains(&signal) {
                unique.push(signal);
            }
        }
        if unique.is_empty() {
            return Err(Error::InvalidArgument("No signals selected".to_string()));
        }
        policy.check(&unique)?;
        Ok(Self::from_signals(unique))
    }

    fn from_signals(signals: Vec<Signal>) -> Self {
        Self {
            signals,
            callback: callback::callback(callback::note_shutdown),
            frames: RefCell::new(Vec::new()),
        }
    }

    /// Replace the callback run after a caught signal.
    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: Fn(Signal, &SignalContext) + Send + Sync + 'static,
    {
        self.callback = callback::callback(f);
        self
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// Number of scopes currently open on this guard.
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Install the handlers and open a scope. Must be called on the main thread.
    pub fn enter(&self) -> Result<Scope<'_>> {
        if !platform::is_main_thread() {
            return Err(Error::InvalidState(
                "signal handlers can only be installed from the main thread".to_string(),
            ));
        }
        let baseline = requests::requested();

        let mut saved = Vec::with_capacity(self.signals.len());
        for &signal in &self.signals {
            saved.push(Saved {
                signal,
                action: current_action(signal)?,
                outer: slot(signal).load(Ordering::SeqCst),
                pending: AtomicBool::new(true),
            });
        }
        let frame = Box::new(Frame {
            callback: self.callback.clone(),
            baseline,
            saved,
            panic: AtomicPtr::new(ptr::null_mut()),
        });
        let frame_ptr = &*frame as *const Frame as *mut Frame;

        let action = handler_action();
        for saved in &frame.saved {
            // A signal caught mid-install has already restored this entry.
            if !saved.pending.load(Ordering::SeqCst) {
                continue;
            }
            slot(saved.signal).store(frame_ptr, Ordering::SeqCst);
            // SAFETY: `action` is fully initialized and points at `handle`.
            if unsafe { libc::sigaction(saved.signal.as_raw(), &action, ptr::null_mut()) } != 0 {
                let err = Error::last_os("sigaction");
                let _ = frame.restore();
                wait_for_handlers();
                return Err(err);
            }
        }

        let depth = {
            let mut frames = self.frames.borrow_mut();
            frames.push(frame);
            frames.len()
        };
        log::info!(
            "Process {} now listening for shut down signals: {}",
            std::process::id(),
            join_names(&self.signals)
        );
        Ok(Scope {
            guard: self,
            depth,
            closed: false,
        })
    }

    /// Run `f` inside a scope.
    ///
    /// A panic in `f` still closes the scope while unwinding.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let scope = self.enter()?;
        let out = f();
        scope.exit()?;
        Ok(out)
    }

    fn exit_scope(&self, depth: usize) -> Result<()> {
        let frame = {
            let mut frames = self.frames.borrow_mut();
            if frames.len() != depth {
                return Err(Error::InvalidState(format!(
                    "scope {depth} closed while {} scopes are open; scopes must close innermost first",
                    frames.len()
                )));
            }
            frames.pop()
        };
        let Some(frame) = frame else {
            return Err(Error::InvalidState("no open scope to close".to_string()));
        };

        let restored = frame.restore();
        wait_for_handlers();
        callback::report_shutdown();
        if frame.baseline {
            requests::request();
        } else {
            requests::reset();
        }
        let payload = frame.take_panic();
        drop(frame);

        restored.map_err(|source| Error::Os {
            op: "sigaction",
            source,
        })?;
        if let Some(payload) = payload {
            if std::thread::panicking() {
                log::error!("Signal callback panicked while the scope was already unwinding");
            } else {
                panic::resume_unwind(payload);
            }
        }
        Ok(())
    }
}

impl Default for SignalGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignalGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalGuard")
            .field("signals", &self.signals)
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        let frames = std::mem::take(self.frames.get_mut());
        let Some(outermost) = frames.first() else {
            return;
        };
        log::warn!(
            "{} signal scope(s) still open at guard drop; restoring handlers",
            frames.len()
        );
        for frame in frames.iter().rev() {
            let _ = frame.restore();
        }
        wait_for_handlers();
        callback::report_shutdown();
        if outermost.baseline {
            requests::request();
        } else {
            requests::reset();
        }
    }
}

/// An open [`SignalGuard`] scope. Closing it, explicitly or by drop, restores
/// the previous handlers and request flag.
#[must_use = "dropping the scope immediately restores the previous handlers"]
pub struct Scope<'g> {
    guard: &'g SignalGuard,
    depth: usize,
    closed: bool,
}

impl Scope<'_> {
    /// Nesting level of this scope on its guard, starting at 1.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Close the scope and report failures.
    ///
    /// If the callback panicked while this scope was open, the panic resumes
    /// here after handlers and flag are restored.
    pub fn exit(mut self) -> Result<()> {
        self.closed = true;
        self.guard.exit_scope(self.depth)
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.guard.exit_scope(self.depth) {
            log::error!("Failed to close signal scope: {e}");
        }
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("signals", &self.guard.signals)
            .field("depth", &self.depth)
            .finish()
    }
}
