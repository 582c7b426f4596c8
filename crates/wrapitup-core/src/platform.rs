//! Platform signal policy and main-thread detection

use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::signal::{Signal, join_names};

/// Which signals a platform family catches by default, and which it allows at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalPolicy {
    family: &'static str,
    defaults: Vec<Signal>,
    /// `None` means any catchable signal is allowed.
    allowed: Option<Vec<Signal>>,
}

impl SignalPolicy {
    /// POSIX-like systems: Ctrl+C (`SIGINT`) plus `SIGTERM`, which service
    /// managers and process monitors send when asked to quit.
    pub fn posix() -> Self {
        Self {
            family: "posix",
            defaults: vec![Signal::INT, Signal::TERM],
            allowed: None,
        }
    }

    /// A console-restricted environment that can deliver only `allowed`.
    /// The allowed set doubles as the default set.
    pub fn restricted(family: &'static str, allowed: Vec<Signal>) -> Self {
        Self {
            family,
            defaults: allowed.clone(),
            allowed: Some(allowed),
        }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    pub fn defaults(&self) -> &[Signal] {
        &self.defaults
    }

    pub fn allowed(&self) -> Option<&[Signal]> {
        self.allowed.as_deref()
    }

    pub fn is_restricted(&self) -> bool {
        self.allowed.is_some()
    }

    /// Fail if any of `signals` lies outside this policy's allowed set.
    pub fn check(&self, signals: &[Signal]) -> Result<()> {
        let Some(allowed) = &self.allowed else {
            return Ok(());
        };
        let unsupported: Vec<Signal> = signals
            .iter()
            .copied()
            .filter(|s| !allowed.contains(s))
            .collect();
        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "{} does not support signal(s): {}",
                self.family,
                join_names(&unsupported)
            )))
        }
    }
}

/// Policy of the platform this process runs on, resolved once.
pub fn host() -> &'static SignalPolicy {
    static HOST: OnceLock<SignalPolicy> = OnceLock::new();
    HOST.get_or_init(SignalPolicy::posix)
}

/// Whether the calling thread is the process's main thread.
///
/// Signal dispositions are process-wide, so guards only change them from here.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn is_main_thread() -> bool {
    // SAFETY: gettid/getpid take no arguments and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t == libc::getpid() }
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd"
))]
pub fn is_main_thread() -> bool {
    // SAFETY: no arguments, no failure mode.
    unsafe { libc::pthread_main_np() == 1 }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd"
)))]
pub fn is_main_thread() -> bool {
    std::thread::current().name() == Some("main")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_defaults_are_int_and_term() {
        let policy = host();
        assert_eq!(policy.family(), "posix");
        assert_eq!(policy.defaults(), &[Signal::INT, Signal::TERM]);
        assert!(!policy.is_restricted());
    }

    #[test]
    fn unrestricted_accepts_anything() {
        let policy = SignalPolicy::posix();
        assert!(policy.check(&Signal::catalog()).is_ok());
    }

    #[test]
    fn restricted_rejects_outsiders() {
        let policy = SignalPolicy::restricted("console", vec![Signal::INT, Signal::QUIT]);
        assert!(policy.check(&[Signal::INT]).is_ok());
        assert!(policy.check(&[Signal::QUIT, Signal::INT]).is_ok());
        let err = policy.check(&[Signal::INT, Signal::TERM]).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("console"));
        assert!(err.to_string().contains("SIGTERM"));
    }

    #[test]
    fn restricted_defaults_match_allowed() {
        let policy = SignalPolicy::restricted("console", vec![Signal::INT, Signal::QUIT]);
        assert_eq!(policy.defaults(), policy.allowed().unwrap());
    }

    #[test]
    fn spawned_thread_is_not_main() {
        assert!(!std::thread::spawn(is_main_thread).join().unwrap());
    }
}
