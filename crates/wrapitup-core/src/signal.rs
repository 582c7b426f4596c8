//! Catchable signal identifiers

use std::fmt;
use std::str::FromStr;

use libc::c_int;
use signal_hook::consts::signal::*;

use crate::error::{Error, Result};

/// A signal a [`SignalGuard`](crate::SignalGuard) may catch.
///
/// Only signals from the catalog below are representable; `SIGKILL`,
/// `SIGSTOP` and the synchronous fault signals are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signal(c_int);

/// Catchable signals and their canonical names.
const CATALOG: &[(c_int, &str)] = &[
    (SIGHUP, "SIGHUP"),
    (SIGINT, "SIGINT"),
    (SIGQUIT, "SIGQUIT"),
    (SIGTRAP, "SIGTRAP"),
    (SIGABRT, "SIGABRT"),
    (SIGBUS, "SIGBUS"),
    (SIGUSR1, "SIGUSR1"),
    (SIGUSR2, "SIGUSR2"),
    (SIGPIPE, "SIGPIPE"),
    (SIGALRM, "SIGALRM"),
    (SIGTERM, "SIGTERM"),
    (SIGCHLD, "SIGCHLD"),
    (SIGCONT, "SIGCONT"),
    (SIGTSTP, "SIGTSTP"),
    (SIGTTIN, "SIGTTIN"),
    (SIGTTOU, "SIGTTOU"),
    (SIGURG, "SIGURG"),
    (SIGXCPU, "SIGXCPU"),
    (SIGXFSZ, "SIGXFSZ"),
    (SIGVTALRM, "SIGVTALRM"),
    (SIGPROF, "SIGPROF"),
    (SIGWINCH, "SIGWINCH"),
    (SIGIO, "SIGIO"),
    (SIGSYS, "SIGSYS"),
];

impl Signal {
    pub const HUP: Signal = Signal(SIGHUP);
    pub const INT: Signal = Signal(SIGINT);
    pub const QUIT: Signal = Signal(SIGQUIT);
    pub const TERM: Signal = Signal(SIGTERM);
    pub const USR1: Signal = Signal(SIGUSR1);
    pub const USR2: Signal = Signal(SIGUSR2);
    pub const ALRM: Signal = Signal(SIGALRM);

    /// Convert a raw signal number.
    pub fn from_raw(raw: c_int) -> Result<Self> {
        if signal_hook::consts::FORBIDDEN.contains(&raw) {
            return Err(Error::InvalidArgument(format!(
                "signal {raw} cannot be caught"
            )));
        }
        if CATALOG.iter().any(|&(num, _)| num == raw) {
            Ok(Self(raw))
        } else {
            Err(Error::InvalidArgument(format!(
                "Cannot convert to a signal: {raw}"
            )))
        }
    }

    /// Look up a signal by name: `SIGINT`, `INT` and `int` are all accepted.
    pub fn from_name(name: &str) -> Result<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let full = if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{upper}")
        };
        CATALOG
            .iter()
            .find(|&&(_, n)| n == full)
            .map(|&(num, _)| Self(num))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown signal name: {name:?}")))
    }

    /// For numbers the kernel hands back for a signal we installed.
    pub(crate) const fn from_raw_unchecked(raw: c_int) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> c_int {
        self.0
    }

    /// Canonical `SIGxxx` name.
    pub fn name(self) -> &'static str {
        CATALOG
            .iter()
            .find(|&&(num, _)| num == self.0)
            .map(|&(_, n)| n)
            .unwrap_or("SIG?")
    }

    /// All catchable signals, in signal-number order.
    pub fn catalog() -> Vec<Signal> {
        let mut all: Vec<_> = CATALOG.iter().map(|&(num, _)| Signal(num)).collect();
        all.sort();
        all
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Signal {
    type Err = Error;

    /// Parse a signal name or a decimal signal number.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().parse::<c_int>() {
            Ok(raw) => Self::from_raw(raw),
            Err(_) => Self::from_name(s),
        }
    }
}

impl TryFrom<c_int> for Signal {
    type Error = Error;

    fn try_from(raw: c_int) -> Result<Self> {
        Self::from_raw(raw)
    }
}

impl From<Signal> for c_int {
    fn from(sig: Signal) -> c_int {
        sig.0
    }
}

/// Comma-separated signal names, as used in log lines.
pub fn join_names(signals: &[Signal]) -> String {
    signals
        .iter()
        .map(|s| s.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_name() {
        assert_eq!("SIGINT".parse::<Signal>().unwrap(), Signal::INT);
        assert_eq!("SIGTERM".parse::<Signal>().unwrap(), Signal::TERM);
    }

    #[test]
    fn parse_short_and_lowercase() {
        assert_eq!("INT".parse::<Signal>().unwrap(), Signal::INT);
        assert_eq!("usr1".parse::<Signal>().unwrap(), Signal::USR1);
        assert_eq!(" sigusr2 ".parse::<Signal>().unwrap(), Signal::USR2);
    }

    #[test]
    fn parse_number() {
        let raw = libc::SIGTERM.to_string();
        assert_eq!(raw.parse::<Signal>().unwrap(), Signal::TERM);
    }

    #[test]
    fn unknown_name_rejected() {
        let err = "SIGNOPE".parse::<Signal>().unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("SIGNOPE"));
    }

    #[test]
    fn forbidden_rejected() {
        for raw in [libc::SIGKILL, libc::SIGSTOP, libc::SIGSEGV] {
            let err = Signal::from_raw(raw).unwrap_err();
            assert!(err.is_invalid_argument(), "{raw}");
        }
        assert!("SIGKILL".parse::<Signal>().is_err());
    }

    #[test]
    fn out_of_range_rejected() {
        assert!(Signal::try_from(0).is_err());
        assert!(Signal::try_from(-1).is_err());
        assert!(Signal::try_from(10_000).is_err());
    }

    #[test]
    fn names_round_trip_through_catalog() {
        for sig in Signal::catalog() {
            assert_eq!(Signal::from_name(sig.name()).unwrap(), sig);
            assert_eq!(sig.to_string(), sig.name());
        }
    }

    #[test]
    fn catalog_is_sorted_and_complete() {
        let all = Signal::catalog();
        assert_eq!(all.len(), CATALOG.len());
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert!(all.contains(&Signal::INT));
    }

    #[test]
    fn join_names_in_order() {
        assert_eq!(join_names(&[Signal::USR1, Signal::USR2]), "SIGUSR1, SIGUSR2");
        assert_eq!(join_names(&[]), "");
    }

    #[test]
    fn raw_conversion() {
        assert_eq!(c_int::from(Signal::INT), libc::SIGINT);
        assert_eq!(Signal::QUIT.as_raw(), libc::SIGQUIT);
    }
}
