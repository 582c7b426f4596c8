//! Countdown timer that runs out early when a shutdown is requested

use std::time::Instant;

use crate::callback::report_shutdown;
use crate::error::{Error, Result};
use crate::requests::requested;

/// Countdown timer that goes to zero while a shutdown request is active.
///
/// Before [`stop`](Timer::stop), [`remaining`](Timer::remaining) and
/// [`expired`](Timer::expired) behave as though the limit ran out whenever a
/// shutdown is requested, and recover if the request is [`reset`](crate::reset).
/// After `stop`, `expired` reports what was observed up to the stop and never
/// changes again.
///
/// Timers carry no synchronization. Share one across threads behind a lock.
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
    limit: f64,
    running_time: Option<f64>,
    shutdown_latched: bool,
}

fn check_limit(limit: f64) -> Result<()> {
    if limit.is_nan() {
        return Err(Error::InvalidArgument(
            "limit is NaN (not a number)".to_string(),
        ));
    }
    if limit < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "limit must not be negative: {limit}"
        )));
    }
    Ok(())
}

impl Timer {
    /// Start a timer with `limit` seconds (`f64::INFINITY` for no limit).
    pub fn new(limit: f64) -> Result<Self> {
        check_limit(limit)?;
        Ok(Self {
            start: Instant::now(),
            limit,
            running_time: None,
            shutdown_latched: false,
        })
    }

    /// Start a timer without a time limit.
    pub fn unlimited() -> Self {
        Self {
            start: Instant::now(),
            limit: f64::INFINITY,
            running_time: None,
            shutdown_latched: false,
        }
    }

    /// (Re)start the timer, replacing the limit. A bad limit leaves the timer untouched.
    pub fn start(&mut self, limit: f64) -> Result<()> {
        *self = Self::new(limit)?;
        Ok(())
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn is_stopped(&self) -> bool {
        self.running_time.is_some()
    }

    fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop and return elapsed seconds. Later calls return the first value.
    pub fn stop(&mut self) -> f64 {
        *self
            .running_time
            .get_or_insert_with(|| self.start.elapsed().as_secs_f64())
    }

    /// Seconds left under the limit.
    ///
    /// Zero while a shutdown is requested, negative once the limit has passed,
    /// and always zero after [`stop`](Timer::stop).
    pub fn remaining(&mut self) -> f64 {
        if self.running_time.is_some() {
            return 0.0;
        }
        if requested() {
            if !self.shutdown_latched {
                report_shutdown();
            }
            self.shutdown_latched = true;
            return 0.0;
        }
        self.limit - self.elapsed()
    }

    /// Whether the limit ran out or a shutdown was requested.
    ///
    /// After [`stop`](Timer::stop): whether a request had been observed before
    /// the stop, or the running time exceeded the limit. Frozen.
    pub fn expired(&mut self) -> bool {
        match self.running_time {
            None => self.remaining() <= 0.0,
            Some(running) => self.shutdown_latched || running > self.limit,
        }
    }

    /// Deliver `SIGALRM` once [`remaining`](Timer::remaining) seconds from now.
    ///
    /// Arms the process's single `ITIMER_REAL` one-shot (no interval) and
    /// returns the previous timer's `(seconds, interval)` so the caller can
    /// restore it. Install a `SIGALRM` handler first.
    #[cfg(unix)]
    pub fn alarm(&mut self) -> Result<(f64, f64)> {
        let remaining = self.remaining();
        if remaining <= 0.0 {
            return Err(Error::InvalidState(format!(
                "Time limit has expired: time remaining is {remaining:.6}"
            )));
        }
        if remaining.is_infinite() {
            return Err(Error::InvalidArgument(
                "timer has no time limit to alarm on".to_string(),
            ));
        }
        let new = libc::itimerval {
            it_interval: timeval_from_secs(0.0),
            it_value: timeval_from_secs(remaining),
        };
        let mut old = libc::itimerval {
            it_interval: timeval_from_secs(0.0),
            it_value: timeval_from_secs(0.0),
        };
        // SAFETY: both pointers reference live, initialized itimervals.
        if unsafe { libc::setitimer(libc::ITIMER_REAL, &new, &mut old) } != 0 {
            return Err(Error::last_os("setitimer"));
        }
        log::debug!("Alarm set for {remaining:.3}s");
        Ok((secs_from_timeval(old.it_value), secs_from_timeval(old.it_interval)))
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Round up to whole microseconds; a positive delay never becomes zero,
/// which `setitimer` would read as "disarm".
#[cfg(unix)]
fn timeval_from_secs(secs: f64) -> libc::timeval {
    let mut whole = secs.trunc();
    let mut micros = ((secs - whole) * 1e6).ceil();
    if micros >= 1e6 {
        whole += 1.0;
        micros -= 1e6;
    }
    if secs > 0.0 && whole == 0.0 && micros == 0.0 {
        micros = 1.0;
    }
    libc::timeval {
        tv_sec: whole as libc::time_t,
        tv_usec: micros as libc::suseconds_t,
    }
}

#[cfg(unix)]
fn secs_from_timeval(tv: libc::timeval) -> f64 {
    tv.tv_sec as f64 + tv.tv_usec as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{request, reset};
    use crate::test_support::serial;
    use std::time::Duration;

    const LIMIT: f64 = 0.05;

    fn sleep(secs: f64) {
        std::thread::sleep(Duration::from_secs_f64(secs));
    }

    #[test]
    fn request_expires_timer() {
        let _lock = serial();
        request();
        assert!(Timer::unlimited().expired());
        reset();
    }

    #[test]
    fn first_request_seen_reports_caught_signal() {
        let _lock = serial();
        crate::requests::note(crate::Signal::TERM);
        request();
        let mut timer = Timer::unlimited();
        assert!(timer.expired());
        assert_eq!(report_shutdown(), None);
        reset();
    }

    #[test]
    fn bad_limits_rejected() {
        assert!(Timer::new(f64::NAN).unwrap_err().is_invalid_argument());
        assert!(Timer::new(-1.0).unwrap_err().is_invalid_argument());
        assert!(Timer::new(f64::NEG_INFINITY).unwrap_err().is_invalid_argument());
        assert!(Timer::new(0.0).is_ok());
        assert!(Timer::new(f64::INFINITY).is_ok());
    }

    #[test]
    fn failed_start_keeps_state() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(LIMIT).unwrap();
        t.stop();
        assert!(t.start(f64::NAN).is_err());
        assert!(t.is_stopped());
        assert_eq!(t.limit(), LIMIT);
    }

    #[test]
    fn default_has_no_limit() {
        let _lock = serial();
        reset();
        let mut t = Timer::default();
        assert_eq!(t.remaining(), f64::INFINITY);
        assert!(!t.expired());
        sleep(0.01);
        assert_eq!(t.remaining(), f64::INFINITY);
        assert!(!t.expired());
    }

    #[test]
    fn counts_down_then_expires() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(LIMIT).unwrap();
        let t1 = t.remaining();
        assert!(t1 > LIMIT / 2.0 && t1 <= LIMIT);
        assert!(!t.expired());
        sleep(LIMIT / 2.0);
        let t2 = t.remaining();
        assert!(t1 - t2 >= LIMIT / 2.0 - 1e-3, "t1={t1} t2={t2}");
        sleep(LIMIT);
        assert!(t.remaining() < 0.0);
        assert!(t.expired());
        t.stop();
        assert!(t.expired());
    }

    #[test]
    fn stopped_before_limit_stays_unexpired() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(LIMIT).unwrap();
        t.stop();
        assert!(!t.expired());
        sleep(LIMIT);
        assert!(!t.expired());
    }

    #[test]
    fn stop_is_idempotent() {
        let _lock = serial();
        reset();
        let mut t = Timer::unlimited();
        sleep(0.01);
        let first = t.stop();
        assert!(first >= 0.01);
        sleep(0.01);
        assert_eq!(t.stop(), first);
    }

    #[test]
    fn stop_past_limit() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(LIMIT).unwrap();
        sleep(LIMIT);
        assert!(t.stop() > LIMIT);
        assert!(t.expired());
    }

    #[test]
    fn remaining_zero_while_requested() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(10.0).unwrap();
        request();
        assert_eq!(t.remaining(), 0.0);
        assert!(t.expired());
        reset();
        assert!(t.remaining() > 0.0);
        assert!(!t.expired());
    }

    #[test]
    fn remaining_zero_after_stop() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(10.0).unwrap();
        assert!(t.stop() < 10.0);
        assert_eq!(t.remaining(), 0.0);
    }

    #[test]
    fn latched_request_survives_reset() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(10.0).unwrap();
        request();
        assert!(t.expired());
        t.stop();
        reset();
        assert!(t.expired());
        request();
        assert!(t.expired());
        reset();
    }

    #[test]
    fn stop_does_not_latch_request() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(10.0).unwrap();
        request();
        t.stop();
        reset();
        assert!(!t.expired());
    }

    #[test]
    fn start_clears_frozen_state() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(10.0).unwrap();
        request();
        assert!(t.expired());
        t.stop();
        reset();
        t.start(10.0).unwrap();
        assert!(!t.is_stopped());
        assert!(!t.expired());
        assert!(t.remaining() > 9.0);
    }

    #[test]
    fn zero_limit_is_expired() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(0.0).unwrap();
        assert!(t.expired());
    }

    #[test]
    fn alarm_after_deadline_fails() {
        let _lock = serial();
        reset();
        let mut t = Timer::new(0.0).unwrap();
        let err = t.alarm().unwrap_err();
        assert!(err.is_invalid_state());
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn alarm_without_limit_fails() {
        let _lock = serial();
        reset();
        let err = Timer::unlimited().alarm().unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn timeval_rounding() {
        let tv = timeval_from_secs(1.5);
        assert_eq!((tv.tv_sec, tv.tv_usec), (1, 500_000));
        let tv = timeval_from_secs(1e-9);
        assert_eq!((tv.tv_sec, tv.tv_usec), (0, 1));
        let tv = timeval_from_secs(0.0);
        assert_eq!((tv.tv_sec, tv.tv_usec), (0, 0));
        let tv = timeval_from_secs(2.999_999_9);
        assert_eq!((tv.tv_sec, tv.tv_usec), (3, 0));
        assert_eq!(secs_from_timeval(timeval_from_secs(10.25)), 10.25);
    }
}
